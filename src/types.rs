// =============================================================================
// Shared types used across the scalper
// =============================================================================

use serde::{Deserialize, Serialize};

/// Direction of a position or of an entry signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for longs, -1 for shorts. Multiplying a price move by this gives the
    /// move in the position's favour.
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Coarse market regime, derived from the spread between the fast and slow
/// averages normalised by the volatility range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketRegime {
    Trending,
    #[default]
    Ranging,
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trending => write!(f, "TRENDING"),
            Self::Ranging => write!(f, "RANGING"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_sign_and_opposite() {
        assert_eq!(Side::Long.sign(), 1.0);
        assert_eq!(Side::Short.sign(), -1.0);
        assert_eq!(Side::Long.opposite(), Side::Short);
    }

    #[test]
    fn side_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Side::Short).unwrap(), "\"SHORT\"");
        assert_eq!(Side::Long.to_string(), "LONG");
        assert_eq!(MarketRegime::Trending.to_string(), "TRENDING");
    }

    #[test]
    fn regime_defaults_to_ranging() {
        assert_eq!(MarketRegime::default(), MarketRegime::Ranging);
        assert_eq!(serde_json::to_string(&MarketRegime::default()).unwrap(), "\"RANGING\"");
    }
}
