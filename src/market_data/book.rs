// =============================================================================
// Order book views - best bid/ask and partial depth
// =============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CandleError;
use crate::market_data::candle::{parse_f64, parse_i64};

/// Best bid/ask update from `@bookTicker`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookTicker {
    pub symbol: String,
    pub update_id: i64,
    pub best_bid: f64,
    pub best_bid_qty: f64,
    pub best_ask: f64,
    pub best_ask_qty: f64,
}

impl BookTicker {
    pub fn from_event(data: &Value) -> Result<Self, CandleError> {
        let field = |name: &'static str| data.get(name).ok_or(CandleError::MissingField(name));
        Ok(Self {
            symbol: field("s")?
                .as_str()
                .ok_or(CandleError::MissingField("s"))?
                .to_uppercase(),
            update_id: parse_i64(field("u")?, "u")?,
            best_bid: parse_f64(field("b")?, "b")?,
            best_bid_qty: parse_f64(field("B")?, "B")?,
            best_ask: parse_f64(field("a")?, "a")?,
            best_ask_qty: parse_f64(field("A")?, "A")?,
        })
    }

    pub fn mid(&self) -> f64 {
        (self.best_bid + self.best_ask) / 2.0
    }

    /// Spread in basis points of the mid price; 0 for a degenerate book.
    pub fn spread_bps(&self) -> f64 {
        let mid = self.mid();
        if mid > 0.0 {
            (self.best_ask - self.best_bid) / mid * 10_000.0
        } else {
            0.0
        }
    }

    /// (bid qty - ask qty) / (bid qty + ask qty), in [-1, 1].
    pub fn imbalance(&self) -> f64 {
        imbalance(self.best_bid_qty, self.best_ask_qty)
    }
}

/// Partial book snapshot (`@depth5`, `@depth10`, `@depth20`) or a diff
/// update (`@depth`). Levels are `(price, quantity)`, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthUpdate {
    pub symbol: Option<String>,
    pub last_update_id: i64,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

impl DepthUpdate {
    pub fn from_event(data: &Value) -> Result<Self, CandleError> {
        // Partial snapshots use `lastUpdateId`/`bids`/`asks`; diff events use
        // `u`/`b`/`a` and carry the symbol.
        let (id, bids, asks) = if data.get("lastUpdateId").is_some() {
            (&data["lastUpdateId"], &data["bids"], &data["asks"])
        } else {
            (&data["u"], &data["b"], &data["a"])
        };

        Ok(Self {
            symbol: data.get("s").and_then(Value::as_str).map(str::to_uppercase),
            last_update_id: parse_i64(id, "lastUpdateId")?,
            bids: parse_levels(bids, "bids")?,
            asks: parse_levels(asks, "asks")?,
        })
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.0)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.0)
    }

    /// Quantity imbalance over every level carried by the update.
    pub fn imbalance(&self) -> f64 {
        let bid: f64 = self.bids.iter().map(|l| l.1).sum();
        let ask: f64 = self.asks.iter().map(|l| l.1).sum();
        imbalance(bid, ask)
    }
}

fn parse_levels(val: &Value, field: &'static str) -> Result<Vec<(f64, f64)>, CandleError> {
    let rows = val.as_array().ok_or(CandleError::MissingField(field))?;
    rows.iter()
        .map(|row| match row.as_array() {
            Some(pair) if pair.len() >= 2 => {
                Ok((parse_f64(&pair[0], field)?, parse_f64(&pair[1], field)?))
            }
            _ => Err(CandleError::NotNumeric { field, value: row.to_string() }),
        })
        .collect()
}

fn imbalance(bid: f64, ask: f64) -> f64 {
    let total = bid + ask;
    if total > 0.0 {
        (bid - ask) / total
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn book_ticker_derived_values() {
        let data = json!({
            "u": 400900217, "s": "BNBUSDT",
            "b": "25.35", "B": "30", "a": "25.37", "A": "10"
        });
        let t = BookTicker::from_event(&data).unwrap();
        assert!((t.mid() - 25.36).abs() < 1e-9);
        assert!((t.spread_bps() - 0.02 / 25.36 * 10_000.0).abs() < 1e-6);
        assert!((t.imbalance() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn parses_partial_depth_snapshot() {
        let data = json!({
            "lastUpdateId": 160,
            "bids": [["0.0024", "10"], ["0.0023", "5"]],
            "asks": [["0.0026", "100"]]
        });
        let d = DepthUpdate::from_event(&data).unwrap();
        assert_eq!(d.last_update_id, 160);
        assert_eq!(d.best_bid(), Some(0.0024));
        assert_eq!(d.best_ask(), Some(0.0026));
        assert!((d.imbalance() - (15.0 - 100.0) / 115.0).abs() < 1e-12);
        assert!(d.symbol.is_none());
    }

    #[test]
    fn parses_diff_depth_event() {
        let data = json!({
            "e": "depthUpdate", "E": 123456789, "s": "BNBBTC",
            "U": 157, "u": 160,
            "b": [["0.0024", "10"]], "a": []
        });
        let d = DepthUpdate::from_event(&data).unwrap();
        assert_eq!(d.symbol.as_deref(), Some("BNBBTC"));
        assert!(d.asks.is_empty());
    }

    #[test]
    fn malformed_level_is_rejected() {
        let data = json!({ "lastUpdateId": 1, "bids": [["x"]], "asks": [] });
        assert!(DepthUpdate::from_event(&data).is_err());
    }
}
