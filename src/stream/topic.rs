// =============================================================================
// Topics, stream names and endpoint URLs
// =============================================================================
//
// A stream name is `<symbol>@<topic>` (e.g. `btcusdt@kline_1m`). One name
// connects to `<base>/ws/<name>`; several names are multiplexed on one socket
// through `<base>/stream?streams=a/b/c`, in which case every frame arrives in
// a `{"stream": name, "data": {...}}` envelope.

use serde::{Deserialize, Serialize};

/// Data topic carried by a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    Trade,
    AggTrade,
    Kline { interval: String },
    /// Diff depth (`levels == None`) or partial book depth (5, 10 or 20).
    Depth { levels: Option<u8> },
    BookTicker,
    Ticker,
    MarkPrice,
    ForceOrder,
}

impl Topic {
    /// Suffix after `<symbol>@`.
    pub fn suffix(&self) -> String {
        match self {
            Self::Trade => "trade".to_string(),
            Self::AggTrade => "aggTrade".to_string(),
            Self::Kline { interval } => format!("kline_{interval}"),
            Self::Depth { levels: None } => "depth@100ms".to_string(),
            Self::Depth { levels: Some(n) } => format!("depth{n}@100ms"),
            Self::BookTicker => "bookTicker".to_string(),
            Self::Ticker => "ticker".to_string(),
            Self::MarkPrice => "markPrice@1s".to_string(),
            Self::ForceOrder => "forceOrder".to_string(),
        }
    }

    /// Full stream name for `symbol`.
    pub fn stream_name(&self, symbol: &str) -> String {
        format!("{}@{}", symbol.to_lowercase(), self.suffix())
    }

    /// Recognise the topic of a stream name. Returns `None` for topics this
    /// crate does not route.
    pub fn from_stream_name(name: &str) -> Option<Self> {
        let (_, rest) = name.split_once('@')?;
        // Drop update-speed qualifiers such as `@100ms` / `@1s`.
        let head = rest.split('@').next().unwrap_or(rest);

        match head {
            "trade" => Some(Self::Trade),
            "aggTrade" => Some(Self::AggTrade),
            "bookTicker" => Some(Self::BookTicker),
            "ticker" => Some(Self::Ticker),
            "markPrice" => Some(Self::MarkPrice),
            "forceOrder" => Some(Self::ForceOrder),
            "depth" => Some(Self::Depth { levels: None }),
            _ => {
                if let Some(interval) = head.strip_prefix("kline_") {
                    return Some(Self::Kline { interval: interval.to_string() });
                }
                let levels = head.strip_prefix("depth")?.parse::<u8>().ok()?;
                Some(Self::Depth { levels: Some(levels) })
            }
        }
    }

    /// Recognise the topic of an un-enveloped payload from its `e` field
    /// (or, for payloads without one, from their shape).
    pub fn from_event_type(data: &serde_json::Value) -> Option<Self> {
        match data.get("e").and_then(serde_json::Value::as_str) {
            Some("trade") => Some(Self::Trade),
            Some("aggTrade") => Some(Self::AggTrade),
            Some("kline") => {
                let interval = data.get("k")?.get("i")?.as_str()?;
                Some(Self::Kline { interval: interval.to_string() })
            }
            Some("depthUpdate") => Some(Self::Depth { levels: None }),
            Some("24hrTicker") => Some(Self::Ticker),
            Some("markPriceUpdate") => Some(Self::MarkPrice),
            Some("forceOrder") => Some(Self::ForceOrder),
            Some("bookTicker") => Some(Self::BookTicker),
            Some(_) => None,
            None => {
                if data.get("lastUpdateId").is_some() {
                    Some(Self::Depth { levels: None })
                } else if data.get("u").is_some() && data.get("b").is_some() && data.get("a").is_some() {
                    Some(Self::BookTicker)
                } else {
                    None
                }
            }
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

// ---------------------------------------------------------------------------
// StreamSpec
// ---------------------------------------------------------------------------

/// The set of stream names one logical stream subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSpec {
    names: Vec<String>,
}

impl StreamSpec {
    pub fn single(name: impl Into<String>) -> Self {
        Self { names: vec![name.into()] }
    }

    pub fn combined<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { names: names.into_iter().map(Into::into).collect() }
    }

    /// All `topics` for one symbol.
    pub fn for_symbol(symbol: &str, topics: &[Topic]) -> Self {
        Self::combined(topics.iter().map(|t| t.stream_name(symbol)))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Endpoint URL under `base`.
    pub fn url(&self, base: &str) -> String {
        let base = base.trim_end_matches('/');
        match self.names.as_slice() {
            [one] => format!("{base}/ws/{one}"),
            many => format!("{base}/stream?streams={}", many.join("/")),
        }
    }
}
