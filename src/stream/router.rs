// =============================================================================
// Frame router - envelope unwrapping and topic dispatch
// =============================================================================
//
// Turns one text frame into at most one typed `MarketEvent`:
//
//   combined stream   {"stream": "btcusdt@aggTrade", "data": {...}}
//                     topic from the stream name
//   single stream     {...}
//                     topic from the payload's `e` field (or its shape)
//
// Frames with an unknown topic (subscription acks, topics nobody routes) are
// `Ok(None)`. Frames that claim a known topic but do not parse are
// `Err(FrameError)`; the caller logs and drops them.

use serde::Serialize;
use serde_json::Value;

use super::topic::Topic;
use crate::error::FrameError;
use crate::market_data::{
    BookTicker, Candle, CandleKey, DepthUpdate, Liquidation, MarkPrice, Ticker24h, Trade,
};

/// A routed, typed market-data event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum MarketEvent {
    Trade(Trade),
    AggTrade(Trade),
    Kline { key: CandleKey, candle: Candle },
    Depth(DepthUpdate),
    BookTicker(BookTicker),
    Ticker(Ticker24h),
    MarkPrice(MarkPrice),
    Liquidation(Liquidation),
}

impl MarketEvent {
    pub fn topic_label(&self) -> &'static str {
        match self {
            Self::Trade(_) => "trade",
            Self::AggTrade(_) => "aggTrade",
            Self::Kline { .. } => "kline",
            Self::Depth(_) => "depth",
            Self::BookTicker(_) => "bookTicker",
            Self::Ticker(_) => "ticker",
            Self::MarkPrice(_) => "markPrice",
            Self::Liquidation(_) => "forceOrder",
        }
    }
}

/// Route a raw text frame.
pub fn route_frame(text: &str) -> Result<Option<MarketEvent>, FrameError> {
    let root: Value = serde_json::from_str(text)?;

    let (topic, data) = match (root.get("stream"), root.get("data")) {
        (Some(Value::String(name)), Some(data)) => (Topic::from_stream_name(name), data),
        _ => (Topic::from_event_type(&root), &root),
    };

    match topic {
        Some(topic) => decode(&topic, data).map(Some),
        None => Ok(None),
    }
}

fn decode(topic: &Topic, data: &Value) -> Result<MarketEvent, FrameError> {
    let event = match topic {
        Topic::Trade => MarketEvent::Trade(Trade::from_event(data)?),
        Topic::AggTrade => MarketEvent::AggTrade(Trade::from_event(data)?),
        Topic::Kline { .. } => {
            let (key, candle) = Candle::from_kline_event(data)?;
            MarketEvent::Kline { key, candle }
        }
        Topic::Depth { .. } => MarketEvent::Depth(DepthUpdate::from_event(data)?),
        Topic::BookTicker => MarketEvent::BookTicker(BookTicker::from_event(data)?),
        Topic::Ticker => MarketEvent::Ticker(Ticker24h::from_event(data)?),
        Topic::MarkPrice => MarketEvent::MarkPrice(MarkPrice::from_event(data)?),
        Topic::ForceOrder => MarketEvent::Liquidation(Liquidation::from_event(data)?),
    };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agg_trade_data() -> Value {
        json!({
            "e": "aggTrade", "E": 1, "s": "BTCUSDT", "a": 7,
            "p": "100.5", "q": "2", "f": 1, "l": 1, "T": 1000, "m": false
        })
    }

    #[test]
    fn routes_enveloped_frame_by_stream_name() {
        let frame = json!({ "stream": "btcusdt@aggTrade", "data": agg_trade_data() }).to_string();
        match route_frame(&frame).unwrap() {
            Some(MarketEvent::AggTrade(t)) => assert_eq!(t.id, 7),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn routes_bare_frame_by_event_type() {
        let frame = agg_trade_data().to_string();
        assert!(matches!(route_frame(&frame).unwrap(), Some(MarketEvent::AggTrade(_))));
    }

    #[test]
    fn routes_kline() {
        let frame = json!({
            "stream": "btcusdt@kline_1m",
            "data": {
                "e": "kline", "s": "BTCUSDT",
                "k": {
                    "t": 0, "T": 59_999, "i": "1m", "o": "1", "h": "2", "l": "0.5",
                    "c": "1.5", "v": "10", "q": "15", "n": 3, "V": "5", "Q": "7.5", "x": false
                }
            }
        })
        .to_string();
        match route_frame(&frame).unwrap() {
            Some(MarketEvent::Kline { key, candle }) => {
                assert_eq!(key.interval, "1m");
                assert!(!candle.is_closed);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_topic_is_ignored() {
        let frame = json!({ "stream": "btcusdt@miniTicker", "data": { "e": "24hrMiniTicker" } })
            .to_string();
        assert_eq!(route_frame(&frame).unwrap(), None);

        // Subscription acknowledgement.
        assert_eq!(route_frame(r#"{"result":null,"id":1}"#).unwrap(), None);
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(route_frame("{oops"), Err(FrameError::Json(_))));
    }

    #[test]
    fn known_topic_with_bad_payload_is_an_error() {
        let frame = json!({ "stream": "btcusdt@trade", "data": { "s": "BTCUSDT" } }).to_string();
        assert!(matches!(route_frame(&frame), Err(FrameError::Record(_))));
    }
}
