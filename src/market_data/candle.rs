use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CandleError;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV candle, either a historical REST row or a live kline.
///
/// Immutable once built. Every constructor goes through [`Candle::validate`],
/// so a `Candle` in hand always satisfies `close_time > open_time`,
/// `high >= max(open, close)` and `low <= min(open, close)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    #[serde(rename = "trades")]
    pub trade_count: u64,
    pub taker_buy_base_volume: f64,
    pub taker_buy_quote_volume: f64,
    /// Finality flag from the kline stream. Historical rows are always closed.
    #[serde(default = "default_closed")]
    pub is_closed: bool,
}

fn default_closed() -> bool {
    true
}

/// Symbol and interval of a kline series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CandleKey {
    pub symbol: String,
    pub interval: String,
}

impl std::fmt::Display for CandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.interval)
    }
}

impl Candle {
    /// Build from any supported encoding: a fixed-position REST row or a
    /// named-field object.
    pub fn from_value(value: &Value) -> Result<Self, CandleError> {
        match value {
            Value::Array(row) => Self::from_row(row),
            Value::Object(_) => Self::from_object(value),
            other => Err(CandleError::Encoding(json_type(other).to_string())),
        }
    }

    /// Build from a REST kline row:
    /// `[openTime, open, high, low, close, volume, closeTime, quoteVolume,
    ///   trades, takerBuyBase, takerBuyQuote, ignore?]`.
    pub fn from_row(row: &[Value]) -> Result<Self, CandleError> {
        if row.len() < 11 {
            return Err(CandleError::ShortRow(row.len()));
        }

        let candle = Self {
            open_time: parse_i64(&row[0], "openTime")?,
            open: parse_f64(&row[1], "open")?,
            high: parse_f64(&row[2], "high")?,
            low: parse_f64(&row[3], "low")?,
            close: parse_f64(&row[4], "close")?,
            volume: parse_f64(&row[5], "volume")?,
            close_time: parse_i64(&row[6], "closeTime")?,
            quote_volume: parse_f64(&row[7], "quoteVolume")?,
            trade_count: parse_u64(&row[8], "trades")?,
            taker_buy_base_volume: parse_f64(&row[9], "takerBuyBaseVolume")?,
            taker_buy_quote_volume: parse_f64(&row[10], "takerBuyQuoteVolume")?,
            is_closed: true,
        };
        candle.validate()
    }

    /// Build from a named-field object. Numerics may be strings.
    pub fn from_object(obj: &Value) -> Result<Self, CandleError> {
        let field = |name: &'static str| obj.get(name).ok_or(CandleError::MissingField(name));

        let candle = Self {
            open_time: parse_i64(field("openTime")?, "openTime")?,
            open: parse_f64(field("open")?, "open")?,
            high: parse_f64(field("high")?, "high")?,
            low: parse_f64(field("low")?, "low")?,
            close: parse_f64(field("close")?, "close")?,
            volume: parse_f64(field("volume")?, "volume")?,
            close_time: parse_i64(field("closeTime")?, "closeTime")?,
            quote_volume: parse_f64(field("quoteVolume")?, "quoteVolume")?,
            trade_count: parse_u64(field("trades")?, "trades")?,
            taker_buy_base_volume: parse_f64(field("takerBuyBaseVolume")?, "takerBuyBaseVolume")?,
            taker_buy_quote_volume: parse_f64(
                field("takerBuyQuoteVolume")?,
                "takerBuyQuoteVolume",
            )?,
            is_closed: obj.get("isClosed").and_then(Value::as_bool).unwrap_or(true),
        };
        candle.validate()
    }

    /// Build from the `data` object of a live kline event:
    ///
    /// ```json
    /// { "e": "kline", "s": "BTCUSDT", "k": { "t": 0, "T": 59999, "i": "1m", ... } }
    /// ```
    pub fn from_kline_event(data: &Value) -> Result<(CandleKey, Self), CandleError> {
        let symbol = data
            .get("s")
            .and_then(Value::as_str)
            .ok_or(CandleError::MissingField("s"))?
            .to_uppercase();
        let k = data.get("k").ok_or(CandleError::MissingField("k"))?;
        let field = |name: &'static str| k.get(name).ok_or(CandleError::MissingField(name));

        let interval = field("i")?
            .as_str()
            .ok_or(CandleError::MissingField("i"))?
            .to_string();

        let candle = Self {
            open_time: parse_i64(field("t")?, "k.t")?,
            close_time: parse_i64(field("T")?, "k.T")?,
            open: parse_f64(field("o")?, "k.o")?,
            high: parse_f64(field("h")?, "k.h")?,
            low: parse_f64(field("l")?, "k.l")?,
            close: parse_f64(field("c")?, "k.c")?,
            volume: parse_f64(field("v")?, "k.v")?,
            quote_volume: parse_f64(field("q")?, "k.q")?,
            trade_count: parse_u64(field("n")?, "k.n")?,
            taker_buy_base_volume: parse_f64(field("V")?, "k.V")?,
            taker_buy_quote_volume: parse_f64(field("Q")?, "k.Q")?,
            is_closed: field("x")?.as_bool().ok_or(CandleError::MissingField("k.x"))?,
        };

        Ok((CandleKey { symbol, interval }, candle.validate()?))
    }

    /// Check the OHLC and timing invariants.
    pub fn validate(self) -> Result<Self, CandleError> {
        if self.close_time <= self.open_time {
            return Err(CandleError::Inconsistent(format!(
                "close_time {} is not after open_time {}",
                self.close_time, self.open_time
            )));
        }
        if self.high < self.open.max(self.close) {
            return Err(CandleError::Inconsistent(format!(
                "high {} is below the body ({} / {})",
                self.high, self.open, self.close
            )));
        }
        if self.low > self.open.min(self.close) {
            return Err(CandleError::Inconsistent(format!(
                "low {} is above the body ({} / {})",
                self.low, self.open, self.close
            )));
        }
        Ok(self)
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Signed body: positive for bullish candles.
    pub fn body(&self) -> f64 {
        self.close - self.open
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn open_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.open_time).single()
    }

    pub fn close_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.close_time).single()
    }
}

// ---------------------------------------------------------------------------
// Numeric helpers
// ---------------------------------------------------------------------------

/// Binance encodes most numerics as JSON strings; accept both forms.
pub(crate) fn parse_f64(val: &Value, field: &'static str) -> Result<f64, CandleError> {
    let parsed = match val {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(CandleError::NotNumeric { field, value: val.to_string() }),
    }
}

pub(crate) fn parse_i64(val: &Value, field: &'static str) -> Result<i64, CandleError> {
    let parsed = match val {
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        }),
        _ => None,
    };
    parsed.ok_or_else(|| CandleError::NotNumeric { field, value: val.to_string() })
}

pub(crate) fn parse_u64(val: &Value, field: &'static str) -> Result<u64, CandleError> {
    parse_i64(val, field).and_then(|v| {
        u64::try_from(v).map_err(|_| CandleError::NotNumeric { field, value: val.to_string() })
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rest_row() -> Value {
        json!([
            1499040000000_i64,
            "0.01634790",
            "0.80000000",
            "0.01575800",
            "0.01577100",
            "148976.11427815",
            1499644799999_i64,
            "2434.19055334",
            308,
            "1756.87402397",
            "28.46694368",
            "17928899.62484339"
        ])
    }

    #[test]
    fn parses_rest_row_with_string_numerics() {
        let candle = Candle::from_value(&rest_row()).unwrap();
        assert_eq!(candle.open_time, 1_499_040_000_000);
        assert_eq!(candle.close_time, 1_499_644_799_999);
        assert!((candle.open - 0.0163479).abs() < 1e-12);
        assert!((candle.high - 0.8).abs() < 1e-12);
        assert_eq!(candle.trade_count, 308);
        assert!(candle.is_closed);
    }

    #[test]
    fn row_without_ignore_column_is_accepted() {
        let mut row = rest_row();
        row.as_array_mut().unwrap().pop();
        assert!(Candle::from_value(&row).is_ok());
    }

    #[test]
    fn short_row_is_rejected() {
        let row = json!([1, "1", "1", "1"]);
        assert_eq!(Candle::from_value(&row), Err(CandleError::ShortRow(4)));
    }

    #[test]
    fn non_numeric_string_is_fatal_for_the_record() {
        let mut row = rest_row();
        row[4] = json!("abc");
        let err = Candle::from_value(&row).unwrap_err();
        assert!(matches!(err, CandleError::NotNumeric { field: "close", .. }));
    }

    #[test]
    fn parses_named_object_with_mixed_encodings() {
        let obj = json!({
            "openTime": 60_000,
            "open": 100.0,
            "high": "101.5",
            "low": 99.5,
            "close": "101",
            "volume": 12.0,
            "closeTime": "119999",
            "quoteVolume": 1210.0,
            "trades": 42,
            "takerBuyBaseVolume": 7.0,
            "takerBuyQuoteVolume": 707.0
        });
        let candle = Candle::from_value(&obj).unwrap();
        assert_eq!(candle.close_time, 119_999);
        assert!((candle.high - 101.5).abs() < 1e-12);
        assert!((candle.range() - 2.0).abs() < 1e-12);
        assert!((candle.body() - 1.0).abs() < 1e-12);
        assert!(candle.is_bullish());
        assert!(!candle.is_bearish());
    }

    #[test]
    fn object_missing_field_is_rejected() {
        let obj = json!({ "openTime": 0, "open": 1.0 });
        assert_eq!(
            Candle::from_value(&obj),
            Err(CandleError::MissingField("high"))
        );
    }

    #[test]
    fn inconsistent_ohlc_is_rejected() {
        let mut row = rest_row();
        // high below close
        row[2] = json!("0.01");
        assert!(matches!(
            Candle::from_value(&row),
            Err(CandleError::Inconsistent(_))
        ));
    }

    #[test]
    fn parses_live_kline_event() {
        let data = json!({
            "e": "kline",
            "s": "btcusdt",
            "k": {
                "t": 1_700_000_000_000_i64, "T": 1_700_000_059_999_i64, "i": "1m",
                "o": "37000.0", "h": "37050.0", "l": "36990.0", "c": "37020.0",
                "v": "12.5", "q": "462500.0", "n": 321,
                "V": "6.0", "Q": "222000.0", "x": true
            }
        });
        let (key, candle) = Candle::from_kline_event(&data).unwrap();
        assert_eq!(key.to_string(), "BTCUSDT@1m");
        assert!(candle.is_closed);
        assert!((candle.close - 37_020.0).abs() < 1e-9);
        assert_eq!(
            candle.open_datetime().unwrap().to_rfc3339(),
            "2023-11-14T22:13:20+00:00"
        );
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let candle = Candle::from_value(&rest_row()).unwrap();
        let v = serde_json::to_value(&candle).unwrap();
        assert!(v.get("openTime").is_some());
        assert!(v.get("trades").is_some());
        assert!(v.get("takerBuyBaseVolume").is_some());
    }
}
