// =============================================================================
// Derivatives feed events - mark price / funding, liquidations, 24h ticker
// =============================================================================
//
// Funding and liquidation events come from the futures stream endpoints
// (`@markPrice`, `@forceOrder`). They are routed like any other topic and do
// not feed the strategy; the pipeline only logs and counts them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CandleError;
use crate::market_data::candle::{parse_f64, parse_i64};
use crate::types::Side;

fn symbol_of(data: &Value) -> Result<String, CandleError> {
    Ok(data
        .get("s")
        .and_then(Value::as_str)
        .ok_or(CandleError::MissingField("s"))?
        .to_uppercase())
}

/// `markPriceUpdate` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkPrice {
    pub symbol: String,
    pub mark_price: f64,
    pub index_price: Option<f64>,
    /// Funding rate as a decimal (0.0001 = 0.01%).
    pub funding_rate: f64,
    pub next_funding_time: i64,
    pub event_time: i64,
}

impl MarkPrice {
    pub fn from_event(data: &Value) -> Result<Self, CandleError> {
        let field = |name: &'static str| data.get(name).ok_or(CandleError::MissingField(name));
        Ok(Self {
            symbol: symbol_of(data)?,
            mark_price: parse_f64(field("p")?, "p")?,
            index_price: data.get("i").map(|v| parse_f64(v, "i")).transpose()?,
            funding_rate: parse_f64(field("r")?, "r")?,
            next_funding_time: parse_i64(field("T")?, "T")?,
            event_time: parse_i64(field("E")?, "E")?,
        })
    }

    /// Mark minus index, as a fraction of the index.
    pub fn basis(&self) -> Option<f64> {
        self.index_price
            .filter(|i| *i > 0.0)
            .map(|i| (self.mark_price - i) / i)
    }
}

/// `forceOrder` event: a forced liquidation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Liquidation {
    pub symbol: String,
    /// Side of the liquidation order. A SELL order closes a long.
    pub order_side: String,
    pub price: f64,
    pub average_price: f64,
    pub quantity: f64,
    pub trade_time: i64,
}

impl Liquidation {
    pub fn from_event(data: &Value) -> Result<Self, CandleError> {
        let order = data.get("o").ok_or(CandleError::MissingField("o"))?;
        let field = |name: &'static str| order.get(name).ok_or(CandleError::MissingField(name));
        Ok(Self {
            symbol: symbol_of(order)?,
            order_side: field("S")?
                .as_str()
                .ok_or(CandleError::MissingField("S"))?
                .to_uppercase(),
            price: parse_f64(field("p")?, "p")?,
            average_price: parse_f64(field("ap")?, "ap")?,
            quantity: parse_f64(field("q")?, "q")?,
            trade_time: parse_i64(field("T")?, "T")?,
        })
    }

    /// The position side that was forced out.
    pub fn liquidated_side(&self) -> Side {
        if self.order_side == "SELL" {
            Side::Long
        } else {
            Side::Short
        }
    }

    pub fn notional(&self) -> f64 {
        self.average_price * self.quantity
    }
}

/// `24hrTicker` rolling window statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker24h {
    pub symbol: String,
    pub last_price: f64,
    pub price_change_pct: f64,
    pub volume: f64,
    pub quote_volume: f64,
}

impl Ticker24h {
    pub fn from_event(data: &Value) -> Result<Self, CandleError> {
        let field = |name: &'static str| data.get(name).ok_or(CandleError::MissingField(name));
        Ok(Self {
            symbol: symbol_of(data)?,
            last_price: parse_f64(field("c")?, "c")?,
            price_change_pct: parse_f64(field("P")?, "P")?,
            volume: parse_f64(field("v")?, "v")?,
            quote_volume: parse_f64(field("q")?, "q")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mark_price_with_basis() {
        let data = json!({
            "e": "markPriceUpdate", "E": 1562305380000_i64, "s": "BTCUSDT",
            "p": "11794.15", "i": "11784.62", "r": "0.00038167", "T": 1562306400000_i64
        });
        let m = MarkPrice::from_event(&data).unwrap();
        assert!((m.funding_rate - 0.00038167).abs() < 1e-12);
        let basis = m.basis().unwrap();
        assert!((basis - (11794.15 - 11784.62) / 11784.62).abs() < 1e-12);
    }

    #[test]
    fn liquidation_side_is_inverted_from_order_side() {
        let data = json!({
            "e": "forceOrder", "E": 1568014460893_i64,
            "o": {
                "s": "BTCUSDT", "S": "SELL", "o": "LIMIT", "q": "0.014",
                "p": "9910", "ap": "9910", "X": "FILLED", "T": 1568014460893_i64
            }
        });
        let l = Liquidation::from_event(&data).unwrap();
        assert_eq!(l.liquidated_side(), Side::Long);
        assert!((l.notional() - 9910.0 * 0.014).abs() < 1e-9);
    }

    #[test]
    fn ticker_requires_last_price() {
        let data = json!({ "e": "24hrTicker", "s": "BTCUSDT", "P": "1.5", "v": "10", "q": "100" });
        assert_eq!(Ticker24h::from_event(&data), Err(CandleError::MissingField("c")));
    }
}
