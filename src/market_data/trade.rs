// =============================================================================
// Trades and the per-candle flow window
// =============================================================================
//
// `Trade` is the immutable tick parsed from `@trade` / `@aggTrade` events.
// `TradeWindow` aggregates ticks between two emission boundaries (one closed
// candle) and is owned by the consumer task, so it needs no locking.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CandleError;
use crate::market_data::candle::{parse_f64, parse_i64, parse_u64};

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: u64,
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub timestamp: i64,
    pub is_buyer_maker: bool,
}

impl Trade {
    /// Parse a raw `trade` event (`t` = trade id) or an `aggTrade` event
    /// (`a` = aggregate id).
    pub fn from_event(data: &Value) -> Result<Self, CandleError> {
        let symbol = data
            .get("s")
            .and_then(Value::as_str)
            .ok_or(CandleError::MissingField("s"))?
            .to_uppercase();
        let id = match data.get("a").or_else(|| data.get("t")) {
            Some(v) => parse_u64(v, "id")?,
            None => return Err(CandleError::MissingField("a|t")),
        };
        let field = |name: &'static str| data.get(name).ok_or(CandleError::MissingField(name));

        Ok(Self {
            id,
            symbol,
            price: parse_f64(field("p")?, "p")?,
            quantity: parse_f64(field("q")?, "q")?,
            timestamp: parse_i64(field("T")?, "T")?,
            is_buyer_maker: field("m")?.as_bool().ok_or(CandleError::MissingField("m"))?,
        })
    }

    /// Quote-currency value of the trade.
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }

    /// The taker bought: the buyer was not resting on the book.
    pub fn is_buy(&self) -> bool {
        !self.is_buyer_maker
    }

    pub fn is_sell(&self) -> bool {
        self.is_buyer_maker
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

// ---------------------------------------------------------------------------
// TradeWindow
// ---------------------------------------------------------------------------

/// Snapshot of one aggregation window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowSummary {
    pub trade_count: u64,
    pub buy_notional: f64,
    pub sell_notional: f64,
    /// Buy notional / total notional; 0.5 for an empty window.
    pub buy_ratio: f64,
    pub last_price: Option<f64>,
    pub liquidations: u64,
    /// Cumulative volume delta since the window object was created.
    pub cvd: f64,
}

/// Accumulates trade flow between emission boundaries.
#[derive(Debug, Default)]
pub struct TradeWindow {
    trade_count: u64,
    buy_notional: f64,
    sell_notional: f64,
    last_price: Option<f64>,
    liquidations: u64,
    cvd: f64,
}

impl TradeWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_trade(&mut self, trade: &Trade) {
        let notional = trade.notional();
        if trade.is_buy() {
            self.buy_notional += notional;
            self.cvd += notional;
        } else {
            self.sell_notional += notional;
            self.cvd -= notional;
        }
        self.trade_count += 1;
        self.last_price = Some(trade.price);
    }

    pub fn record_liquidation(&mut self) {
        self.liquidations += 1;
    }

    pub fn summary(&self) -> FlowSummary {
        let total = self.buy_notional + self.sell_notional;
        FlowSummary {
            trade_count: self.trade_count,
            buy_notional: self.buy_notional,
            sell_notional: self.sell_notional,
            buy_ratio: if total > 0.0 { self.buy_notional / total } else { 0.5 },
            last_price: self.last_price,
            liquidations: self.liquidations,
            cvd: self.cvd,
        }
    }

    /// Return the current summary and start a new window. CVD and the last
    /// price carry over.
    pub fn take(&mut self) -> FlowSummary {
        let summary = self.summary();
        self.trade_count = 0;
        self.buy_notional = 0.0;
        self.sell_notional = 0.0;
        self.liquidations = 0;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trade(price: f64, qty: f64, buyer_maker: bool) -> Trade {
        Trade {
            id: 1,
            symbol: "BTCUSDT".into(),
            price,
            quantity: qty,
            timestamp: 0,
            is_buyer_maker: buyer_maker,
        }
    }

    #[test]
    fn parses_agg_trade_event() {
        let data = json!({
            "e": "aggTrade", "E": 1, "s": "BTCUSDT", "a": 26129,
            "p": "0.01633102", "q": "4.70443515", "f": 27781, "l": 27781,
            "T": 1498793709153_i64, "m": true
        });
        let t = Trade::from_event(&data).unwrap();
        assert_eq!(t.id, 26129);
        assert!(t.is_sell());
        assert_eq!(t.datetime().unwrap().timestamp_millis(), 1498793709153);
        assert!((t.notional() - 0.01633102 * 4.70443515).abs() < 1e-12);
    }

    #[test]
    fn parses_raw_trade_event() {
        let data = json!({
            "e": "trade", "s": "ethusdt", "t": 12345,
            "p": "2000.5", "q": "0.1", "T": 1_700_000_000_000_i64, "m": false
        });
        let t = Trade::from_event(&data).unwrap();
        assert_eq!(t.symbol, "ETHUSDT");
        assert!(t.is_buy());
    }

    #[test]
    fn trade_without_price_is_rejected() {
        let data = json!({ "s": "BTCUSDT", "a": 1, "q": "1", "T": 0, "m": true });
        assert_eq!(Trade::from_event(&data), Err(CandleError::MissingField("p")));
    }

    #[test]
    fn window_splits_buy_and_sell_flow() {
        let mut w = TradeWindow::new();
        w.record_trade(&trade(100.0, 3.0, false));
        w.record_trade(&trade(101.0, 1.0, true));
        let s = w.summary();
        assert_eq!(s.trade_count, 2);
        assert!((s.buy_notional - 300.0).abs() < 1e-9);
        assert!((s.sell_notional - 101.0).abs() < 1e-9);
        assert!((s.buy_ratio - 300.0 / 401.0).abs() < 1e-12);
        assert_eq!(s.last_price, Some(101.0));
        assert!((s.cvd - 199.0).abs() < 1e-9);
    }

    #[test]
    fn take_resets_window_but_keeps_cvd() {
        let mut w = TradeWindow::new();
        w.record_trade(&trade(10.0, 1.0, false));
        w.record_liquidation();
        let first = w.take();
        assert_eq!(first.liquidations, 1);

        let second = w.summary();
        assert_eq!(second.trade_count, 0);
        assert_eq!(second.liquidations, 0);
        assert_eq!(second.buy_ratio, 0.5);
        assert!((second.cvd - 10.0).abs() < 1e-12);
        assert_eq!(second.last_price, Some(10.0));
    }
}
