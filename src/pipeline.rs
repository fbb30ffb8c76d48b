// =============================================================================
// Pipeline - routed market events -> strategy -> event sink
// =============================================================================
//
// One task owns one strategy and drains one stream's event channel, so
// candles are applied strictly one at a time. Per event:
//
//   kline (closed, matching symbol/interval)  -> strategy, then flow report
//   trade / aggTrade                          -> flow window
//   forceOrder                                -> liquidation count
//   bookTicker / markPrice                    -> latest quote, for logging
//
// Strategy events are forwarded to the sink in emission order. The task ends
// when the event channel closes or the sink is dropped.
// =============================================================================

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::market_data::{BookTicker, Candle, CandleKey, MarkPrice, TradeWindow};
use crate::strategy::{PullbackStrategy, StrategyEvent};
use crate::stream::MarketEvent;

/// Counters reported when the pipeline stops.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    pub candles_applied: u64,
    pub candles_rejected: u64,
    pub events_emitted: u64,
    pub trades: u64,
    pub liquidations: u64,
}

pub struct Pipeline {
    key: CandleKey,
    strategy: PullbackStrategy,
    flow: TradeWindow,
    sink: mpsc::Sender<StrategyEvent>,
    book: Option<BookTicker>,
    mark: Option<MarkPrice>,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(key: CandleKey, strategy: PullbackStrategy, sink: mpsc::Sender<StrategyEvent>) -> Self {
        Self {
            key,
            strategy,
            flow: TradeWindow::new(),
            sink,
            book: None,
            mark: None,
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Drain `events` until the stream or the sink goes away.
    pub async fn run(mut self, mut events: mpsc::Receiver<MarketEvent>) -> PipelineStats {
        info!(key = %self.key, "pipeline started");

        while let Some(event) = events.recv().await {
            for signal in self.handle(event) {
                if self.sink.send(signal).await.is_err() {
                    warn!(key = %self.key, "event sink closed, stopping pipeline");
                    return self.stats;
                }
                self.stats.events_emitted += 1;
            }
        }

        info!(
            key = %self.key,
            applied = self.stats.candles_applied,
            rejected = self.stats.candles_rejected,
            emitted = self.stats.events_emitted,
            "pipeline stopped"
        );
        self.stats
    }

    /// Fold one market event; returns the strategy events it produced.
    pub fn handle(&mut self, event: MarketEvent) -> Vec<StrategyEvent> {
        match event {
            MarketEvent::Kline { key, candle } => return self.on_kline(&key, &candle),
            MarketEvent::Trade(trade) | MarketEvent::AggTrade(trade) => {
                self.flow.record_trade(&trade);
                self.stats.trades += 1;
            }
            MarketEvent::Liquidation(liq) => {
                debug!(
                    symbol = %liq.symbol,
                    side = %liq.liquidated_side(),
                    notional = liq.notional(),
                    "liquidation"
                );
                self.flow.record_liquidation();
                self.stats.liquidations += 1;
            }
            MarketEvent::BookTicker(book) => self.book = Some(book),
            MarketEvent::MarkPrice(mark) => self.mark = Some(mark),
            other => trace!(topic = other.topic_label(), "event not used by the pipeline"),
        }
        Vec::new()
    }

    fn on_kline(&mut self, key: &CandleKey, candle: &Candle) -> Vec<StrategyEvent> {
        if !key.symbol.eq_ignore_ascii_case(&self.key.symbol) || key.interval != self.key.interval {
            trace!(key = %key, "kline for another series ignored");
            return Vec::new();
        }
        if !candle.is_closed {
            return Vec::new();
        }

        let events = match self.strategy.on_candle(candle) {
            Ok(events) => events,
            Err(e) => {
                warn!(key = %self.key, error = %e, "candle rejected");
                self.stats.candles_rejected += 1;
                return Vec::new();
            }
        };
        self.stats.candles_applied += 1;

        // ── Flow report for the window this candle closes ──
        let flow = self.flow.take();
        info!(
            key = %self.key,
            close = candle.close,
            state = ?self.strategy.state(),
            regime = %self.strategy.regime(),
            trades = flow.trade_count,
            buy_ratio = flow.buy_ratio,
            cvd = flow.cvd,
            liquidations = flow.liquidations,
            spread_bps = self.book.as_ref().map(BookTicker::spread_bps),
            funding = self.mark.as_ref().map(|m| m.funding_rate),
            "candle closed"
        );

        events
    }
}
