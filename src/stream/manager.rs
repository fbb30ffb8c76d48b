// =============================================================================
// Stream Connection Manager - registry of self-healing market-data streams
// =============================================================================
//
// Every logical stream is identified by a caller-chosen key and is driven by
// exactly one tokio task that owns all of its state: the socket, the
// heartbeat interval, the connect timeout, the backoff sleep and the attempt
// counter. The registry only holds a shutdown signal and the join handle, so
// one key can never have two connections or two pending reconnects.
//
// Life-cycle of a stream task:
//
//   connect (under timeout) ──ok──> open: attempts = 0, heartbeat armed
//        │                            │
//        │ error / timeout            │ error, peer close, heartbeat silence
//        v                            v
//   attempts < max ? ──yes──> sleep min(base * 2^attempts, cap), attempts += 1
//        │
//        no ──> Abandoned notification, task ends
//
// An explicit close() wins over everything: it suppresses reconnection,
// closes the socket and waits for the task (and therefore every timer) to
// finish.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::config::StreamConfig;
use super::router::{route_frame, MarketEvent};
use super::topic::StreamSpec;
use super::transport::{Connection, Connector, Frame, ABNORMAL_CLOSURE};
use crate::error::StreamError;

/// How long close() waits for a task to wind down before aborting it.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

const NOTIFICATION_CAPACITY: usize = 256;

// =============================================================================
// Public types
// =============================================================================

/// Connection lifecycle notifications, fanned out to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamNotification {
    Connected { key: String },
    Disconnected { key: String, code: u16, reason: String },
    Error { key: String, error: String },
    /// Reconnect attempts exhausted; the stream is gone for good.
    Abandoned { key: String, attempts: u32 },
}

/// Point-in-time view of one registered stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamStatus {
    pub connected: bool,
    pub reconnect_attempts: u32,
}

/// Optional callback hooks, invoked from the stream task.
///
/// Implementations must not block; heavy work belongs on the consumer side
/// of the event channel.
pub trait StreamObserver: Send + Sync {
    fn on_open(&self, _key: &str) {}
    fn on_message(&self, _key: &str, _event: &MarketEvent) {}
    fn on_error(&self, _key: &str, _error: &StreamError) {}
    fn on_close(&self, _key: &str, _code: u16, _reason: &str) {}
}

/// Returned by [`StreamManager::connect`]: the consumer end of the routed
/// event channel.
#[derive(Debug)]
pub struct StreamHandle {
    pub key: String,
    pub events: mpsc::Receiver<MarketEvent>,
}

struct StreamEntry {
    generation: u64,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    status: Arc<RwLock<StreamStatus>>,
}

type Registry = Arc<Mutex<HashMap<String, StreamEntry>>>;

// =============================================================================
// StreamManager
// =============================================================================

pub struct StreamManager {
    connector: Arc<dyn Connector>,
    registry: Registry,
    notifications: broadcast::Sender<StreamNotification>,
    next_generation: AtomicU64,
}

impl StreamManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            connector,
            registry: Arc::new(Mutex::new(HashMap::new())),
            notifications,
            next_generation: AtomicU64::new(1),
        }
    }

    /// Receive lifecycle notifications for every stream.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamNotification> {
        self.notifications.subscribe()
    }

    /// Register a stream and start its task. Must be called from within a
    /// tokio runtime.
    pub fn connect(
        &self,
        key: impl Into<String>,
        spec: &StreamSpec,
        config: StreamConfig,
        observer: Option<Arc<dyn StreamObserver>>,
    ) -> Result<StreamHandle, StreamError> {
        let key = key.into();
        if spec.is_empty() {
            return Err(StreamError::NoTopics);
        }
        config.validate()?;

        let mut registry = self.registry.lock();
        if registry.contains_key(&key) {
            return Err(StreamError::AlreadyRegistered(key));
        }

        let url = spec.url(&config.base_url);
        let (events_tx, events_rx) = mpsc::channel(config.channel_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let status = Arc::new(RwLock::new(StreamStatus::default()));
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        info!(key = %key, url = %url, streams = spec.names().len(), "registering stream");

        let worker = StreamWorker {
            key: key.clone(),
            url,
            config,
            connector: Arc::clone(&self.connector),
            events: events_tx,
            notifications: self.notifications.clone(),
            observer,
            status: Arc::clone(&status),
            shutdown: shutdown_rx,
            registry: Arc::clone(&self.registry),
            generation,
            attempts: 0,
        };
        let task = tokio::spawn(worker.run());

        registry.insert(
            key.clone(),
            StreamEntry { generation, shutdown: shutdown_tx, task, status },
        );

        Ok(StreamHandle { key, events: events_rx })
    }

    /// Close one stream. Returns whether it was registered; closing an
    /// unknown or already-closed key is a no-op.
    pub async fn close(&self, key: &str) -> bool {
        let entry = self.registry.lock().remove(key);
        match entry {
            Some(entry) => {
                shutdown_entry(key, entry).await;
                true
            }
            None => false,
        }
    }

    /// Close every stream. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let entries: Vec<(String, StreamEntry)> = self.registry.lock().drain().collect();
        let count = entries.len();

        // Signal everyone first so the streams wind down in parallel.
        for (_, entry) in &entries {
            let _ = entry.shutdown.send(true);
        }
        for (key, entry) in entries {
            shutdown_entry(&key, entry).await;
        }

        if count > 0 {
            info!(count, "all streams closed");
        }
        count
    }

    pub fn status(&self) -> HashMap<String, StreamStatus> {
        self.registry
            .lock()
            .iter()
            .map(|(k, e)| (k.clone(), e.status.read().clone()))
            .collect()
    }

    /// Number of streams with an open connection right now.
    pub fn active_count(&self) -> usize {
        self.registry
            .lock()
            .values()
            .filter(|e| e.status.read().connected)
            .count()
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.registry.lock().contains_key(key)
    }
}

async fn shutdown_entry(key: &str, entry: StreamEntry) {
    let StreamEntry { shutdown, mut task, .. } = entry;
    let _ = shutdown.send(true);

    match tokio::time::timeout(CLOSE_GRACE, &mut task).await {
        Ok(Ok(())) => debug!(key = %key, "stream task finished"),
        Ok(Err(e)) => warn!(key = %key, error = %e, "stream task ended abnormally"),
        Err(_) => {
            warn!(key = %key, "stream task did not stop in time, aborting");
            task.abort();
        }
    }
}

// =============================================================================
// Per-stream task
// =============================================================================

enum SessionEnd {
    Shutdown,
    ConsumerGone,
    Closed { code: u16, reason: String },
    Failed { error: StreamError, was_open: bool },
}

enum Dispatch {
    Delivered,
    ConsumerGone,
    Shutdown,
}

struct StreamWorker {
    key: String,
    url: String,
    config: StreamConfig,
    connector: Arc<dyn Connector>,
    events: mpsc::Sender<MarketEvent>,
    notifications: broadcast::Sender<StreamNotification>,
    observer: Option<Arc<dyn StreamObserver>>,
    status: Arc<RwLock<StreamStatus>>,
    shutdown: watch::Receiver<bool>,
    registry: Registry,
    generation: u64,
    attempts: u32,
}

impl StreamWorker {
    async fn run(mut self) {
        loop {
            let end = self.session().await;
            self.status.write().connected = false;

            match end {
                SessionEnd::Shutdown => {
                    info!(key = %self.key, "stream closed by request");
                    break;
                }
                SessionEnd::ConsumerGone => {
                    info!(key = %self.key, "event receiver dropped, stopping stream");
                    break;
                }
                SessionEnd::Closed { code, reason } => {
                    warn!(key = %self.key, code, reason = %reason, "stream closed by peer");
                    self.report_close(code, &reason);
                }
                SessionEnd::Failed { error, was_open } => {
                    error!(key = %self.key, error = %error, "stream error");
                    if let Some(observer) = &self.observer {
                        observer.on_error(&self.key, &error);
                    }
                    self.notify(StreamNotification::Error {
                        key: self.key.clone(),
                        error: error.to_string(),
                    });
                    if was_open {
                        self.report_close(ABNORMAL_CLOSURE, &error.to_string());
                    }
                }
            }

            if !self.config.auto_reconnect {
                info!(key = %self.key, "auto-reconnect disabled, stream stays down");
                break;
            }

            let max_attempts = self.config.reconnect.max_attempts;
            if self.attempts >= max_attempts {
                error!(
                    key = %self.key,
                    attempts = self.attempts,
                    "reconnect attempts exhausted, abandoning stream"
                );
                self.notify(StreamNotification::Abandoned {
                    key: self.key.clone(),
                    attempts: self.attempts,
                });
                break;
            }

            let delay = self.config.reconnect.delay(self.attempts);
            self.attempts += 1;
            self.status.write().reconnect_attempts = self.attempts;
            warn!(
                key = %self.key,
                attempt = self.attempts,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "reconnect scheduled"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => {
                    info!(key = %self.key, "stream closed during backoff");
                    break;
                }
            }
        }

        self.deregister();
    }

    /// One connection: connect, then pump frames until it ends.
    async fn session(&mut self) -> SessionEnd {
        if *self.shutdown.borrow() {
            return SessionEnd::Shutdown;
        }

        info!(key = %self.key, url = %self.url, attempt = self.attempts, "connecting stream");
        let timeout_ms = self.config.connection_timeout_ms;
        let connecting =
            tokio::time::timeout(self.config.connection_timeout(), self.connector.connect(&self.url));

        let result = tokio::select! {
            res = connecting => res,
            _ = self.shutdown.changed() => return SessionEnd::Shutdown,
        };

        let mut conn = match result {
            Ok(Ok(conn)) => conn,
            Ok(Err(error)) => return SessionEnd::Failed { error, was_open: false },
            Err(_) => {
                return SessionEnd::Failed {
                    error: StreamError::ConnectTimeout { url: self.url.clone(), timeout_ms },
                    was_open: false,
                }
            }
        };

        // ── Open ─────────────────────────────────────────────────────────────
        self.attempts = 0;
        {
            let mut status = self.status.write();
            status.connected = true;
            status.reconnect_attempts = 0;
        }
        info!(key = %self.key, "stream connected");
        if let Some(observer) = &self.observer {
            observer.on_open(&self.key);
        }
        self.notify(StreamNotification::Connected { key: self.key.clone() });

        let heartbeat_period = self.config.heartbeat_interval();
        let mut heartbeat = heartbeat_period.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let mut last_seen = Instant::now();

        // ── Pump ─────────────────────────────────────────────────────────────
        loop {
            tokio::select! {
                frame = conn.next_frame() => match frame {
                    Some(Ok(Frame::Text(text))) => {
                        last_seen = Instant::now();
                        match self.dispatch(&text).await {
                            Dispatch::Delivered => {}
                            Dispatch::ConsumerGone => {
                                conn.close().await;
                                return SessionEnd::ConsumerGone;
                            }
                            Dispatch::Shutdown => {
                                conn.close().await;
                                return SessionEnd::Shutdown;
                            }
                        }
                    }
                    Some(Ok(Frame::Close { code, reason })) => {
                        return SessionEnd::Closed { code, reason };
                    }
                    Some(Ok(_)) => last_seen = Instant::now(),
                    Some(Err(error)) => return SessionEnd::Failed { error, was_open: true },
                    None => {
                        return SessionEnd::Closed {
                            code: ABNORMAL_CLOSURE,
                            reason: "stream ended".to_string(),
                        };
                    }
                },
                _ = next_tick(&mut heartbeat) => {
                    let period = heartbeat_period.unwrap_or_default();
                    let silent = last_seen.elapsed();
                    if silent > period * 2 {
                        conn.close().await;
                        return SessionEnd::Failed {
                            error: StreamError::HeartbeatTimeout(silent.as_millis() as u64),
                            was_open: true,
                        };
                    }
                    trace!(key = %self.key, "heartbeat ping");
                    if let Err(error) = conn.send_ping().await {
                        return SessionEnd::Failed { error, was_open: true };
                    }
                }
                _ = self.shutdown.changed() => {
                    conn.close().await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    /// Route one text frame to the consumer. A full channel applies
    /// backpressure, but never blocks a close request.
    async fn dispatch(&mut self, text: &str) -> Dispatch {
        let event = match route_frame(text) {
            Ok(Some(event)) => event,
            Ok(None) => {
                trace!(key = %self.key, "frame with unrouted topic ignored");
                return Dispatch::Delivered;
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "dropping malformed frame");
                return Dispatch::Delivered;
            }
        };
        if let Some(observer) = &self.observer {
            observer.on_message(&self.key, &event);
        }

        tokio::select! {
            sent = self.events.send(event) => match sent {
                Ok(()) => Dispatch::Delivered,
                Err(_) => Dispatch::ConsumerGone,
            },
            _ = self.shutdown.changed() => Dispatch::Shutdown,
        }
    }

    fn report_close(&self, code: u16, reason: &str) {
        if let Some(observer) = &self.observer {
            observer.on_close(&self.key, code, reason);
        }
        self.notify(StreamNotification::Disconnected {
            key: self.key.clone(),
            code,
            reason: reason.to_string(),
        });
    }

    fn notify(&self, notification: StreamNotification) {
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }

    /// Remove our own registry entry when the task ends on its own. A close()
    /// has already removed it; a newer stream under the same key is left alone.
    fn deregister(&self) {
        let mut registry = self.registry.lock();
        if registry.get(&self.key).map(|e| e.generation) == Some(self.generation) {
            registry.remove(&self.key);
            debug!(key = %self.key, "stream deregistered");
        }
    }
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::stream::topic::Topic;

    // ── Scripted transport ──────────────────────────────────────────────────

    enum Script {
        /// Connect succeeds and the connection yields these frames, then idles.
        Frames(Vec<Frame>),
        /// Connect fails.
        Fail,
        /// Connect never completes.
        Hang,
    }

    #[derive(Default)]
    struct ScriptedConnector {
        scripts: Mutex<VecDeque<Script>>,
        connects: Mutex<Vec<Instant>>,
        pings: Arc<AtomicUsize>,
    }

    impl ScriptedConnector {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self { scripts: Mutex::new(scripts.into()), ..Self::default() })
        }

        fn connect_times(&self) -> Vec<Instant> {
            self.connects.lock().clone()
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, _url: &str) -> Result<Box<dyn Connection>, StreamError> {
            self.connects.lock().push(Instant::now());
            let script = self.scripts.lock().pop_front().unwrap_or(Script::Fail);
            match script {
                Script::Frames(frames) => Ok(Box::new(ScriptedConnection {
                    frames: frames.into(),
                    pings: Arc::clone(&self.pings),
                })),
                Script::Fail => Err(StreamError::Transport("connection refused".into())),
                Script::Hang => std::future::pending().await,
            }
        }
    }

    struct ScriptedConnection {
        frames: VecDeque<Frame>,
        pings: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connection for ScriptedConnection {
        async fn next_frame(&mut self) -> Option<Result<Frame, StreamError>> {
            match self.frames.pop_front() {
                Some(frame) => Some(Ok(frame)),
                None => std::future::pending().await,
            }
        }

        async fn send_ping(&mut self) -> Result<(), StreamError> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&mut self) {}
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    fn spec() -> StreamSpec {
        StreamSpec::for_symbol("BTCUSDT", &[Topic::AggTrade, Topic::Kline { interval: "1m".into() }])
    }

    fn quiet_config() -> StreamConfig {
        StreamConfig { heartbeat_interval_ms: 0, ..StreamConfig::default() }
    }

    fn agg_trade_frame(id: u64) -> Frame {
        Frame::Text(
            json!({
                "stream": "btcusdt@aggTrade",
                "data": {
                    "e": "aggTrade", "s": "BTCUSDT", "a": id, "p": "100", "q": "1",
                    "T": 1000, "m": false
                }
            })
            .to_string(),
        )
    }

    fn kline_frame() -> Frame {
        Frame::Text(
            json!({
                "stream": "btcusdt@kline_1m",
                "data": {
                    "e": "kline", "s": "BTCUSDT",
                    "k": {
                        "t": 0, "T": 59_999, "i": "1m", "o": "100", "h": "101", "l": "99",
                        "c": "100.5", "v": "3", "q": "301", "n": 9, "V": "1", "Q": "100",
                        "x": true
                    }
                }
            })
            .to_string(),
        )
    }

    async fn wait_for<F>(rx: &mut broadcast::Receiver<StreamNotification>, pred: F) -> StreamNotification
    where
        F: Fn(&StreamNotification) -> bool,
    {
        loop {
            let n = rx.recv().await.expect("notification channel closed");
            if pred(&n) {
                return n;
            }
        }
    }

    // ── Tests ───────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn reconnects_with_exponential_backoff_then_abandons() {
        let connector = ScriptedConnector::new(vec![]);
        let manager = StreamManager::new(connector.clone());
        let mut notes = manager.subscribe();

        let _handle = manager.connect("btc", &spec(), quiet_config(), None).unwrap();

        let abandoned =
            wait_for(&mut notes, |n| matches!(n, StreamNotification::Abandoned { .. })).await;
        assert_eq!(
            abandoned,
            StreamNotification::Abandoned { key: "btc".into(), attempts: 5 }
        );

        // Initial attempt plus five reconnects.
        let times = connector.connect_times();
        assert_eq!(times.len(), 6);
        let gaps: Vec<u64> = times
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis() as u64)
            .collect();
        for (gap, expected) in gaps.iter().zip([1_000u64, 2_000, 4_000, 8_000, 16_000]) {
            assert!(
                (expected..expected + 5).contains(gap),
                "gap {gap} ms, expected {expected} ms"
            );
        }

        // The task removed itself once it gave up.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!manager.is_registered("btc"));
    }

    #[tokio::test]
    async fn routes_frames_and_drops_malformed_ones() {
        let connector = ScriptedConnector::new(vec![Script::Frames(vec![
            agg_trade_frame(1),
            Frame::Text("{garbage".into()),
            Frame::Text(json!({"stream": "btcusdt@miniTicker", "data": {}}).to_string()),
            Frame::Ping,
            kline_frame(),
        ])]);
        let manager = StreamManager::new(connector);
        let mut handle = manager.connect("btc", &spec(), quiet_config(), None).unwrap();

        match handle.events.recv().await {
            Some(MarketEvent::AggTrade(t)) => assert_eq!(t.id, 1),
            other => panic!("unexpected {other:?}"),
        }
        match handle.events.recv().await {
            Some(MarketEvent::Kline { candle, .. }) => assert!(candle.is_closed),
            other => panic!("unexpected {other:?}"),
        }

        assert!(manager.is_registered("btc"));
        assert_eq!(manager.active_count(), 1);
        assert!(manager.status()["btc"].connected);

        assert_eq!(manager.close_all().await, 1);
        assert_eq!(manager.close_all().await, 0);
        assert_eq!(manager.active_count(), 0);
        assert!(manager.status().is_empty());
        // Sender side dropped with the task.
        assert!(handle.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn duplicate_key_is_rejected() {
        let connector = ScriptedConnector::new(vec![Script::Frames(vec![])]);
        let manager = StreamManager::new(connector);
        let _first = manager.connect("btc", &spec(), quiet_config(), None).unwrap();

        let err = manager.connect("btc", &spec(), quiet_config(), None).unwrap_err();
        assert!(matches!(err, StreamError::AlreadyRegistered(k) if k == "btc"));

        manager.close_all().await;
    }

    #[tokio::test]
    async fn rejects_empty_spec_and_bad_config() {
        let manager = StreamManager::new(ScriptedConnector::new(vec![]));
        let empty = StreamSpec::combined(Vec::<String>::new());
        assert!(matches!(
            manager.connect("x", &empty, quiet_config(), None),
            Err(StreamError::NoTopics)
        ));

        let bad = StreamConfig { channel_capacity: 0, ..quiet_config() };
        assert!(matches!(
            manager.connect("x", &spec(), bad, None),
            Err(StreamError::Config(_))
        ));
        assert!(!manager.is_registered("x"));
    }

    #[tokio::test(start_paused = true)]
    async fn peer_close_reconnects_and_resets_attempts() {
        let connector = ScriptedConnector::new(vec![
            Script::Frames(vec![Frame::Close { code: 1001, reason: "going away".into() }]),
            Script::Frames(vec![]),
        ]);
        let manager = StreamManager::new(connector.clone());
        let mut notes = manager.subscribe();
        let _handle = manager.connect("btc", &spec(), quiet_config(), None).unwrap();

        let n = wait_for(&mut notes, |n| matches!(n, StreamNotification::Disconnected { .. })).await;
        assert_eq!(
            n,
            StreamNotification::Disconnected { key: "btc".into(), code: 1001, reason: "going away".into() }
        );
        wait_for(&mut notes, |n| matches!(n, StreamNotification::Connected { .. })).await;

        assert_eq!(connector.connect_times().len(), 2);
        assert_eq!(manager.status()["btc"].reconnect_attempts, 0);
        assert_eq!(manager.active_count(), 1);

        manager.close_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn close_during_backoff_cancels_the_reconnect() {
        let connector = ScriptedConnector::new(vec![]);
        let manager = StreamManager::new(connector.clone());
        let mut notes = manager.subscribe();
        let _handle = manager.connect("btc", &spec(), quiet_config(), None).unwrap();

        wait_for(&mut notes, |n| matches!(n, StreamNotification::Error { .. })).await;
        assert!(manager.close("btc").await);
        assert!(!manager.close("btc").await);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(connector.connect_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_connection_fails_the_heartbeat() {
        let connector = ScriptedConnector::new(vec![Script::Frames(vec![])]);
        let manager = StreamManager::new(connector.clone());
        let mut notes = manager.subscribe();
        let config = StreamConfig {
            heartbeat_interval_ms: 1_000,
            auto_reconnect: false,
            ..StreamConfig::default()
        };
        let _handle = manager.connect("btc", &spec(), config, None).unwrap();

        let n = wait_for(&mut notes, |n| matches!(n, StreamNotification::Error { .. })).await;
        match n {
            StreamNotification::Error { error, .. } => assert!(error.contains("presumed dead")),
            other => panic!("unexpected {other:?}"),
        }
        // Pings at 1s and 2s; silence detected at 3s.
        assert_eq!(connector.pings.load(Ordering::SeqCst), 2);

        let n = wait_for(&mut notes, |n| matches!(n, StreamNotification::Disconnected { .. })).await;
        assert!(matches!(n, StreamNotification::Disconnected { code: ABNORMAL_CLOSURE, .. }));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!manager.is_registered("btc"));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_is_a_transport_failure() {
        let connector = ScriptedConnector::new(vec![Script::Hang]);
        let manager = StreamManager::new(connector);
        let mut notes = manager.subscribe();
        let config = StreamConfig { auto_reconnect: false, ..quiet_config() };
        let _handle = manager.connect("btc", &spec(), config, None).unwrap();

        let start = Instant::now();
        let n = wait_for(&mut notes, |n| matches!(n, StreamNotification::Error { .. })).await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(10_000) && waited < Duration::from_millis(10_100));
        match n {
            StreamNotification::Error { error, .. } => assert!(error.contains("timed out")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_prompt_while_the_consumer_lags() {
        let connector = ScriptedConnector::new(vec![Script::Frames(vec![
            agg_trade_frame(1),
            agg_trade_frame(2),
            agg_trade_frame(3),
        ])]);
        let manager = StreamManager::new(connector);
        let config = StreamConfig { channel_capacity: 1, ..quiet_config() };
        let handle = manager.connect("btc", &spec(), config, None).unwrap();

        // First event fills the channel; the task is now parked on the second.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let start = Instant::now();
        assert!(manager.close("btc").await);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!manager.is_registered("btc"));
        drop(handle);
    }

    #[derive(Default)]
    struct CountingObserver {
        opens: AtomicUsize,
        messages: AtomicUsize,
    }

    impl StreamObserver for CountingObserver {
        fn on_open(&self, _key: &str) {
            self.opens.fetch_add(1, Ordering::SeqCst);
        }

        fn on_message(&self, _key: &str, _event: &MarketEvent) {
            self.messages.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn observer_hooks_fire() {
        let connector =
            ScriptedConnector::new(vec![Script::Frames(vec![agg_trade_frame(1), agg_trade_frame(2)])]);
        let manager = StreamManager::new(connector);
        let observer = Arc::new(CountingObserver::default());
        let mut handle = manager
            .connect("btc", &spec(), quiet_config(), Some(observer.clone()))
            .unwrap();

        handle.events.recv().await.unwrap();
        handle.events.recv().await.unwrap();

        assert_eq!(observer.opens.load(Ordering::SeqCst), 1);
        assert_eq!(observer.messages.load(Ordering::SeqCst), 2);
        manager.close_all().await;
    }
}
