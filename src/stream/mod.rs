// =============================================================================
// Market-data streaming
// =============================================================================
//
//   topic       stream names, endpoint URLs
//   router      frame -> typed MarketEvent
//   transport   connector seam + tokio-tungstenite backend
//   manager     keyed registry of self-healing streams
//   config      connection / backoff settings

pub mod config;
pub mod manager;
pub mod router;
pub mod topic;
pub mod transport;

pub use config::{ReconnectPolicy, StreamConfig};
pub use manager::{StreamHandle, StreamManager, StreamNotification, StreamObserver, StreamStatus};
pub use router::{route_frame, MarketEvent};
pub use topic::{StreamSpec, Topic};
pub use transport::{Connection, Connector, Frame, WsConnector};
