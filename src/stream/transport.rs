// =============================================================================
// Transport seam - connector / connection traits and the WebSocket backend
// =============================================================================
//
// The connection manager only talks to these traits. Production uses
// `WsConnector` (tokio-tungstenite); tests plug in scripted connections.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::StreamError;

/// Transport-level frame, stripped of WebSocket specifics.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Ping,
    Pong,
    Close { code: u16, reason: String },
    /// Binary or raw frames; counted as liveness, never routed.
    Other,
}

/// Close code reported when the peer vanished without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code reported for a close frame that carried no status.
pub const NO_STATUS: u16 = 1005;

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, StreamError>;
}

#[async_trait]
pub trait Connection: Send {
    /// Next frame, or `None` once the transport is exhausted.
    async fn next_frame(&mut self) -> Option<Result<Frame, StreamError>>;

    async fn send_ping(&mut self) -> Result<(), StreamError>;

    /// Best-effort graceful close.
    async fn close(&mut self);
}

// ---------------------------------------------------------------------------
// tokio-tungstenite backend
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, StreamError> {
        let (ws_stream, response) = connect_async(url)
            .await
            .map_err(|e| StreamError::Transport(format!("failed to connect to {url}: {e}")))?;
        debug!(url = %url, status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WsConnection { inner: ws_stream }))
    }
}

pub struct WsConnection {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn next_frame(&mut self) -> Option<Result<Frame, StreamError>> {
        let msg = self.inner.next().await?;
        Some(match msg {
            Ok(Message::Text(text)) => Ok(Frame::Text(text)),
            Ok(Message::Ping(_)) => Ok(Frame::Ping),
            Ok(Message::Pong(_)) => Ok(Frame::Pong),
            Ok(Message::Close(Some(frame))) => Ok(Frame::Close {
                code: u16::from(frame.code),
                reason: frame.reason.into_owned(),
            }),
            Ok(Message::Close(None)) => Ok(Frame::Close { code: NO_STATUS, reason: String::new() }),
            Ok(Message::Binary(_)) | Ok(Message::Frame(_)) => Ok(Frame::Other),
            Err(e) => Err(StreamError::Transport(e.to_string())),
        })
    }

    async fn send_ping(&mut self) -> Result<(), StreamError> {
        self.inner
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| StreamError::Transport(format!("ping failed: {e}")))
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.close(None).await {
            debug!(error = %e, "WebSocket close handshake failed");
        }
    }
}
