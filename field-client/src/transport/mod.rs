//! Push channel transport abstraction.
//!
//! The push channel is a long-lived duplex stream of JSON text frames. This
//! module abstracts the underlying connection (WebSocket, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` opens the channel
//! - `send()` transmits one text frame
//! - `recv()` waits for the next text frame
//! - `close()` terminates
//!
//! Reconnect policy lives in the session, not the transport: a transport
//! reports a closed channel and waits to be told to connect again.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockPushTransport::new();
//! transport.connect("ws://device/ws/status").await?;
//! transport.send(r#"{"type":"p","origin_id":"","p":{}}"#).await?;
//! let frame = transport.recv().await?;
//! ```

mod mock;
mod ws;

pub use mock::MockPushTransport;
pub use ws::WsTransport;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Push channel errors. Every one of them ends the current connection
/// attempt or connection; the session decides whether to reconnect.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The handshake with the device failed.
    #[error("connect to {url} failed: {reason}")]
    Connect {
        /// Channel URL.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// The handshake did not finish within the connect timeout.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// No channel is open.
    #[error("channel not open")]
    NotConnected,

    /// The channel closed or broke while waiting for a frame.
    #[error("channel closed: {0}")]
    Closed(String),

    /// A frame could not be written.
    #[error("write failed: {0}")]
    Write(String),
}

/// Transport trait for the push channel.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open the channel to `url`.
    async fn connect(&self, url: &str) -> Result<(), TransportError>;

    /// Send one text frame.
    async fn send(&self, text: &str) -> Result<(), TransportError>;

    /// Receive the next text frame.
    ///
    /// Blocks until a frame is available or the channel closes. Must be
    /// cancel-safe: dropping the future loses no frame.
    async fn recv(&self) -> Result<String, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the channel.
    async fn close(&self) -> Result<(), TransportError>;
}
