//! # livefield-client
//!
//! Client library for livefield device field synchronization.
//!
//! This is the I/O half: it drives the pure state machines from
//! `livefield-core` against real channels.
//!
//! ## Features
//!
//! - **Push session**: reconnect with backoff, identity and payload frames,
//!   leading-edge outbound throttle, optimistic cache echo
//! - **Transport abstraction**: pluggable push transport (WebSocket, mock)
//! - **Request/response**: form fetch and partial update over HTTP
//! - **Configuration**: TOML with defaults for every key
//!
//! ## Example
//!
//! ```ignore
//! use livefield_client::{Config, PushSessionHandle, SessionConfig, WsTransport};
//!
//! let config = Config::from_file("livefield.toml".as_ref())?;
//! let cache = Arc::new(ReconciliationCache::new());
//! let session = PushSessionHandle::spawn(
//!     SessionConfig::from_push_config(&config.push)?,
//!     WsTransport::new(),
//!     cache,
//! );
//! let mut payloads = session.subscribe();
//! while let Ok(inbound) = payloads.recv().await {
//!     println!("{:?}", inbound.payload);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod rest;
pub mod session;
pub mod transport;

pub use config::{Config, ConfigError, PushConfig, RestConfig, SeriesConfig};
pub use rest::{load, save, HttpStateTransport, MockStateTransport, StateError, StateTransport};
pub use session::{InboundPayload, PushSessionHandle, SessionConfig, SessionError, SessionStatus};
pub use transport::{MockPushTransport, PushTransport, TransportError, WsTransport};
