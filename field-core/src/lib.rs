//! # livefield-core
//!
//! Pure logic for livefield (no I/O, instant tests).
//!
//! This crate holds the synchronization substrate beneath a device field UI:
//!
//! - [`decoder`]: encoding string to typed [`FieldDescriptor`]
//! - [`cache`]: timestamp-arbitrated store shared by the request/response and
//!   push channels
//! - [`series`]: bounded, sorted time-series merge with a latest-values
//!   projection
//! - [`state`] and [`throttle`]: the push session state machine and its
//!   outbound rate limiter
//! - [`form`]: a decoded field collection tied to the cache and series store
//!
//! ## Design Philosophy
//!
//! Nothing here touches the network or a clock-driven timer. State machines
//! take events and return actions; `livefield-client` interprets the actions
//! and performs the I/O.
//!
//! [`FieldDescriptor`]: field_types::FieldDescriptor

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod cache;
pub mod decoder;
pub mod form;
pub mod lines;
pub mod series;
pub mod state;
pub mod throttle;

pub use builder::EncodingBuilder;
pub use cache::{now_millis, CacheEntry, ReconciliationCache, Subscription};
pub use decoder::{decode, readable_label};
pub use form::{coerce_bool, Field, FieldSet, PushOutcome};
pub use lines::{parse_lines, resolve_lines, PALETTE};
pub use series::{merge, MergeOutcome, SeriesBuffer, SeriesPoint, SeriesStore, DEFAULT_MAX_POINTS};
pub use state::{
    Action, ConnectionState, Event, PushSession, ReconnectPolicy, SessionEvent, SessionPhase,
};
pub use throttle::{Coalesce, Offer, Throttle, ThrottleState};
