//! # field-types
//!
//! Wire format types for livefield.
//!
//! This crate provides the foundational types used across all livefield crates:
//! - [`FieldKind`], [`Source`] - closed vocabularies shared by every layer
//! - [`FieldDescriptor`] - the typed result of decoding a field's option string
//! - [`Frame`] - push channel frames (identity and payload)
//! - [`RawField`], [`FormData`] - the request/response field collection
//! - [`FieldError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod descriptor;
mod error;
mod frame;
mod kind;
mod raw;

pub use descriptor::{ChartMode, FieldDescriptor, LineSpec, SeriesOptions, DEFAULT_X_AXIS};
pub use error::FieldError;
pub use frame::{Frame, Payload};
pub use kind::{FieldKind, Source};
pub use raw::{FormData, RawField};
