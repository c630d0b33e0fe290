//! Push channel frames.
//!
//! Frames are JSON text messages discriminated by a `type` field:
//!
//! ```text
//! {"type":"id","id":"ws:3"}                                  identity
//! {"type":"p","origin_id":"ws:3","p":{"led":true,"rate":12}}  payload
//! ```
//!
//! The device spells the origin key `origin_id`; `originId` is accepted on
//! input as an alias.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::FieldError;

/// Field updates carried by a payload frame, in wire order.
pub type Payload = serde_json::Map<String, Value>;

/// A push channel frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Establishes or refreshes the session identity. Carries no field values.
    #[serde(rename = "id")]
    Identity {
        /// Connection identifier assigned by the device.
        id: String,
        /// Origin identifier, when the device sends one.
        #[serde(default, alias = "originId", skip_serializing_if = "Option::is_none")]
        origin_id: Option<String>,
    },
    /// Field updates.
    #[serde(rename = "p")]
    Payload {
        /// Which connection caused the update (empty when unknown).
        #[serde(default, alias = "originId")]
        origin_id: String,
        /// The updates themselves.
        #[serde(rename = "p")]
        payload: Payload,
    },
}

impl Frame {
    /// Build an outbound payload frame.
    pub fn payload(origin_id: impl Into<String>, payload: Payload) -> Self {
        Frame::Payload {
            origin_id: origin_id.into(),
            payload,
        }
    }

    /// Parse a text frame.
    ///
    /// Unknown or missing `type` values are reported as distinct errors so
    /// callers can log and drop them without treating them as corrupt JSON.
    pub fn parse(text: &str) -> Result<Self, FieldError> {
        let value: Value = serde_json::from_str(text)?;
        match value.get("type") {
            None => return Err(FieldError::MissingFrameType),
            Some(Value::String(t)) if t == "id" || t == "p" => {}
            Some(Value::String(t)) => return Err(FieldError::UnknownFrameType(t.clone())),
            Some(other) => return Err(FieldError::UnknownFrameType(other.to_string())),
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, FieldError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The frame's origin identifier, if any.
    pub fn origin_id(&self) -> Option<&str> {
        match self {
            Frame::Identity { origin_id, .. } => origin_id.as_deref(),
            Frame::Payload { origin_id, .. } => Some(origin_id.as_str()),
        }
    }
}
