//! Error types for livefield wire data.

use thiserror::Error;

/// Errors that can occur while reading wire data.
#[derive(Debug, Error)]
pub enum FieldError {
    /// JSON (de)serialization failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame has no `type` discriminator
    #[error("frame has no type")]
    MissingFrameType,

    /// Frame type is not one we understand
    #[error("unknown frame type: {0}")]
    UnknownFrameType(String),

    /// A field collection entry is not `{ <name>: value, o: encoding }`
    #[error("invalid raw field: {0}")]
    InvalidRawField(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = FieldError::UnknownFrameType("zz".into());
        assert_eq!(err.to_string(), "unknown frame type: zz");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FieldError>();
    }
}
