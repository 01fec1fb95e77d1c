//! Payload codecs.
//!
//! A codec converts between wire bytes and a [`serde_json::Value`] tree; the
//! typed mapping on either side is done with `serde`. Codecs are installed on a
//! [`ProtocolBuilder`](crate::ProtocolBuilder) by protocol modules.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::CallError;

/// Encodes request bodies and decodes response bodies.
pub trait Codec: Send + Sync {
    /// Content type sent with encoded bodies.
    fn content_type(&self) -> &str;

    /// Encode a value tree into bytes.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CallError>;

    /// Decode bytes into a value tree.
    fn decode(&self, bytes: &[u8]) -> Result<Value, CallError>;
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &str {
        "application/json; charset=utf-8"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CallError> {
        serde_json::to_vec(value).map_err(|e| CallError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CallError> {
        serde_json::from_slice(bytes).map_err(|e| CallError::Decode(e.to_string()))
    }
}

/// Decode a successful body into `T`.
///
/// An empty body decodes to `None` without consulting the codec.
pub(crate) fn decode_body<T: DeserializeOwned>(
    codec: Option<&dyn Codec>,
    bytes: &[u8],
) -> Result<Option<T>, CallError> {
    if bytes.is_empty() {
        return Ok(None);
    }

    let codec = codec.ok_or_else(|| {
        CallError::Decode("No payload codec installed; add a protocol module".to_string())
    })?;

    let value = codec.decode(bytes)?;
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| CallError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::IgnoredAny;

    #[test]
    fn test_decode_names() {
        let body = "[\"Clarrisa\", \"Natália\", \"João\"]".as_bytes();
        let names: Vec<String> = decode_body(Some(&JsonCodec), body).unwrap().unwrap();
        assert_eq!(names, vec!["Clarrisa", "Natália", "João"]);
    }

    #[test]
    fn test_shape_mismatch_is_decode_error() {
        let err = decode_body::<Vec<String>>(Some(&JsonCodec), b"{}").unwrap_err();
        assert!(err.is_decode());
        assert!(err.to_string().contains("expected a sequence"));
    }

    #[test]
    fn test_empty_body_is_absent() {
        let body: Option<Vec<String>> = decode_body(None, b"").unwrap();
        assert!(body.is_none());
    }

    #[test]
    fn test_ignored_body() {
        let body: Option<IgnoredAny> =
            decode_body(Some(&JsonCodec), br#"{"success": true}"#).unwrap();
        assert!(body.is_some());
    }

    #[test]
    fn test_missing_codec() {
        let err = decode_body::<Vec<String>>(None, b"[]").unwrap_err();
        assert!(err.is_decode());
    }
}
