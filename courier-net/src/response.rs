//! Response types.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde_json::Value;

/// Status line, headers, and raw body of a completed exchange.
///
/// This is the untyped view shared with interceptors and auth strategies.
#[derive(Debug, Clone)]
pub struct ResponseParts {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    url: url::Url,
}

impl ResponseParts {
    /// Assemble a response from its parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes, url: url::Url) -> Self {
        Self {
            status,
            headers,
            body,
            url,
        }
    }

    /// Read a `reqwest` response to completion.
    pub(crate) async fn from_reqwest(response: reqwest::Response) -> reqwest::Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        Ok(Self::new(status, headers, body, url))
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Check if the response was successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Status message handed to failure handlers, e.g. "Bad Request".
    pub fn message(&self) -> String {
        self.status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| self.status.as_str().to_string())
    }

    /// Get the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Every value of a repeated header.
    pub fn header_values(&self, name: impl AsRef<str>) -> Vec<String> {
        self.headers
            .get_all(name.as_ref())
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    /// Get the final URL of the exchange.
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Get the raw body.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Raw body of an unsuccessful response.
    pub fn error_body(&self) -> Option<&Bytes> {
        (!self.is_success() && !self.body.is_empty()).then_some(&self.body)
    }

    /// Best-effort parse of the error body as a JSON object.
    ///
    /// Yields `None` for successful responses, empty bodies, malformed JSON,
    /// and JSON values that are not objects.
    pub fn json_error(&self) -> Option<Value> {
        let body = self.error_body()?;
        match serde_json::from_slice::<Value>(body) {
            Ok(value) if value.is_object() => Some(value),
            _ => None,
        }
    }

    /// Replace the body, keeping status and headers.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// A typed response: the raw parts plus the decoded body of a 2xx exchange.
#[derive(Debug)]
pub struct Response<T> {
    parts: ResponseParts,
    body: Option<T>,
}

impl<T> Response<T> {
    pub(crate) fn new(parts: ResponseParts, body: Option<T>) -> Self {
        Self { parts, body }
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.parts.status()
    }

    /// Check if the response was successful (2xx).
    pub fn is_success(&self) -> bool {
        self.parts.is_success()
    }

    /// Status message, e.g. "Bad Request".
    pub fn message(&self) -> String {
        self.parts.message()
    }

    /// Decoded body; always `None` for unsuccessful responses.
    pub fn body(&self) -> Option<&T> {
        self.body.as_ref()
    }

    /// Untyped parts.
    pub fn parts(&self) -> &ResponseParts {
        &self.parts
    }

    /// Split into parts and decoded body.
    pub fn into_parts(self) -> (ResponseParts, Option<T>) {
        (self.parts, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(status: u16, body: &'static str) -> ResponseParts {
        ResponseParts::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            Bytes::from_static(body.as_bytes()),
            url::Url::parse("http://localhost/names").unwrap(),
        )
    }

    #[test]
    fn test_message_uses_reason_phrase() {
        assert_eq!(parts(400, "").message(), "Bad Request");
        assert_eq!(parts(401, "").message(), "Unauthorized");
    }

    #[test]
    fn test_json_error_parses_objects_only() {
        let value = parts(422, r#"{"field": "name"}"#).json_error().unwrap();
        assert_eq!(value["field"], "name");

        assert!(parts(422, "[1, 2]").json_error().is_none());
        assert!(parts(422, "not json").json_error().is_none());
        assert!(parts(422, "").json_error().is_none());
        assert!(parts(200, r#"{"ok": true}"#).json_error().is_none());
    }

    #[test]
    fn test_header_values() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", "a=1".parse().unwrap());
        headers.append("set-cookie", "b=2".parse().unwrap());
        let parts = parts(200, "").clone();
        let parts = ResponseParts::new(parts.status(), headers, Bytes::new(), parts.url().clone());

        assert_eq!(parts.header_values("set-cookie"), vec!["a=1", "b=2"]);
        assert_eq!(parts.header("set-cookie"), Some("a=1"));
    }
}
