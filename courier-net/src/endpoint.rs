//! Operation declarations.
//!
//! An [`Endpoint`] describes one remote operation of an API: the HTTP method,
//! a path template relative to the base address, and the parameters bound to
//! it. API methods build an endpoint and hand it to
//! [`Transport::call`](crate::Transport::call).

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::CallError;

/// Characters escaped when a value is substituted into a path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Request body bound to an endpoint.
#[derive(Debug, Clone)]
pub(crate) enum RequestBody {
    /// A value tree encoded by the transport's codec.
    Encoded(Value),
    /// Pre-encoded bytes sent as-is.
    Raw { content_type: String, bytes: Vec<u8> },
}

/// A declared remote operation with its bound parameters.
#[derive(Debug, Clone)]
pub struct Endpoint {
    method: Method,
    path: String,
    path_params: Vec<(String, String)>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<RequestBody>,
    timeout: Option<Duration>,
    invalid: Option<String>,
}

impl Endpoint {
    /// Declare an operation with a custom method.
    ///
    /// `path` is relative to the base address and may contain `{name}`
    /// placeholders filled by [`Endpoint::path`]. A leading `/` makes it
    /// relative to the host root instead.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            path_params: Vec::new(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            invalid: None,
        }
    }

    /// Declare a GET operation.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Declare a POST operation.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Declare a PUT operation.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Declare a PATCH operation.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// Declare a DELETE operation.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Declare a HEAD operation.
    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::HEAD, path)
    }

    /// Bind a value to a `{name}` placeholder of the path template.
    pub fn path(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.path_params.push((name.into(), value.to_string()));
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add a query parameter only when a value is present.
    pub fn query_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    /// Add a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        match (
            HeaderName::try_from(name.as_ref()),
            HeaderValue::try_from(value.as_ref()),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => {
                self.invalid = Some(format!("Invalid header {:?}", name.as_ref()));
            }
        }
        self
    }

    /// Bind a body encoded by the transport's codec.
    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => self.body = Some(RequestBody::Encoded(value)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize request body");
                self.invalid = Some(e.to_string());
            }
        }
        self
    }

    /// Bind a form-encoded body.
    pub fn form<T: Serialize>(mut self, form: &T) -> Self {
        match serde_urlencoded::to_string(form) {
            Ok(encoded) => {
                self.body = Some(RequestBody::Raw {
                    content_type: "application/x-www-form-urlencoded".to_string(),
                    bytes: encoded.into_bytes(),
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode form data");
                self.invalid = Some(e.to_string());
            }
        }
        self
    }

    /// Bind a plain text body.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Raw {
            content_type: "text/plain; charset=utf-8".to_string(),
            bytes: text.into().into_bytes(),
        });
        self
    }

    /// Set a per-call timeout overriding the transport's.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path template as declared.
    pub fn path_template(&self) -> &str {
        &self.path
    }

    pub(crate) fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub(crate) fn call_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Resolve the full URL against a base address.
    pub fn resolve(&self, base: &url::Url) -> Result<url::Url, CallError> {
        if let Some(reason) = &self.invalid {
            return Err(CallError::InvalidRequest(reason.clone()));
        }

        let path = self.expand_path()?;
        let mut url = base
            .join(&path)
            .map_err(|e| CallError::InvalidRequest(format!("{path}: {e}")))?;

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    fn expand_path(&self) -> Result<String, CallError> {
        let mut out = String::with_capacity(self.path.len());
        let mut rest = self.path.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after.find('}').ok_or_else(|| {
                CallError::InvalidRequest(format!("Unclosed placeholder in {:?}", self.path))
            })?;
            let name = &after[..end];
            let value = self
                .path_params
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value)
                .ok_or_else(|| {
                    CallError::InvalidRequest(format!("Missing path parameter {name:?}"))
                })?;
            out.extend(utf8_percent_encode(value, PATH_SEGMENT));
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> url::Url {
        url::Url::parse("https://viacep.com.br/ws/").unwrap()
    }

    #[test]
    fn test_path_template_expansion() {
        let endpoint = Endpoint::get("{cep}/json").path("cep", "01001000");
        let url = endpoint.resolve(&base()).unwrap();
        assert_eq!(url.as_str(), "https://viacep.com.br/ws/01001000/json");
    }

    #[test]
    fn test_path_values_are_escaped() {
        let endpoint = Endpoint::get("users/{name}").path("name", "a b/c");
        let url = endpoint.resolve(&base()).unwrap();
        assert_eq!(url.as_str(), "https://viacep.com.br/ws/users/a%20b%2Fc");
    }

    #[test]
    fn test_missing_path_parameter() {
        let err = Endpoint::get("{cep}/json").resolve(&base()).unwrap_err();
        assert!(matches!(err, CallError::InvalidRequest(_)));
    }

    #[test]
    fn test_query_parameters() {
        let endpoint = Endpoint::get("search")
            .query("q", "são paulo")
            .query_opt("page", Some(2))
            .query_opt::<u32>("limit", None);
        let url = endpoint.resolve(&base()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://viacep.com.br/ws/search?q=s%C3%A3o+paulo&page=2"
        );
    }

    #[test]
    fn test_invalid_header_fails_resolution() {
        let endpoint = Endpoint::get("names").header("bad header", "x");
        assert!(endpoint.resolve(&base()).is_err());
    }

    #[test]
    fn test_json_body_is_deferred_to_codec() {
        let endpoint = Endpoint::post("names").json(&serde_json::json!({"name": "Lucas"}));
        match endpoint.body() {
            Some(RequestBody::Encoded(value)) => assert_eq!(value["name"], "Lucas"),
            other => panic!("unexpected body: {other:?}"),
        }
    }
}
