//! Header injection.

use async_trait::async_trait;
use base64::Engine;
use http::header::{AUTHORIZATION, HeaderName, HeaderValue};
use parking_lot::RwLock;
use reqwest::Request;
use std::fmt;
use std::sync::Arc;

use super::{ClientBuilder, ClientModule, ExchangeHook};
use crate::CallError;

/// Shared slot for a bearer token.
///
/// Auth strategies write a refreshed token here; a
/// [`HeaderModule::bearer`] reads it on every request.
#[derive(Clone, Default)]
pub struct TokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(token);
        store
    }

    /// Replace the token.
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Remove the token.
    pub fn clear(&self) {
        *self.token.write() = None;
    }

    /// Current token.
    pub fn get(&self) -> Option<String> {
        self.token.read().clone()
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("present", &self.token.read().is_some())
            .finish()
    }
}

#[derive(Clone)]
enum HeaderSource {
    Static { name: String, value: String },
    Bearer(TokenStore),
    Basic { username: String, password: String },
}

/// Client module that adds a header to every request.
#[derive(Clone)]
pub struct HeaderModule {
    source: HeaderSource,
}

impl HeaderModule {
    /// Add a fixed header.
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            source: HeaderSource::Static {
                name: name.into(),
                value: value.into(),
            },
        }
    }

    /// Add `Authorization: Bearer <token>` while `store` holds a token.
    pub fn bearer(store: TokenStore) -> Self {
        Self {
            source: HeaderSource::Bearer(store),
        }
    }

    /// Add HTTP basic credentials.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            source: HeaderSource::Basic {
                username: username.into(),
                password: password.into(),
            },
        }
    }

    /// Add an API key under `header`.
    pub fn api_key(header: impl Into<String>, key: impl Into<String>) -> Self {
        Self::header(header, key)
    }

    fn resolve(&self) -> Result<Option<(HeaderName, HeaderValue)>, CallError> {
        let (name, value) = match &self.source {
            HeaderSource::Static { name, value } => {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| CallError::Hook(format!("invalid header name {name:?}: {e}")))?;
                (name, value.clone())
            }
            HeaderSource::Bearer(store) => match store.get() {
                Some(token) => (AUTHORIZATION, format!("Bearer {token}")),
                None => return Ok(None),
            },
            HeaderSource::Basic { username, password } => {
                let credentials = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                (AUTHORIZATION, format!("Basic {credentials}"))
            }
        };

        let mut value = HeaderValue::from_str(&value)
            .map_err(|e| CallError::Hook(format!("invalid value for header {name}: {e}")))?;
        if name == AUTHORIZATION {
            value.set_sensitive(true);
        }
        Ok(Some((name, value)))
    }
}

impl fmt::Debug for HeaderModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.source {
            HeaderSource::Static { name, .. } => name.as_str(),
            HeaderSource::Bearer(_) => "bearer",
            HeaderSource::Basic { .. } => "basic",
        };
        f.debug_tuple("HeaderModule").field(&kind).finish()
    }
}

impl ClientModule for HeaderModule {
    fn on_builder_created(&self, builder: &mut ClientBuilder) {
        builder.add_hook(self.clone());
    }
}

#[async_trait]
impl ExchangeHook for HeaderModule {
    async fn intercept_request(&self, mut request: Request) -> Result<Request, CallError> {
        if let Some((name, value)) = self.resolve()? {
            request.headers_mut().insert(name, value);
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn request() -> Request {
        Request::new(Method::GET, url::Url::parse("http://localhost/names").unwrap())
    }

    #[tokio::test]
    async fn test_bearer_follows_store() {
        let store = TokenStore::new();
        let module = HeaderModule::bearer(store.clone());

        let sent = module.intercept_request(request()).await.unwrap();
        assert!(sent.headers().get(AUTHORIZATION).is_none());

        store.set("fresh");
        let sent = module.intercept_request(request()).await.unwrap();
        assert_eq!(sent.headers().get(AUTHORIZATION).unwrap(), "Bearer fresh");
    }

    #[tokio::test]
    async fn test_basic_credentials() {
        let module = HeaderModule::basic("user", "pass");
        let sent = module.intercept_request(request()).await.unwrap();
        assert_eq!(
            sent.headers().get(AUTHORIZATION).unwrap(),
            "Basic dXNlcjpwYXNz"
        );
    }

    #[tokio::test]
    async fn test_api_key() {
        let module = HeaderModule::api_key("X-Api-Key", "secret");
        let sent = module.intercept_request(request()).await.unwrap();
        assert_eq!(sent.headers().get("x-api-key").unwrap(), "secret");
    }

    #[tokio::test]
    async fn test_invalid_header_is_hook_error() {
        let module = HeaderModule::header("bad header", "x");
        let err = module.intercept_request(request()).await.unwrap_err();
        assert!(matches!(err, CallError::Hook(_)));
    }
}
