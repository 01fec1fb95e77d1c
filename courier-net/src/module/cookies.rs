//! Cookie persistence across exchanges.

use async_trait::async_trait;
use http::header::{COOKIE, HeaderValue, SET_COOKIE};
use parking_lot::RwLock;
use reqwest::Request;
use std::sync::Arc;
use tracing::trace;

use super::{ClientBuilder, ClientModule, ExchangeHook};
use crate::{CallError, ResponseParts};

/// Client module that remembers cookies set by the server and sends them back.
///
/// Every response carrying `Set-Cookie` replaces the remembered set. The jar
/// is shared by all transports built from the same module and by its clones.
#[derive(Debug, Clone, Default)]
pub struct CookiesModule {
    jar: Arc<RwLock<Vec<String>>>,
}

impl CookiesModule {
    /// Create a module with an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembered `name=value` pairs.
    pub fn cookies(&self) -> Vec<String> {
        self.jar.read().clone()
    }

    /// Forget every cookie.
    pub fn clear(&self) {
        self.jar.write().clear();
    }
}

impl ClientModule for CookiesModule {
    fn on_builder_created(&self, builder: &mut ClientBuilder) {
        builder.add_hook(CookieHook {
            jar: self.jar.clone(),
        });
    }
}

struct CookieHook {
    jar: Arc<RwLock<Vec<String>>>,
}

#[async_trait]
impl ExchangeHook for CookieHook {
    async fn intercept_request(&self, mut request: Request) -> Result<Request, CallError> {
        let cookies = self.jar.read().join("; ");
        if cookies.is_empty() || request.headers().contains_key(COOKIE) {
            return Ok(request);
        }

        let value = HeaderValue::from_str(&cookies)
            .map_err(|e| CallError::Hook(format!("invalid stored cookie: {e}")))?;
        request.headers_mut().insert(COOKIE, value);
        Ok(request)
    }

    async fn intercept_response(&self, response: ResponseParts) -> Result<ResponseParts, CallError> {
        let received: Vec<String> = response
            .header_values(SET_COOKIE)
            .iter()
            .filter_map(|cookie| cookie.split(';').next())
            .map(|pair| pair.trim().to_string())
            .filter(|pair| !pair.is_empty())
            .collect();

        if !received.is_empty() {
            trace!(count = received.len(), "Storing received cookies");
            *self.jar.write() = received;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderMap, Method, StatusCode};

    fn response(cookies: &[&str]) -> ResponseParts {
        let mut headers = HeaderMap::new();
        for cookie in cookies {
            headers.append(SET_COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        ResponseParts::new(
            StatusCode::OK,
            headers,
            Bytes::new(),
            url::Url::parse("http://localhost/").unwrap(),
        )
    }

    fn request() -> Request {
        Request::new(Method::GET, url::Url::parse("http://localhost/names").unwrap())
    }

    #[tokio::test]
    async fn test_stores_and_sends_cookies() {
        let module = CookiesModule::new();
        let hook = CookieHook {
            jar: module.jar.clone(),
        };

        hook.intercept_response(response(&["session=abc; Path=/; HttpOnly", "theme=dark"]))
            .await
            .unwrap();
        assert_eq!(module.cookies(), vec!["session=abc", "theme=dark"]);

        let request = hook.intercept_request(request()).await.unwrap();
        assert_eq!(
            request.headers().get(COOKIE).unwrap(),
            "session=abc; theme=dark"
        );
    }

    #[tokio::test]
    async fn test_response_without_cookies_keeps_jar() {
        let module = CookiesModule::new();
        let hook = CookieHook {
            jar: module.jar.clone(),
        };

        hook.intercept_response(response(&["session=abc"])).await.unwrap();
        hook.intercept_response(response(&[])).await.unwrap();
        assert_eq!(module.cookies(), vec!["session=abc"]);

        hook.intercept_response(response(&["session=def"])).await.unwrap();
        assert_eq!(module.cookies(), vec!["session=def"]);
    }

    #[tokio::test]
    async fn test_empty_jar_adds_nothing() {
        let hook = CookieHook {
            jar: Arc::default(),
        };
        let request = hook.intercept_request(request()).await.unwrap();
        assert!(request.headers().get(COOKIE).is_none());
    }
}
