//! Builder pipeline modules.
//!
//! Every transport is assembled in two stages. Client modules run first,
//! against a [`ClientBuilder`], and install connection settings and exchange
//! hooks. Protocol modules run second, against a [`ProtocolBuilder`] seeded
//! with the finished client, and install payload codecs. Both lists run once
//! per transport build, in registration order.

mod cookies;
mod headers;
mod json;
mod log;

pub use cookies::CookiesModule;
pub use headers::{HeaderModule, TokenStore};
pub use json::JsonCodecModule;
pub use log::{LogLevel, LogModule};

use async_trait::async_trait;
use reqwest::Request;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use crate::codec::Codec;
use crate::config::NetworkConfig;
use crate::transport::{HttpClient, Transport};
use crate::{CallError, NetworkError, ResponseParts};

/// Hook around every exchange performed by a transport.
///
/// Request hooks run in installation order; response hooks run in reverse, so
/// the last hook installed sees the request last and the response first.
#[async_trait]
pub trait ExchangeHook: Send + Sync {
    /// Inspect or modify the request before it is sent.
    async fn intercept_request(&self, request: Request) -> Result<Request, CallError> {
        Ok(request)
    }

    /// Inspect or modify the response after it is read.
    async fn intercept_response(&self, response: ResponseParts) -> Result<ResponseParts, CallError> {
        Ok(response)
    }
}

/// Module invoked on the client builder of every new transport.
///
/// Runs without the registry lock; it may query the same
/// [`Network`](crate::Network) or build transports for other addresses.
pub trait ClientModule: Send + Sync {
    /// Configure the client under construction.
    fn on_builder_created(&self, builder: &mut ClientBuilder);
}

impl<F> ClientModule for F
where
    F: Fn(&mut ClientBuilder) + Send + Sync,
{
    fn on_builder_created(&self, builder: &mut ClientBuilder) {
        self(builder)
    }
}

/// Module invoked on the protocol builder of every new transport.
pub trait ProtocolModule: Send + Sync {
    /// Configure the protocol layer under construction.
    fn on_builder_created(&self, builder: &mut ProtocolBuilder);
}

impl<F> ProtocolModule for F
where
    F: Fn(&mut ProtocolBuilder) + Send + Sync,
{
    fn on_builder_created(&self, builder: &mut ProtocolBuilder) {
        self(builder)
    }
}

/// Builder for the HTTP client of one transport.
pub struct ClientBuilder {
    inner: reqwest::ClientBuilder,
    hooks: Vec<Arc<dyn ExchangeHook>>,
    timeout: Duration,
    runtime: Option<Handle>,
}

impl ClientBuilder {
    /// Create a builder seeded with the connection settings of `config`.
    pub(crate) fn new(config: &NetworkConfig) -> Self {
        let mut inner = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent);

        if !config.default_headers.is_empty() {
            inner = inner.default_headers(config.default_headers.clone());
        }

        Self {
            inner,
            hooks: Vec::new(),
            timeout: config.timeout,
            runtime: config.runtime.clone(),
        }
    }

    /// Install an exchange hook.
    pub fn add_hook(&mut self, hook: impl ExchangeHook + 'static) -> &mut Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Install a hook that is shared with other owners.
    pub fn add_shared_hook(&mut self, hook: Arc<dyn ExchangeHook>) -> &mut Self {
        self.hooks.push(hook);
        self
    }

    /// Number of hooks installed so far.
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Set the request timeout.
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Set the runtime that drives calls of this transport.
    pub fn runtime(&mut self, handle: Handle) -> &mut Self {
        self.runtime = Some(handle);
        self
    }

    /// Apply arbitrary settings to the underlying `reqwest` builder.
    pub fn configure<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder,
    {
        let builder = std::mem::take(&mut self.inner);
        self.inner = f(builder);
        self
    }

    pub(crate) fn build(self) -> Result<HttpClient, NetworkError> {
        let inner = self.inner.timeout(self.timeout).build()?;
        Ok(HttpClient::new(inner, self.hooks, self.timeout, self.runtime))
    }
}

/// Builder for the protocol layer of one transport.
pub struct ProtocolBuilder {
    base_url: url::Url,
    client: HttpClient,
    codec: Option<Arc<dyn Codec>>,
}

impl ProtocolBuilder {
    pub(crate) fn new(base_url: url::Url, client: HttpClient) -> Self {
        Self {
            base_url,
            client,
            codec: None,
        }
    }

    /// Base address the transport is bound to.
    pub fn base_url(&self) -> &url::Url {
        &self.base_url
    }

    /// The finished HTTP client.
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Install the payload codec, replacing any codec installed earlier.
    pub fn codec(&mut self, codec: impl Codec + 'static) -> &mut Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    /// Whether a codec has been installed.
    pub fn has_codec(&self) -> bool {
        self.codec.is_some()
    }

    pub(crate) fn build(self) -> Transport {
        Transport::new(self.base_url, self.client, self.codec)
    }
}
