//! Transports: one HTTP client and codec bound to a base address.

use http::header::CONTENT_TYPE;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::trace;

use crate::call::Call;
use crate::codec::Codec;
use crate::endpoint::{Endpoint, RequestBody};
use crate::module::ExchangeHook;
use crate::{CallError, ResponseParts};

/// HTTP client produced by the client stage of the builder pipeline.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    hooks: Arc<[Arc<dyn ExchangeHook>]>,
    timeout: Duration,
    runtime: Option<Handle>,
}

impl HttpClient {
    pub(crate) fn new(
        inner: reqwest::Client,
        hooks: Vec<Arc<dyn ExchangeHook>>,
        timeout: Duration,
        runtime: Option<Handle>,
    ) -> Self {
        Self {
            inner,
            hooks: hooks.into(),
            timeout,
            runtime,
        }
    }

    /// Get the underlying reqwest client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    /// Default request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of installed exchange hooks.
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Runtime that drives enqueued calls, when pinned.
    pub fn runtime(&self) -> Option<&Handle> {
        self.runtime.as_ref()
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("hooks", &self.hooks.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

struct TransportInner {
    base_url: url::Url,
    client: HttpClient,
    codec: Option<Arc<dyn Codec>>,
}

/// Long-lived transport for one base address.
///
/// Cheap to clone; clones share the same client and connection pool.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

impl Transport {
    pub(crate) fn new(base_url: url::Url, client: HttpClient, codec: Option<Arc<dyn Codec>>) -> Self {
        Self {
            inner: Arc::new(TransportInner {
                base_url,
                client,
                codec,
            }),
        }
    }

    /// Base address every endpoint is resolved against.
    pub fn base_url(&self) -> &url::Url {
        &self.inner.base_url
    }

    /// The HTTP client.
    pub fn client(&self) -> &HttpClient {
        &self.inner.client
    }

    /// The installed payload codec.
    pub fn codec(&self) -> Option<&dyn Codec> {
        self.inner.codec.as_deref()
    }

    /// Whether two handles refer to the same transport instance.
    pub fn ptr_eq(&self, other: &Transport) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Create an unexecuted call for `endpoint`.
    pub fn call<T>(&self, endpoint: Endpoint) -> Call<T> {
        Call::new(self.clone(), endpoint)
    }

    /// Perform one exchange and read the whole response.
    pub(crate) async fn exchange(&self, endpoint: &Endpoint) -> Result<ResponseParts, CallError> {
        let client = &self.inner.client;
        let url = endpoint.resolve(&self.inner.base_url)?;
        let mut builder = client.inner.request(endpoint.method().clone(), url);

        for (name, value) in endpoint.headers() {
            builder = builder.header(name, value);
        }

        builder = match endpoint.body() {
            Some(RequestBody::Encoded(value)) => {
                let codec = self.codec().ok_or_else(|| {
                    CallError::Encode("No payload codec installed; add a protocol module".to_string())
                })?;
                let bytes = codec.encode(value)?;
                builder.header(CONTENT_TYPE, codec.content_type()).body(bytes)
            }
            Some(RequestBody::Raw {
                content_type,
                bytes,
            }) => builder
                .header(CONTENT_TYPE, content_type.as_str())
                .body(bytes.clone()),
            None => builder,
        };

        let timeout = endpoint.call_timeout().unwrap_or(client.timeout);
        if let Some(per_call) = endpoint.call_timeout() {
            builder = builder.timeout(per_call);
        }

        let mut request = builder.build()?;
        for hook in client.hooks.iter() {
            request = hook.intercept_request(request).await?;
        }

        trace!(method = %request.method(), url = %request.url(), "Dispatching exchange");

        let response = client
            .inner
            .execute(request)
            .await
            .map_err(|e| CallError::from_reqwest(e, timeout))?;
        let mut parts = ResponseParts::from_reqwest(response)
            .await
            .map_err(|e| CallError::from_reqwest(e, timeout))?;

        for hook in client.hooks.iter().rev() {
            parts = hook.intercept_response(parts).await?;
        }

        Ok(parts)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.inner.base_url.as_str())
            .field("client", &self.inner.client)
            .field("codec", &self.inner.codec.as_ref().map(|c| c.content_type().to_string()))
            .finish()
    }
}
