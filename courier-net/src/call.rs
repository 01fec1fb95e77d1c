//! In-flight call handles and completion callbacks.

use http::Method;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio::sync::Notify;

use crate::codec::decode_body;
use crate::endpoint::Endpoint;
use crate::transport::Transport;
use crate::{CallError, Response};

/// Completion continuation of a call.
///
/// Exactly one of `on_failure` and `on_response` runs per enqueued call,
/// on the worker that completed the exchange.
pub trait Callback<T>: Send + Sync {
    /// The call was handed to a worker; `cancel` aborts it.
    fn on_enqueued(&self, _cancel: &CancelHandle) {}

    /// The exchange failed without a response.
    fn on_failure(&self, call: Call<T>, error: CallError);

    /// The exchange produced a response (any status).
    fn on_response(&self, call: Call<T>, response: Response<T>);
}

/// Shared completion handed to [`Call::enqueue`].
pub type Completion<T> = Arc<dyn Callback<T>>;

struct FnCallback<T, F, R> {
    on_failure: F,
    on_response: R,
    _marker: PhantomData<fn(T)>,
}

impl<T, F, R> Callback<T> for FnCallback<T, F, R>
where
    F: Fn(Call<T>, CallError) + Send + Sync,
    R: Fn(Call<T>, Response<T>) + Send + Sync,
{
    fn on_failure(&self, call: Call<T>, error: CallError) {
        (self.on_failure)(call, error)
    }

    fn on_response(&self, call: Call<T>, response: Response<T>) {
        (self.on_response)(call, response)
    }
}

/// Build a completion from two closures.
pub fn callback_fn<T, F, R>(on_failure: F, on_response: R) -> Completion<T>
where
    T: 'static,
    F: Fn(Call<T>, CallError) + Send + Sync + 'static,
    R: Fn(Call<T>, Response<T>) + Send + Sync + 'static,
{
    Arc::new(FnCallback {
        on_failure,
        on_response,
        _marker: PhantomData,
    })
}

#[derive(Default)]
struct CancelState {
    canceled: AtomicBool,
    notify: Notify,
}

/// Cancels one call attempt.
#[derive(Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelState>,
}

impl CancelHandle {
    /// Cancel the attempt. The call completes with [`CallError::Canceled`].
    pub fn cancel(&self) {
        if !self.inner.canceled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Whether cancellation was requested.
    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    async fn canceled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_canceled() {
            return;
        }
        notified.await;
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

/// Type-erased description of a call, shared with interceptors and auth strategies.
#[derive(Debug, Clone)]
pub struct CallInfo {
    method: Method,
    path: String,
    url: Option<url::Url>,
}

impl CallInfo {
    /// Describe a call by method, path template, and resolved URL.
    pub fn new(method: Method, path: impl Into<String>, url: Option<url::Url>) -> Self {
        Self {
            method,
            path: path.into(),
            url,
        }
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path template as declared.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fully resolved URL, if the endpoint resolves.
    pub fn url(&self) -> Option<&url::Url> {
        self.url.as_ref()
    }
}

impl fmt::Display for CallInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url {
            Some(url) => write!(f, "{} {}", self.method, url),
            None => write!(f, "{} {}", self.method, self.path),
        }
    }
}

/// An unexecuted (or completed) call against a transport.
///
/// A call runs once. To issue the same request again, take a
/// [`fresh`](Call::fresh) copy.
pub struct Call<T> {
    transport: Transport,
    endpoint: Endpoint,
    cancel: CancelHandle,
    executed: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Call<T> {
    pub(crate) fn new(transport: Transport, endpoint: Endpoint) -> Self {
        Self {
            transport,
            endpoint,
            cancel: CancelHandle::default(),
            executed: false,
            _marker: PhantomData,
        }
    }

    /// A new, unexecuted call for the same request.
    pub fn fresh(&self) -> Self {
        Self::new(self.transport.clone(), self.endpoint.clone())
    }

    /// Describe this call.
    pub fn info(&self) -> CallInfo {
        CallInfo::new(
            self.endpoint.method().clone(),
            self.endpoint.path_template(),
            self.endpoint.resolve(self.transport.base_url()).ok(),
        )
    }

    /// The endpoint this call issues.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The transport this call runs on.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Handle that cancels this call.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Cancel this call.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation was requested.
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    /// Whether this call was already enqueued or executed.
    pub fn is_executed(&self) -> bool {
        self.executed
    }
}

impl<T> Call<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Run the call on a worker and report the outcome to `callback`.
    ///
    /// Uses the transport's pinned runtime, else the current one. Without
    /// either, the callback receives [`CallError::NoRuntime`].
    pub fn enqueue(mut self, callback: Completion<T>) {
        if self.executed {
            callback.on_failure(self, CallError::AlreadyExecuted);
            return;
        }
        self.executed = true;
        callback.on_enqueued(&self.cancel);

        let runtime = self
            .transport
            .client()
            .runtime()
            .cloned()
            .or_else(|| Handle::try_current().ok());
        let Some(runtime) = runtime else {
            callback.on_failure(self, CallError::NoRuntime);
            return;
        };

        runtime.spawn(async move {
            let outcome = self.run().await;
            match outcome {
                Ok(response) => callback.on_response(self, response),
                Err(error) => callback.on_failure(self, error),
            }
        });
    }

    /// Run the call on the current task.
    pub async fn execute(mut self) -> Result<Response<T>, CallError> {
        if self.executed {
            return Err(CallError::AlreadyExecuted);
        }
        self.executed = true;
        self.run().await
    }

    async fn run(&self) -> Result<Response<T>, CallError> {
        if self.cancel.is_canceled() {
            return Err(CallError::Canceled);
        }

        let parts = tokio::select! {
            biased;
            _ = self.cancel.canceled() => return Err(CallError::Canceled),
            result = self.transport.exchange(&self.endpoint) => result?,
        };

        let body = if parts.is_success() {
            decode_body::<T>(self.transport.codec(), parts.bytes())?
        } else {
            None
        };

        Ok(Response::new(parts, body))
    }
}

impl<T> fmt::Debug for Call<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("method", self.endpoint.method())
            .field("path", &self.endpoint.path_template())
            .field("executed", &self.executed)
            .field("canceled", &self.is_canceled())
            .finish()
    }
}
