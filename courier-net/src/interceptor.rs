//! Completion interceptors.
//!
//! Interceptors observe every completion of every promise before default
//! handling. The first one that returns `true` claims the event: later
//! interceptors do not run, and neither the auth check nor the promise's own
//! handlers see it.

use std::sync::Arc;

use crate::call::CallInfo;
use crate::promise::PromiseView;
use crate::{CallError, ResponseParts};

/// Observer of promise completions.
pub trait CompletionInterceptor: Send + Sync {
    /// A call failed without a response. Return `true` to claim the event.
    fn on_failure(&self, _call: &CallInfo, _error: &CallError, _promise: &dyn PromiseView) -> bool {
        false
    }

    /// A call produced a response. Return `true` to claim the event.
    fn on_response(
        &self,
        _call: &CallInfo,
        _response: &ResponseParts,
        _promise: &dyn PromiseView,
    ) -> bool {
        false
    }
}

/// Ordered list of interceptors shared by all promises of a network.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn CompletionInterceptor>>,
}

impl InterceptorChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor.
    pub fn with(mut self, interceptor: impl CompletionInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Append a shared interceptor.
    pub fn push(&mut self, interceptor: Arc<dyn CompletionInterceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Number of interceptors.
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run the failure hooks in order; returns the position of the claimant.
    pub fn run_failure(
        &self,
        call: &CallInfo,
        error: &CallError,
        promise: &dyn PromiseView,
    ) -> Option<usize> {
        self.interceptors
            .iter()
            .position(|interceptor| interceptor.on_failure(call, error, promise))
    }

    /// Run the response hooks in order; returns the position of the claimant.
    pub fn run_response(
        &self,
        call: &CallInfo,
        response: &ResponseParts,
        promise: &dyn PromiseView,
    ) -> Option<usize> {
        self.interceptors
            .iter()
            .position(|interceptor| interceptor.on_response(call, response, promise))
    }
}

impl FromIterator<Arc<dyn CompletionInterceptor>> for InterceptorChain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn CompletionInterceptor>>>(iter: I) -> Self {
        Self {
            interceptors: iter.into_iter().collect(),
        }
    }
}

/// Claims connection failures and reports a fixed message instead.
pub struct OfflineInterceptor {
    message: String,
}

impl OfflineInterceptor {
    /// Report `message` for every connection failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for OfflineInterceptor {
    fn default() -> Self {
        Self::new("You are offline")
    }
}

impl CompletionInterceptor for OfflineInterceptor {
    fn on_failure(&self, call: &CallInfo, error: &CallError, promise: &dyn PromiseView) -> bool {
        if !error.is_connection() {
            return false;
        }
        tracing::debug!(call = %call, error = %error, "Reporting connection failure as offline");
        promise.fail(Some(self.message.clone()));
        true
    }
}
