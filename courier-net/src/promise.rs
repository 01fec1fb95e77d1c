//! Promise-style wrapper around a single request.
//!
//! A [`Promise`] owns the completion continuation of its call. Every
//! completion runs the network's interceptor chain first; an unclaimed
//! response then goes through the auth check; only then does the promise
//! settle and fire the matching handler.
//!
//! ```rust,no_run
//! # use courier_net::{Endpoint, Network, NetworkConfig, Promise};
//! # async fn demo() -> courier_net::Result<()> {
//! let network = Network::new(NetworkConfig::builder().base_url("https://example.com/").build());
//! let transport = network.transport("")?;
//! let call = transport.call::<Vec<String>>(Endpoint::get("names"));
//!
//! Promise::from_call(&network, call)
//!     .then(|names| println!("names: {names:?}"))
//!     .catch(|error| eprintln!("failed: {error:?}"));
//! # Ok(())
//! # }
//! ```

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::auth::PendingCall;
use crate::call::{Call, CallInfo, Callback, CancelHandle, Completion};
use crate::registry::Network;
use crate::{CallError, Response, ResponseParts};

/// Type-erased surface of a promise, handed to interceptors.
pub trait PromiseView: Send + Sync {
    /// Call of the most recent attempt.
    fn last_call(&self) -> Option<CallInfo>;

    /// Transport error of the most recent failed attempt.
    fn last_error(&self) -> Option<Arc<CallError>>;

    /// Response of the most recent attempt that produced one.
    fn last_response(&self) -> Option<ResponseParts>;

    /// Best-effort parse of the last response's error body.
    fn json_error(&self) -> Option<Value> {
        self.last_response().and_then(|response| response.json_error())
    }

    /// Settle the promise with a failure message.
    fn fail(&self, message: Option<String>);
}

type SuccessHandler<T> = Box<dyn FnOnce(Option<T>) + Send>;
type FailureHandler = Box<dyn FnOnce(Option<String>) + Send>;
type Action<T> = Box<dyn FnOnce(Completion<T>) + Send>;

enum Settled<T> {
    Success(Option<T>),
    Failure(Option<String>),
}

enum Delivery<T> {
    Success(SuccessHandler<T>, Option<T>),
    Failure(FailureHandler, Option<String>),
}

struct PromiseState<T> {
    action: Option<Action<T>>,
    on_success: Option<SuccessHandler<T>>,
    on_failure: Option<FailureHandler>,
    undelivered: Option<Settled<T>>,
    settled: bool,
    cancel: Option<CancelHandle>,
    cancel_requested: bool,
    last_call: Option<CallInfo>,
    last_error: Option<Arc<CallError>>,
    last_response: Option<ResponseParts>,
}

struct Shared<T> {
    this: Weak<Shared<T>>,
    network: Network,
    state: Mutex<PromiseState<T>>,
}

/// Deferred success/failure registration for one logical request.
///
/// The issuing action runs once: as soon as both handlers are registered, or
/// immediately with [`Promise::send`]. An outcome that arrives before its
/// handler is cached and delivered on registration. At most one handler fires
/// per promise.
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Promise<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Wrap an action that issues the call against the given completion.
    pub fn new<F>(network: &Network, action: F) -> Self
    where
        F: FnOnce(Completion<T>) + Send + 'static,
    {
        let shared = Arc::new_cyclic(|this| Shared {
            this: this.clone(),
            network: network.clone(),
            state: Mutex::new(PromiseState {
                action: Some(Box::new(action)),
                on_success: None,
                on_failure: None,
                undelivered: None,
                settled: false,
                cancel: None,
                cancel_requested: false,
                last_call: None,
                last_error: None,
                last_response: None,
            }),
        });

        Self { shared }
    }

    /// Wrap an unexecuted call.
    pub fn from_call(network: &Network, call: Call<T>) -> Self {
        Self::new(network, move |completion| call.enqueue(completion))
    }

    /// Register the success handler.
    pub fn then<F>(self, handler: F) -> Self
    where
        F: FnOnce(Option<T>) + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        match state.undelivered.take() {
            Some(Settled::Success(body)) => {
                drop(state);
                handler(body);
                return self;
            }
            other => state.undelivered = other,
        }
        if state.settled {
            drop(state);
            return self;
        }
        state.on_success = Some(Box::new(handler));
        let ready = state.on_failure.is_some();
        drop(state);

        if ready {
            self.shared.issue();
        }
        self
    }

    /// Register the failure handler.
    pub fn catch<F>(self, handler: F) -> Self
    where
        F: FnOnce(Option<String>) + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        match state.undelivered.take() {
            Some(Settled::Failure(message)) => {
                drop(state);
                handler(message);
                return self;
            }
            other => state.undelivered = other,
        }
        if state.settled {
            drop(state);
            return self;
        }
        state.on_failure = Some(Box::new(handler));
        let ready = state.on_success.is_some();
        drop(state);

        if ready {
            self.shared.issue();
        }
        self
    }

    /// Issue the action now, without waiting for both handlers.
    pub fn send(self) -> Self {
        self.shared.issue();
        self
    }

    /// Cancel the current attempt; it settles as a failure with no message.
    pub fn cancel(&self) {
        let handle = {
            let mut state = self.shared.state.lock();
            state.cancel_requested = true;
            state.cancel.clone()
        };
        if let Some(handle) = handle {
            handle.cancel();
        }
    }

    /// Whether the action has been issued.
    pub fn is_issued(&self) -> bool {
        self.shared.state.lock().action.is_none()
    }

    /// Whether a terminal outcome was produced.
    pub fn is_settled(&self) -> bool {
        self.shared.state.lock().settled
    }

    /// Call of the most recent attempt.
    pub fn last_call(&self) -> Option<CallInfo> {
        self.shared.last_call()
    }

    /// Transport error of the most recent failed attempt.
    pub fn last_error(&self) -> Option<Arc<CallError>> {
        self.shared.last_error()
    }

    /// Response of the most recent attempt that produced one.
    pub fn last_response(&self) -> Option<ResponseParts> {
        self.shared.last_response()
    }

    /// Best-effort parse of the last response's error body.
    pub fn json_error(&self) -> Option<Value> {
        self.shared.json_error()
    }
}

impl<T> PromiseView for Promise<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn last_call(&self) -> Option<CallInfo> {
        self.shared.last_call()
    }

    fn last_error(&self) -> Option<Arc<CallError>> {
        self.shared.last_error()
    }

    fn last_response(&self) -> Option<ResponseParts> {
        self.shared.last_response()
    }

    fn fail(&self, message: Option<String>) {
        self.shared.settle(Settled::Failure(message));
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Promise")
            .field("issued", &state.action.is_none())
            .field("settled", &state.settled)
            .field("last_call", &state.last_call)
            .finish()
    }
}

impl<T> Shared<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn completion(&self) -> Option<Completion<T>> {
        self.this.upgrade().map(|shared| shared as Completion<T>)
    }

    fn issue(&self) {
        let action = self.state.lock().action.take();
        let (Some(action), Some(completion)) = (action, self.completion()) else {
            return;
        };
        action(completion);
    }

    /// Produce the terminal outcome and deliver it if its handler is present.
    fn settle(&self, outcome: Settled<T>) {
        let mut state = self.state.lock();
        if state.settled {
            drop(state);
            debug!("Promise already settled, dropping outcome");
            return;
        }
        state.settled = true;

        let on_success = state.on_success.take();
        let on_failure = state.on_failure.take();
        let delivery = match (outcome, on_success, on_failure) {
            (Settled::Success(body), Some(handler), _) => Some(Delivery::Success(handler, body)),
            (Settled::Failure(message), _, Some(handler)) => {
                Some(Delivery::Failure(handler, message))
            }
            (outcome, _, _) => {
                state.undelivered = Some(outcome);
                None
            }
        };
        drop(state);

        match delivery {
            Some(Delivery::Success(handler, body)) => handler(body),
            Some(Delivery::Failure(handler, message)) => handler(message),
            None => {}
        }
    }

    fn pending_call(&self, call: &Call<T>, info: CallInfo) -> Option<PendingCall> {
        let completion = self.completion()?;
        let rejecting = self.this.upgrade()?;
        let fresh = call.fresh();

        let runtime = call.transport().client().runtime().cloned();

        Some(
            PendingCall::new(
                info,
                move || fresh.enqueue(completion),
                move |message| rejecting.settle(Settled::Failure(message)),
            )
            .with_runtime(runtime),
        )
    }
}

impl<T> PromiseView for Shared<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn last_call(&self) -> Option<CallInfo> {
        self.state.lock().last_call.clone()
    }

    fn last_error(&self) -> Option<Arc<CallError>> {
        self.state.lock().last_error.clone()
    }

    fn last_response(&self) -> Option<ResponseParts> {
        self.state.lock().last_response.clone()
    }

    fn fail(&self, message: Option<String>) {
        self.settle(Settled::Failure(message));
    }
}

impl<T> Callback<T> for Shared<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn on_enqueued(&self, cancel: &CancelHandle) {
        let mut state = self.state.lock();
        state.cancel = Some(cancel.clone());
        if state.cancel_requested {
            cancel.cancel();
        }
    }

    fn on_failure(&self, call: Call<T>, error: CallError) {
        let info = call.info();
        let error = Arc::new(error);
        {
            let mut state = self.state.lock();
            state.last_call = Some(info.clone());
            state.last_error = Some(error.clone());
        }

        let config = self.network.config();
        if let Some(position) = config.interceptors.run_failure(&info, &error, self) {
            debug!(call = %info, interceptor = position, "Failure claimed by interceptor");
            return;
        }

        debug!(call = %info, error = %error, "Dispatching failure");
        self.settle(Settled::Failure(error.user_message()));
    }

    fn on_response(&self, call: Call<T>, response: Response<T>) {
        let info = call.info();
        let (parts, body) = response.into_parts();
        {
            let mut state = self.state.lock();
            state.last_call = Some(info.clone());
            state.last_response = Some(parts.clone());
        }

        let config = self.network.config();
        if let Some(position) = config.interceptors.run_response(&info, &parts, self) {
            debug!(call = %info, interceptor = position, "Response claimed by interceptor");
            return;
        }

        if parts.is_success() {
            config.auth.record_authenticated();
            debug!(call = %info, status = %parts.status(), "Dispatching success");
            self.settle(Settled::Success(body));
        } else if !config.auth.is_authenticated(&parts) {
            debug!(call = %info, status = %parts.status(), "Unauthorized, entering auth cycle");
            if let Some(pending) = self.pending_call(&call, info) {
                config.auth.on_unauthorized(pending);
            }
        } else {
            debug!(call = %info, status = %parts.status(), "Dispatching failure");
            self.settle(Settled::Failure(Some(parts.message())));
        }
    }
}
