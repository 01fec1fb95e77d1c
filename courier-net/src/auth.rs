//! Re-authentication of unauthorized calls.
//!
//! When a response is judged unauthenticated, the [`AuthController`] hands a
//! [`PendingCall`] to the configured [`AuthStrategy`]. The strategy refreshes
//! credentials and replays the call; the issuing promise observes the
//! replayed outcome. After [`AuthController::MAX_ATTEMPTS`] re-authentication
//! attempts without an authenticated response, the next unauthorized response
//! ends the cycle with [`AuthStrategy::on_authentication_failed`] and the
//! counter starts over.

use http::StatusCode;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::ResponseParts;
use crate::backoff::BackoffStrategy;
use crate::call::CallInfo;

/// Credential protocol plugged into the auth cycle.
pub trait AuthStrategy: Send + Sync {
    /// Whether `response` proves the caller is authenticated.
    ///
    /// Only consulted for unsuccessful responses. The default treats exactly
    /// `401 Unauthorized` as unauthenticated.
    fn is_authenticated(&self, response: &ResponseParts) -> bool {
        response.status() != StatusCode::UNAUTHORIZED
    }

    /// Refresh credentials, then [`replay`](PendingCall::replay) the call.
    ///
    /// Must not block; issue any exchange asynchronously.
    fn authenticate(&self, pending: PendingCall);

    /// Authentication cannot be recovered in this cycle. Must not panic.
    fn on_authentication_failed(&self);
}

/// Strategy for networks without a credential protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl AuthStrategy for NoAuth {
    fn is_authenticated(&self, _response: &ResponseParts) -> bool {
        true
    }

    fn authenticate(&self, _pending: PendingCall) {}

    fn on_authentication_failed(&self) {}
}

/// A call held back by an unauthorized response.
///
/// Dropping it without replaying or rejecting leaves the issuing promise
/// unsettled.
pub struct PendingCall {
    info: CallInfo,
    attempt: u32,
    delay: Duration,
    runtime: Option<Handle>,
    replay: Box<dyn FnOnce() + Send>,
    reject: Box<dyn FnOnce(Option<String>) + Send>,
}

impl PendingCall {
    /// Wrap the continuations of a held-back call.
    pub fn new(
        info: CallInfo,
        replay: impl FnOnce() + Send + 'static,
        reject: impl FnOnce(Option<String>) + Send + 'static,
    ) -> Self {
        Self {
            info,
            attempt: 0,
            delay: Duration::ZERO,
            runtime: None,
            replay: Box::new(replay),
            reject: Box::new(reject),
        }
    }

    /// Run delayed replays on `runtime` instead of the ambient one.
    pub fn with_runtime(mut self, runtime: Option<Handle>) -> Self {
        self.runtime = runtime;
        self
    }

    fn scheduled(mut self, attempt: u32, delay: Duration) -> Self {
        self.attempt = attempt;
        self.delay = delay;
        self
    }

    /// The held-back call.
    pub fn info(&self) -> &CallInfo {
        &self.info
    }

    /// Re-authentication attempt this call belongs to (1-based).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Backoff applied before the replay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Issue a fresh copy of the call against the issuing promise.
    pub fn replay(self) {
        let replay = self.replay;
        if self.delay.is_zero() {
            replay();
            return;
        }

        let delay = self.delay;
        match self.runtime.or_else(|| Handle::try_current().ok()) {
            Some(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    replay();
                });
            }
            None => {
                warn!(
                    call = %self.info,
                    delay_ms = delay.as_millis() as u64,
                    "No runtime to delay replay, replaying immediately"
                );
                replay();
            }
        }
    }

    /// Settle the issuing promise with a failure instead of replaying.
    pub fn reject(self, message: Option<String>) {
        (self.reject)(message)
    }
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("call", &self.info)
            .field("attempt", &self.attempt)
            .field("delay", &self.delay)
            .finish()
    }
}

/// Position in the auth cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// The last verdict was authenticated, or no challenge was seen yet.
    Authenticated,
    /// A re-authentication attempt is in progress.
    Authenticating,
    /// The last cycle ran out of attempts.
    AuthFailed,
}

#[derive(Debug)]
struct AuthCycle {
    retries: u32,
    state: AuthState,
}

/// Shared auth state machine wrapping one [`AuthStrategy`].
pub struct AuthController {
    strategy: Arc<dyn AuthStrategy>,
    backoff: BackoffStrategy,
    cycle: Mutex<AuthCycle>,
}

impl AuthController {
    /// Re-authentication attempts per cycle.
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Wrap a strategy.
    pub fn new(strategy: impl AuthStrategy + 'static) -> Self {
        Self::from_shared(Arc::new(strategy))
    }

    /// Wrap a strategy that is also held elsewhere.
    pub fn from_shared(strategy: Arc<dyn AuthStrategy>) -> Self {
        Self {
            strategy,
            backoff: BackoffStrategy::None,
            cycle: Mutex::new(AuthCycle {
                retries: 0,
                state: AuthState::Authenticated,
            }),
        }
    }

    /// Delay replays according to `backoff`.
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// The wrapped strategy.
    pub fn strategy(&self) -> &Arc<dyn AuthStrategy> {
        &self.strategy
    }

    /// Re-authentication attempts made in the current cycle.
    pub fn retry_count(&self) -> u32 {
        self.cycle.lock().retries
    }

    /// Current position in the cycle.
    pub fn state(&self) -> AuthState {
        self.cycle.lock().state
    }

    /// Ask the strategy whether `response` is authenticated; resets the cycle if so.
    pub fn is_authenticated(&self, response: &ResponseParts) -> bool {
        let authenticated = self.strategy.is_authenticated(response);
        if authenticated {
            self.record_authenticated();
        }
        authenticated
    }

    /// Reset the cycle after an authenticated (e.g. successful) response.
    pub fn record_authenticated(&self) {
        let mut cycle = self.cycle.lock();
        cycle.retries = 0;
        cycle.state = AuthState::Authenticated;
    }

    /// Start or continue the auth cycle for an unauthorized call.
    pub fn on_unauthorized(&self, pending: PendingCall) {
        let attempt = {
            let mut cycle = self.cycle.lock();
            if cycle.retries >= Self::MAX_ATTEMPTS {
                cycle.retries = 0;
                cycle.state = AuthState::AuthFailed;
                None
            } else {
                cycle.retries += 1;
                cycle.state = AuthState::Authenticating;
                Some(cycle.retries)
            }
        };

        match attempt {
            Some(attempt) => {
                let delay = self.backoff.delay_for_attempt(attempt - 1);
                debug!(
                    call = %pending.info(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Re-authenticating unauthorized call"
                );
                self.strategy.authenticate(pending.scheduled(attempt, delay));
            }
            None => {
                warn!(
                    call = %pending.info(),
                    attempts = Self::MAX_ATTEMPTS,
                    "Authentication failed, giving up"
                );
                self.strategy.on_authentication_failed();
            }
        }
    }
}

impl Default for AuthController {
    fn default() -> Self {
        Self::new(NoAuth)
    }
}

impl fmt::Debug for AuthController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthController")
            .field("backoff", &self.backoff)
            .field("cycle", &*self.cycle.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderMap, Method};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn response(status: u16) -> ResponseParts {
        ResponseParts::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            Bytes::new(),
            url::Url::parse("http://localhost/names").unwrap(),
        )
    }

    fn pending(replays: &Arc<AtomicU32>) -> PendingCall {
        let replays = replays.clone();
        let info = CallInfo::new(Method::POST, "names", None);
        PendingCall::new(
            info,
            move || {
                replays.fetch_add(1, Ordering::SeqCst);
            },
            |_| {},
        )
    }

    #[derive(Default)]
    struct NeverAuthenticated {
        attempts: AtomicU32,
        failures: AtomicU32,
    }

    impl AuthStrategy for NeverAuthenticated {
        fn is_authenticated(&self, _response: &ResponseParts) -> bool {
            false
        }

        fn authenticate(&self, pending: PendingCall) {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            pending.replay();
        }

        fn on_authentication_failed(&self) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_default_predicate_only_rejects_401() {
        let controller = AuthController::new(NeverAuthenticated::default());
        assert!(!controller.is_authenticated(&response(401)));

        struct DefaultPredicate;
        impl AuthStrategy for DefaultPredicate {
            fn authenticate(&self, _pending: PendingCall) {}
            fn on_authentication_failed(&self) {}
        }
        let controller = AuthController::new(DefaultPredicate);
        assert!(!controller.is_authenticated(&response(401)));
        assert!(controller.is_authenticated(&response(403)));
        assert!(controller.is_authenticated(&response(500)));
    }

    #[test]
    fn test_retry_bound() {
        let strategy = Arc::new(NeverAuthenticated::default());
        let controller = AuthController::from_shared(strategy.clone());
        let replays = Arc::new(AtomicU32::new(0));

        for expected in 1..=3 {
            controller.on_unauthorized(pending(&replays));
            assert_eq!(controller.retry_count(), expected);
            assert_eq!(controller.state(), AuthState::Authenticating);
        }
        assert_eq!(strategy.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(strategy.failures.load(Ordering::SeqCst), 0);

        controller.on_unauthorized(pending(&replays));
        assert_eq!(strategy.failures.load(Ordering::SeqCst), 1);
        assert_eq!(controller.retry_count(), 0);
        assert_eq!(controller.state(), AuthState::AuthFailed);
        assert_eq!(replays.load(Ordering::SeqCst), 3);

        // A new cycle counts from zero again.
        controller.on_unauthorized(pending(&replays));
        assert_eq!(controller.retry_count(), 1);
        assert_eq!(strategy.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(strategy.failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_authenticated_response_resets_cycle() {
        struct Refreshing;
        impl AuthStrategy for Refreshing {
            fn authenticate(&self, _pending: PendingCall) {}
            fn on_authentication_failed(&self) {}
        }

        let controller = AuthController::new(Refreshing);
        let replays = Arc::new(AtomicU32::new(0));
        controller.on_unauthorized(pending(&replays));
        controller.on_unauthorized(pending(&replays));
        assert_eq!(controller.retry_count(), 2);

        assert!(controller.is_authenticated(&response(404)));
        assert_eq!(controller.retry_count(), 0);
        assert_eq!(controller.state(), AuthState::Authenticated);
    }

    #[test]
    fn test_no_auth_is_always_authenticated() {
        let controller = AuthController::default();
        assert!(controller.is_authenticated(&response(401)));
        assert_eq!(controller.state(), AuthState::Authenticated);
    }

    #[test]
    fn test_delayed_replay_uses_pinned_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        let info = CallInfo::new(Method::GET, "names", None);
        let pending = PendingCall::new(info, move || tx.send(()).unwrap(), |_| {})
            .with_runtime(Some(runtime.handle().clone()))
            .scheduled(1, Duration::from_millis(50));

        // No ambient runtime on the test thread.
        assert!(Handle::try_current().is_err());
        let started = std::time::Instant::now();
        pending.replay();

        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_concurrent_unauthorized_calls_share_one_cycle() {
        let strategy = Arc::new(NeverAuthenticated::default());
        let controller = Arc::new(AuthController::from_shared(strategy.clone()));
        let replays = Arc::new(AtomicU32::new(0));
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let controller = controller.clone();
                let barrier = barrier.clone();
                let pending = pending(&replays);
                std::thread::spawn(move || {
                    barrier.wait();
                    controller.on_unauthorized(pending);
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        // Two full cycles: three attempts then a failure, twice.
        assert_eq!(strategy.attempts.load(Ordering::SeqCst), 6);
        assert_eq!(strategy.failures.load(Ordering::SeqCst), 2);
        assert_eq!(replays.load(Ordering::SeqCst), 6);
        assert_eq!(controller.retry_count(), 0);
        assert_eq!(controller.state(), AuthState::AuthFailed);
    }

    #[test]
    fn test_backoff_is_attached_to_pending_call() {
        struct Inspecting(Mutex<Vec<(u32, Duration)>>);
        impl AuthStrategy for Inspecting {
            fn authenticate(&self, pending: PendingCall) {
                self.0.lock().push((pending.attempt(), pending.delay()));
            }
            fn on_authentication_failed(&self) {}
        }

        let strategy = Arc::new(Inspecting(Mutex::new(Vec::new())));
        let controller = AuthController::from_shared(strategy.clone())
            .with_backoff(BackoffStrategy::exponential(Duration::from_millis(50)));
        let replays = Arc::new(AtomicU32::new(0));
        controller.on_unauthorized(pending(&replays));
        controller.on_unauthorized(pending(&replays));

        assert_eq!(
            *strategy.0.lock(),
            vec![
                (1, Duration::from_millis(50)),
                (2, Duration::from_millis(100))
            ]
        );
    }
}
