//! Network configuration.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::warn;

use crate::auth::{AuthController, AuthStrategy};
use crate::backoff::BackoffStrategy;
use crate::interceptor::{CompletionInterceptor, InterceptorChain};
use crate::module::{ClientModule, ProtocolModule};
use crate::{NetworkError, Result};

/// Prefix of the environment variables read by [`NetworkConfig::from_env`].
pub const ENV_PREFIX: &str = "COURIER";

/// Everything a [`Network`](crate::Network) needs to build transports and
/// dispatch completions.
///
/// Handed over whole; re-configuring a network replaces the previous value.
#[derive(Clone)]
pub struct NetworkConfig {
    /// Modules applied to every new client builder, in order.
    pub client_modules: Vec<Arc<dyn ClientModule>>,
    /// Modules applied to every new protocol builder, in order.
    pub protocol_modules: Vec<Arc<dyn ProtocolModule>>,
    /// Completion interceptors consulted before default dispatch.
    pub interceptors: InterceptorChain,
    /// Re-authentication controller shared by every promise.
    pub auth: Arc<AuthController>,
    /// Address used for APIs without an explicit or declared one.
    pub base_url: String,
    /// Default request timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// User agent string.
    pub user_agent: String,
    /// Headers sent with every request.
    pub default_headers: HeaderMap,
    /// Runtime that drives enqueued calls; the ambient one when unset.
    pub runtime: Option<Handle>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            client_modules: Vec::new(),
            protocol_modules: Vec::new(),
            interceptors: InterceptorChain::new(),
            auth: Arc::new(AuthController::default()),
            base_url: String::new(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("courier-net/{}", env!("CARGO_PKG_VERSION")),
            default_headers: HeaderMap::new(),
            runtime: None,
        }
    }
}

impl NetworkConfig {
    /// Create a new configuration builder.
    pub fn builder() -> NetworkConfigBuilder {
        NetworkConfigBuilder::default()
    }

    /// Load connection settings from `COURIER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::builder().from_env()?.build())
    }
}

impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("client_modules", &self.client_modules.len())
            .field("protocol_modules", &self.protocol_modules.len())
            .field("interceptors", &self.interceptors.len())
            .field("auth", &self.auth)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("user_agent", &self.user_agent)
            .field("default_headers", &self.default_headers)
            .finish()
    }
}

/// Builder for [`NetworkConfig`].
#[derive(Default)]
pub struct NetworkConfigBuilder {
    config: NetworkConfig,
    auth_strategy: Option<Arc<dyn AuthStrategy>>,
    auth_backoff: BackoffStrategy,
}

impl NetworkConfigBuilder {
    /// Append a client module.
    pub fn client_module(mut self, module: impl ClientModule + 'static) -> Self {
        self.config.client_modules.push(Arc::new(module));
        self
    }

    /// Append a protocol module.
    pub fn protocol_module(mut self, module: impl ProtocolModule + 'static) -> Self {
        self.config.protocol_modules.push(Arc::new(module));
        self
    }

    /// Append a completion interceptor.
    pub fn interceptor(mut self, interceptor: impl CompletionInterceptor + 'static) -> Self {
        self.config.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Append an interceptor shared with other owners.
    pub fn shared_interceptor(mut self, interceptor: Arc<dyn CompletionInterceptor>) -> Self {
        self.config.interceptors.push(interceptor);
        self
    }

    /// Set the authentication strategy.
    pub fn auth(mut self, strategy: impl AuthStrategy + 'static) -> Self {
        self.auth_strategy = Some(Arc::new(strategy));
        self
    }

    /// Set an authentication strategy shared with other owners.
    pub fn shared_auth(mut self, strategy: Arc<dyn AuthStrategy>) -> Self {
        self.auth_strategy = Some(strategy);
        self
    }

    /// Set the delay between re-authentication attempts.
    pub fn auth_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.auth_backoff = backoff;
        self
    }

    /// Set the default base address.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Set the default request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a header sent with every request. Invalid headers are skipped.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value.as_ref()),
        ) {
            (Ok(name), Ok(value)) => {
                self.config.default_headers.append(name, value);
            }
            _ => warn!(header = name, "Skipping invalid default header"),
        }
        self
    }

    /// Set the runtime that drives enqueued calls.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.config.runtime = Some(handle);
        self
    }

    /// Override connection settings from `COURIER_*` environment variables.
    ///
    /// Reads `COURIER_BASE_URL`, `COURIER_TIMEOUT_SECS`,
    /// `COURIER_CONNECT_TIMEOUT_SECS` and `COURIER_USER_AGENT`. Unset
    /// variables leave the current value alone.
    pub fn from_env(self) -> Result<Self> {
        self.apply_vars(&EnvLoader::new(ENV_PREFIX).load())
    }

    fn apply_vars(mut self, vars: &HashMap<String, String>) -> Result<Self> {
        if let Some(url) = vars.get("base_url") {
            self.config.base_url = url.clone();
        }
        if let Some(secs) = vars.get("timeout_secs") {
            self.config.timeout = parse_secs("TIMEOUT_SECS", secs)?;
        }
        if let Some(secs) = vars.get("connect_timeout_secs") {
            self.config.connect_timeout = parse_secs("CONNECT_TIMEOUT_SECS", secs)?;
        }
        if let Some(agent) = vars.get("user_agent") {
            self.config.user_agent = agent.clone();
        }
        Ok(self)
    }

    /// Build the configuration.
    pub fn build(mut self) -> NetworkConfig {
        let controller = match self.auth_strategy {
            Some(strategy) => AuthController::from_shared(strategy),
            None => AuthController::default(),
        };
        self.config.auth = Arc::new(controller.with_backoff(self.auth_backoff));
        self.config
    }
}

impl fmt::Debug for NetworkConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfigBuilder")
            .field("config", &self.config)
            .field("custom_auth", &self.auth_strategy.is_some())
            .field("auth_backoff", &self.auth_backoff)
            .finish()
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| NetworkError::Configuration(format!("{ENV_PREFIX}_{key}={value:?}: {e}")))
}

/// Prefix-scoped environment reader.
struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    fn new(prefix: &str) -> Self {
        Self {
            prefix: format!("{prefix}_"),
        }
    }

    /// Variables under the prefix, keyed by the lowercased remainder.
    fn load(&self) -> HashMap<String, String> {
        env::vars()
            .filter_map(|(key, value)| {
                key.strip_prefix(&self.prefix)
                    .map(|rest| (rest.to_lowercase(), value))
            })
            .collect()
    }
}
