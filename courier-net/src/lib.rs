//! # Courier Net
//!
//! A promise-style HTTP API client. APIs are declared as thin adapters over a
//! shared [`Transport`]; every call's outcome flows through completion
//! interceptors and a bounded re-authentication cycle before it reaches the
//! caller's handlers.
//!
//! ## Features
//!
//! - **Transport registry**: one lazily built transport per base address
//! - **Builder modules**: pluggable client and protocol configuration
//! - **Promises**: `then`/`catch` registration with cached outcomes
//! - **Interceptors**: claim failures or responses before default handling
//! - **Re-authentication**: bounded retry of unauthorized calls
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use courier_net::prelude::*;
//!
//! struct Names(Transport);
//!
//! impl Api for Names {
//!     fn bind(transport: Transport) -> Self {
//!         Self(transport)
//!     }
//! }
//!
//! impl Names {
//!     fn list(&self) -> Call<Vec<String>> {
//!         self.0.call(Endpoint::get("names"))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let network = Network::new(
//!         NetworkConfig::builder()
//!             .base_url("https://api.example.com/")
//!             .protocol_module(JsonCodecModule)
//!             .client_module(LogModule::new(LogLevel::Basic))
//!             .build(),
//!     );
//!
//!     let names = network.build::<Names>()?;
//!     Promise::from_call(&network, names.list())
//!         .then(|names| println!("{names:?}"))
//!         .catch(|error| eprintln!("{error:?}"));
//!     Ok(())
//! }
//! ```
//!
//! ## Without promises
//!
//! ```rust,no_run
//! use courier_net::prelude::*;
//!
//! # async fn run(network: Network) -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let transport = network.transport("https://api.example.com/")?;
//! let response = transport
//!     .call::<Vec<String>>(Endpoint::get("names"))
//!     .execute()
//!     .await?;
//! println!("{}: {:?}", response.status(), response.body());
//! # Ok(())
//! # }
//! ```

mod auth;
mod backoff;
mod call;
mod codec;
mod config;
mod endpoint;
mod error;
mod interceptor;
mod module;
mod promise;
mod registry;
mod response;
mod transport;

pub use auth::{AuthController, AuthState, AuthStrategy, NoAuth, PendingCall};
pub use backoff::BackoffStrategy;
pub use call::{Call, CallInfo, Callback, CancelHandle, Completion, callback_fn};
pub use codec::{Codec, JsonCodec};
pub use config::{ENV_PREFIX, NetworkConfig, NetworkConfigBuilder};
pub use endpoint::Endpoint;
pub use error::{CallError, NetworkError, Result};
pub use interceptor::{CompletionInterceptor, InterceptorChain, OfflineInterceptor};
pub use module::{
    ClientBuilder, ClientModule, CookiesModule, ExchangeHook, HeaderModule, JsonCodecModule,
    LogLevel, LogModule, ProtocolBuilder, ProtocolModule, TokenStore,
};
pub use promise::{Promise, PromiseView};
pub use registry::{Api, Network};
pub use response::{Response, ResponseParts};
pub use transport::{HttpClient, Transport};

// Re-export common types
pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use courier_net::prelude::*;
/// ```
pub mod prelude {
    pub use crate::auth::{AuthStrategy, NoAuth, PendingCall};
    pub use crate::backoff::BackoffStrategy;
    pub use crate::call::{Call, CallInfo, Callback, Completion, callback_fn};
    pub use crate::config::{NetworkConfig, NetworkConfigBuilder};
    pub use crate::endpoint::Endpoint;
    pub use crate::error::{CallError, NetworkError, Result};
    pub use crate::interceptor::{CompletionInterceptor, OfflineInterceptor};
    pub use crate::module::{
        ClientBuilder, ClientModule, CookiesModule, HeaderModule, JsonCodecModule, LogLevel,
        LogModule, ProtocolBuilder, ProtocolModule, TokenStore,
    };
    pub use crate::promise::{Promise, PromiseView};
    pub use crate::registry::{Api, Network};
    pub use crate::response::{Response, ResponseParts};
    pub use crate::transport::Transport;
    pub use http::{HeaderMap, Method, StatusCode};
}
