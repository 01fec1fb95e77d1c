//! Transport registry.
//!
//! A [`Network`] owns the active [`NetworkConfig`] and one [`Transport`] per
//! base address. Transports are built lazily on first use, through the
//! configured client and protocol modules, and reused afterwards.
//!
//! Each address owns a once-cell. The map lock only guards finding or
//! inserting that cell, so modules run without it and may call back into
//! the same [`Network`].

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::config::NetworkConfig;
use crate::module::{ClientBuilder, ProtocolBuilder};
use crate::transport::Transport;
use crate::{NetworkError, Result};

/// A remote API surface bound to a transport.
///
/// Implementors are thin adapters that turn method calls into
/// [`Transport::call`]s.
///
/// ```rust
/// use courier_net::{Api, Call, Endpoint, Transport};
///
/// struct Names(Transport);
///
/// impl Api for Names {
///     const ROUTE: Option<&'static str> = Some("https://names.example.com/");
///
///     fn bind(transport: Transport) -> Self {
///         Self(transport)
///     }
/// }
///
/// impl Names {
///     fn list(&self) -> Call<Vec<String>> {
///         self.0.call(Endpoint::get("names"))
///     }
/// }
/// ```
pub trait Api: Sized {
    /// Base address declared by the API, used when none is given explicitly.
    const ROUTE: Option<&'static str> = None;

    /// Bind the API to its transport.
    fn bind(transport: Transport) -> Self;
}

type Slot = Arc<OnceCell<Transport>>;

struct NetworkInner {
    config: RwLock<Arc<NetworkConfig>>,
    transports: RwLock<HashMap<String, Slot>>,
}

/// Shared network context: configuration plus the transport cache.
///
/// Cloning is cheap and every clone sees the same state.
#[derive(Clone)]
pub struct Network {
    inner: Arc<NetworkInner>,
}

impl Network {
    /// Create a network with the given configuration.
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                config: RwLock::new(Arc::new(config)),
                transports: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Replace the configuration and drop every cached transport.
    ///
    /// Transports already handed out keep working with the settings they
    /// were built with.
    pub fn configure(&self, config: NetworkConfig) {
        let mut transports = self.inner.transports.write();
        *self.inner.config.write() = Arc::new(config);
        let dropped = transports.values().filter(|slot| slot.get().is_some()).count();
        transports.clear();
        info!(dropped, "Network reconfigured");
    }

    /// Snapshot of the active configuration.
    pub fn config(&self) -> Arc<NetworkConfig> {
        self.inner.config.read().clone()
    }

    /// Bind `A` to the transport for its declared route, or the default
    /// base address.
    pub fn build<A: Api>(&self) -> Result<A> {
        self.build_at("")
    }

    /// Bind `A` to the transport for `address`.
    ///
    /// An empty `address` falls back to [`Api::ROUTE`], then to the configured
    /// base address.
    pub fn build_at<A: Api>(&self, address: &str) -> Result<A> {
        let address = if address.trim().is_empty() {
            A::ROUTE.unwrap_or_default()
        } else {
            address
        };
        self.transport(address).map(A::bind)
    }

    /// Transport for `address`, built on first use.
    ///
    /// An empty `address` falls back to the configured base address.
    pub fn transport(&self, address: &str) -> Result<Transport> {
        let key = self.resolve(address)?;

        if let Some(transport) = self
            .inner
            .transports
            .read()
            .get(&key)
            .and_then(|slot| slot.get())
        {
            return Ok(transport.clone());
        }

        let base_url = Url::parse(&key).map_err(|source| NetworkError::InvalidUrl {
            address: key.clone(),
            source,
        })?;
        let (config, slot) = self.slot(&key);

        let built = slot.get_or_try_init(|| {
            let transport = build_transport(&config, base_url)?;
            debug!(base_url = %key, "Built transport");
            Ok::<_, NetworkError>(transport)
        });
        match built {
            Ok(transport) => Ok(transport.clone()),
            Err(err) => {
                self.discard(&key, &slot);
                Err(err)
            }
        }
    }

    /// Number of cached transports.
    pub fn transport_count(&self) -> usize {
        self.inner
            .transports
            .read()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    /// Cell for `key` together with the configuration it must be built with.
    fn slot(&self, key: &str) -> (Arc<NetworkConfig>, Slot) {
        let mut transports = self.inner.transports.write();
        let slot = transports.entry(key.to_string()).or_default().clone();
        (self.config(), slot)
    }

    fn discard(&self, key: &str, slot: &Slot) {
        let mut transports = self.inner.transports.write();
        if transports
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && current.get().is_none())
        {
            transports.remove(key);
        }
    }

    fn resolve(&self, address: &str) -> Result<String> {
        let address = address.trim();
        let address = if address.is_empty() {
            self.config().base_url.trim().to_string()
        } else {
            address.to_string()
        };

        if address.is_empty() {
            return Err(NetworkError::Configuration(
                "No base address: pass one explicitly, declare Api::ROUTE, or set a default base_url"
                    .to_string(),
            ));
        }
        Ok(normalize(address))
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("config", &*self.config())
            .field("transports", &self.transport_count())
            .finish()
    }
}

fn normalize(mut address: String) -> String {
    if !address.ends_with('/') {
        address.push('/');
    }
    address
}

fn build_transport(config: &NetworkConfig, base_url: Url) -> Result<Transport> {
    let mut client = ClientBuilder::new(config);
    for module in &config.client_modules {
        module.on_builder_created(&mut client);
    }

    let mut protocol = ProtocolBuilder::new(base_url, client.build()?);
    for module in &config.protocol_modules {
        module.on_builder_created(&mut protocol);
    }
    Ok(protocol.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Barrier, mpsc};
    use std::thread;
    use std::time::Duration;

    #[derive(Debug)]
    struct Plain(Transport);

    impl Api for Plain {
        fn bind(transport: Transport) -> Self {
            Self(transport)
        }
    }

    #[derive(Debug)]
    struct Routed(Transport);

    impl Api for Routed {
        const ROUTE: Option<&'static str> = Some("http://routed.test");

        fn bind(transport: Transport) -> Self {
            Self(transport)
        }
    }

    fn counting_network(base_url: &str) -> (Network, Arc<AtomicUsize>) {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let config = NetworkConfig::builder()
            .base_url(base_url)
            .client_module(move |_: &mut ClientBuilder| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        (Network::new(config), builds)
    }

    #[test]
    fn test_single_transport_per_address() {
        let (network, builds) = counting_network("http://default.test/");

        let first = network.build::<Plain>().unwrap();
        let second = network.build::<Plain>().unwrap();
        let third = network.build_at::<Plain>("http://default.test").unwrap();

        assert!(first.0.ptr_eq(&second.0));
        assert!(first.0.ptr_eq(&third.0));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(network.transport_count(), 1);
    }

    #[test]
    fn test_concurrent_first_build_constructs_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let network = Network::new(
            NetworkConfig::builder()
                .base_url("http://default.test/")
                .client_module(move |_: &mut ClientBuilder| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                })
                .build(),
        );
        let barrier = Arc::new(Barrier::new(16));

        let workers: Vec<_> = (0..16)
            .map(|_| {
                let network = network.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    network.build::<Plain>().unwrap()
                })
            })
            .collect();
        let apis: Vec<Plain> = workers.into_iter().map(|w| w.join().unwrap()).collect();

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(apis.iter().all(|api| api.0.ptr_eq(&apis[0].0)));
        assert_eq!(network.transport_count(), 1);
    }

    #[test]
    fn test_module_may_call_back_into_network() {
        let network = Network::default();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let nested = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let inner = network.clone();
        let record = seen.clone();
        network.configure(
            NetworkConfig::builder()
                .base_url("http://default.test/")
                .client_module(move |_: &mut ClientBuilder| {
                    record.lock().push(inner.transport_count());
                    // Build a different address from inside the module, once.
                    if !nested.swap(true, Ordering::SeqCst) {
                        inner.transport("http://other.test/").unwrap();
                    }
                })
                .build(),
        );

        let (tx, rx) = mpsc::channel();
        let outer = network.clone();
        thread::spawn(move || {
            let built = outer.build::<Plain>().map(|api| api.0.base_url().to_string());
            let _ = tx.send(built);
        });

        let built = rx
            .recv_timeout(Duration::from_secs(3))
            .expect("build finished")
            .unwrap();
        assert_eq!(built, "http://default.test/");
        assert_eq!(network.transport_count(), 2);
        assert_eq!(*seen.lock(), vec![0, 0]);
    }

    #[test]
    fn test_resolution_order() {
        let (network, builds) = counting_network("http://default.test/");

        let routed = network.build::<Routed>().unwrap();
        assert_eq!(routed.0.base_url().as_str(), "http://routed.test/");

        let explicit = network.build_at::<Routed>("http://explicit.test/").unwrap();
        assert_eq!(explicit.0.base_url().as_str(), "http://explicit.test/");

        let plain = network.build::<Plain>().unwrap();
        assert_eq!(plain.0.base_url().as_str(), "http://default.test/");

        assert_eq!(builds.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_missing_address_is_configuration_error() {
        let network = Network::default();
        let err = network.build::<Plain>().unwrap_err();
        assert!(matches!(err, NetworkError::Configuration(_)));
        assert_eq!(network.transport_count(), 0);
    }

    #[test]
    fn test_invalid_address() {
        let network = Network::default();
        let err = network.transport("not a url").unwrap_err();
        assert!(matches!(err, NetworkError::InvalidUrl { .. }));
    }

    #[test]
    fn test_configure_invalidates_transports() {
        let (network, builds) = counting_network("http://default.test/");
        let before = network.build::<Plain>().unwrap();

        network.configure(
            NetworkConfig::builder()
                .base_url("http://default.test/")
                .build(),
        );
        assert_eq!(network.transport_count(), 0);

        let after = network.build::<Plain>().unwrap();
        assert!(!before.0.ptr_eq(&after.0));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let (network, _) = counting_network("http://default.test/");
        let clone = network.clone();
        clone.transport("").unwrap();
        assert_eq!(network.transport_count(), 1);
    }
}
