//! Builder wiring the cache, callback pipeline and stream processor.

use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use xds_cache::{CacheBuilder, Snapshot};
use xds_core::{Node, NodeHasher, XdsError, XdsResult};

use crate::callbacks::{
    Callbacks, CallbacksChain, ControlPlaneIdCallbacks, LoggingCallbacks, PeriodicWatchdogFactory,
    StatsCallbacks, StatusTrackerCallbacks, WatchdogCallbacks, WatchdogFactory,
};
use crate::config::ServerConfig;
use crate::sotw::StreamProcessor;
use crate::stream::StreamId;
use crate::XdsServer;

/// Builder for creating an [`XdsServer`].
///
/// # Example
///
/// ```rust
/// use xds_cache::ResourceSnapshot;
/// use xds_server::{ServerConfig, XdsServer};
///
/// let server = XdsServer::<ResourceSnapshot>::builder()
///     .config(ServerConfig::default().with_control_plane_id("cp-1"))
///     .build()
///     .unwrap();
/// assert_eq!(server.stats().prefix(), "xds");
/// ```
pub struct XdsServerBuilder<S: Snapshot> {
    config: ServerConfig,
    hasher: Option<Arc<dyn NodeHasher>>,
    watchdog: Option<Arc<dyn WatchdogFactory>>,
    callbacks: Vec<Arc<dyn Callbacks>>,
    _snapshot: PhantomData<fn() -> S>,
}

impl<S: Snapshot> std::fmt::Debug for XdsServerBuilder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XdsServerBuilder")
            .field("config", &self.config)
            .field("watchdog", &self.watchdog.is_some())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl<S: Snapshot> Default for XdsServerBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Snapshot> XdsServerBuilder<S> {
    /// Create a new server builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            hasher: None,
            watchdog: None,
            callbacks: Vec::new(),
            _snapshot: PhantomData,
        }
    }

    /// Replace the configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Key cache entries with `hasher` instead of the node id.
    pub fn node_hasher(mut self, hasher: Arc<dyn NodeHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Run a watchdog from `factory` for every stream.
    pub fn watchdog(mut self, factory: Arc<dyn WatchdogFactory>) -> Self {
        self.watchdog = Some(factory);
        self
    }

    /// Call `on_tick` for every open stream at the configured watchdog
    /// interval.
    pub fn periodic_watchdog<F>(self, on_tick: F) -> Self
    where
        F: Fn(StreamId, Option<Node>) -> BoxFuture<'static, XdsResult<()>> + Send + Sync + 'static,
    {
        let interval = self.config.watchdog_interval;
        self.watchdog(Arc::new(PeriodicWatchdogFactory::new(interval, on_tick)))
    }

    /// Append a handler after the built-in ones.
    pub fn callbacks(mut self, callbacks: Arc<dyn Callbacks>) -> Self {
        self.callbacks.push(callbacks);
        self
    }

    /// Build the server.
    ///
    /// The callback chain runs stats first, then the status tracker,
    /// logging (if enabled), the watchdog (if set), the control plane id and
    /// finally any extra handlers.
    ///
    /// # Errors
    ///
    /// [`XdsError::Configuration`] if the stats prefix is invalid or the
    /// response buffer size is zero.
    pub fn build(self) -> XdsResult<XdsServer<S>> {
        if self.config.response_buffer_size == 0 {
            return Err(XdsError::Configuration(
                "response buffer size must be positive".into(),
            ));
        }

        let stats = StatsCallbacks::new(&self.config.stats_prefix)?;

        let mut cache = CacheBuilder::new().ads(self.config.ads);
        if let Some(hasher) = self.hasher {
            cache = cache.hasher(hasher);
        }
        let cache = cache.build::<S>();

        let mut chain = CallbacksChain::default();
        chain.push(Arc::new(stats.clone()));
        let status = Arc::new(StatusTrackerCallbacks::new());
        chain.push(Arc::clone(&status) as Arc<dyn Callbacks>);
        if self.config.log_callbacks {
            chain.push(Arc::new(LoggingCallbacks));
        }
        let watchdogs = self.watchdog.map(|f| Arc::new(WatchdogCallbacks::new(f)));
        if let Some(watchdogs) = &watchdogs {
            chain.push(Arc::clone(watchdogs) as Arc<dyn Callbacks>);
        }
        if !self.config.control_plane_id.is_empty() {
            chain.push(Arc::new(ControlPlaneIdCallbacks::new(
                self.config.control_plane_id.clone(),
            )));
        }
        for extra in self.callbacks {
            chain.push(extra);
        }

        let processor = StreamProcessor::new(Arc::new(cache.clone()), Arc::new(chain))
            .with_response_buffer_size(self.config.response_buffer_size);

        Ok(XdsServer {
            cache,
            stats,
            status,
            watchdogs,
            processor: Arc::new(processor),
            config: self.config,
        })
    }
}
