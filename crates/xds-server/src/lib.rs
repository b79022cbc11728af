//! # xds-server
//!
//! Stream-side machinery for distributing snapshots to data planes.
//!
//! This crate provides:
//!
//! - [`XdsServer`] - cache, callback pipeline and stream processor wired
//!   together from a [`ServerConfig`]
//! - [`StreamProcessor`] - transport-agnostic State-of-the-World stream loop
//! - [`callbacks`] - stream lifecycle hooks: stats, subscription status,
//!   watchdogs, control plane identity and logging
//! - [`SnapshotReconciler`] - generate, version and publish snapshots
//! - [`metrics`] - metric names and sanitization
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use xds_cache::ResourceSnapshot;
//! use xds_core::{DiscoveryRequest, Node, TypeUrl};
//! use futures::StreamExt;
//! use xds_server::XdsServer;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> xds_core::XdsResult<()> {
//! let server = XdsServer::<ResourceSnapshot>::builder().build()?;
//! server
//!     .cache()
//!     .set_snapshot("node-1", Arc::new(ResourceSnapshot::builder().version("v1").build()))?;
//!
//! let request = DiscoveryRequest::new(TypeUrl::CLUSTER, "").with_node(Node::new("node-1"));
//! let requests = futures::stream::iter(vec![Ok(request)]).chain(futures::stream::pending());
//! let (mut responses, _task) = server.serve_stream(requests, "");
//! let response = responses.recv().await.unwrap();
//! assert_eq!(response.version_info, "v1");
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
pub mod callbacks;
mod config;
pub mod metrics;
mod reconcile;
mod sotw;
mod stream;

pub use builder::XdsServerBuilder;
pub use callbacks::{
    Callbacks, CallbacksChain, ControlPlaneIdCallbacks, DeliveryTracker, LoggingCallbacks,
    PeriodicWatchdog, PeriodicWatchdogFactory, StatsCallbacks, StatusAccessor,
    StatusTrackerCallbacks, Watchdog, WatchdogCallbacks, WatchdogFactory,
};
pub use config::ServerConfig;
pub use reconcile::{SnapshotGenerator, SnapshotReconciler};
pub use sotw::StreamProcessor;
pub use stream::{StreamContext, StreamId, StreamIdAllocator};

use std::sync::Arc;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use xds_cache::{Snapshot, SnapshotCache};
use xds_core::{DiscoveryRequest, DiscoveryResponse, XdsResult};

/// A configured distribution server.
///
/// Owns the snapshot cache, the stats handler feeding the delivery ledger
/// and the stream processor every client stream runs on.
pub struct XdsServer<S: Snapshot> {
    cache: SnapshotCache<S>,
    stats: StatsCallbacks,
    status: Arc<StatusTrackerCallbacks>,
    watchdogs: Option<Arc<WatchdogCallbacks>>,
    processor: Arc<StreamProcessor>,
    config: ServerConfig,
}

impl<S: Snapshot> std::fmt::Debug for XdsServer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XdsServer")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<S: Snapshot> XdsServer<S> {
    /// Create a new builder for configuring the server.
    pub fn builder() -> XdsServerBuilder<S> {
        XdsServerBuilder::new()
    }

    /// Get a reference to the cache.
    #[inline]
    pub fn cache(&self) -> &SnapshotCache<S> {
        &self.cache
    }

    /// Stream statistics.
    #[inline]
    pub fn stats(&self) -> &StatsCallbacks {
        &self.stats
    }

    /// Subscription records of open streams.
    #[inline]
    pub fn status_tracker(&self) -> &Arc<StatusTrackerCallbacks> {
        &self.status
    }

    /// Watchdog handler, if a watchdog was configured.
    #[inline]
    pub fn watchdogs(&self) -> Option<&Arc<WatchdogCallbacks>> {
        self.watchdogs.as_ref()
    }

    /// Get the server configuration.
    #[inline]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The stream processor.
    #[inline]
    pub fn processor(&self) -> &Arc<StreamProcessor> {
        &self.processor
    }

    /// Reconciler publishing into this server's cache and reporting
    /// versions to its stats.
    pub fn reconciler(&self, generator: Arc<dyn SnapshotGenerator<S>>) -> SnapshotReconciler<S> {
        SnapshotReconciler::new(generator, self.cache.clone())
            .with_delivery_tracker(Arc::new(self.stats.clone()))
    }

    /// Serve one client stream on a new task.
    ///
    /// `type_url` is empty for aggregated streams.
    pub fn serve_stream<St>(
        &self,
        requests: St,
        type_url: impl Into<String>,
    ) -> (mpsc::Receiver<DiscoveryResponse>, JoinHandle<XdsResult<()>>)
    where
        St: Stream<Item = XdsResult<DiscoveryRequest>> + Send + Unpin + 'static,
    {
        self.processor.spawn(requests, type_url)
    }
}
