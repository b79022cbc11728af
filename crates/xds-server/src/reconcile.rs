//! Snapshot reconciliation.
//!
//! A [`SnapshotReconciler`] asks a [`SnapshotGenerator`] for the desired
//! snapshot of a node, stamps versions on it with a
//! [`SnapshotAutoVersioner`] against what the cache already holds, and
//! publishes it only when some type actually changed.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};
use xds_cache::{Snapshot, SnapshotAutoVersioner, SnapshotCache};
use xds_core::{Node, XdsResult};

use crate::callbacks::DeliveryTracker;

/// Produces the desired snapshot for a node.
#[async_trait]
pub trait SnapshotGenerator<S: Snapshot>: Send + Sync {
    /// Build the snapshot `node` should be running.
    ///
    /// Versions may be left empty; the reconciler fills them in.
    async fn generate_snapshot(&self, node: &Node) -> XdsResult<S>;
}

/// Publishes generated snapshots into a [`SnapshotCache`].
pub struct SnapshotReconciler<S: Snapshot> {
    generator: Arc<dyn SnapshotGenerator<S>>,
    versioner: SnapshotAutoVersioner,
    cache: SnapshotCache<S>,
    tracker: Option<Arc<dyn DeliveryTracker>>,
}

impl<S: Snapshot> fmt::Debug for SnapshotReconciler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotReconciler")
            .field("tracks_delivery", &self.tracker.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: Snapshot> SnapshotReconciler<S> {
    /// Reconciler publishing into `cache`.
    pub fn new(generator: Arc<dyn SnapshotGenerator<S>>, cache: SnapshotCache<S>) -> Self {
        Self {
            generator,
            versioner: SnapshotAutoVersioner::new(),
            cache,
            tracker: None,
        }
    }

    /// Use `versioner` to assign version tokens.
    pub fn with_versioner(mut self, versioner: SnapshotAutoVersioner) -> Self {
        self.versioner = versioner;
        self
    }

    /// Report published and superseded versions to `tracker`.
    pub fn with_delivery_tracker(mut self, tracker: Arc<dyn DeliveryTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// The cache being published into.
    pub fn cache(&self) -> &SnapshotCache<S> {
        &self.cache
    }

    /// Regenerate the snapshot for `node` and publish it if it changed.
    ///
    /// Returns whether a new snapshot was stored.
    ///
    /// # Errors
    ///
    /// Generator errors and inconsistent snapshots are returned; the cache
    /// is left untouched in both cases.
    pub async fn reconcile(&self, node: &Node) -> XdsResult<bool> {
        let key = self.cache.node_key(Some(node));
        let generated = Arc::new(self.generator.generate_snapshot(node).await?);
        generated.consistent()?;

        let old = self.cache.get_snapshot(&key).ok();
        let Some(new) = self.versioner.version(Some(generated), old.as_ref()) else {
            return Ok(false);
        };

        let changed: Vec<_> = new
            .supported_types()
            .iter()
            .filter(|t| {
                old.as_ref()
                    .map(|old| old.get_version(t.as_str()) != new.get_version(t.as_str()))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        if changed.is_empty() {
            trace!(node = %key, "snapshot unchanged");
            return Ok(false);
        }

        if let Some(tracker) = &self.tracker {
            for type_url in &changed {
                if let Some(old) = &old {
                    let previous = old.get_version(type_url.as_str());
                    if !previous.is_empty() {
                        tracker.discard_config(type_url.as_str(), previous);
                    }
                }
                tracker.config_ready_for_delivery(
                    type_url.as_str(),
                    new.get_version(type_url.as_str()),
                );
            }
        }

        self.cache.set_snapshot(&key, new)?;
        debug!(node = %key, changed_types = changed.len(), "published snapshot");
        Ok(true)
    }

    /// Drop the snapshot for `node` and forget its pending deliveries.
    pub fn clear(&self, node: &Node) {
        let key = self.cache.node_key(Some(node));
        let Some(old) = self.cache.clear_snapshot(&key) else {
            return;
        };
        if let Some(tracker) = &self.tracker {
            for type_url in old.supported_types() {
                let version = old.get_version(type_url.as_str());
                if !version.is_empty() {
                    tracker.discard_config(type_url.as_str(), version);
                }
            }
        }
        debug!(node = %key, "cleared snapshot");
    }
}
