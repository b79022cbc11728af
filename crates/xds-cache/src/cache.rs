//! Watch-driven snapshot cache.
//!
//! The cache stores one snapshot per node key. Clients register watches
//! (one per request) that are answered at most once: immediately if the
//! stored snapshot already differs from the version the client holds, or
//! later when [`SnapshotCache::set_snapshot`] installs such a snapshot.
//!
//! ## Locking
//!
//! Each node key owns a single `DashMap` entry holding its snapshot, its
//! pending watches and its status. The version check and the watch
//! registration in [`SnapshotCache::create_watch`] happen under that
//! entry's shard guard, as does the fan-out in
//! [`SnapshotCache::set_snapshot`], so a watch can never be registered
//! against a stale snapshot and then missed. Delivery goes through a
//! single-slot `oneshot` channel and never blocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use fnv::FnvHashMap;
use tracing::{debug, trace};
use xds_core::{BoxResource, DiscoveryRequest, IdHash, Node, NodeHasher, XdsError, XdsResult};

use crate::snapshot::{ResourceMap, Snapshot};
use crate::stats::CacheStats;
use crate::watch::{PendingWatch, Response, WatchCancel, WatchId, WatchReceiver};

/// Watch and fetch interface consumed by stream handlers.
///
/// Object-safe so that transport code does not need to know which
/// snapshot flavour backs the cache.
pub trait ConfigWatcher: Send + Sync {
    /// Register a watch for `request`.
    ///
    /// If the stored snapshot already differs from the requested version the
    /// receiver is filled before this returns and the cancel handle is a
    /// no-op. Otherwise the watch stays pending until a matching snapshot is
    /// set, the handle is cancelled, or the node is cleared.
    fn create_watch(&self, request: DiscoveryRequest) -> (WatchReceiver, WatchCancel);

    /// Answer `request` from the stored snapshot without registering a watch.
    ///
    /// # Errors
    ///
    /// - [`XdsError::SnapshotNotFound`] when no snapshot is stored
    /// - [`XdsError::NoChange`] when the requested version is current
    fn fetch(&self, request: &DiscoveryRequest) -> XdsResult<Response>;
}

/// Status of a node that has requested at least one watch.
#[derive(Debug, Clone)]
pub struct StatusInfo {
    /// Node as sent on the first watch request, if any.
    pub node: Option<Node>,
    /// Number of watches currently pending.
    pub num_watches: usize,
    /// Time of the most recent watch request.
    pub last_watch_request_time: SystemTime,
}

#[derive(Debug)]
struct WatchStatus {
    node: Option<Node>,
    last_watch_request_time: SystemTime,
}

#[derive(Debug)]
struct NodeEntry<S> {
    snapshot: Option<Arc<S>>,
    status: Option<WatchStatus>,
    watches: FnvHashMap<WatchId, PendingWatch>,
}

impl<S> Default for NodeEntry<S> {
    fn default() -> Self {
        Self {
            snapshot: None,
            status: None,
            watches: FnvHashMap::default(),
        }
    }
}

impl<S> NodeEntry<S> {
    fn touch(&mut self, node: Option<&Node>) {
        let now = SystemTime::now();
        match &mut self.status {
            Some(status) => {
                status.last_watch_request_time = now;
                if status.node.is_none() {
                    status.node = node.cloned();
                }
            }
            None => {
                self.status = Some(WatchStatus {
                    node: node.cloned(),
                    last_watch_request_time: now,
                });
            }
        }
    }
}

#[derive(Debug)]
struct CacheInner<S> {
    ads: bool,
    hasher: Arc<dyn NodeHasher>,
    nodes: DashMap<String, NodeEntry<S>>,
    next_watch_id: AtomicU64,
    stats: CacheStats,
}

impl<S: Snapshot> CacheInner<S> {
    /// In ADS mode a request naming resources is held back while the
    /// snapshot carries resources outside that set.
    fn ads_holds(&self, request: &DiscoveryRequest, resources: Option<&ResourceMap>) -> bool {
        if !self.ads || request.resource_names.is_empty() {
            return false;
        }
        resources
            .map(|r| {
                r.keys()
                    .any(|name| !request.resource_names.iter().any(|n| n == name))
            })
            .unwrap_or(false)
    }

    fn should_respond(&self, snapshot: &S, request: &DiscoveryRequest) -> bool {
        request.version_info != snapshot.get_version(&request.type_url)
            && !self.ads_holds(request, snapshot.get_resources(&request.type_url))
    }

    fn cancel_watch(&self, key: &str, id: WatchId) {
        if let Some(mut entry) = self.nodes.get_mut(key) {
            if entry.watches.remove(&id).is_some() {
                self.stats.record_watch_cancelled();
                trace!(node = %key, watch_id = %id, "cancelled watch");
            }
        }
    }
}

fn collect_resources<S: Snapshot>(snapshot: &S, type_url: &str) -> Vec<BoxResource> {
    let mut resources: Vec<BoxResource> = snapshot
        .get_resources(type_url)
        .map(|items| items.values().cloned().collect())
        .unwrap_or_default();
    resources.sort_by(|a, b| a.name().cmp(b.name()));
    resources
}

/// Concurrent snapshot cache keyed by node.
///
/// Cheap to clone; clones share the same storage.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use xds_cache::{ResourceSnapshot, SnapshotCache};
/// use xds_core::{DiscoveryRequest, Node, TypeUrl};
///
/// let cache = SnapshotCache::new();
/// let (mut receiver, _cancel) = cache.create_watch(
///     DiscoveryRequest::new(TypeUrl::CLUSTER, "").with_node(Node::new("node-1")),
/// );
/// assert!(receiver.try_recv().unwrap().is_none());
///
/// let snapshot = ResourceSnapshot::builder().version("v1").build();
/// cache.set_snapshot("node-1", Arc::new(snapshot)).unwrap();
///
/// let response = receiver.try_recv().unwrap().unwrap();
/// assert_eq!(response.version, "v1");
/// ```
#[derive(Debug)]
pub struct SnapshotCache<S: Snapshot> {
    inner: Arc<CacheInner<S>>,
}

impl<S: Snapshot> Clone for SnapshotCache<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Snapshot> Default for SnapshotCache<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Snapshot> SnapshotCache<S> {
    /// Create a cache with default settings: no ADS hold, keyed by node id.
    pub fn new() -> Self {
        CacheBuilder::new().build()
    }

    /// Get cache statistics.
    #[inline]
    pub fn stats(&self) -> &CacheStats {
        &self.inner.stats
    }

    /// Whether ADS hold mode is enabled.
    #[inline]
    pub fn is_ads(&self) -> bool {
        self.inner.ads
    }

    /// Node key for `node` under this cache's hasher.
    pub fn node_key(&self, node: Option<&Node>) -> String {
        self.inner.hasher.id(node)
    }

    /// Install `snapshot` for `key` and answer every pending watch it
    /// satisfies.
    ///
    /// # Errors
    ///
    /// [`XdsError::InconsistentSnapshot`] if the snapshot is missing a
    /// supported type. The stored state is left untouched in that case.
    pub fn set_snapshot(&self, key: &str, snapshot: Arc<S>) -> XdsResult<()> {
        snapshot.consistent()?;

        let mut entry = self.inner.nodes.entry(key.to_string()).or_default();
        entry.snapshot = Some(Arc::clone(&snapshot));

        let ready: Vec<WatchId> = entry
            .watches
            .iter()
            .filter(|(_, w)| self.inner.should_respond(&snapshot, &w.request))
            .map(|(id, _)| *id)
            .collect();

        let mut delivered = 0u64;
        for id in &ready {
            if let Some(watch) = entry.watches.remove(id) {
                let type_url = watch.request.type_url.clone();
                let version = snapshot.get_version(&type_url).to_string();
                let resources = collect_resources(&*snapshot, &type_url);
                if watch.deliver(version, resources) {
                    delivered += 1;
                }
            }
        }
        let pending = entry.watches.len();
        drop(entry);

        self.inner.stats.record_set();
        self.inner.stats.record_responses(delivered);
        debug!(
            node = %key,
            responded = ready.len(),
            pending,
            "set snapshot"
        );
        Ok(())
    }

    /// Get the snapshot stored for `key`.
    ///
    /// # Errors
    ///
    /// [`XdsError::SnapshotNotFound`] if nothing is stored for `key`.
    pub fn get_snapshot(&self, key: &str) -> XdsResult<Arc<S>> {
        let snapshot = self
            .inner
            .nodes
            .get(key)
            .and_then(|entry| entry.snapshot.clone());
        self.inner.stats.record_lookup(snapshot.is_some());
        snapshot.ok_or_else(|| XdsError::SnapshotNotFound {
            node: key.to_string(),
        })
    }

    /// Check if a snapshot is stored for `key`.
    pub fn has_snapshot(&self, key: &str) -> bool {
        self.inner
            .nodes
            .get(key)
            .map(|entry| entry.snapshot.is_some())
            .unwrap_or(false)
    }

    /// Remove everything stored for `key` and return its snapshot.
    ///
    /// Pending watches for the node are dropped, which closes their
    /// receivers.
    pub fn clear_snapshot(&self, key: &str) -> Option<Arc<S>> {
        let (_, entry) = self.inner.nodes.remove(key)?;
        self.inner.stats.record_clear();
        debug!(node = %key, dropped_watches = entry.watches.len(), "cleared snapshot");
        entry.snapshot
    }

    /// Status of `key`, if it ever requested a watch.
    pub fn get_status_info(&self, key: &str) -> Option<StatusInfo> {
        let entry = self.inner.nodes.get(key)?;
        let status = entry.status.as_ref()?;
        Some(StatusInfo {
            node: status.node.clone(),
            num_watches: entry.watches.len(),
            last_watch_request_time: status.last_watch_request_time,
        })
    }

    /// Keys of every node that has requested a watch.
    pub fn get_status_keys(&self) -> Vec<String> {
        self.inner
            .nodes
            .iter()
            .filter(|entry| entry.status.is_some())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Get the number of stored snapshots.
    pub fn snapshot_count(&self) -> usize {
        self.inner
            .nodes
            .iter()
            .filter(|entry| entry.snapshot.is_some())
            .count()
    }

    /// Get the number of pending watches for `key`.
    pub fn watch_count(&self, key: &str) -> usize {
        self.inner
            .nodes
            .get(key)
            .map(|entry| entry.watches.len())
            .unwrap_or(0)
    }

    /// Get the number of pending watches across all nodes.
    pub fn total_watch_count(&self) -> usize {
        self.inner.nodes.iter().map(|entry| entry.watches.len()).sum()
    }

    /// Register a watch; see [`ConfigWatcher::create_watch`].
    pub fn create_watch(&self, request: DiscoveryRequest) -> (WatchReceiver, WatchCancel) {
        let key = self.inner.hasher.id(request.node.as_ref());
        let id = WatchId::new(self.inner.next_watch_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = tokio::sync::oneshot::channel();
        let receiver = WatchReceiver::new(id, receiver);

        let mut entry = self.inner.nodes.entry(key.clone()).or_default();
        entry.touch(request.node.as_ref());

        if let Some(snapshot) = entry.snapshot.clone() {
            if self.inner.should_respond(&snapshot, &request) {
                drop(entry);
                let version = snapshot.get_version(&request.type_url).to_string();
                let resources = collect_resources(&*snapshot, &request.type_url);
                trace!(
                    node = %key,
                    type_url = %request.type_url,
                    %version,
                    "responding to watch immediately"
                );
                if PendingWatch::new(request, sender).deliver(version, resources) {
                    self.inner.stats.record_responses(1);
                }
                return (receiver, WatchCancel::noop());
            }
        }

        trace!(
            node = %key,
            watch_id = %id,
            type_url = %request.type_url,
            version = %request.version_info,
            "registered watch"
        );
        entry.watches.insert(id, PendingWatch::new(request, sender));
        drop(entry);
        self.inner.stats.record_watch_created();

        let inner: Weak<CacheInner<S>> = Arc::downgrade(&self.inner);
        let cancel = WatchCancel::new(id, move || {
            if let Some(inner) = inner.upgrade() {
                inner.cancel_watch(&key, id);
            }
        });
        (receiver, cancel)
    }

    /// Answer a request directly; see [`ConfigWatcher::fetch`].
    pub fn fetch(&self, request: &DiscoveryRequest) -> XdsResult<Response> {
        let key = self.inner.hasher.id(request.node.as_ref());
        let snapshot = self.get_snapshot(&key)?;

        let version = snapshot.get_version(&request.type_url);
        if request.version_info == version {
            return Err(XdsError::NoChange {
                type_url: request.type_url.clone(),
                version: version.to_string(),
            });
        }

        Ok(Response {
            request: request.clone(),
            version: version.to_string(),
            resources: collect_resources(&*snapshot, &request.type_url),
        })
    }

    /// Long-poll variant of [`fetch`](Self::fetch).
    ///
    /// Waits up to `timeout` for a response. On expiry the watch is
    /// cancelled and [`XdsError::NoChange`] is returned; if the node is
    /// cleared while waiting the result is [`XdsError::SnapshotNotFound`].
    pub async fn fetch_blocking(
        &self,
        request: &DiscoveryRequest,
        timeout: Duration,
    ) -> XdsResult<Response> {
        let (receiver, cancel) = self.create_watch(request.clone());
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(XdsError::SnapshotNotFound {
                node: self.inner.hasher.id(request.node.as_ref()),
            }),
            Err(_) => {
                cancel.cancel();
                Err(XdsError::NoChange {
                    type_url: request.type_url.clone(),
                    version: request.version_info.clone(),
                })
            }
        }
    }
}

impl<S: Snapshot> ConfigWatcher for SnapshotCache<S> {
    fn create_watch(&self, request: DiscoveryRequest) -> (WatchReceiver, WatchCancel) {
        SnapshotCache::create_watch(self, request)
    }

    fn fetch(&self, request: &DiscoveryRequest) -> XdsResult<Response> {
        SnapshotCache::fetch(self, request)
    }
}

/// Builder for creating a configured cache.
#[derive(Debug, Default)]
pub struct CacheBuilder {
    ads: bool,
    hasher: Option<Arc<dyn NodeHasher>>,
    capacity: Option<usize>,
}

impl CacheBuilder {
    /// Create a new cache builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable ADS hold mode.
    ///
    /// A watch naming resources is held while the snapshot carries
    /// resources it did not name. Held watches stay registered rather than
    /// being dropped, and fire on the first later snapshot that satisfies
    /// them.
    pub fn ads(mut self, ads: bool) -> Self {
        self.ads = ads;
        self
    }

    /// Set the node hasher (default: [`IdHash`]).
    pub fn hasher(mut self, hasher: Arc<dyn NodeHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Set the initial capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Build the cache.
    pub fn build<S: Snapshot>(self) -> SnapshotCache<S> {
        SnapshotCache {
            inner: Arc::new(CacheInner {
                ads: self.ads,
                hasher: self.hasher.unwrap_or_else(|| Arc::new(IdHash)),
                nodes: DashMap::with_capacity(self.capacity.unwrap_or(64)),
                next_watch_id: AtomicU64::new(1),
                stats: CacheStats::new(),
            }),
        }
    }
}
