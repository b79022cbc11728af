//! # xds-cache
//!
//! Snapshot storage and change notification for the distribution engine.
//!
//! This crate provides:
//!
//! - [`Snapshot`] - Per-type versioned resource sets, with [`ResourceSnapshot`]
//!   for xDS and [`KdsSnapshot`] for cross-zone replication
//! - [`SnapshotAutoVersioner`] - Content-based version assignment
//! - [`SnapshotCache`] - Concurrent per-node cache with single-shot watches
//! - [`CacheStats`] - Operation counters
//!
//! ## Key Design Decisions
//!
//! - Uses `DashMap` for concurrent access; a node's snapshot and its watches
//!   share one entry so checks and registrations are atomic
//! - Snapshots are immutable and shared through `Arc`; re-versioning shares
//!   every untouched per-type entry
//! - Watch delivery is a non-blocking `oneshot` send
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use xds_cache::{ResourceSnapshot, SnapshotAutoVersioner, SnapshotCache};
//! use xds_core::{DiscoveryRequest, Node, TypeUrl};
//!
//! let cache = SnapshotCache::new();
//! let versioner = SnapshotAutoVersioner::new();
//!
//! let snapshot = versioner
//!     .version(Some(Arc::new(ResourceSnapshot::builder().build())), None)
//!     .unwrap();
//! cache.set_snapshot("node-1", snapshot).unwrap();
//!
//! let request = DiscoveryRequest::new(TypeUrl::CLUSTER, "").with_node(Node::new("node-1"));
//! let response = cache.fetch(&request).unwrap();
//! assert!(response.resources.is_empty());
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod kds;
mod snapshot;
mod stats;
mod versioner;
mod watch;

pub use cache::{CacheBuilder, ConfigWatcher, SnapshotCache, StatusInfo};
pub use kds::{index_resources_by_name, KdsMeta, KdsResource, KdsSnapshot, KdsSnapshotBuilder, KDS_TYPES};
pub use snapshot::{
    resources_equal, MaybeSnapshot, ResourceMap, ResourceSnapshot, Snapshot, SnapshotBuilder,
    SnapshotResources,
};
pub use stats::CacheStats;
pub use versioner::SnapshotAutoVersioner;
pub use watch::{Response, WatchCancel, WatchId, WatchReceiver};
