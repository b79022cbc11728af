//! # meshcp-xds
//!
//! Snapshot distribution engine for service-mesh control planes.
//!
//! Control planes compute a versioned [`Snapshot`](prelude::Snapshot) of
//! configuration per data-plane node; this library stores it, answers
//! long-poll watches when it changes, and runs every stream event through a
//! pipeline of callbacks for statistics, watchdogs and identity stamping.
//! Both Envoy xDS resources and cross-zone (KDS) resources are supported.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use meshcp_xds::prelude::*;
//!
//! let cache = SnapshotCache::new();
//! let snapshot = ResourceSnapshot::builder().version("v1").build();
//! cache.set_snapshot("node-1", Arc::new(snapshot)).unwrap();
//!
//! let request = DiscoveryRequest::new(TypeUrl::CLUSTER, "").with_node(Node::new("node-1"));
//! let response = cache.fetch(&request).unwrap();
//! assert_eq!(response.version, "v1");
//! ```
//!
//! ## Architecture
//!
//! - `xds-core` - error taxonomy, type URLs, resources, nodes and discovery messages
//! - `xds-cache` - snapshots, the auto-versioner, the snapshot cache and KDS snapshots
//! - `xds-server` - callbacks, stream processing, reconciliation and configuration
//!
//! This crate re-exports all public APIs for convenience.
//!
//! ## Design Principles
//!
//! 1. **No panics in library code** - All errors are returned as `Result`
//! 2. **No locks held across await points** - node entries live in a DashMap
//!    and watches are answered through oneshot channels
//! 3. **Shared, immutable snapshots** - snapshots are `Arc`ed and re-versioning
//!    shares every untouched resource set

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use xds_cache as cache;
pub use xds_core as core;
pub use xds_server as server;

/// Prelude module for convenient imports.
///
/// ```rust
/// use meshcp_xds::prelude::*;
/// ```
pub mod prelude {
    pub use xds_core::{
        AnyResource, BoxResource, Confirmation, DiscoveryRequest, DiscoveryResponse, Node,
        NodeHasher, Resource, RpcStatus, TypeUrl, XdsError, XdsResult,
    };

    pub use xds_cache::{
        CacheBuilder, ConfigWatcher, KdsMeta, KdsResource, KdsSnapshot, KdsSnapshotBuilder,
        MaybeSnapshot, ResourceSnapshot, Snapshot, SnapshotAutoVersioner, SnapshotCache,
        WatchCancel, WatchReceiver,
    };

    pub use xds_server::{
        Callbacks, CallbacksChain, ServerConfig, SnapshotGenerator, SnapshotReconciler,
        StatsCallbacks, StatusAccessor, StatusTrackerCallbacks, StreamId, StreamProcessor,
        XdsServer, XdsServerBuilder,
    };
}

/// Version information for this crate.
pub mod version {
    /// Crate version.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Minimum supported Rust version.
    pub const MSRV: &str = "1.75";

    /// Get version info as a string.
    pub fn version_string() -> String {
        format!("meshcp-xds {} (MSRV {})", VERSION, MSRV)
    }
}
