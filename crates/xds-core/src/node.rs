//! Node identity and node-key extraction.
//!
//! The cache groups snapshots and watches by an opaque string key derived
//! from the requesting node. [`NodeHasher`] is the pluggable extraction
//! function; [`IdHash`] is the default and uses the node ID.

use std::collections::BTreeMap;
use std::fmt;

/// Identity a client declares on its discovery requests.
///
/// Only the first request on a stream is required to carry it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Node {
    /// Node identifier.
    pub id: String,
    /// Cluster the node belongs to.
    pub cluster: String,
    /// Free-form metadata (e.g. proxy type, zone).
    pub metadata: BTreeMap<String, String>,
}

impl Node {
    /// Create a node with only an ID set.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set the cluster.
    #[must_use]
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cluster.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{}/{}", self.cluster, self.id)
        }
    }
}

/// Computes the cache key for a node.
///
/// Implementations must be pure: the same node always maps to the same key.
pub trait NodeHasher: Send + Sync + fmt::Debug {
    /// Key for `node`; `None` means the request carried no identity.
    fn id(&self, node: Option<&Node>) -> String;
}

/// Uses the node ID as the key.
///
/// Requests without a node all share the empty key, and therefore one
/// snapshot.
///
/// # Example
///
/// ```rust
/// use xds_core::{IdHash, Node, NodeHasher};
///
/// assert_eq!(IdHash.id(Some(&Node::new("edge-1"))), "edge-1");
/// assert_eq!(IdHash.id(None), "");
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct IdHash;

impl NodeHasher for IdHash {
    fn id(&self, node: Option<&Node>) -> String {
        node.map(|n| n.id.clone()).unwrap_or_default()
    }
}
