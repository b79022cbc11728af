//! Snapshot: immutable, per-type versioned collection of resources.
//!
//! A snapshot represents one consistent desired state for a node. Snapshots are:
//!
//! - **Immutable**: once handed to the cache a snapshot is only read
//! - **Versioned per type**: each resource type carries its own version
//! - **Structurally shared**: [`Snapshot::with_version`] reuses every
//!   untouched per-type entry instead of copying it
//!
//! [`ResourceSnapshot`] is the xDS implementation. The KDS implementation
//! lives in [`crate::kds`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use xds_core::{BoxResource, TypeUrl, XdsError, XdsResult};

/// Resources of one type, keyed by name.
pub type ResourceMap = HashMap<String, BoxResource>;

/// Compare two resource maps by content.
///
/// Equal iff both hold the same names and every pair of values is
/// structurally equal. Cardinality is checked first.
pub fn resources_equal(a: &ResourceMap, b: &ResourceMap) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|(name, resource)| {
        b.get(name)
            .map(|other| Arc::ptr_eq(resource, other) || resource.equals(other.as_ref()))
            .unwrap_or(false)
    })
}

/// Resources for a specific type within a snapshot.
///
/// The item map sits behind an `Arc`, so re-versioning an entry never
/// copies its resources.
#[derive(Debug, Clone, Default)]
pub struct SnapshotResources {
    /// Version string for this resource type.
    version: String,
    /// Resources keyed by name.
    items: Arc<ResourceMap>,
}

impl SnapshotResources {
    /// Create a resource collection from an already-indexed map.
    pub fn new(version: impl Into<String>, items: ResourceMap) -> Self {
        Self {
            version: version.into(),
            items: Arc::new(items),
        }
    }

    /// Create an empty resource collection.
    pub fn empty(version: impl Into<String>) -> Self {
        Self::new(version, ResourceMap::new())
    }

    /// Index `resources` by [`xds_core::Resource::name`]; later duplicates win.
    pub fn from_resources(
        version: impl Into<String>,
        resources: impl IntoIterator<Item = BoxResource>,
    ) -> Self {
        let items = resources
            .into_iter()
            .map(|r| (r.name().to_string(), r))
            .collect();
        Self::new(version, items)
    }

    /// Same items under a different version.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            items: Arc::clone(&self.items),
        }
    }

    /// Get the version for this resource type.
    #[inline]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The indexed resources.
    #[inline]
    pub fn items(&self) -> &ResourceMap {
        &self.items
    }

    /// Get the number of resources.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if there are no resources.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get a resource by name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&BoxResource> {
        self.items.get(name)
    }

    /// Whether both collections point at the same item map.
    #[inline]
    pub fn shares_items_with(&self, other: &SnapshotResources) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }
}

impl PartialEq for SnapshotResources {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && (self.shares_items_with(other) || resources_equal(&self.items, &other.items))
    }
}

/// Behaviour shared by every snapshot flavour.
pub trait Snapshot: Send + Sync + fmt::Debug + 'static {
    /// Types this snapshot is expected to carry.
    fn supported_types(&self) -> &[TypeUrl];

    /// Resources of `type_url`.
    ///
    /// `None` for types this snapshot does not carry; an empty map for
    /// carried types without data.
    fn get_resources(&self, type_url: &str) -> Option<&ResourceMap>;

    /// Version of `type_url`, or `""` when unset.
    fn get_version(&self, type_url: &str) -> &str;

    /// Snapshot with `type_url` re-versioned.
    ///
    /// Returns the same `Arc` when the version is unchanged. Otherwise the
    /// result shares every other per-type entry with `self`.
    fn with_version(self: &Arc<Self>, type_url: &str, version: &str) -> Arc<Self>;

    /// Check that every supported type has an entry.
    fn consistent(&self) -> XdsResult<()> {
        let missing: Vec<&str> = self
            .supported_types()
            .iter()
            .map(TypeUrl::as_str)
            .filter(|t| self.get_resources(t).is_none())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(XdsError::inconsistent(format!(
                "missing resource types {missing:?}"
            )))
        }
    }
}

/// Snapshot accessors that tolerate an absent snapshot.
///
/// `None.consistent()` fails with [`XdsError::InconsistentSnapshot`]; the
/// other accessors return `None`, `""` and `None`.
pub trait MaybeSnapshot<S: Snapshot> {
    /// See [`Snapshot::consistent`].
    fn consistent(&self) -> XdsResult<()>;
    /// See [`Snapshot::get_resources`].
    fn get_resources(&self, type_url: &str) -> Option<&ResourceMap>;
    /// See [`Snapshot::get_version`].
    fn get_version(&self, type_url: &str) -> &str;
    /// See [`Snapshot::with_version`].
    fn with_version(&self, type_url: &str, version: &str) -> Option<Arc<S>>;
}

impl<S: Snapshot> MaybeSnapshot<S> for Option<Arc<S>> {
    fn consistent(&self) -> XdsResult<()> {
        match self {
            Some(s) => s.consistent(),
            None => Err(XdsError::inconsistent("snapshot is nil")),
        }
    }

    fn get_resources(&self, type_url: &str) -> Option<&ResourceMap> {
        self.as_ref().and_then(|s| s.get_resources(type_url))
    }

    fn get_version(&self, type_url: &str) -> &str {
        self.as_ref().map(|s| s.get_version(type_url)).unwrap_or("")
    }

    fn with_version(&self, type_url: &str, version: &str) -> Option<Arc<S>> {
        self.as_ref().map(|s| s.with_version(type_url, version))
    }
}

/// An immutable snapshot of xDS resources for a node.
#[derive(Debug, Clone)]
pub struct ResourceSnapshot {
    /// Types the snapshot must carry.
    supported: Arc<Vec<TypeUrl>>,
    /// Resources grouped by type URL.
    resources: HashMap<TypeUrl, Arc<SnapshotResources>>,
    /// Creation timestamp.
    created_at: Instant,
}

impl ResourceSnapshot {
    /// Create a new snapshot builder.
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new()
    }

    /// Assemble a snapshot without filling in missing types.
    ///
    /// The result fails [`Snapshot::consistent`] if a supported type has
    /// no entry.
    pub fn from_parts(
        supported: Vec<TypeUrl>,
        resources: HashMap<TypeUrl, SnapshotResources>,
    ) -> Self {
        Self {
            supported: Arc::new(supported),
            resources: resources
                .into_iter()
                .map(|(t, r)| (t, Arc::new(r)))
                .collect(),
            created_at: Instant::now(),
        }
    }

    /// Get the creation timestamp.
    #[inline]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// The per-type entry for `type_url`.
    #[inline]
    pub fn entry(&self, type_url: &str) -> Option<&Arc<SnapshotResources>> {
        self.resources.get(type_url)
    }

    /// Check if this snapshot contains a specific resource type.
    #[inline]
    pub fn contains_type(&self, type_url: &str) -> bool {
        self.resources.contains_key(type_url)
    }

    /// Get all type URLs present in this snapshot.
    pub fn type_urls(&self) -> impl Iterator<Item = &TypeUrl> {
        self.resources.keys()
    }

    /// Get the total number of resources across all types.
    pub fn total_resources(&self) -> usize {
        self.resources.values().map(|r| r.len()).sum()
    }

    /// Check if this snapshot has no resources.
    pub fn is_empty(&self) -> bool {
        self.resources.values().all(|r| r.is_empty())
    }
}

impl Snapshot for ResourceSnapshot {
    fn supported_types(&self) -> &[TypeUrl] {
        &self.supported
    }

    fn get_resources(&self, type_url: &str) -> Option<&ResourceMap> {
        self.resources.get(type_url).map(|r| r.items())
    }

    fn get_version(&self, type_url: &str) -> &str {
        self.resources
            .get(type_url)
            .map(|r| r.version())
            .unwrap_or("")
    }

    fn with_version(self: &Arc<Self>, type_url: &str, version: &str) -> Arc<Self> {
        let Some(current) = self.resources.get(type_url) else {
            return Arc::clone(self);
        };
        if current.version() == version {
            return Arc::clone(self);
        }
        let mut resources = self.resources.clone();
        resources.insert(
            TypeUrl::new(type_url),
            Arc::new(current.with_version(version)),
        );
        Arc::new(Self {
            supported: Arc::clone(&self.supported),
            resources,
            created_at: self.created_at,
        })
    }
}

impl PartialEq for ResourceSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.supported == other.supported
            && self.resources.len() == other.resources.len()
            && self
                .resources
                .iter()
                .all(|(t, r)| other.resources.get(t).map(|o| r == o).unwrap_or(false))
    }
}

/// Builder for creating snapshots.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    version: String,
    supported: Option<Vec<TypeUrl>>,
    resources: HashMap<TypeUrl, SnapshotResources>,
}

impl SnapshotBuilder {
    /// Create a new snapshot builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default version for every type added without an explicit one.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Override the supported types (default: [`TypeUrl::XDS_TYPES`]).
    pub fn supported_types(mut self, types: impl IntoIterator<Item = TypeUrl>) -> Self {
        self.supported = Some(types.into_iter().collect());
        self
    }

    /// Add resources of a specific type.
    ///
    /// The version for this resource type defaults to the builder version.
    pub fn resources(
        self,
        type_url: TypeUrl,
        resources: impl IntoIterator<Item = BoxResource>,
    ) -> Self {
        let version = self.version.clone();
        self.resources_with_version(type_url, version, resources)
    }

    /// Add resources of a specific type with a custom version.
    pub fn resources_with_version(
        mut self,
        type_url: TypeUrl,
        version: impl Into<String>,
        resources: impl IntoIterator<Item = BoxResource>,
    ) -> Self {
        self.resources
            .insert(type_url, SnapshotResources::from_resources(version, resources));
        self
    }

    /// Add a single resource.
    pub fn resource(mut self, type_url: TypeUrl, resource: BoxResource) -> Self {
        let entry = self
            .resources
            .entry(type_url)
            .or_insert_with(|| SnapshotResources::empty(self.version.clone()));
        let mut items = entry.items().clone();
        items.insert(resource.name().to_string(), resource);
        *entry = SnapshotResources::new(entry.version().to_string(), items);
        self
    }

    /// Build the snapshot.
    ///
    /// Supported types without resources get an empty entry at the builder
    /// version; types added outside the supported set extend it.
    pub fn build(self) -> ResourceSnapshot {
        let mut supported = self.supported.unwrap_or_else(TypeUrl::xds_types);
        let mut resources = self.resources;

        let mut extra: Vec<TypeUrl> = resources
            .keys()
            .filter(|t| !supported.contains(t))
            .cloned()
            .collect();
        extra.sort();
        supported.extend(extra);

        for type_url in &supported {
            resources
                .entry(type_url.clone())
                .or_insert_with(|| SnapshotResources::empty(self.version.clone()));
        }

        ResourceSnapshot::from_parts(supported, resources)
    }
}
