//! Cross-zone (KDS) snapshots.
//!
//! Control-plane instances replicate a bounded set of resource kinds to
//! each other. A [`KdsSnapshot`] carries those kinds, all stamped with one
//! version at build time, and re-versions individual kinds by copying only
//! the top-level kind map.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use xds_core::{BoxResource, Resource, TypeUrl};

use crate::snapshot::{ResourceMap, Snapshot, SnapshotResources};

/// Resource kinds replicated between zones by default.
pub const KDS_TYPES: [&str; 16] = [
    "Mesh",
    "ZoneIngress",
    "ZoneEgress",
    "Dataplane",
    "CircuitBreaker",
    "FaultInjection",
    "HealthCheck",
    "MeshGateway",
    "ProxyTemplate",
    "RateLimit",
    "Retry",
    "Timeout",
    "TrafficLog",
    "TrafficPermission",
    "TrafficRoute",
    "TrafficTrace",
];

/// Identity of a replicated resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KdsMeta {
    /// Resource name.
    pub name: String,
    /// Owning mesh; empty for global-scoped resources.
    pub mesh: String,
}

impl KdsMeta {
    /// Meta for a resource scoped to `mesh`.
    pub fn new(name: impl Into<String>, mesh: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mesh: mesh.into(),
        }
    }

    /// Meta for a global-scoped resource.
    pub fn global(name: impl Into<String>) -> Self {
        Self::new(name, "")
    }

    /// Name the resource is indexed under: `name.mesh`, or `name` when
    /// the resource has no mesh.
    pub fn key(&self) -> String {
        if self.mesh.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.mesh)
        }
    }
}

/// A replicated resource: kind, identity and encoded spec.
#[derive(Debug, Clone, PartialEq)]
pub struct KdsResource {
    kind: TypeUrl,
    meta: KdsMeta,
    key: String,
    spec: prost_types::Any,
}

impl KdsResource {
    /// Create a resource of `kind`.
    pub fn new(kind: impl Into<TypeUrl>, meta: KdsMeta, spec: prost_types::Any) -> Self {
        let key = meta.key();
        Self {
            kind: kind.into(),
            meta,
            key,
            spec,
        }
    }

    /// Get the resource identity.
    #[inline]
    pub fn meta(&self) -> &KdsMeta {
        &self.meta
    }

    /// Get the encoded spec.
    #[inline]
    pub fn spec(&self) -> &prost_types::Any {
        &self.spec
    }

    /// Wrap into a shared [`BoxResource`].
    pub fn boxed(self) -> BoxResource {
        Arc::new(self)
    }
}

impl Resource for KdsResource {
    fn type_url(&self) -> &str {
        self.kind.as_str()
    }

    fn name(&self) -> &str {
        &self.key
    }

    fn encode(&self) -> Result<prost_types::Any, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.spec.clone())
    }

    fn equals(&self, other: &dyn Resource) -> bool {
        other
            .as_any()
            .downcast_ref::<KdsResource>()
            .map(|other| self == other)
            .unwrap_or(false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Index resources by their declared name. Later duplicates win.
pub fn index_resources_by_name(resources: impl IntoIterator<Item = KdsResource>) -> ResourceMap {
    resources
        .into_iter()
        .map(|r| (r.key.clone(), r.boxed()))
        .collect()
}

/// Snapshot of replicated resources.
#[derive(Debug, Clone)]
pub struct KdsSnapshot {
    supported: Arc<Vec<TypeUrl>>,
    resources: HashMap<TypeUrl, Arc<SnapshotResources>>,
}

impl KdsSnapshot {
    /// The per-kind entry for `type_url`.
    #[inline]
    pub fn entry(&self, type_url: &str) -> Option<&Arc<SnapshotResources>> {
        self.resources.get(type_url)
    }
}

impl Snapshot for KdsSnapshot {
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
        match self.resources.get(type_url) {
            Some(current) if current.version() != version => {
                let mut resources = self.resources.clone();
                resources.insert(
                    TypeUrl::new(type_url),
                    Arc::new(current.with_version(version)),
                );
                Arc::new(Self {
                    supported: Arc::clone(&self.supported),
                    resources,
                })
            }
            _ => Arc::clone(self),
        }
    }
}

/// Accumulating builder for [`KdsSnapshot`].
///
/// # Example
///
/// ```rust
/// use xds_cache::{KdsMeta, KdsResource, KdsSnapshotBuilder, Snapshot};
///
/// let mesh = KdsResource::new("Mesh", KdsMeta::new("mesh1", "mesh1"), Default::default());
/// let snapshot = KdsSnapshotBuilder::new().with("Mesh", [mesh]).build("v1");
///
/// assert!(snapshot.get_resources("Mesh").unwrap().contains_key("mesh1.mesh1"));
/// assert_eq!(snapshot.get_version("Mesh"), "v1");
/// assert!(snapshot.get_resources("UnsupportedType").is_none());
/// ```
#[derive(Debug)]
pub struct KdsSnapshotBuilder {
    supported: Vec<TypeUrl>,
    resources: HashMap<TypeUrl, Vec<KdsResource>>,
}

impl Default for KdsSnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KdsSnapshotBuilder {
    /// Builder supporting [`KDS_TYPES`].
    pub fn new() -> Self {
        Self::with_supported_types(KDS_TYPES.iter().map(|t| TypeUrl::new(*t)))
    }

    /// Builder supporting exactly `types`.
    pub fn with_supported_types(types: impl IntoIterator<Item = TypeUrl>) -> Self {
        Self {
            supported: types.into_iter().collect(),
            resources: HashMap::new(),
        }
    }

    /// Add resources of `type_url`.
    pub fn with(
        mut self,
        type_url: impl Into<TypeUrl>,
        resources: impl IntoIterator<Item = KdsResource>,
    ) -> Self {
        self.resources
            .entry(type_url.into())
            .or_default()
            .extend(resources);
        self
    }

    /// Build the snapshot with every supported kind at `version`.
    ///
    /// Kinds that are not supported are dropped.
    pub fn build(mut self, version: &str) -> KdsSnapshot {
        let mut resources = HashMap::with_capacity(self.supported.len());
        for type_url in &self.supported {
            let items = self.resources.remove(type_url).unwrap_or_default();
            resources.insert(
                type_url.clone(),
                Arc::new(SnapshotResources::new(version, index_resources_by_name(items))),
            );
        }

        for (type_url, dropped) in &self.resources {
            debug!(type_url = %type_url, count = dropped.len(), "dropping unsupported kds resources");
        }

        KdsSnapshot {
            supported: Arc::new(self.supported),
            resources,
        }
    }
}
