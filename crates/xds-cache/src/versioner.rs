//! Automatic per-type versioning of snapshots.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::snapshot::{resources_equal, Snapshot};

type VersionGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Fills in missing per-type versions on a freshly built snapshot.
///
/// For each supported type without a version:
/// - if the resources equal those of the previous snapshot, the previous
///   version is reused
/// - otherwise a fresh version is taken from the generator
///
/// Types that already carry a version are left alone.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use xds_cache::{ResourceSnapshot, Snapshot, SnapshotAutoVersioner};
/// use xds_core::TypeUrl;
///
/// let versioner = SnapshotAutoVersioner::new();
/// let first = versioner
///     .version(Some(Arc::new(ResourceSnapshot::builder().build())), None)
///     .unwrap();
/// assert!(!first.get_version(TypeUrl::CLUSTER).is_empty());
///
/// // Same content keeps the same version.
/// let second = versioner
///     .version(Some(Arc::new(ResourceSnapshot::builder().build())), Some(&first))
///     .unwrap();
/// assert_eq!(
///     first.get_version(TypeUrl::CLUSTER),
///     second.get_version(TypeUrl::CLUSTER)
/// );
/// ```
#[derive(Clone)]
pub struct SnapshotAutoVersioner {
    generator: VersionGenerator,
}

impl Default for SnapshotAutoVersioner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SnapshotAutoVersioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotAutoVersioner").finish_non_exhaustive()
    }
}

impl SnapshotAutoVersioner {
    /// Versioner that generates random UUID v4 versions.
    pub fn new() -> Self {
        Self::with_generator(|| uuid::Uuid::new_v4().to_string())
    }

    /// Versioner with a custom version generator.
    pub fn with_generator(generator: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self {
            generator: Arc::new(generator),
        }
    }

    /// Version `new` against `old`.
    ///
    /// Returns `None` when `new` is `None`. Pure apart from the generator
    /// calls; neither input is modified.
    pub fn version<S: Snapshot>(&self, new: Option<Arc<S>>, old: Option<&Arc<S>>) -> Option<Arc<S>> {
        let mut snapshot = new?;
        let types = snapshot.supported_types().to_vec();

        for type_url in &types {
            let type_url = type_url.as_str();
            if !snapshot.get_version(type_url).is_empty() {
                continue;
            }

            let mut version = String::new();
            if let Some(old) = old {
                if self.same_resources(&*snapshot, &**old, type_url) {
                    version = old.get_version(type_url).to_string();
                }
            }
            if version.is_empty() {
                version = (self.generator)();
                trace!(type_url, %version, "generated new version");
            }

            snapshot = snapshot.with_version(type_url, &version);
        }

        Some(snapshot)
    }

    fn same_resources<S: Snapshot>(&self, new: &S, old: &S, type_url: &str) -> bool {
        match (new.get_resources(type_url), old.get_resources(type_url)) {
            (Some(a), Some(b)) => resources_equal(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}
