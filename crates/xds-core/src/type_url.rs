//! Resource type identifiers.
//!
//! Snapshots are keyed by resource type. For xDS the identifier is the
//! protobuf type URL; KDS uses short kind names such as `Mesh`. Both are
//! carried by [`TypeUrl`].

use std::borrow::Borrow;
use std::fmt;

/// Resource type identifier.
///
/// Implements `Borrow<str>` so maps keyed by `TypeUrl` can be queried with
/// a plain `&str`.
///
/// # Example
///
/// ```rust
/// use xds_core::TypeUrl;
///
/// let cluster_type = TypeUrl::new(TypeUrl::CLUSTER);
/// assert_eq!(cluster_type.short_name(), "Cluster");
/// assert_eq!(TypeUrl::new("Mesh").short_name(), "Mesh");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeUrl(String);

impl TypeUrl {
    /// Type URL for Cluster (CDS).
    pub const CLUSTER: &'static str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";

    /// Type URL for ClusterLoadAssignment (EDS).
    pub const ENDPOINT: &'static str =
        "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";

    /// Type URL for Listener (LDS).
    pub const LISTENER: &'static str = "type.googleapis.com/envoy.config.listener.v3.Listener";

    /// Type URL for RouteConfiguration (RDS).
    pub const ROUTE: &'static str =
        "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";

    /// Type URL for Secret (SDS).
    pub const SECRET: &'static str =
        "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret";

    /// Type URL for Runtime (RTDS).
    pub const RUNTIME: &'static str = "type.googleapis.com/envoy.service.runtime.v3.Runtime";

    /// The types every xDS snapshot carries by default.
    pub const XDS_TYPES: [&'static str; 6] = [
        Self::ENDPOINT,
        Self::CLUSTER,
        Self::ROUTE,
        Self::LISTENER,
        Self::SECRET,
        Self::RUNTIME,
    ];

    /// Create a new type URL from a string.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Owned list of [`TypeUrl::XDS_TYPES`].
    #[must_use]
    pub fn xds_types() -> Vec<TypeUrl> {
        Self::XDS_TYPES.iter().map(|t| TypeUrl::new(*t)).collect()
    }

    /// Get the type URL as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the short name from the type URL.
    ///
    /// For example, `type.googleapis.com/envoy.config.cluster.v3.Cluster`
    /// returns `Cluster`. Identifiers without a path are returned as-is.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.0.rsplit('/').next().and_then(|s| s.rsplit('.').next()).unwrap_or(&self.0)
    }
}

impl fmt::Display for TypeUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TypeUrl {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TypeUrl {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<TypeUrl> for String {
    fn from(t: TypeUrl) -> Self {
        t.0
    }
}

impl AsRef<str> for TypeUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TypeUrl {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_type_url_creation() {
        let t = TypeUrl::new(TypeUrl::CLUSTER);
        assert_eq!(t.as_str(), TypeUrl::CLUSTER);
    }

    #[test]
    fn test_short_name() {
        let t = TypeUrl::new(TypeUrl::CLUSTER);
        assert_eq!(t.short_name(), "Cluster");

        let t = TypeUrl::new(TypeUrl::ENDPOINT);
        assert_eq!(t.short_name(), "ClusterLoadAssignment");

        let t = TypeUrl::new("TrafficRoute");
        assert_eq!(t.short_name(), "TrafficRoute");
    }

    #[test]
    fn test_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(TypeUrl::new(TypeUrl::ROUTE), 1);
        assert_eq!(map.get(TypeUrl::ROUTE), Some(&1));
    }

    #[test]
    fn test_xds_types() {
        let types = TypeUrl::xds_types();
        assert_eq!(types.len(), 6);
        assert!(types.contains(&TypeUrl::new(TypeUrl::SECRET)));
    }
}
