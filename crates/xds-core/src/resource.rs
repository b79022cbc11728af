//! Resource trait for distributed configuration objects.
//!
//! This module provides the [`Resource`] trait through which the
//! config-generation collaborators hand objects to the cache, and
//! [`AnyResource`], a resource backed by an already-encoded protobuf `Any`.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Trait for distributable resources.
///
/// The cache never looks inside a resource: it only needs its name, a way
/// to encode it for the wire, and structural equality for versioning.
///
/// # Example
///
/// ```rust
/// use xds_core::{Resource, TypeUrl};
/// use prost_types::Any;
/// use std::any::Any as StdAny;
///
/// #[derive(Debug)]
/// struct MyCluster {
///     name: String,
/// }
///
/// impl Resource for MyCluster {
///     fn type_url(&self) -> &str {
///         TypeUrl::CLUSTER
///     }
///
///     fn name(&self) -> &str {
///         &self.name
///     }
///
///     fn encode(&self) -> Result<Any, Box<dyn std::error::Error + Send + Sync>> {
///         Ok(Any {
///             type_url: self.type_url().to_string(),
///             value: self.name.as_bytes().to_vec(),
///         })
///     }
///
///     fn as_any(&self) -> &dyn StdAny {
///         self
///     }
/// }
/// ```
pub trait Resource: Send + Sync + fmt::Debug {
    /// Get the type URL for this resource.
    fn type_url(&self) -> &str;

    /// Get the resource name.
    fn name(&self) -> &str;

    /// Encode the resource to a protobuf Any message.
    fn encode(&self) -> Result<prost_types::Any, Box<dyn std::error::Error + Send + Sync>>;

    /// Structural equality with another resource.
    ///
    /// The default compares type URLs and the encoded bytes, which equals
    /// proto equality for deterministic encoders. Resources that fail to
    /// encode are never equal.
    fn equals(&self, other: &dyn Resource) -> bool {
        if self.type_url() != other.type_url() {
            return false;
        }
        match (self.encode(), other.encode()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Convert to Any for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Type alias for a shared resource.
/// Uses Arc for efficient cloning and sharing across snapshots.
pub type BoxResource = Arc<dyn Resource>;

/// A wrapped Any message that implements Resource.
///
/// This allows storing raw protobuf Any messages as resources
/// without needing to decode them.
#[derive(Debug, Clone, PartialEq)]
pub struct AnyResource {
    name: String,
    any: prost_types::Any,
}

impl AnyResource {
    /// Create a new AnyResource.
    #[must_use]
    pub fn new(name: impl Into<String>, any: prost_types::Any) -> Self {
        Self {
            name: name.into(),
            any,
        }
    }

    /// Create a resource of `type_url` from raw encoded bytes.
    #[must_use]
    pub fn from_bytes(
        type_url: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(
            name,
            prost_types::Any {
                type_url: type_url.into(),
                value: value.into(),
            },
        )
    }

    /// Wrap into a shared [`BoxResource`].
    #[must_use]
    pub fn boxed(self) -> BoxResource {
        Arc::new(self)
    }

    /// Get the inner Any message.
    #[must_use]
    pub fn inner(&self) -> &prost_types::Any {
        &self.any
    }
}

impl Resource for AnyResource {
    fn type_url(&self) -> &str {
        &self.any.type_url
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self) -> Result<prost_types::Any, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.any.clone())
    }

    fn equals(&self, other: &dyn Resource) -> bool {
        match other.as_any().downcast_ref::<AnyResource>() {
            Some(other) => self == other,
            None => self.type_url() == other.type_url()
                && other.encode().map(|a| a == self.any).unwrap_or(false),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
