//! # xds-core
//!
//! Core types, traits, and error handling for the snapshot distribution engine.
//!
//! This crate provides the foundational types used across all other crates:
//!
//! - [`XdsError`] - Error taxonomy with gRPC status code mapping
//! - [`Node`] / [`NodeHasher`] - Client identity and node-key extraction
//! - [`Resource`] - Trait for distributable configuration objects
//! - [`TypeUrl`] - Resource type identifiers
//! - [`DiscoveryRequest`] / [`DiscoveryResponse`] - Transport-agnostic wire values
//!
//! ## Example
//!
//! ```rust
//! use xds_core::{DiscoveryRequest, IdHash, Node, NodeHasher, TypeUrl};
//!
//! let request = DiscoveryRequest::new(TypeUrl::CLUSTER, "")
//!     .with_node(Node::new("my-envoy-node"));
//!
//! assert_eq!(IdHash.id(request.node.as_ref()), "my-envoy-node");
//! assert!(request.confirmation().is_none());
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod discovery;
mod error;
mod node;
mod resource;
mod type_url;

pub use discovery::{Confirmation, ControlPlane, DiscoveryRequest, DiscoveryResponse, RpcStatus};
pub use error::XdsError;
pub use node::{IdHash, Node, NodeHasher};
pub use resource::{AnyResource, BoxResource, Resource};
pub use type_url::TypeUrl;

/// Result type alias using [`XdsError`].
pub type Result<T> = std::result::Result<T, XdsError>;

/// Shorthand for [`Result`] used across the workspace.
pub type XdsResult<T> = Result<T>;
