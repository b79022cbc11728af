//! Transport-agnostic discovery request and response values.
//!
//! These mirror the shape of the xDS `DiscoveryRequest` /
//! `DiscoveryResponse` messages without tying the core to a generated
//! protobuf crate.

use crate::Node;

/// Error detail attached to a NACK.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcStatus {
    /// gRPC status code.
    pub code: i32,
    /// Human-readable reason the client rejected the configuration.
    pub message: String,
}

impl RpcStatus {
    /// Create a status with the given code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Discovery request sent by a client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryRequest {
    /// Version the client last applied for this type (empty on first request).
    pub version_info: String,
    /// Node information; only required on the first request of a stream.
    pub node: Option<Node>,
    /// Requested resource names (empty for wildcard).
    pub resource_names: Vec<String>,
    /// Type of the requested resources.
    pub type_url: String,
    /// Nonce of the response this request confirms (empty on first request).
    pub response_nonce: String,
    /// Set when the client rejects the response identified by the nonce.
    pub error_detail: Option<RpcStatus>,
}

impl DiscoveryRequest {
    /// Create a request for `type_url` at `version_info`.
    pub fn new(type_url: impl Into<String>, version_info: impl Into<String>) -> Self {
        Self {
            type_url: type_url.into(),
            version_info: version_info.into(),
            ..Self::default()
        }
    }

    /// Set the node.
    #[must_use]
    pub fn with_node(mut self, node: Node) -> Self {
        self.node = Some(node);
        self
    }

    /// Set the requested resource names.
    #[must_use]
    pub fn with_resource_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the response nonce.
    #[must_use]
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.response_nonce = nonce.into();
        self
    }

    /// Attach NACK error detail.
    #[must_use]
    pub fn with_error(mut self, detail: RpcStatus) -> Self {
        self.error_detail = Some(detail);
        self
    }

    /// Classify this request as a confirmation of an earlier response.
    ///
    /// An empty nonce marks an initial request, which confirms nothing.
    #[must_use]
    pub fn confirmation(&self) -> Option<Confirmation> {
        if self.response_nonce.is_empty() {
            None
        } else if self.error_detail.is_some() {
            Some(Confirmation::Nack)
        } else {
            Some(Confirmation::Ack)
        }
    }
}

/// How a client answered a previously sent response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Confirmation {
    /// Configuration applied.
    Ack,
    /// Configuration rejected.
    Nack,
}

impl Confirmation {
    /// Label value used in metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Confirmation::Ack => "ACK",
            Confirmation::Nack => "NACK",
        }
    }
}

/// Discovery response sent to a client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryResponse {
    /// Version of this response.
    pub version_info: String,
    /// Encoded resources.
    pub resources: Vec<prost_types::Any>,
    /// Type URL of the resources.
    pub type_url: String,
    /// Unique nonce for this response.
    pub nonce: String,
    /// Control plane identifier.
    pub control_plane: Option<ControlPlane>,
}

/// Control plane identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlPlane {
    /// Identifier.
    pub identifier: String,
}
