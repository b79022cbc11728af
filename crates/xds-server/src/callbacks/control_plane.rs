//! Control plane identity on outgoing responses.

use xds_core::{ControlPlane, DiscoveryRequest, DiscoveryResponse};

use super::Callbacks;
use crate::stream::StreamId;

/// Stamps a control plane identifier onto outgoing responses.
#[derive(Debug, Clone, Default)]
pub struct ControlPlaneIdCallbacks {
    id: String,
}

impl ControlPlaneIdCallbacks {
    /// Stamp `id`; an empty id leaves responses untouched.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl Callbacks for ControlPlaneIdCallbacks {
    fn on_stream_response(
        &self,
        _stream_id: StreamId,
        _request: &DiscoveryRequest,
        response: &mut DiscoveryResponse,
    ) {
        if !self.id.is_empty() {
            response.control_plane = Some(ControlPlane {
                identifier: self.id.clone(),
            });
        }
    }
}
