//! Debug logging of stream events.

use tracing::debug;
use xds_core::{DiscoveryRequest, DiscoveryResponse, XdsResult};

use super::Callbacks;
use crate::stream::StreamId;

/// Logs every stream event at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCallbacks;

impl Callbacks for LoggingCallbacks {
    fn on_stream_open(&self, stream_id: StreamId, type_url: &str) -> XdsResult<()> {
        debug!(stream = %stream_id, type_url, "stream opened");
        Ok(())
    }

    fn on_stream_request(&self, stream_id: StreamId, request: &DiscoveryRequest) -> XdsResult<()> {
        debug!(
            stream = %stream_id,
            type_url = %request.type_url,
            version = %request.version_info,
            nonce = %request.response_nonce,
            resources = ?request.resource_names,
            nack = request.error_detail.is_some(),
            "received request"
        );
        Ok(())
    }

    fn on_stream_response(
        &self,
        stream_id: StreamId,
        _request: &DiscoveryRequest,
        response: &mut DiscoveryResponse,
    ) {
        debug!(
            stream = %stream_id,
            type_url = %response.type_url,
            version = %response.version_info,
            nonce = %response.nonce,
            count = response.resources.len(),
            "sending response"
        );
    }

    fn on_stream_closed(&self, stream_id: StreamId) {
        debug!(stream = %stream_id, "stream closed");
    }
}
