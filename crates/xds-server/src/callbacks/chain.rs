//! Ordered composition of stream callbacks.

use std::fmt;
use std::sync::Arc;

use xds_core::{DiscoveryRequest, DiscoveryResponse, XdsError, XdsResult};

use super::Callbacks;
use crate::stream::StreamId;

/// Ordered composition of [`Callbacks`].
///
/// Open and request hooks run first to last; every handler runs and all
/// errors are combined. Response and close hooks run last to first.
#[derive(Clone, Default)]
pub struct CallbacksChain {
    callbacks: Vec<Arc<dyn Callbacks>>,
}

impl CallbacksChain {
    /// Chain over `callbacks` in the given order.
    pub fn new(callbacks: Vec<Arc<dyn Callbacks>>) -> Self {
        Self { callbacks }
    }

    /// Append a handler.
    pub fn push(&mut self, callbacks: Arc<dyn Callbacks>) {
        self.callbacks.push(callbacks);
    }

    /// Number of handlers.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether the chain has no handlers.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    fn collect(&self, mut hook: impl FnMut(&dyn Callbacks) -> XdsResult<()>) -> XdsResult<()> {
        let errors: Vec<XdsError> = self
            .callbacks
            .iter()
            .filter_map(|cb| hook(cb.as_ref()).err())
            .collect();
        match XdsError::aggregate(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for CallbacksChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbacksChain")
            .field("len", &self.callbacks.len())
            .finish()
    }
}

impl Callbacks for CallbacksChain {
    fn on_stream_open(&self, stream_id: StreamId, type_url: &str) -> XdsResult<()> {
        self.collect(|cb| cb.on_stream_open(stream_id, type_url))
    }

    fn on_stream_request(&self, stream_id: StreamId, request: &DiscoveryRequest) -> XdsResult<()> {
        self.collect(|cb| cb.on_stream_request(stream_id, request))
    }

    fn on_stream_response(
        &self,
        stream_id: StreamId,
        request: &DiscoveryRequest,
        response: &mut DiscoveryResponse,
    ) {
        for cb in self.callbacks.iter().rev() {
            cb.on_stream_response(stream_id, request, response);
        }
    }

    fn on_stream_closed(&self, stream_id: StreamId) {
        for cb in self.callbacks.iter().rev() {
            cb.on_stream_closed(stream_id);
        }
    }
}
