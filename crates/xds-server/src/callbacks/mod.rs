//! Stream lifecycle callbacks.
//!
//! Every request and response crossing a stream passes through a
//! [`Callbacks`] implementation, usually a [`CallbacksChain`] composed of:
//!
//! - [`StatsCallbacks`] - stream gauges, ACK/NACK counters and delivery latency
//! - [`StatusTrackerCallbacks`] - per-stream subscription records
//! - [`WatchdogCallbacks`] - a background task per stream
//! - [`ControlPlaneIdCallbacks`] - stamps the control plane identity on responses
//! - [`LoggingCallbacks`] - debug logs for every hook

mod chain;
mod control_plane;
mod logging;
mod stats;
mod status;
mod watchdog;

pub use chain::CallbacksChain;
pub use control_plane::ControlPlaneIdCallbacks;
pub use logging::LoggingCallbacks;
pub use stats::{DeliveryTracker, StatsCallbacks};
pub use status::{
    DiscoveryStats, StatusAccessor, StatusTrackerCallbacks, Subscription, SubscriptionStatus,
};
pub use watchdog::{
    PeriodicWatchdog, PeriodicWatchdogFactory, Watchdog, WatchdogCallbacks, WatchdogFactory,
};

use xds_core::{DiscoveryRequest, DiscoveryResponse, XdsResult};

use crate::stream::StreamId;

/// Hooks invoked over the lifetime of a stream.
///
/// Every method has a no-op default so handlers only implement the phases
/// they care about. Errors from the open and request phases terminate the
/// stream; [`on_stream_closed`](Callbacks::on_stream_closed) still runs.
pub trait Callbacks: Send + Sync {
    /// A stream was opened. `type_url` is empty for aggregated streams.
    fn on_stream_open(&self, stream_id: StreamId, type_url: &str) -> XdsResult<()> {
        let _ = (stream_id, type_url);
        Ok(())
    }

    /// A request arrived on the stream.
    fn on_stream_request(&self, stream_id: StreamId, request: &DiscoveryRequest) -> XdsResult<()> {
        let _ = (stream_id, request);
        Ok(())
    }

    /// A response is about to be sent; handlers may decorate it.
    fn on_stream_response(
        &self,
        stream_id: StreamId,
        request: &DiscoveryRequest,
        response: &mut DiscoveryResponse,
    ) {
        let _ = (stream_id, request, response);
    }

    /// The stream closed. Runs exactly once per opened stream.
    fn on_stream_closed(&self, stream_id: StreamId) {
        let _ = stream_id;
    }
}
