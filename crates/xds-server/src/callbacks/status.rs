//! Per-stream subscription status.
//!
//! [`StatusTrackerCallbacks`] keeps a [`Subscription`] record for every open
//! stream: when it connected, which node it belongs to and how many responses
//! were sent, acknowledged and rejected, both in total and per type. Readers
//! get a [`StatusAccessor`] that stays valid after the stream closes, so a
//! final snapshot of the record (with its disconnect time) can still be taken.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;
use xds_core::{Confirmation, DiscoveryRequest, DiscoveryResponse, XdsResult};

use super::Callbacks;
use crate::stream::StreamId;

/// Response counters for one type, or for the whole stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    /// Responses sent to the client.
    pub responses_sent: u64,
    /// Requests that ACKed a response.
    pub responses_acknowledged: u64,
    /// Requests that NACKed a response.
    pub responses_rejected: u64,
}

/// Status of a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionStatus {
    /// Time of the last ACK, NACK or response.
    pub last_update_time: SystemTime,
    /// Counters across every type.
    pub total: DiscoveryStats,
    /// Counters keyed by type URL.
    pub by_type: HashMap<String, DiscoveryStats>,
}

impl SubscriptionStatus {
    fn new(now: SystemTime) -> Self {
        Self {
            last_update_time: now,
            total: DiscoveryStats::default(),
            by_type: HashMap::new(),
        }
    }

    /// Counters for `type_url`; zero if nothing was exchanged for it.
    pub fn stats_of(&self, type_url: &str) -> DiscoveryStats {
        self.by_type.get(type_url).copied().unwrap_or_default()
    }

    fn stats_of_mut(&mut self, type_url: &str) -> &mut DiscoveryStats {
        self.by_type.entry(type_url.to_string()).or_default()
    }
}

/// One stream's connection record.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    /// Random identifier, unique per stream.
    pub id: String,
    /// Node id announced on the first request carrying a node.
    pub node_id: Option<String>,
    /// When the stream opened.
    pub connect_time: SystemTime,
    /// When the stream closed; `None` while it is open.
    pub disconnect_time: Option<SystemTime>,
    /// Response counters.
    pub status: SubscriptionStatus,
}

type Shared = Arc<RwLock<Subscription>>;

/// Read handle to a stream's [`Subscription`].
#[derive(Clone)]
pub struct StatusAccessor {
    subscription: Shared,
}

impl StatusAccessor {
    /// Copy of the current record.
    pub fn status(&self) -> Subscription {
        self.subscription
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for StatusAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StatusAccessor").field(&self.status().id).finish()
    }
}

/// Tracks a [`Subscription`] per open stream.
///
/// Requests with an empty nonce are initial requests and only record the
/// node id. A nonce with error detail counts as rejected, a nonce without
/// one as acknowledged.
#[derive(Default)]
pub struct StatusTrackerCallbacks {
    streams: DashMap<StreamId, Shared>,
}

impl fmt::Debug for StatusTrackerCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusTrackerCallbacks")
            .field("streams", &self.streams.len())
            .finish()
    }
}

impl StatusTrackerCallbacks {
    /// Tracker with no streams.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accessor for an open stream.
    pub fn status_accessor(&self, stream_id: StreamId) -> Option<StatusAccessor> {
        self.streams.get(&stream_id).map(|s| StatusAccessor {
            subscription: Arc::clone(s.value()),
        })
    }

    /// Number of tracked streams.
    pub fn tracked(&self) -> usize {
        self.streams.len()
    }

    fn update(&self, stream_id: StreamId, f: impl FnOnce(&mut Subscription)) {
        let Some(shared) = self.streams.get(&stream_id).map(|s| Arc::clone(s.value())) else {
            warn!(stream = %stream_id, "no subscription for stream");
            return;
        };
        let mut subscription = shared.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut subscription);
    }
}

impl Callbacks for StatusTrackerCallbacks {
    fn on_stream_open(&self, stream_id: StreamId, type_url: &str) -> XdsResult<()> {
        let now = SystemTime::now();
        let subscription = Subscription {
            id: Uuid::new_v4().to_string(),
            node_id: None,
            connect_time: now,
            disconnect_time: None,
            status: SubscriptionStatus::new(now),
        };
        debug!(stream = %stream_id, type_url, subscription = %subscription.id, "subscription opened");
        self.streams
            .insert(stream_id, Arc::new(RwLock::new(subscription)));
        Ok(())
    }

    fn on_stream_request(&self, stream_id: StreamId, request: &DiscoveryRequest) -> XdsResult<()> {
        self.update(stream_id, |subscription| {
            if subscription.node_id.is_none() {
                if let Some(node) = &request.node {
                    info!(stream = %stream_id, node = %node.id, subscription = %subscription.id, "proxy connected");
                    subscription.node_id = Some(node.id.clone());
                }
            }

            let Some(confirmation) = request.confirmation() else {
                return;
            };
            let status = &mut subscription.status;
            status.last_update_time = SystemTime::now();
            match confirmation {
                Confirmation::Ack => {
                    status.total.responses_acknowledged += 1;
                    status.stats_of_mut(&request.type_url).responses_acknowledged += 1;
                }
                Confirmation::Nack => {
                    info!(stream = %stream_id, type_url = %request.type_url, "config rejected");
                    status.total.responses_rejected += 1;
                    status.stats_of_mut(&request.type_url).responses_rejected += 1;
                }
            }
        });
        Ok(())
    }

    fn on_stream_response(
        &self,
        stream_id: StreamId,
        _request: &DiscoveryRequest,
        response: &mut DiscoveryResponse,
    ) {
        self.update(stream_id, |subscription| {
            let status = &mut subscription.status;
            status.last_update_time = SystemTime::now();
            status.total.responses_sent += 1;
            status.stats_of_mut(&response.type_url).responses_sent += 1;
        });
    }

    fn on_stream_closed(&self, stream_id: StreamId) {
        let Some((_, shared)) = self.streams.remove(&stream_id) else {
            warn!(stream = %stream_id, "stream closed without a subscription");
            return;
        };
        let mut subscription = shared.write().unwrap_or_else(PoisonError::into_inner);
        subscription.disconnect_time = Some(SystemTime::now());
        debug!(stream = %stream_id, subscription = %subscription.id, "subscription closed");
    }
}
