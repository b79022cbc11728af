//! Stream statistics and the configuration delivery ledger.
//!
//! The reconciler marks every published `(type, version)` pair ready; the
//! first ACK for that pair on any stream records one delivery latency
//! sample.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use metrics::{counter, gauge, histogram};
use tracing::{debug, trace};
use xds_core::{Confirmation, DiscoveryRequest, DiscoveryResponse, XdsError, XdsResult};

use super::Callbacks;
use crate::metrics::{
    describe_stream_metrics, metric_name, sanitize_metric_name, DELIVERY, REQUESTS_RECEIVED,
    RESPONSES_SENT, STREAMS_ACTIVE,
};
use crate::stream::StreamId;

/// Receives notice of configuration versions handed to the cache.
///
/// Versions are tracked per type, so types sharing one version string are
/// measured independently.
pub trait DeliveryTracker: Send + Sync {
    /// `version` of `type_url` was published and may now be ACKed.
    fn config_ready_for_delivery(&self, type_url: &str, version: &str);

    /// `version` of `type_url` was superseded and must not be measured.
    fn discard_config(&self, type_url: &str, version: &str);
}

struct Names {
    streams_active: String,
    requests_received: String,
    responses_sent: String,
    delivery: String,
}

struct StatsInner {
    prefix: String,
    names: Names,
    streams_active: AtomicI64,
    requests: DashMap<(String, Confirmation), u64>,
    responses: DashMap<String, u64>,
    ready: DashMap<(String, String), Instant>,
    delivery_count: AtomicU64,
    delivery_sum_micros: AtomicU64,
}

/// Stream statistics.
///
/// Emits through the `metrics` facade:
/// - `<prefix>_streams_active` gauge, +1 on open and -1 on close
/// - `<prefix>_requests_received{type_url,confirmation}` counter
/// - `<prefix>_responses_sent{type_url}` counter
/// - `<prefix>_delivery` histogram in milliseconds
///
/// A request with an empty nonce is an initial request and is not counted.
/// A nonce with error detail is a NACK; a nonce without one is an ACK.
///
/// The values are also kept locally so they can be read back without a
/// metrics recorder.
///
/// A delivery ledger entry lives until it is ACKed, superseded by a newer
/// version of its type, discarded when its node is cleared, or dropped by
/// [`expire_deliveries`](Self::expire_deliveries). Nodes that disconnect
/// without being cleared leave entries behind until they expire.
#[derive(Clone)]
pub struct StatsCallbacks {
    inner: Arc<StatsInner>,
}

impl fmt::Debug for StatsCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsCallbacks")
            .field("prefix", &self.inner.prefix)
            .field("streams_active", &self.streams_active())
            .finish()
    }
}

impl StatsCallbacks {
    /// Create stats under `prefix` and describe the metrics.
    ///
    /// # Errors
    ///
    /// [`XdsError::Configuration`] if `prefix` is empty or contains
    /// characters outside `[a-zA-Z_-0-9]`.
    pub fn new(prefix: &str) -> XdsResult<Self> {
        if prefix.is_empty() {
            return Err(XdsError::Configuration(
                "stats prefix must not be empty".to_string(),
            ));
        }
        if sanitize_metric_name(prefix) != prefix {
            return Err(XdsError::Configuration(format!(
                "stats prefix {prefix:?} is not a valid metric name"
            )));
        }

        describe_stream_metrics(prefix);

        Ok(Self {
            inner: Arc::new(StatsInner {
                prefix: prefix.to_string(),
                names: Names {
                    streams_active: metric_name(prefix, STREAMS_ACTIVE),
                    requests_received: metric_name(prefix, REQUESTS_RECEIVED),
                    responses_sent: metric_name(prefix, RESPONSES_SENT),
                    delivery: metric_name(prefix, DELIVERY),
                },
                streams_active: AtomicI64::new(0),
                requests: DashMap::new(),
                responses: DashMap::new(),
                ready: DashMap::new(),
                delivery_count: AtomicU64::new(0),
                delivery_sum_micros: AtomicU64::new(0),
            }),
        })
    }

    /// The metric prefix.
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// Number of open streams.
    pub fn streams_active(&self) -> i64 {
        self.inner.streams_active.load(Ordering::Relaxed)
    }

    /// Confirmations counted for `type_url`.
    pub fn requests_received(&self, type_url: &str, confirmation: Confirmation) -> u64 {
        self.inner
            .requests
            .get(&(type_url.to_string(), confirmation))
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// Responses counted for `type_url`.
    pub fn responses_sent(&self, type_url: &str) -> u64 {
        self.inner.responses.get(type_url).map(|v| *v).unwrap_or(0)
    }

    /// Number of delivery samples recorded.
    pub fn delivery_count(&self) -> u64 {
        self.inner.delivery_count.load(Ordering::Relaxed)
    }

    /// Sum of recorded delivery latencies.
    pub fn delivery_sum(&self) -> Duration {
        Duration::from_micros(self.inner.delivery_sum_micros.load(Ordering::Relaxed))
    }

    /// Versions waiting for an ACK.
    pub fn pending_deliveries(&self) -> usize {
        self.inner.ready.len()
    }

    /// Drop ledger entries published more than `max_age` ago without being
    /// ACKed. Returns how many were dropped.
    pub fn expire_deliveries(&self, max_age: Duration) -> usize {
        let before = self.inner.ready.len();
        self.inner
            .ready
            .retain(|_, published| published.elapsed() <= max_age);
        let expired = before.saturating_sub(self.inner.ready.len());
        if expired > 0 {
            debug!(expired, "expired undelivered configs");
        }
        expired
    }

    fn record_delivery(&self, type_url: &str, version: &str) {
        let key = (type_url.to_string(), version.to_string());
        let Some((_, ready)) = self.inner.ready.remove(&key) else {
            return;
        };
        let elapsed = ready.elapsed();
        self.inner.delivery_count.fetch_add(1, Ordering::Relaxed);
        self.inner
            .delivery_sum_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        histogram!(self.inner.names.delivery.clone()).record(elapsed.as_secs_f64() * 1000.0);
        trace!(type_url, version, latency_ms = elapsed.as_millis() as u64, "config delivered");
    }
}

impl DeliveryTracker for StatsCallbacks {
    fn config_ready_for_delivery(&self, type_url: &str, version: &str) {
        self.inner
            .ready
            .insert((type_url.to_string(), version.to_string()), Instant::now());
    }

    fn discard_config(&self, type_url: &str, version: &str) {
        self.inner
            .ready
            .remove(&(type_url.to_string(), version.to_string()));
    }
}

impl Callbacks for StatsCallbacks {
    fn on_stream_open(&self, _stream_id: StreamId, _type_url: &str) -> XdsResult<()> {
        let active = self.inner.streams_active.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!(self.inner.names.streams_active.clone()).set(active as f64);
        Ok(())
    }

    fn on_stream_request(&self, _stream_id: StreamId, request: &DiscoveryRequest) -> XdsResult<()> {
        let Some(confirmation) = request.confirmation() else {
            return Ok(());
        };

        *self
            .inner
            .requests
            .entry((request.type_url.clone(), confirmation))
            .or_insert(0) += 1;
        counter!(
            self.inner.names.requests_received.clone(),
            "type_url" => request.type_url.clone(),
            "confirmation" => confirmation.as_str()
        )
        .increment(1);

        if confirmation == Confirmation::Ack {
            self.record_delivery(&request.type_url, &request.version_info);
        }
        Ok(())
    }

    fn on_stream_response(
        &self,
        _stream_id: StreamId,
        _request: &DiscoveryRequest,
        response: &mut DiscoveryResponse,
    ) {
        *self
            .inner
            .responses
            .entry(response.type_url.clone())
            .or_insert(0) += 1;
        counter!(
            self.inner.names.responses_sent.clone(),
            "type_url" => response.type_url.clone()
        )
        .increment(1);
    }

    fn on_stream_closed(&self, _stream_id: StreamId) {
        let active = self.inner.streams_active.fetch_sub(1, Ordering::Relaxed) - 1;
        gauge!(self.inner.names.streams_active.clone()).set(active as f64);
    }
}
