//! Per-stream background watchdogs.
//!
//! A watchdog starts on the first request of a stream and is cancelled
//! through a [`CancellationToken`] when the stream closes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use xds_core::{DiscoveryRequest, Node, XdsError, XdsResult};

use super::Callbacks;
use crate::stream::StreamId;

/// Background task kept alive for the lifetime of a stream.
#[async_trait]
pub trait Watchdog: Send + Sync {
    /// Run until `stop` is cancelled.
    async fn start(&self, stop: CancellationToken);
}

/// Builds the watchdog for a stream.
pub trait WatchdogFactory: Send + Sync {
    /// Watchdog for `stream_id`, announced by `node` on its first request.
    fn new_watchdog(&self, stream_id: StreamId, node: Option<&Node>) -> Arc<dyn Watchdog>;
}

/// Starts one watchdog per stream on its first request and stops it when
/// the stream closes.
///
/// Requires a tokio runtime on the calling thread.
pub struct WatchdogCallbacks {
    factory: Arc<dyn WatchdogFactory>,
    streams: DashMap<StreamId, CancellationToken>,
}

impl fmt::Debug for WatchdogCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchdogCallbacks")
            .field("active", &self.streams.len())
            .finish()
    }
}

impl WatchdogCallbacks {
    /// Create callbacks spawning watchdogs from `factory`.
    pub fn new(factory: Arc<dyn WatchdogFactory>) -> Self {
        Self {
            factory,
            streams: DashMap::new(),
        }
    }

    /// Number of running watchdogs.
    pub fn active(&self) -> usize {
        self.streams.len()
    }
}

impl Callbacks for WatchdogCallbacks {
    fn on_stream_request(&self, stream_id: StreamId, request: &DiscoveryRequest) -> XdsResult<()> {
        let Entry::Vacant(vacant) = self.streams.entry(stream_id) else {
            return Ok(());
        };

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| XdsError::internal("watchdog requires a tokio runtime", e))?;

        let stop = CancellationToken::new();
        let watchdog = self.factory.new_watchdog(stream_id, request.node.as_ref());
        let token = stop.clone();
        runtime.spawn(async move {
            watchdog.start(token).await;
        });
        vacant.insert(stop);

        debug!(stream = %stream_id, "started watchdog");
        Ok(())
    }

    fn on_stream_closed(&self, stream_id: StreamId) {
        if let Some((_, stop)) = self.streams.remove(&stream_id) {
            stop.cancel();
            debug!(stream = %stream_id, "stopped watchdog");
        }
    }
}

type TickFn = Arc<dyn Fn() -> BoxFuture<'static, XdsResult<()>> + Send + Sync>;

/// Watchdog that runs a tick function on a fixed interval.
///
/// Tick errors are logged and the loop continues.
#[derive(Clone)]
pub struct PeriodicWatchdog {
    interval: Duration,
    on_tick: TickFn,
}

impl fmt::Debug for PeriodicWatchdog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicWatchdog")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl PeriodicWatchdog {
    /// Tick every `interval`; the first tick fires immediately.
    pub fn new<F>(interval: Duration, on_tick: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, XdsResult<()>> + Send + Sync + 'static,
    {
        Self {
            interval,
            on_tick: Arc::new(on_tick),
        }
    }
}

#[async_trait]
impl Watchdog for PeriodicWatchdog {
    async fn start(&self, stop: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    debug!("watchdog stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = (self.on_tick)().await {
                        warn!(error = %e, "watchdog tick failed");
                    }
                }
            }
        }
    }
}

type StreamTickFn =
    Arc<dyn Fn(StreamId, Option<Node>) -> BoxFuture<'static, XdsResult<()>> + Send + Sync>;

/// Factory giving every stream a [`PeriodicWatchdog`] bound to its id and
/// node.
#[derive(Clone)]
pub struct PeriodicWatchdogFactory {
    interval: Duration,
    on_tick: StreamTickFn,
}

impl fmt::Debug for PeriodicWatchdogFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicWatchdogFactory")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl PeriodicWatchdogFactory {
    /// Call `on_tick` every `interval` for each open stream.
    pub fn new<F>(interval: Duration, on_tick: F) -> Self
    where
        F: Fn(StreamId, Option<Node>) -> BoxFuture<'static, XdsResult<()>> + Send + Sync + 'static,
    {
        Self {
            interval,
            on_tick: Arc::new(on_tick),
        }
    }
}

impl WatchdogFactory for PeriodicWatchdogFactory {
    fn new_watchdog(&self, stream_id: StreamId, node: Option<&Node>) -> Arc<dyn Watchdog> {
        let on_tick = Arc::clone(&self.on_tick);
        let node = node.cloned();
        Arc::new(PeriodicWatchdog::new(self.interval, move || {
            on_tick(stream_id, node.clone())
        }))
    }
}
