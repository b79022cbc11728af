//! Simple distribution server demo.
//!
//! Wires the full pipeline in one process:
//! - a generator producing a cluster set that grows every update
//! - a reconciler versioning and publishing it into the cache
//! - a simulated data plane streaming requests through the stream processor
//!   and ACKing every response
//!
//! Run with:
//! ```bash
//! RUST_LOG=info,xds_server=debug cargo run -p simple-server
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use meshcp_xds::prelude::*;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Configuration for the demo.
struct Config {
    /// Node id of the simulated data plane.
    node_id: String,
    /// Interval between snapshot updates.
    update_interval: Duration,
    /// Number of updates before the demo exits on its own.
    rounds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: "edge-proxy".to_string(),
            update_interval: Duration::from_secs(2),
            rounds: 5,
        }
    }
}

/// Produces `generation + 1` clusters for every node.
#[derive(Default)]
struct GrowingClusters {
    generation: AtomicU64,
}

impl GrowingClusters {
    fn advance(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl SnapshotGenerator<ResourceSnapshot> for GrowingClusters {
    async fn generate_snapshot(&self, node: &Node) -> XdsResult<ResourceSnapshot> {
        let count = self.generation.load(Ordering::Relaxed) + 1;
        let clusters = (0..count).map(|i| {
            let name = format!("{}-cluster-{i}", node.id);
            AnyResource::from_bytes(TypeUrl::CLUSTER, name.clone(), name.into_bytes()).boxed()
        });
        Ok(ResourceSnapshot::builder()
            .resources(TypeUrl::CLUSTER.into(), clusters)
            .build())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{}", meshcp_xds::version::version_string());

    let config = Config::default();

    let server = XdsServer::<ResourceSnapshot>::builder()
        .config(
            ServerConfig::default()
                .with_control_plane_id("demo-zone")
                .with_callback_logging(true),
        )
        .periodic_watchdog(|stream, node| {
            let node = node.map(|n| n.id).unwrap_or_default();
            async move {
                info!(%stream, %node, "stream alive");
                Ok(())
            }
            .boxed()
        })
        .build()?;

    let generator = Arc::new(GrowingClusters::default());
    let reconciler = server.reconciler(generator.clone());
    let node = Node::new(config.node_id.clone());
    reconciler.reconcile(&node).await?;

    // Simulated data plane: request clusters, then ACK each response.
    let (requests, requests_rx) = mpsc::channel::<XdsResult<DiscoveryRequest>>(8);
    let request_stream = Box::pin(futures::stream::unfold(requests_rx, |mut rx| async move {
        rx.recv().await.map(|request| (request, rx))
    }));
    let (mut responses, stream_task) = server.serve_stream(request_stream, "");

    requests
        .send(Ok(DiscoveryRequest::new(TypeUrl::CLUSTER, "").with_node(node.clone())))
        .await?;

    let client = tokio::spawn(async move {
        while let Some(response) = responses.recv().await {
            info!(
                version = %response.version_info,
                nonce = %response.nonce,
                clusters = response.resources.len(),
                "data plane received clusters"
            );
            let ack = DiscoveryRequest::new(response.type_url, response.version_info)
                .with_nonce(response.nonce);
            if requests.send(Ok(ack)).await.is_err() {
                break;
            }
        }
    });

    let mut ticker = tokio::time::interval(config.update_interval);
    ticker.tick().await;
    for round in 1..=config.rounds {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
        generator.advance();
        match reconciler.reconcile(&node).await {
            Ok(changed) => info!(round, changed, "reconciled"),
            Err(e) => warn!(error = %e, "reconcile failed"),
        }
        server
            .stats()
            .expire_deliveries(config.update_interval * 10);
    }

    let stats = server.stats();
    info!(
        streams = stats.streams_active(),
        acks = stats.requests_received(TypeUrl::CLUSTER, Confirmation::Ack),
        responses = stats.responses_sent(TypeUrl::CLUSTER),
        deliveries = stats.delivery_count(),
        delivery_ms = stats.delivery_sum().as_millis() as u64,
        "stream stats"
    );
    if let Some(status) = server
        .status_tracker()
        .status_accessor(StreamId::new(1))
        .map(|accessor| accessor.status())
    {
        info!(
            subscription = %status.id,
            sent = status.status.total.responses_sent,
            acknowledged = status.status.total.responses_acknowledged,
            rejected = status.status.total.responses_rejected,
            "subscription status"
        );
    }
    let cache_stats = server.cache().stats();
    info!(
        snapshots_set = cache_stats.snapshots_set(),
        hit_rate = cache_stats.hit_rate(),
        "cache stats"
    );

    client.abort();
    stream_task.abort();
    info!("shutting down");
    Ok(())
}
