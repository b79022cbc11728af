//! End-to-end stream pipeline tests: reconciler, cache, stream processor
//! and callbacks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use meshcp_xds::prelude::*;
use tokio::sync::mpsc;
use xds_server::callbacks::ControlPlaneIdCallbacks;

const NODE: &str = "dp-1";

struct ClusterGenerator {
    clusters: Mutex<Vec<(&'static str, u8)>>,
}

impl ClusterGenerator {
    fn new(clusters: Vec<(&'static str, u8)>) -> Arc<Self> {
        Arc::new(Self {
            clusters: Mutex::new(clusters),
        })
    }

    fn replace(&self, clusters: Vec<(&'static str, u8)>) {
        *self.clusters.lock().unwrap() = clusters;
    }
}

#[async_trait]
impl SnapshotGenerator<ResourceSnapshot> for ClusterGenerator {
    async fn generate_snapshot(&self, _node: &Node) -> XdsResult<ResourceSnapshot> {
        let clusters = self.clusters.lock().unwrap().clone();
        Ok(ResourceSnapshot::builder()
            .resources(
                TypeUrl::CLUSTER.into(),
                clusters.into_iter().map(|(name, payload)| {
                    AnyResource::from_bytes(TypeUrl::CLUSTER, name, vec![payload]).boxed()
                }),
            )
            .build())
    }
}

fn request_stream(
    mut rx: mpsc::Receiver<XdsResult<DiscoveryRequest>>,
) -> impl futures::Stream<Item = XdsResult<DiscoveryRequest>> + Send + Unpin + 'static {
    Box::pin(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)))
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

fn cluster_request(version: &str, nonce: &str) -> XdsResult<DiscoveryRequest> {
    Ok(DiscoveryRequest::new(TypeUrl::CLUSTER, version)
        .with_node(Node::new(NODE))
        .with_nonce(nonce))
}

#[tokio::test]
async fn reconciled_snapshot_reaches_stream_and_ack_is_measured() {
    let server = XdsServer::<ResourceSnapshot>::builder()
        .config(
            ServerConfig::default()
                .with_control_plane_id("zone-east")
                .with_callback_logging(true),
        )
        .build()
        .unwrap();
    let generator = ClusterGenerator::new(vec![("web", 1)]);
    let reconciler = server.reconciler(generator.clone());

    assert!(reconciler.reconcile(&Node::new(NODE)).await.unwrap());
    assert_eq!(server.stats().pending_deliveries(), TypeUrl::XDS_TYPES.len());

    let (tx, rx) = mpsc::channel(8);
    let (mut responses, task) = server.serve_stream(request_stream(rx), "");

    tx.send(cluster_request("", "")).await.unwrap();
    let first = responses.recv().await.unwrap();
    assert_eq!(first.resources.len(), 1);
    assert_eq!(
        first.control_plane.as_ref().map(|cp| cp.identifier.as_str()),
        Some("zone-east")
    );
    assert_eq!(server.stats().streams_active(), 1);

    tx.send(cluster_request(&first.version_info, &first.nonce))
        .await
        .unwrap();
    wait_until(|| server.stats().delivery_count() == 1).await;

    generator.replace(vec![("web", 2), ("api", 1)]);
    assert!(reconciler.reconcile(&Node::new(NODE)).await.unwrap());

    let second = responses.recv().await.unwrap();
    assert_ne!(second.version_info, first.version_info);
    assert_eq!(second.resources.len(), 2);

    assert_eq!(
        server
            .stats()
            .requests_received(TypeUrl::CLUSTER, Confirmation::Ack),
        1
    );
    assert_eq!(server.stats().delivery_count(), 1);
    assert_eq!(server.stats().responses_sent(TypeUrl::CLUSTER), 2);

    drop(tx);
    task.await.unwrap().unwrap();
    assert_eq!(server.stats().streams_active(), 0);
}

#[tokio::test]
async fn nack_is_counted_and_keeps_watch_open() {
    let server = XdsServer::<ResourceSnapshot>::builder().build().unwrap();
    let generator = ClusterGenerator::new(vec![("web", 1)]);
    let reconciler = server.reconciler(generator.clone());
    reconciler.reconcile(&Node::new(NODE)).await.unwrap();

    let (tx, rx) = mpsc::channel(8);
    let (mut responses, task) = server.serve_stream(request_stream(rx), TypeUrl::CLUSTER);

    tx.send(cluster_request("", "")).await.unwrap();
    let first = responses.recv().await.unwrap();

    let nack = DiscoveryRequest::new(TypeUrl::CLUSTER, "")
        .with_node(Node::new(NODE))
        .with_nonce(first.nonce.clone())
        .with_error(RpcStatus::new(3, "cluster web rejected"));
    tx.send(Ok(nack)).await.unwrap();

    // A NACK carrying the previous version is answered with the current one.
    let retry = responses.recv().await.unwrap();
    assert_eq!(retry.version_info, first.version_info);
    assert_ne!(retry.nonce, first.nonce);

    assert_eq!(
        server
            .stats()
            .requests_received(TypeUrl::CLUSTER, Confirmation::Nack),
        1
    );
    assert_eq!(server.stats().delivery_count(), 0);

    drop(tx);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn subscription_status_follows_the_stream() {
    let server = XdsServer::<ResourceSnapshot>::builder().build().unwrap();
    let reconciler = server.reconciler(ClusterGenerator::new(vec![("web", 1)]));
    reconciler.reconcile(&Node::new(NODE)).await.unwrap();

    let (tx, rx) = mpsc::channel(8);
    let (mut responses, task) = server.serve_stream(request_stream(rx), "");

    tx.send(cluster_request("", "")).await.unwrap();
    let first = responses.recv().await.unwrap();
    tx.send(cluster_request(&first.version_info, &first.nonce))
        .await
        .unwrap();

    let tracker = server.status_tracker();
    let accessor = tracker
        .status_accessor(StreamId::new(1))
        .expect("first stream is tracked");
    wait_until(|| accessor.status().status.total.responses_acknowledged == 1).await;

    let status = accessor.status();
    assert_eq!(status.node_id.as_deref(), Some(NODE));
    assert_eq!(status.status.total.responses_sent, 1);
    assert_eq!(status.status.stats_of(TypeUrl::CLUSTER).responses_acknowledged, 1);
    assert!(status.disconnect_time.is_none());

    drop(tx);
    task.await.unwrap().unwrap();
    assert!(accessor.status().disconnect_time.is_some());
    assert_eq!(tracker.tracked(), 0);
}

#[tokio::test]
async fn watchdog_runs_for_the_life_of_the_stream() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    let server = XdsServer::<ResourceSnapshot>::builder()
        .config(ServerConfig::default().with_watchdog_interval(Duration::from_millis(10)))
        .periodic_watchdog(move |_stream, node| {
            if node.map(|n| n.id).as_deref() == Some(NODE) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            async { Ok(()) }.boxed()
        })
        .build()
        .unwrap();

    let (tx, rx) = mpsc::channel(8);
    let (_responses, task) = server.serve_stream(request_stream(rx), "");
    tx.send(cluster_request("", "")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    let watchdogs = server.watchdogs().expect("watchdog configured");
    assert_eq!(watchdogs.active(), 1);
    assert!(ticks.load(Ordering::SeqCst) >= 1);

    drop(tx);
    task.await.unwrap().unwrap();
    assert_eq!(watchdogs.active(), 0);
}

#[tokio::test]
async fn failing_callback_closes_stream_once() {
    struct Reject;

    impl Callbacks for Reject {
        fn on_stream_request(&self, _: StreamId, _: &DiscoveryRequest) -> XdsResult<()> {
            Err(XdsError::Configuration("node not allowed".into()))
        }
    }

    let server = XdsServer::<ResourceSnapshot>::builder()
        .callbacks(Arc::new(Reject))
        .build()
        .unwrap();

    let (tx, rx) = mpsc::channel(8);
    let (_responses, task) = server.serve_stream(request_stream(rx), "");
    tx.send(cluster_request("", "")).await.unwrap();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, XdsError::Configuration(_)));
    assert_eq!(server.stats().streams_active(), 0);
    assert_eq!(server.cache().total_watch_count(), 0);
}

#[test]
fn control_plane_id_is_stamped() {
    let callbacks = ControlPlaneIdCallbacks::new("cp-7");
    let mut response = DiscoveryResponse::default();
    callbacks.on_stream_response(StreamId::new(1), &DiscoveryRequest::default(), &mut response);

    assert_eq!(
        response.control_plane.map(|cp| cp.identifier),
        Some("cp-7".to_string())
    );
}
