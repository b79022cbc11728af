//! Load tests for the snapshot cache with 1000+ nodes.
//!
//! These tests verify the cache under high load:
//! - 1000+ nodes
//! - parallel snapshot updates
//! - watch delivery under load
//!
//! Run with: `cargo test --package integration-tests --test load_tests -- --nocapture`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Barrier;
use xds_cache::{ResourceSnapshot, SnapshotCache};
use xds_core::{AnyResource, DiscoveryRequest, Node, TypeUrl};

fn create_snapshot(version: &str) -> Arc<ResourceSnapshot> {
    Arc::new(
        ResourceSnapshot::builder()
            .version(version)
            .resources(
                TypeUrl::CLUSTER.into(),
                (0..4u8).map(|i| {
                    AnyResource::from_bytes(TypeUrl::CLUSTER, format!("cluster-{i}"), vec![i]).boxed()
                }),
            )
            .build(),
    )
}

fn node_keys(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("envoy-sidecar-{i}")).collect()
}

#[tokio::test]
async fn test_1000_nodes() {
    let cache = SnapshotCache::new();
    let nodes = node_keys(1000);

    let start = Instant::now();
    for (i, node) in nodes.iter().enumerate() {
        cache.set_snapshot(node, create_snapshot(&format!("v{i}"))).unwrap();
    }
    let set_duration = start.elapsed();
    println!(
        "Set {} snapshots in {:?} ({:.2} µs/op)",
        nodes.len(),
        set_duration,
        set_duration.as_micros() as f64 / nodes.len() as f64
    );

    for node in &nodes {
        assert!(cache.get_snapshot(node).is_ok());
    }

    let stats = cache.stats();
    assert_eq!(cache.snapshot_count(), nodes.len());
    assert_eq!(stats.snapshot_hits(), nodes.len() as u64);
    assert_eq!(stats.hit_rate(), 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_1000_nodes() {
    let cache = SnapshotCache::new();
    let nodes = node_keys(1000);
    let num_tasks = 10;
    let per_task = nodes.len() / num_tasks;

    let barrier = Arc::new(Barrier::new(num_tasks));
    let total_ops = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::new();
    for task_id in 0..num_tasks {
        let cache = cache.clone();
        let barrier = Arc::clone(&barrier);
        let total_ops = Arc::clone(&total_ops);
        let task_nodes = nodes[task_id * per_task..(task_id + 1) * per_task].to_vec();

        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            for (i, node) in task_nodes.iter().enumerate() {
                cache
                    .set_snapshot(node, create_snapshot(&format!("v{task_id}-{i}")))
                    .unwrap();
                total_ops.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(total_ops.load(Ordering::Relaxed), nodes.len() as u64);
    assert_eq!(cache.snapshot_count(), nodes.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_watch_notifications_1000_nodes() {
    let cache = SnapshotCache::new();
    let nodes = node_keys(1000);

    let receivers: Vec<_> = nodes
        .iter()
        .map(|node| {
            let (receiver, _cancel) = cache
                .create_watch(DiscoveryRequest::new(TypeUrl::CLUSTER, "").with_node(Node::new(node)));
            receiver
        })
        .collect();
    assert_eq!(cache.total_watch_count(), nodes.len());

    let writer = {
        let cache = cache.clone();
        let nodes = nodes.clone();
        tokio::spawn(async move {
            for node in &nodes {
                cache.set_snapshot(node, create_snapshot("v1")).unwrap();
            }
        })
    };

    let start = Instant::now();
    for receiver in receivers {
        let response = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .expect("watch answered in time")
            .expect("watch not closed");
        assert_eq!(response.version, "v1");
        assert_eq!(response.resources.len(), 4);
    }
    writer.await.unwrap();
    println!("Delivered {} watches in {:?}", nodes.len(), start.elapsed());

    assert_eq!(cache.total_watch_count(), 0);
    assert_eq!(cache.stats().responses_delivered(), nodes.len() as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_writers() {
    let cache = SnapshotCache::new();
    let nodes = Arc::new(node_keys(200));
    for node in nodes.iter() {
        cache.set_snapshot(node, create_snapshot("v0")).unwrap();
    }

    let reads = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::new();

    for writer in 0..4u64 {
        let cache = cache.clone();
        let nodes = Arc::clone(&nodes);
        handles.push(tokio::spawn(async move {
            for round in 0..50u64 {
                let node = &nodes[((writer * 50 + round) as usize) % nodes.len()];
                cache
                    .set_snapshot(node, create_snapshot(&format!("w{writer}-{round}")))
                    .unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }

    for _ in 0..8 {
        let cache = cache.clone();
        let nodes = Arc::clone(&nodes);
        let reads = Arc::clone(&reads);
        handles.push(tokio::spawn(async move {
            for node in nodes.iter() {
                let request =
                    DiscoveryRequest::new(TypeUrl::CLUSTER, "").with_node(Node::new(node.as_str()));
                let response = cache.fetch(&request).unwrap();
                assert_eq!(response.resources.len(), 4);
                reads.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(reads.load(Ordering::Relaxed), 8 * 200);
    assert_eq!(cache.snapshot_count(), 200);
}

#[tokio::test]
async fn test_5000_nodes() {
    let cache = SnapshotCache::new();
    let nodes = node_keys(5000);

    for node in &nodes {
        cache.set_snapshot(node, create_snapshot("v1")).unwrap();
    }
    assert_eq!(cache.snapshot_count(), 5000);

    for node in nodes.iter().step_by(100) {
        cache.clear_snapshot(node);
    }
    assert_eq!(cache.snapshot_count(), 4950);
}
