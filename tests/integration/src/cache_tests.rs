//! Cache integration tests.

use std::sync::Arc;
use std::time::Duration;

use meshcp_xds::prelude::*;

fn endpoint(name: &str) -> BoxResource {
    AnyResource::from_bytes(TypeUrl::ENDPOINT, name, name.as_bytes().to_vec()).boxed()
}

fn snapshot(version: &str) -> Arc<ResourceSnapshot> {
    Arc::new(
        ResourceSnapshot::builder()
            .version(version)
            .resources(
                TypeUrl::ENDPOINT.into(),
                vec![endpoint("backend-a"), endpoint("backend-b")],
            )
            .build(),
    )
}

fn request(node: &str, type_url: &str, version: &str) -> DiscoveryRequest {
    DiscoveryRequest::new(type_url, version).with_node(Node::new(node))
}

#[test]
fn get_after_set_returns_the_snapshot() {
    let cache = SnapshotCache::new();

    let err = cache.get_snapshot("k").unwrap_err();
    assert!(err.is_not_found());

    let snap = snapshot("v1");
    cache.set_snapshot("k", Arc::clone(&snap)).unwrap();

    let stored = cache.get_snapshot("k").unwrap();
    assert_eq!(*stored, *snap);
    assert_eq!(stored.get_version(TypeUrl::ENDPOINT), "v1");
}

#[test]
fn inconsistent_snapshot_is_rejected() {
    let cache = SnapshotCache::new();
    let partial = ResourceSnapshot::from_parts(TypeUrl::xds_types(), Default::default());

    let err = cache.set_snapshot("k", Arc::new(partial)).unwrap_err();
    assert!(matches!(err, XdsError::InconsistentSnapshot { .. }));
    assert!(!cache.has_snapshot("k"));
}

#[test]
fn watch_for_unknown_name_returns_full_set() {
    let cache = SnapshotCache::new();
    cache.set_snapshot("k", snapshot("v1")).unwrap();

    let (mut receiver, _cancel) = cache.create_watch(
        request("k", TypeUrl::ENDPOINT, "v0").with_resource_names(["none"]),
    );

    let response = receiver.try_recv().unwrap().expect("fires immediately");
    assert_eq!(response.version, "v1");
    let names: Vec<_> = response.resources.iter().map(|r| r.name().to_string()).collect();
    assert_eq!(names, vec!["backend-a", "backend-b"]);
    assert_eq!(cache.watch_count("k"), 0);
}

#[tokio::test]
async fn pending_watch_fires_on_new_version() {
    let cache = SnapshotCache::new();
    cache.set_snapshot("k", snapshot("v1")).unwrap();

    let (receiver, _cancel) = cache.create_watch(request("k", TypeUrl::ENDPOINT, "v1"));
    assert_eq!(cache.watch_count("k"), 1);

    cache.set_snapshot("k", snapshot("v2")).unwrap();

    let response = tokio::time::timeout(Duration::from_secs(1), receiver.recv())
        .await
        .expect("delivered")
        .expect("open");
    assert_eq!(response.version, "v2");
    assert_eq!(response.type_url(), TypeUrl::ENDPOINT);
    assert_eq!(cache.watch_count("k"), 0);
}

#[tokio::test]
async fn identical_watches_are_all_answered() {
    let cache = SnapshotCache::new();

    let (first, _c1) = cache.create_watch(request("k", TypeUrl::ENDPOINT, ""));
    let (second, _c2) = cache.create_watch(request("k", TypeUrl::ENDPOINT, ""));
    assert_ne!(first.id(), second.id());
    assert_eq!(cache.watch_count("k"), 2);

    cache.set_snapshot("k", snapshot("v1")).unwrap();

    assert_eq!(first.recv().await.unwrap().version, "v1");
    assert_eq!(second.recv().await.unwrap().version, "v1");
    assert_eq!(cache.stats().responses_delivered(), 2);
}

#[test]
fn cancelled_watch_is_never_answered() {
    let cache = SnapshotCache::new();
    let (mut receiver, cancel) = cache.create_watch(request("k", TypeUrl::ENDPOINT, ""));

    cancel.cancel();
    cancel.cancel();
    assert_eq!(cache.watch_count("k"), 0);

    cache.set_snapshot("k", snapshot("v1")).unwrap();
    assert!(receiver.try_recv().is_err());
    assert_eq!(cache.stats().watches_cancelled(), 1);
}

#[tokio::test]
async fn clear_wipes_snapshot_status_and_watches() {
    let cache: SnapshotCache<ResourceSnapshot> = SnapshotCache::new();
    let (receiver, _cancel) = cache.create_watch(request("k", TypeUrl::CLUSTER, ""));
    assert!(cache.get_status_info("k").is_some());
    assert_eq!(cache.get_status_keys(), vec!["k".to_string()]);

    cache.clear_snapshot("k");

    assert!(receiver.recv().await.is_none());
    assert!(cache.get_status_info("k").is_none());
    assert!(cache.get_status_keys().is_empty());
    assert_eq!(cache.total_watch_count(), 0);
}

#[test]
fn status_info_tracks_watches() {
    let cache: SnapshotCache<ResourceSnapshot> = SnapshotCache::new();
    let (_r1, _c1) = cache.create_watch(request("k", TypeUrl::CLUSTER, ""));
    let (_r2, _c2) = cache.create_watch(request("k", TypeUrl::LISTENER, ""));

    let status = cache.get_status_info("k").unwrap();
    assert_eq!(status.num_watches, 2);
    assert_eq!(status.node.map(|n| n.id), Some("k".to_string()));
}

#[test]
fn fetch_reports_missing_and_unchanged() {
    let cache = SnapshotCache::new();
    let err = cache.fetch(&request("k", TypeUrl::ENDPOINT, "")).unwrap_err();
    assert!(err.is_not_found());

    cache.set_snapshot("k", snapshot("v1")).unwrap();
    let err = cache.fetch(&request("k", TypeUrl::ENDPOINT, "v1")).unwrap_err();
    assert!(err.is_no_change());

    let response = cache.fetch(&request("k", TypeUrl::ENDPOINT, "v0")).unwrap();
    assert_eq!(response.resources.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn blocking_fetch_times_out() {
    let cache = SnapshotCache::new();
    cache.set_snapshot("k", snapshot("v1")).unwrap();

    let err = cache
        .fetch_blocking(&request("k", TypeUrl::ENDPOINT, "v1"), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(err.is_no_change());
    assert_eq!(cache.watch_count("k"), 0);
}

#[test]
fn ads_mode_holds_partial_requests() {
    let cache = CacheBuilder::new().ads(true).build();
    cache.set_snapshot("k", snapshot("v1")).unwrap();

    let (mut partial, _c1) = cache.create_watch(
        request("k", TypeUrl::ENDPOINT, "").with_resource_names(["backend-a"]),
    );
    assert!(partial.try_recv().unwrap().is_none());
    assert_eq!(cache.watch_count("k"), 1);

    let (mut complete, _c2) = cache.create_watch(
        request("k", TypeUrl::ENDPOINT, "").with_resource_names(["backend-a", "backend-b"]),
    );
    assert!(complete.try_recv().unwrap().is_some());
}

#[test]
fn untagged_clients_share_the_empty_key() {
    let cache = SnapshotCache::new();
    cache.set_snapshot("", snapshot("v1")).unwrap();

    let response = cache
        .fetch(&DiscoveryRequest::new(TypeUrl::ENDPOINT, ""))
        .unwrap();
    assert_eq!(response.version, "v1");
}

#[test]
fn cache_concurrent_access() {
    use std::thread;

    let cache = SnapshotCache::new();
    let mut handles = vec![];

    for i in 0..10 {
        let cache = cache.clone();
        handles.push(thread::spawn(move || {
            let key = format!("node-{i}");
            for j in 0..100 {
                cache.set_snapshot(&key, snapshot(&format!("v{j}"))).unwrap();
                cache.get_snapshot(&key).unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.snapshot_count(), 10);
    assert_eq!(cache.stats().snapshots_set(), 1000);
}
