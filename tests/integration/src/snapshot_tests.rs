//! Snapshot, versioner and KDS integration tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use meshcp_xds::cache::{resources_equal, KDS_TYPES};
use meshcp_xds::prelude::*;

fn cluster(name: &str, payload: &[u8]) -> BoxResource {
    AnyResource::from_bytes(TypeUrl::CLUSTER, name, payload.to_vec()).boxed()
}

fn sequential_versioner() -> SnapshotAutoVersioner {
    let next = Arc::new(AtomicU64::new(1));
    SnapshotAutoVersioner::with_generator(move || format!("gen-{}", next.fetch_add(1, Ordering::SeqCst)))
}

fn unversioned(clusters: Vec<BoxResource>) -> Arc<ResourceSnapshot> {
    Arc::new(
        ResourceSnapshot::builder()
            .resources(TypeUrl::CLUSTER.into(), clusters)
            .build(),
    )
}

#[test]
fn snapshot_builder_basic() {
    let snapshot = ResourceSnapshot::builder().version("v1").build();

    assert!(snapshot.is_empty());
    assert_eq!(snapshot.total_resources(), 0);
    assert_eq!(snapshot.type_urls().count(), TypeUrl::XDS_TYPES.len());
    assert!(snapshot.consistent().is_ok());
    for type_url in TypeUrl::XDS_TYPES {
        assert_eq!(snapshot.get_version(type_url), "v1");
    }
}

#[test]
fn snapshot_builder_with_resources() {
    let snapshot = ResourceSnapshot::builder()
        .version("v2")
        .resources(TypeUrl::CLUSTER.into(), vec![cluster("a", b"1"), cluster("b", b"2")])
        .resources_with_version(TypeUrl::LISTENER.into(), "l-7", vec![])
        .build();

    assert_eq!(snapshot.total_resources(), 2);
    assert_eq!(snapshot.get_version(TypeUrl::CLUSTER), "v2");
    assert_eq!(snapshot.get_version(TypeUrl::LISTENER), "l-7");
    assert_eq!(snapshot.get_resources(TypeUrl::CLUSTER).map(|r| r.len()), Some(2));
    assert!(snapshot
        .get_resources(TypeUrl::ROUTE)
        .map(|r| r.is_empty())
        .unwrap_or(false));
    assert!(snapshot.get_resources("type.googleapis.com/unknown").is_none());
    assert_eq!(snapshot.get_version("type.googleapis.com/unknown"), "");
}

#[test]
fn partial_snapshot_is_inconsistent() {
    let snapshot = ResourceSnapshot::from_parts(TypeUrl::xds_types(), Default::default());
    let err = snapshot.consistent().unwrap_err();
    assert!(matches!(err, XdsError::InconsistentSnapshot { .. }));
}

#[test]
fn missing_snapshot_is_null_safe() {
    let missing: Option<Arc<ResourceSnapshot>> = None;

    assert!(matches!(
        missing.consistent(),
        Err(XdsError::InconsistentSnapshot { .. })
    ));
    assert!(missing.get_resources(TypeUrl::CLUSTER).is_none());
    assert_eq!(missing.get_version(TypeUrl::CLUSTER), "");
    assert!(missing.with_version(TypeUrl::CLUSTER, "v1").is_none());
}

#[test]
fn with_version_shares_untouched_types() {
    let snapshot = Arc::new(
        ResourceSnapshot::builder()
            .version("v1")
            .resources(TypeUrl::CLUSTER.into(), vec![cluster("a", b"1")])
            .build(),
    );

    let same = snapshot.with_version(TypeUrl::CLUSTER, "v1");
    assert!(Arc::ptr_eq(&snapshot, &same));

    let bumped = snapshot.with_version(TypeUrl::CLUSTER, "v2");
    assert_eq!(bumped.get_version(TypeUrl::CLUSTER), "v2");
    assert_eq!(snapshot.get_version(TypeUrl::CLUSTER), "v1");

    let before = snapshot.entry(TypeUrl::LISTENER).unwrap();
    let after = bumped.entry(TypeUrl::LISTENER).unwrap();
    assert!(Arc::ptr_eq(before, after));
    assert!(snapshot
        .entry(TypeUrl::CLUSTER)
        .unwrap()
        .shares_items_with(bumped.entry(TypeUrl::CLUSTER).unwrap()));
}

#[test]
fn versioning_is_idempotent() {
    let versioner = sequential_versioner();
    let first = versioner
        .version(Some(unversioned(vec![cluster("a", b"1")])), None)
        .unwrap();
    let again = versioner
        .version(Some(unversioned(vec![cluster("a", b"1")])), Some(&first))
        .unwrap();

    for type_url in TypeUrl::XDS_TYPES {
        assert!(!first.get_version(type_url).is_empty());
        assert_eq!(first.get_version(type_url), again.get_version(type_url));
    }
}

#[test]
fn versioning_tracks_content_per_type() {
    let versioner = sequential_versioner();
    let first = versioner
        .version(Some(unversioned(vec![cluster("a", b"1")])), None)
        .unwrap();
    let changed = versioner
        .version(Some(unversioned(vec![cluster("a", b"2")])), Some(&first))
        .unwrap();
    let renamed = versioner
        .version(Some(unversioned(vec![cluster("b", b"2")])), Some(&changed))
        .unwrap();

    assert_ne!(
        first.get_version(TypeUrl::CLUSTER),
        changed.get_version(TypeUrl::CLUSTER)
    );
    assert_ne!(
        changed.get_version(TypeUrl::CLUSTER),
        renamed.get_version(TypeUrl::CLUSTER)
    );
    assert_eq!(
        first.get_version(TypeUrl::LISTENER),
        renamed.get_version(TypeUrl::LISTENER)
    );
}

#[test]
fn explicit_versions_are_kept() {
    let versioner = sequential_versioner();
    let explicit = Arc::new(
        ResourceSnapshot::builder()
            .resources_with_version(TypeUrl::CLUSTER.into(), "pinned", vec![cluster("a", b"1")])
            .build(),
    );

    let versioned = versioner.version(Some(explicit), None).unwrap();
    assert_eq!(versioned.get_version(TypeUrl::CLUSTER), "pinned");
    assert!(versioner
        .version::<ResourceSnapshot>(None, Some(&versioned))
        .is_none());
}

#[test]
fn resource_equality_is_structural() {
    let a = unversioned(vec![cluster("a", b"1"), cluster("b", b"2")]);
    let b = unversioned(vec![cluster("b", b"2"), cluster("a", b"1")]);
    let c = unversioned(vec![cluster("a", b"1")]);

    let items = |s: &ResourceSnapshot| s.get_resources(TypeUrl::CLUSTER).cloned().unwrap_or_default();
    assert!(resources_equal(&items(&a), &items(&b)));
    assert!(!resources_equal(&items(&a), &items(&c)));
}

fn mesh_resource() -> KdsResource {
    KdsResource::new(
        "Mesh",
        KdsMeta::new("mesh1", "mesh1"),
        prost_types::Any {
            type_url: "Mesh".to_string(),
            value: b"mtls: enabled".to_vec(),
        },
    )
}

#[test]
fn kds_builder_indexes_by_name_and_mesh() {
    let snapshot = KdsSnapshotBuilder::new()
        .with("Mesh", vec![mesh_resource()])
        .build("v1");

    let meshes = snapshot.get_resources("Mesh").expect("mesh is supported");
    assert_eq!(meshes.len(), 1);
    let stored = meshes.get("mesh1.mesh1").expect("indexed by name.mesh");
    assert!(stored.equals(&mesh_resource()));
    assert_eq!(snapshot.get_version("Mesh"), "v1");
    assert!(snapshot.get_resources("UnsupportedType").is_none());
}

#[test]
fn kds_builder_versions_every_supported_kind() {
    let snapshot = KdsSnapshotBuilder::new()
        .with("Mesh", vec![mesh_resource()])
        .with("UnsupportedType", vec![mesh_resource()])
        .build("v3");

    assert!(snapshot.consistent().is_ok());
    for kind in KDS_TYPES {
        assert_eq!(snapshot.get_version(kind), "v3");
    }
    assert!(snapshot.get_resources("Dataplane").unwrap().is_empty());
}

#[test]
fn kds_global_resources_use_bare_name() {
    let zone = KdsResource::new(
        "ZoneIngress",
        KdsMeta::global("zone-1"),
        prost_types::Any::default(),
    );
    let snapshot = KdsSnapshotBuilder::new()
        .with("ZoneIngress", vec![zone])
        .build("v1");

    assert!(snapshot
        .get_resources("ZoneIngress")
        .unwrap()
        .contains_key("zone-1"));
}
