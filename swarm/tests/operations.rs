//! Storage and network operations against a recording backend

mod common;

use std::sync::Arc;

use indexmap::IndexMap;
use proxmox_swarm::backend::Credentials;
use proxmox_swarm::errors::SwarmError;
use proxmox_swarm::network::NetworkOps;
use proxmox_swarm::storage::StorageOps;

use common::{strings, RecordingBackend};

fn options(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// storage

#[tokio::test]
async fn test_create_subvolume_drops_unsupported_options() {
    let backend = Arc::new(RecordingBackend::new());
    let storage = StorageOps::new(backend.clone());

    let status = storage
        .create_subvolume(
            &Credentials::default(),
            "vol/data",
            &options(&[("size", "10G"), ("force", "true"), ("rw", "1")]),
        )
        .await;

    assert_eq!(status, 0);
    assert_eq!(
        backend.argvs(),
        vec![strings(&["cephfs", "subvolume", "create", "vol/data", "--size", "10G"])]
    );
}

#[tokio::test]
async fn test_mount_with_mode() {
    let backend = Arc::new(RecordingBackend::new());
    let storage = StorageOps::new(backend.clone());

    storage
        .mount(
            &Credentials::default(),
            "web",
            "/srv/data",
            "vol/data",
            Some("ro"),
            &options(&[("uid", "1000"), ("size", "10G")]),
        )
        .await;

    assert_eq!(
        backend.argvs(),
        vec![strings(&[
            "cephfs", "mount", "web", "/srv/data", "vol/data", "--mode", "ro", "--uid", "1000"
        ])]
    );
}

#[tokio::test]
async fn test_unmount_and_remove() {
    let backend = Arc::new(RecordingBackend::new().fail_on("cephfs", "rm", 4));
    let storage = StorageOps::new(backend.clone());
    let creds = Credentials::default();

    assert_eq!(storage.unmount(&creds, "web", "/srv/data", &IndexMap::new()).await, 0);
    assert_eq!(storage.remove_subvolume(&creds, "vol/data", &IndexMap::new()).await, 4);

    assert_eq!(
        backend.argvs(),
        vec![
            strings(&["cephfs", "umount", "web", "/srv/data"]),
            strings(&["cephfs", "subvolume", "rm", "vol/data"]),
        ]
    );
}

#[tokio::test]
async fn test_credentials_reach_backend() {
    let backend = Arc::new(RecordingBackend::new());
    let storage = StorageOps::new(backend.clone());
    let creds = Credentials::new(Some("pve.local".to_string()), None, None);

    storage.create_subvolume(&creds, "vol/a", &IndexMap::new()).await;
    assert_eq!(backend.calls()[0].host.as_deref(), Some("pve.local"));
}

// network

#[tokio::test]
async fn test_attach_with_tags_and_vlan() {
    let backend = Arc::new(RecordingBackend::new());
    let network = NetworkOps::new(backend.clone());
    let tags = strings(&["frontend", "tier.1"]);

    let status = network
        .attach_to_sdn(&Credentials::default(), "web", "overlay", Some(&tags), Some(100))
        .await
        .unwrap();

    assert_eq!(status, 0);
    assert_eq!(
        backend.argvs(),
        vec![strings(&[
            "sdn", "attach", "web", "overlay", "--tags", "frontend,tier.1", "--vlan", "100"
        ])]
    );
}

#[tokio::test]
async fn test_invalid_tag_makes_no_call() {
    let backend = Arc::new(RecordingBackend::new());
    let network = NetworkOps::new(backend.clone());
    let tags = strings(&["ok", "bad tag"]);

    match network
        .attach_to_sdn(&Credentials::default(), "web", "overlay", Some(&tags), None)
        .await
    {
        Err(SwarmError::Validation(message)) => assert_eq!(message, "Invalid tag format: bad tag"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_out_of_range_vlan_makes_no_call() {
    let backend = Arc::new(RecordingBackend::new());
    let network = NetworkOps::new(backend.clone());
    let creds = Credentials::default();

    for vlan in [0, 4095, -1] {
        assert!(matches!(
            network.attach_to_sdn(&creds, "web", "overlay", None, Some(vlan)).await,
            Err(SwarmError::Validation(_))
        ));
        assert!(matches!(
            network.create_network(&creds, "overlay", None, Some(vlan)).await,
            Err(SwarmError::Validation(_))
        ));
    }
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_network_lifecycle_verbs() {
    let backend = Arc::new(RecordingBackend::new());
    let network = NetworkOps::new(backend.clone());
    let creds = Credentials::default();

    network
        .create_network(&creds, "overlay", Some("zone1"), Some(20))
        .await
        .unwrap();
    network.detach_from_sdn(&creds, "web", "overlay").await;
    network.delete_network(&creds, "overlay").await;

    assert_eq!(
        backend.argvs(),
        vec![
            strings(&["sdn", "create", "overlay", "--zone", "zone1", "--vlan", "20"]),
            strings(&["sdn", "detach", "web", "overlay"]),
            strings(&["sdn", "delete", "overlay"]),
        ]
    );
}
