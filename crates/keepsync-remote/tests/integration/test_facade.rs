//! RemoteFacade over HTTP

use std::sync::Arc;

use serde_json::json;

use keepsync_core::config::MarkerScope;
use keepsync_core::domain::{DatasetId, DeviceId, DeviceMarker, OwnerId, Timestamp};
use keepsync_core::validation::Validator;
use keepsync_remote::{paths, RemoteFacade};

use crate::common::{mount_object, mount_status, mount_upload, setup_blob_mock};

fn notes() -> DatasetId {
    DatasetId::new("notes").unwrap()
}

fn alice() -> OwnerId {
    OwnerId::new("alice").unwrap()
}

#[tokio::test]
async fn test_download_snapshot_envelope() {
    let (server, store) = setup_blob_mock().await;
    let body = json!({
        "lastModified": 1_700_000_000_000_i64,
        "records": [{
            "key": "n1",
            "ownerId": "alice",
            "parentId": "",
            "lastRead": 1,
            "lastModified": 2,
            "createdAt": 1,
            "dataType": "notes",
            "deleted": false,
            "payload": {"text": "hello"}
        }]
    });
    mount_object(
        &server,
        &paths::snapshot(&alice(), &notes()),
        body.to_string().as_bytes(),
    )
    .await;

    let facade = RemoteFacade::new(Arc::new(store), Validator::new(), MarkerScope::PerOwner);
    let snapshot = facade
        .get_snapshot(&alice(), &notes())
        .await
        .unwrap()
        .expect("snapshot should exist");

    assert_eq!(snapshot.last_modified.as_millis(), 1_700_000_000_000);
    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(snapshot.records[0].parent_id(), None);
    assert_eq!(snapshot.records[0].payload()["text"], "hello");
}

#[tokio::test]
async fn test_missing_marker_means_no_remote_state() {
    let (server, store) = setup_blob_mock().await;
    let marker_path = paths::device_marker(MarkerScope::PerDataset, &notes(), &alice());
    mount_status(&server, "GET", &marker_path, 404).await;

    let facade = RemoteFacade::new(Arc::new(store), Validator::new(), MarkerScope::PerDataset);
    assert!(facade.get_marker(&notes(), &alice()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_upload_marker_envelope() {
    let (server, store) = setup_blob_mock().await;
    let marker_path = paths::device_marker(MarkerScope::PerOwner, &notes(), &alice());
    mount_upload(&server, &marker_path, 1).await;

    let facade = RemoteFacade::new(Arc::new(store), Validator::new(), MarkerScope::PerOwner);
    let device = DeviceId::new();
    facade
        .put_marker(
            &notes(),
            &alice(),
            &DeviceMarker::new(device, Timestamp::from_millis(99)),
        )
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["lastUsedDevice"], device.to_string());
    assert_eq!(sent["lastUpdated"], 99);
}
