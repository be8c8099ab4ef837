//! HttpBlobStore status mapping against a mock server

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use keepsync_core::ports::{IBlobStore, RemoteError};
use keepsync_remote::client::HttpBlobStore;

use crate::common::{mount_object, mount_status, mount_upload, setup_blob_mock};

#[tokio::test]
async fn test_get_existing_object() {
    let (server, store) = setup_blob_mock().await;
    mount_object(&server, "public/help/abc", br#"{"answer":42}"#).await;

    let bytes = store.get("public/help/abc").await.unwrap();
    assert_eq!(bytes.as_deref(), Some(&br#"{"answer":42}"#[..]));
}

#[tokio::test]
async fn test_get_missing_object_is_none() {
    let (server, store) = setup_blob_mock().await;
    mount_status(&server, "GET", "public/help/missing", 404).await;

    assert_eq!(store.get("public/help/missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_forbidden_is_access_denied() {
    let (server, store) = setup_blob_mock().await;
    mount_status(&server, "GET", "private/snapshot/x/notes", 403).await;
    mount_status(&server, "PUT", "private/snapshot/x/notes", 401).await;

    let err = store.get("private/snapshot/x/notes").await.unwrap_err();
    assert!(err.is_access_denied(), "unexpected error: {err}");

    let err = store
        .put("private/snapshot/x/notes", b"{}".to_vec(), "application/json")
        .await
        .unwrap_err();
    assert!(err.is_access_denied(), "unexpected error: {err}");
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, store) = setup_blob_mock().await;
    mount_status(&server, "GET", "public/help/abc", 503).await;

    let err = store.get("public/help/abc").await.unwrap_err();
    assert!(matches!(err, RemoteError::Transient(_)));
}

#[tokio::test]
async fn test_put_sends_body_and_content_type() {
    let (server, store) = setup_blob_mock().await;
    mount_upload(&server, "public/help/abc", 1).await;

    store
        .put("public/help/abc", br#"{"a":1}"#.to_vec(), "application/json")
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body, br#"{"a":1}"#.to_vec());
}

#[tokio::test]
async fn test_delete_missing_object_succeeds() {
    let (server, store) = setup_blob_mock().await;
    mount_status(&server, "DELETE", "public/help/gone", 404).await;
    mount_status(&server, "DELETE", "public/help/here", 204).await;

    store.delete("public/help/gone").await.unwrap();
    store.delete("public/help/here").await.unwrap();
}

#[tokio::test]
async fn test_invalid_path_never_hits_the_network() {
    let (server, store) = setup_blob_mock().await;

    let err = store.get("../secrets").await.unwrap_err();
    assert!(matches!(err, RemoteError::InvalidPath(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_timeout_is_transient() {
    let (server, _) = setup_blob_mock().await;
    Mock::given(method("GET"))
        .and(path("/public/help/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let store = HttpBlobStore::with_timeout(server.uri(), Duration::from_millis(100));
    let err = store.get("public/help/slow").await.unwrap_err();
    assert!(matches!(err, RemoteError::Transient(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_transient() {
    let store = HttpBlobStore::with_timeout("http://127.0.0.1:9", Duration::from_millis(500));
    let err = store.get("public/help/abc").await.unwrap_err();
    assert!(matches!(err, RemoteError::Transient(_)));
}
