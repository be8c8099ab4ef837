//! Shared test helpers for blob store integration tests
//!
//! Provides wiremock-based mock server setup. Each helper mounts the
//! necessary endpoints and returns a store pointing at the mock server.

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use keepsync_remote::client::HttpBlobStore;

pub const TEST_TOKEN: &str = "test-access-token";

/// Starts a mock server and returns a (MockServer, HttpBlobStore) tuple
/// authenticated with [`TEST_TOKEN`].
pub async fn setup_blob_mock() -> (MockServer, HttpBlobStore) {
    let server = MockServer::start().await;
    let store = HttpBlobStore::new(server.uri()).with_token(TEST_TOKEN);
    (server, store)
}

/// Mounts a GET endpoint that returns `body` for `object_path`.
pub async fn mount_object(server: &MockServer, object_path: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/{object_path}")))
        .and(header("authorization", format!("Bearer {TEST_TOKEN}").as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.to_vec())
                .append_header("Content-Type", "application/json"),
        )
        .mount(server)
        .await;
}

/// Mounts an endpoint answering `verb` on `object_path` with `status`.
pub async fn mount_status(server: &MockServer, verb: &str, object_path: &str, status: u16) {
    Mock::given(method(verb))
        .and(path(format!("/{object_path}")))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Mounts a PUT endpoint accepting JSON uploads for `object_path`,
/// expected to be hit exactly `times` times.
pub async fn mount_upload(server: &MockServer, object_path: &str, times: u64) {
    Mock::given(method("PUT"))
        .and(path(format!("/{object_path}")))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(201))
        .expect(times)
        .mount(server)
        .await;
}
