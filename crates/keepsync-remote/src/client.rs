//! HTTP blob store client
//!
//! Talks to a path-addressed object store over plain HTTP verbs:
//! `GET`, `PUT` and `DELETE` on `<base_url>/<object path>`.
//!
//! ## Status mapping
//!
//! | Response          | Result                      |
//! |-------------------|-----------------------------|
//! | 2xx               | success                     |
//! | 404               | `Ok(None)` / delete is a no-op |
//! | 401, 403          | `RemoteError::AccessDenied` |
//! | anything else     | `RemoteError::Transient`    |
//!
//! Network failures and timeouts are `Transient`. Nothing is retried here;
//! the next sync cycle is the retry.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keepsync_core::ports::IBlobStore;
//! use keepsync_remote::client::HttpBlobStore;
//!
//! # async fn example() -> Result<(), keepsync_core::ports::RemoteError> {
//! let store = HttpBlobStore::new("https://blobs.example.com").with_token("secret");
//! let bytes = store.get("public/help/abc").await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use keepsync_core::ports::{IBlobStore, RemoteError};

use crate::paths;

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the remote object store
pub struct HttpBlobStore {
    /// The underlying HTTP client
    client: Client,
    /// Base URL, without trailing slash
    base_url: String,
    /// Optional bearer token
    access_token: Option<String>,
}

impl HttpBlobStore {
    /// Creates a client for `base_url` with the default timeout
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Creates a client with a custom per-request timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: None,
        }
    }

    /// Sets the bearer token sent with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Updates the access token (e.g., after a token refresh)
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = Some(token.into());
        debug!("Updated blob store access token");
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for an object path
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let builder = self.client.request(method, &url);
        match self.access_token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> Result<Response, RemoteError> {
        builder.send().await.map_err(|e| {
            warn!(path, error = %e, "Blob store request failed");
            RemoteError::Transient(format!("request to {path} failed: {e}"))
        })
    }
}

/// Maps a non-success status to the port error
fn status_error(status: StatusCode, path: &str) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RemoteError::AccessDenied(format!("{status} for {path}"))
        }
        _ => RemoteError::Transient(format!("{status} for {path}")),
    }
}

#[async_trait::async_trait]
impl IBlobStore for HttpBlobStore {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        paths::validate(path)?;
        debug!(path, "GET object");

        let response = self.send(self.request(Method::GET, path), path).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(path, "Object not found");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(status, path));
        }

        let bytes = response.bytes().await.map_err(|e| {
            RemoteError::Transient(format!("failed to read body of {path}: {e}"))
        })?;
        debug!(path, bytes = bytes.len(), "Fetched object");
        Ok(Some(bytes.to_vec()))
    }

    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), RemoteError> {
        paths::validate(path)?;
        let size = bytes.len();
        let builder = self
            .request(Method::PUT, path)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);

        let response = self.send(builder, path).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, path));
        }
        debug!(path, bytes = size, "Stored object");
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        paths::validate(path)?;
        let response = self.send(self.request(Method::DELETE, path), path).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!(path, "Deleted object");
            return Ok(());
        }
        Err(status_error(status, path))
    }
}
