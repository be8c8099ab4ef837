//! Integration tests for keepsync-remote
//!
//! Uses wiremock to simulate the remote object store and verifies the
//! HttpBlobStore status mapping and the RemoteFacade envelopes over HTTP.

mod common;

mod test_blob_store;
mod test_facade;
