//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the synchronization core depends on; their
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ILocalStore`] - Durable, indexed record store on this device
//! - [`IBlobStore`] - Path-addressed remote object store

pub mod blob_store;
pub mod local_store;

pub use blob_store::{IBlobStore, RemoteError};
pub use local_store::{ILocalStore, RecordFilter, StoreError};
