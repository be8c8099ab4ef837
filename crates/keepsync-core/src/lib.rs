//! KeepSync Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Record`, `Snapshot`, `DeviceMarker`, `SyncReport`
//! - **Port definitions** - Traits for adapters: `ILocalStore`, `IBlobStore`
//! - **Key derivation** - Content-addressed record keys and opaque owner ids
//! - **Validation** - Declarative required-field rules per dataset
//! - **Configuration** - YAML configuration with validation and a builder
//!
//! # Architecture
//!
//! The domain module contains pure data types with no I/O. Ports define
//! trait interfaces that the cache and remote adapter crates implement;
//! the sync crate orchestrates them.

pub mod config;
pub mod domain;
pub mod keys;
pub mod ports;
pub mod validation;
