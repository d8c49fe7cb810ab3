//! SQLite-backed store of versioned cache instances.
//!
//! This module provides a persistent request/response cache using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Named cache instances, one per deployable version
//! - Request-keyed entries addressed by SHA-256 of method and URL
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Cascade deletion of an instance's entries

pub mod connection;
pub mod entries;
pub mod hash;
pub mod instances;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CacheEntry;
pub use instances::CacheIdentity;
