//! Core types and shared functionality for precache.
//!
//! This crate provides:
//! - Versioned cache store with SQLite backend
//! - Request eligibility policy and cache-first fetch strategy
//! - Install/activate lifecycle and the worker state machine
//! - Unified error types
//! - Configuration structures

pub mod activation;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod network;
pub mod policy;
pub mod strategy;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use activation::{ActivationController, ControlMessage};
pub use cache::{CacheDb, CacheEntry, CacheIdentity};
pub use config::AppConfig;
pub use error::Error;
pub use http::{ProxyRequest, ProxyResponse, RequestMode, ResponseKind};
pub use lifecycle::LifecycleManager;
pub use network::Network;
pub use policy::{BypassReason, Eligibility, EligibilityFilter};
pub use strategy::{FetchStrategy, Served, ServedFrom};
pub use worker::{Worker, WorkerEvent, WorkerOutcome, WorkerState};
