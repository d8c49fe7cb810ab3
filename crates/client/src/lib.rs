//! Network client for precache.
//!
//! This crate provides the HTTP layer behind the proxy: a `reqwest` client
//! implementing `precache_core::Network`, plus URL resolution shared by the
//! server.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig, UrlError, canonicalize, resolve};
