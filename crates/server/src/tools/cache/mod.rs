//! Cache inspection tools.
//!
//! Read-only views of the store: one entry, one instance, or the whole
//! worker status.

pub mod get;
pub mod list;
pub mod status;

pub use get::{CacheGetParams, get_impl};
pub use list::{CacheListParams, list_impl};
pub use status::status_impl;
