//! s3-path-proxy library: a path-addressed HTTP gateway to S3-compatible
//! object storage.
//!
//! A request path names the target service, region, bucket and object key
//! (`/{endpoint}/{region}/{bucket}/{key}`). The gateway translates the HTTP
//! method into a storage operation on that resource and streams the result
//! back as plain text or raw object bytes.

use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod grammar;
pub mod listing;
pub mod metrics;
pub mod resource;
pub mod server;
pub mod storage;

use crate::config::Config;
use crate::storage::backend::BackendFactory;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Builds a storage backend per request from the path's endpoint and region.
    pub factory: Arc<dyn BackendFactory>,
}
