//! Abstract storage backend and backend factory traits.
//!
//! The gateway consumes an S3-compatible service through
//! [`StorageBackend`]. A backend is bound to one endpoint/region/credential
//! triple and is produced per request by a [`BackendFactory`]. Both traits
//! are object-safe so the router can hold an `Arc<dyn BackendFactory>`.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::auth::Credentials;

/// Boxed future returned by every backend call.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// One bucket as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEntry {
    pub name: String,
    pub creation_date: Option<DateTime<Utc>>,
}

/// One object row in a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    /// Absent for synthetic rows such as common prefixes.
    pub size: Option<i64>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Object metadata returned without the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    pub content_length: Option<i64>,
    pub content_type: Option<String>,
    pub e_tag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Object metadata plus a byte stream over its contents.
///
/// Dropping the stream releases the underlying backend connection.
pub struct ObjectBody {
    pub meta: ObjectMeta,
    pub stream: BoxStream<'static, std::io::Result<Bytes>>,
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Upload payload: a byte stream of exactly `content_length` bytes.
///
/// The stream is handed to the backend as it arrives from the client; it is
/// never collected in the gateway.
pub struct UploadBody {
    pub content_length: u64,
    pub stream: BoxStream<'static, std::io::Result<Bytes>>,
}

impl UploadBody {
    pub fn new(content_length: u64, stream: BoxStream<'static, std::io::Result<Bytes>>) -> Self {
        Self {
            content_length,
            stream,
        }
    }

    /// Single-chunk body over `data`.
    pub fn from_bytes(data: Bytes) -> Self {
        let content_length = data.len() as u64;
        Self::new(content_length, futures::stream::once(async move { Ok(data) }).boxed())
    }
}

impl fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Async S3-compatible storage contract.
pub trait StorageBackend: Send + Sync + 'static {
    /// Enumerate all buckets visible to the backend's credentials.
    fn list_buckets(&self) -> BackendFuture<'_, Vec<BucketEntry>>;

    /// Enumerate objects in `bucket`, optionally restricted to keys starting with `prefix`.
    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: Option<&'a str>,
    ) -> BackendFuture<'a, Vec<ObjectEntry>>;

    /// Create `bucket`.
    fn create_bucket<'a>(&'a self, bucket: &'a str) -> BackendFuture<'a, ()>;

    /// Delete `bucket`.
    fn delete_bucket<'a>(&'a self, bucket: &'a str) -> BackendFuture<'a, ()>;

    /// Fetch metadata for `bucket`/`key` without the body.
    fn head_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> BackendFuture<'a, ObjectMeta>;

    /// Open `bucket`/`key` for streaming.
    fn get_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> BackendFuture<'a, ObjectBody>;

    /// Stream `body` to `bucket`/`key`, replacing any existing value.
    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: UploadBody,
    ) -> BackendFuture<'a, ()>;

    /// Delete `bucket`/`key`.
    fn delete_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> BackendFuture<'a, ()>;

    /// Delete exactly `keys` from `bucket` in a single batch call.
    fn delete_objects<'a>(&'a self, bucket: &'a str, keys: Vec<String>)
        -> BackendFuture<'a, ()>;
}

/// Builds a [`StorageBackend`] scoped to one endpoint/region/credential triple.
///
/// The gateway calls this once per request and never reuses the result. An
/// implementation that wants to cache clients can do so behind this trait,
/// keyed on all three inputs.
pub trait BackendFactory: Send + Sync + 'static {
    fn make_backend<'a>(
        &'a self,
        endpoint: &'a str,
        region: &'a str,
        credentials: Option<Credentials>,
    ) -> BackendFuture<'a, Arc<dyn StorageBackend>>;
}
