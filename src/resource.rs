//! Capability-scoped resource handles.
//!
//! Each handle wraps the backend context of the level above it plus one
//! discriminator:
//!
//! ```text
//! ServiceResource { backend }
//!   └─ BucketResource { service, bucket }
//!        ├─ ObjectResource { bucket, key }
//!        └─ ObjectPrefixResource { bucket, prefix }
//! ```
//!
//! What a handle may do is fixed by the capability traits it implements:
//!
//! | Handle                 | Index | Create | Delete | Download | Upload |
//! |------------------------|:-----:|:------:|:------:|:--------:|:------:|
//! | `ServiceResource`      |   x   |        |        |          |        |
//! | `BucketResource`       |   x   |   x    |   x    |          |        |
//! | `ObjectResource`       |       |        |   x    |    x     |   x    |
//! | `ObjectPrefixResource` |   x   |        |   x    |          |        |
//!
//! Handles are built per request and dropped with it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

use crate::errors::GatewayError;
use crate::grammar::{Level, PathMatch};
use crate::listing::Listing;
use crate::storage::backend::{ObjectBody, ObjectMeta, StorageBackend, UploadBody};

/// Boxed future returned by every capability.
pub type CapabilityFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, GatewayError>> + Send + 'a>>;

/// Headers-only view of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingHead {
    /// Byte length of the rendered listing.
    pub content_length: usize,
}

// -- Capabilities ------------------------------------------------------------

pub trait Index: Send + Sync {
    fn index(&self) -> CapabilityFuture<'_, Listing>;

    /// Compute the listing but keep only its size.
    fn head_index(&self) -> CapabilityFuture<'_, ListingHead> {
        Box::pin(async move {
            let listing = self.index().await?;
            Ok(ListingHead {
                content_length: listing.render().len(),
            })
        })
    }
}

pub trait Create: Send + Sync {
    fn create(&self) -> CapabilityFuture<'_, ()>;
}

pub trait Delete: Send + Sync {
    fn delete(&self) -> CapabilityFuture<'_, ()>;
}

pub trait Download: Send + Sync {
    fn head_download(&self) -> CapabilityFuture<'_, ObjectMeta>;
    fn download(&self) -> CapabilityFuture<'_, ObjectBody>;
}

pub trait Upload: Send + Sync {
    fn upload(&self, body: UploadBody) -> CapabilityFuture<'_, ()>;
}

// -- Handles -----------------------------------------------------------------

#[derive(Clone)]
pub struct ServiceResource {
    backend: Arc<dyn StorageBackend>,
}

impl ServiceResource {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }
}

#[derive(Clone)]
pub struct BucketResource {
    service: ServiceResource,
    bucket: String,
}

impl BucketResource {
    pub fn new(service: ServiceResource, bucket: impl Into<String>) -> Self {
        Self {
            service,
            bucket: bucket.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.bucket
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.service.backend()
    }
}

#[derive(Clone)]
pub struct ObjectResource {
    bucket: BucketResource,
    key: String,
}

impl ObjectResource {
    pub fn new(bucket: BucketResource, key: impl Into<String>) -> Self {
        Self {
            bucket,
            key: key.into(),
        }
    }

    pub fn bucket(&self) -> &BucketResource {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Clone)]
pub struct ObjectPrefixResource {
    bucket: BucketResource,
    prefix: String,
}

impl ObjectPrefixResource {
    pub fn new(bucket: BucketResource, prefix: impl Into<String>) -> Self {
        Self {
            bucket,
            prefix: prefix.into(),
        }
    }

    pub fn bucket(&self) -> &BucketResource {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

// -- Capability implementations ----------------------------------------------

impl Index for ServiceResource {
    fn index(&self) -> CapabilityFuture<'_, Listing> {
        Box::pin(async move {
            let buckets = self
                .backend()
                .list_buckets()
                .await
                .map_err(GatewayError::Backend)?;
            Ok(Listing::from_buckets(buckets))
        })
    }
}

impl Index for BucketResource {
    fn index(&self) -> CapabilityFuture<'_, Listing> {
        Box::pin(async move {
            let objects = self
                .backend()
                .list_objects(&self.bucket, None)
                .await
                .map_err(GatewayError::Backend)?;
            Ok(Listing::from_objects(objects))
        })
    }
}

impl Create for BucketResource {
    fn create(&self) -> CapabilityFuture<'_, ()> {
        Box::pin(async move {
            self.backend()
                .create_bucket(&self.bucket)
                .await
                .map_err(GatewayError::Backend)
        })
    }
}

impl Delete for BucketResource {
    fn delete(&self) -> CapabilityFuture<'_, ()> {
        Box::pin(async move {
            self.backend()
                .delete_bucket(&self.bucket)
                .await
                .map_err(GatewayError::Backend)
        })
    }
}

impl Download for ObjectResource {
    fn head_download(&self) -> CapabilityFuture<'_, ObjectMeta> {
        Box::pin(async move {
            self.bucket
                .backend()
                .head_object(self.bucket.name(), &self.key)
                .await
                .map_err(GatewayError::Backend)
        })
    }

    fn download(&self) -> CapabilityFuture<'_, ObjectBody> {
        Box::pin(async move {
            self.bucket
                .backend()
                .get_object(self.bucket.name(), &self.key)
                .await
                .map_err(GatewayError::Backend)
        })
    }
}

impl Upload for ObjectResource {
    fn upload(&self, body: UploadBody) -> CapabilityFuture<'_, ()> {
        Box::pin(async move {
            self.bucket
                .backend()
                .put_object(self.bucket.name(), &self.key, body)
                .await
                .map_err(GatewayError::Backend)
        })
    }
}

impl Delete for ObjectResource {
    fn delete(&self) -> CapabilityFuture<'_, ()> {
        Box::pin(async move {
            self.bucket
                .backend()
                .delete_object(self.bucket.name(), &self.key)
                .await
                .map_err(GatewayError::Backend)
        })
    }
}

impl Index for ObjectPrefixResource {
    fn index(&self) -> CapabilityFuture<'_, Listing> {
        Box::pin(async move {
            let objects = self
                .bucket
                .backend()
                .list_objects(self.bucket.name(), Some(self.prefix.as_str()))
                .await
                .map_err(GatewayError::Backend)?;
            Ok(Listing::from_objects(objects))
        })
    }
}

impl Delete for ObjectPrefixResource {
    /// Delete every object under the prefix with one batch call.
    ///
    /// A failed enumeration aborts before anything is deleted. An empty
    /// enumeration skips the batch call and succeeds.
    fn delete(&self) -> CapabilityFuture<'_, ()> {
        Box::pin(async move {
            let backend = self.bucket.backend();
            let keys: Vec<String> = backend
                .list_objects(self.bucket.name(), Some(self.prefix.as_str()))
                .await
                .map_err(GatewayError::Backend)?
                .into_iter()
                .map(|o| o.key)
                .collect();

            if keys.is_empty() {
                debug!(
                    "no objects under {}/{}, skipping batch delete",
                    self.bucket.name(),
                    self.prefix
                );
                return Ok(());
            }

            backend
                .delete_objects(self.bucket.name(), keys)
                .await
                .map_err(GatewayError::Backend)
        })
    }
}

// -- Resource ----------------------------------------------------------------

/// The handle a request resolved to.
pub enum Resource {
    Service(ServiceResource),
    Bucket(BucketResource),
    Object(ObjectResource),
    ObjectPrefix(ObjectPrefixResource),
}

impl Resource {
    /// Wrap `backend` in the handle implied by `path`.
    pub fn from_match(path: PathMatch, backend: Arc<dyn StorageBackend>) -> Self {
        let service = ServiceResource::new(backend);
        match path {
            PathMatch::Service { .. } => Resource::Service(service),
            PathMatch::Bucket { bucket, .. } => {
                Resource::Bucket(BucketResource::new(service, bucket))
            }
            PathMatch::Object { bucket, object, .. } => Resource::Object(ObjectResource::new(
                BucketResource::new(service, bucket),
                object,
            )),
            PathMatch::ObjectPrefix { bucket, prefix, .. } => Resource::ObjectPrefix(
                ObjectPrefixResource::new(BucketResource::new(service, bucket), prefix),
            ),
        }
    }

    pub fn level(&self) -> Level {
        match self {
            Resource::Service(_) => Level::Service,
            Resource::Bucket(_) => Level::Bucket,
            Resource::Object(_) => Level::Object,
            Resource::ObjectPrefix(_) => Level::ObjectPrefix,
        }
    }

    /// Methods accepted at this level, formatted for an `Allow` header.
    pub fn allow(&self) -> &'static str {
        match self {
            Resource::Service(_) => "GET, HEAD",
            Resource::Bucket(_) | Resource::Object(_) => "GET, HEAD, POST, PUT, DELETE",
            Resource::ObjectPrefix(_) => "GET, HEAD, DELETE",
        }
    }
}

// -- Tests -------------------------------------------------------------------
