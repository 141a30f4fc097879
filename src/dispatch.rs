//! Method dispatch for resolved resource handles.
//!
//! | Resource      | HEAD         | GET      | POST / PUT | DELETE |
//! |---------------|--------------|----------|------------|--------|
//! | Service       | HeadIndex    | Index    | -          | -      |
//! | Bucket        | HeadIndex    | Index    | Create     | Delete |
//! | Object        | HeadDownload | Download | Upload     | Delete |
//! | Object prefix | HeadIndex    | Index    | -          | Delete |
//!
//! PUT is an alias of POST on buckets and objects. Every other combination
//! is answered with 405 and an `Allow` header.

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use futures::{StreamExt, TryStreamExt};
use http_body::Body as _;
use metrics::counter;
use std::io;
use std::time::SystemTime;
use tracing::debug;

use crate::errors::GatewayError;
use crate::listing::Listing;
use crate::metrics::GATEWAY_OPERATIONS_TOTAL;
use crate::resource::{
    CapabilityFuture, Create, Delete, Download, Index, ListingHead, Resource, Upload,
};
use crate::storage::backend::{ObjectBody, ObjectMeta, UploadBody};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// One named operation a resource handle can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Index,
    HeadIndex,
    Create,
    Delete,
    HeadDownload,
    Download,
    Upload,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Index => "index",
            Capability::HeadIndex => "head_index",
            Capability::Create => "create",
            Capability::Delete => "delete",
            Capability::HeadDownload => "head_download",
            Capability::Download => "download",
            Capability::Upload => "upload",
        }
    }
}

/// What a capability produced.
#[derive(Debug)]
pub enum Outcome {
    Listing(Listing),
    ListingHead(ListingHead),
    ObjectHead(ObjectMeta),
    Object(ObjectBody),
    Empty,
}

/// A capability invocation that succeeded.
#[derive(Debug)]
pub struct Dispatched {
    pub capability: Capability,
    pub outcome: Outcome,
}

/// Invoke the one capability `resource` offers for `method`.
///
/// `body` is only consumed by Upload, which streams it to the backend when
/// its declared length is at most `max_object_size`.
pub async fn dispatch(
    resource: &Resource,
    method: &Method,
    body: Body,
    max_object_size: u64,
) -> Result<Dispatched, GatewayError> {
    let (capability, call) = match (resource, method) {
        (Resource::Service(r), &Method::HEAD) => (Capability::HeadIndex, head_index(r)),
        (Resource::Service(r), &Method::GET) => (Capability::Index, index(r)),

        (Resource::Bucket(r), &Method::HEAD) => (Capability::HeadIndex, head_index(r)),
        (Resource::Bucket(r), &Method::GET) => (Capability::Index, index(r)),
        (Resource::Bucket(r), &Method::POST | &Method::PUT) => (Capability::Create, create(r)),
        (Resource::Bucket(r), &Method::DELETE) => (Capability::Delete, delete(r)),

        (Resource::Object(r), &Method::HEAD) => (Capability::HeadDownload, head_download(r)),
        (Resource::Object(r), &Method::GET) => (Capability::Download, download(r)),
        (Resource::Object(r), &Method::POST | &Method::PUT) => {
            (Capability::Upload, upload(r, body, max_object_size))
        }
        (Resource::Object(r), &Method::DELETE) => (Capability::Delete, delete(r)),

        (Resource::ObjectPrefix(r), &Method::HEAD) => (Capability::HeadIndex, head_index(r)),
        (Resource::ObjectPrefix(r), &Method::GET) => (Capability::Index, index(r)),
        (Resource::ObjectPrefix(r), &Method::DELETE) => (Capability::Delete, delete(r)),

        _ => {
            return Err(GatewayError::MethodNotAllowed {
                allow: resource.allow(),
            })
        }
    };

    let level = resource.level().as_str();
    debug!("dispatch {} {} -> {}", method, level, capability.as_str());

    let result = call.await;
    let status = if result.is_ok() { "ok" } else { "error" };
    counter!(
        GATEWAY_OPERATIONS_TOTAL,
        "level" => level,
        "capability" => capability.as_str(),
        "status" => status
    )
    .increment(1);

    result.map(|outcome| Dispatched {
        capability,
        outcome,
    })
}

fn index<R: Index>(resource: &R) -> CapabilityFuture<'_, Outcome> {
    Box::pin(async move { resource.index().await.map(Outcome::Listing) })
}

fn head_index<R: Index>(resource: &R) -> CapabilityFuture<'_, Outcome> {
    Box::pin(async move { resource.head_index().await.map(Outcome::ListingHead) })
}

fn create<R: Create>(resource: &R) -> CapabilityFuture<'_, Outcome> {
    Box::pin(async move { resource.create().await.map(|()| Outcome::Empty) })
}

fn delete<R: Delete>(resource: &R) -> CapabilityFuture<'_, Outcome> {
    Box::pin(async move { resource.delete().await.map(|()| Outcome::Empty) })
}

fn head_download<R: Download>(resource: &R) -> CapabilityFuture<'_, Outcome> {
    Box::pin(async move { resource.head_download().await.map(Outcome::ObjectHead) })
}

fn download<R: Download>(resource: &R) -> CapabilityFuture<'_, Outcome> {
    Box::pin(async move { resource.download().await.map(Outcome::Object) })
}

fn upload<R: Upload>(resource: &R, body: Body, limit: u64) -> CapabilityFuture<'_, Outcome> {
    Box::pin(async move {
        let body = upload_body(body, limit)?;
        resource.upload(body).await.map(|()| Outcome::Empty)
    })
}

/// Wrap a request body for streaming without reading any of it.
///
/// The length must be declared (`Content-Length`) and within `limit`.
fn upload_body(body: Body, limit: u64) -> Result<UploadBody, GatewayError> {
    let size = body
        .size_hint()
        .exact()
        .ok_or(GatewayError::LengthRequired)?;
    if size > limit {
        return Err(GatewayError::EntityTooLarge { size, limit });
    }
    let stream = body.into_data_stream().map_err(io::Error::other).boxed();
    Ok(UploadBody::new(size, stream))
}

// -- Response rendering ------------------------------------------------------

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self {
            Outcome::Listing(listing) => {
                ([(CONTENT_TYPE, TEXT_PLAIN)], listing.render()).into_response()
            }
            Outcome::ListingHead(head) => {
                let mut response = [(CONTENT_TYPE, TEXT_PLAIN)].into_response();
                response
                    .headers_mut()
                    .insert(CONTENT_LENGTH, HeaderValue::from(head.content_length));
                response
            }
            Outcome::ObjectHead(meta) => {
                let mut response = ().into_response();
                insert_meta_headers(response.headers_mut(), &meta);
                response
            }
            Outcome::Object(object) => {
                let mut response = Body::from_stream(object.stream).into_response();
                insert_meta_headers(response.headers_mut(), &object.meta);
                response
            }
            Outcome::Empty => ().into_response(),
        }
    }
}

fn insert_meta_headers(headers: &mut HeaderMap, meta: &ObjectMeta) {
    if let Some(len) = meta.content_length {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }
    if let Some(value) = meta
        .content_type
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
    {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Some(value) = meta
        .e_tag
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
    {
        headers.insert(ETAG, value);
    }
    if let Some(modified) = meta.last_modified {
        let date = httpdate::fmt_http_date(SystemTime::from(modified));
        if let Ok(value) = HeaderValue::from_str(&date) {
            headers.insert(LAST_MODIFIED, value);
        }
    }
}

// -- Tests -------------------------------------------------------------------
