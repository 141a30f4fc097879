//! S3 storage backend built on the AWS SDK.
//!
//! [`S3BackendFactory`] builds a fresh [`aws_sdk_s3::Client`] for every
//! request, pointed at the endpoint and region taken from the URL path.
//! Bucket addressing is always path-style, so any S3-compatible service
//! (MinIO, Ceph, LocalStack, ...) works without wildcard DNS.
//!
//! Credentials come only from the request. When none were supplied the
//! client is built with `no_credentials()` and requests go out unsigned.

use aws_sdk_s3::config::{BehaviorVersion, Credentials as AwsCredentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::{ByteStream, DateTime as AwsDateTime};
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier,
};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::ready;
use futures::stream::BoxStream;
use futures::StreamExt;
use http_body::{Frame, SizeHint};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::backend::{
    BackendFactory, BackendFuture, BucketEntry, ObjectBody, ObjectEntry, ObjectMeta,
    StorageBackend, UploadBody,
};
use crate::auth::Credentials;

/// Region in which S3 rejects an explicit location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Provider name attached to credentials taken from a request.
const CREDENTIALS_PROVIDER: &str = "s3-path-proxy-request";

/// Builds [`S3Backend`]s. Holds no state; every call creates a new client.
#[derive(Debug, Clone, Copy, Default)]
pub struct S3BackendFactory;

impl BackendFactory for S3BackendFactory {
    fn make_backend<'a>(
        &'a self,
        endpoint: &'a str,
        region: &'a str,
        credentials: Option<Credentials>,
    ) -> BackendFuture<'a, Arc<dyn StorageBackend>> {
        Box::pin(async move {
            let backend = S3Backend::connect(endpoint, region, credentials).await?;
            Ok(Arc::new(backend) as Arc<dyn StorageBackend>)
        })
    }
}

/// Backend that forwards every operation to one S3-compatible endpoint.
pub struct S3Backend {
    client: Client,
    region: String,
}

impl S3Backend {
    /// Build a client for `endpoint` in `region`.
    ///
    /// `endpoint` may carry an `http://` or `https://` scheme; without one,
    /// `https://` is assumed.
    pub async fn connect(
        endpoint: &str,
        region: &str,
        credentials: Option<Credentials>,
    ) -> anyhow::Result<Self> {
        let endpoint_url = endpoint_url(endpoint);
        let uri: http::Uri = endpoint_url
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid endpoint {endpoint_url:?}: {e}"))?;
        if uri.host().is_none() {
            anyhow::bail!("invalid endpoint {endpoint_url:?}: missing host");
        }

        let mut config_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .endpoint_url(&endpoint_url);

        config_loader = match credentials {
            Some(creds) => config_loader.credentials_provider(AwsCredentials::new(
                creds.access_key,
                creds.secret_key,
                None, // session_token
                None, // expiry
                CREDENTIALS_PROVIDER,
            )),
            None => config_loader.no_credentials(),
        };

        let sdk_config = config_loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        debug!("S3 client built: endpoint={} region={}", endpoint_url, region);

        Ok(Self {
            client: Client::from_conf(s3_config),
            region: region.to_string(),
        })
    }
}

/// HTTP body of known length fed from an upload stream.
///
/// The SDK needs a `Sync` body with an exact size hint; the stream is
/// only `Send`, so it sits behind a mutex that is never locked, only
/// reached through `&mut`.
struct SizedStreamBody {
    stream: Mutex<BoxStream<'static, io::Result<Bytes>>>,
    remaining: u64,
}

impl SizedStreamBody {
    fn new(body: UploadBody) -> Self {
        Self {
            stream: Mutex::new(body.stream),
            remaining: body.content_length,
        }
    }
}

impl http_body::Body for SizedStreamBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
        let this = self.get_mut();
        let stream = match this.stream.get_mut() {
            Ok(stream) => stream,
            Err(_) => return Poll::Ready(Some(Err(io::Error::other("upload stream poisoned")))),
        };
        match ready!(stream.poll_next_unpin(cx)) {
            Some(Ok(chunk)) => {
                this.remaining = this.remaining.saturating_sub(chunk.len() as u64);
                Poll::Ready(Some(Ok(Frame::data(chunk))))
            }
            Some(Err(err)) => Poll::Ready(Some(Err(err))),
            None => Poll::Ready(None),
        }
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining)
    }
}

/// Turn an endpoint token from the path into a full URL.
pub fn endpoint_url(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}

/// Map an AWS SDK error to an anyhow error carrying the full error chain.
fn map_sdk_error<E: std::error::Error>(context: &str, err: E) -> anyhow::Error {
    anyhow::anyhow!("S3 {context}: {}", DisplayErrorContext(err))
}

fn to_chrono(dt: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

impl StorageBackend for S3Backend {
    fn list_buckets(&self) -> BackendFuture<'_, Vec<BucketEntry>> {
        Box::pin(async move {
            debug!("S3 list_buckets");

            // TODO: follow continuation tokens once listings are paginated.
            let resp = self
                .client
                .list_buckets()
                .send()
                .await
                .map_err(|e| map_sdk_error("list_buckets", e))?;

            Ok(resp
                .buckets()
                .iter()
                .map(|b| BucketEntry {
                    name: b.name().unwrap_or_default().to_string(),
                    creation_date: b.creation_date().and_then(to_chrono),
                })
                .collect())
        })
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: Option<&'a str>,
    ) -> BackendFuture<'a, Vec<ObjectEntry>> {
        Box::pin(async move {
            debug!("S3 list_objects: bucket={} prefix={:?}", bucket, prefix);

            let resp = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_prefix(prefix.map(str::to_string))
                .send()
                .await
                .map_err(|e| map_sdk_error("list_objects_v2", e))?;

            if resp.is_truncated() == Some(true) {
                warn!(
                    "S3 listing of {} truncated after {} keys",
                    bucket,
                    resp.contents().len()
                );
            }

            Ok(resp
                .contents()
                .iter()
                .map(|o| ObjectEntry {
                    key: o.key().unwrap_or_default().to_string(),
                    size: o.size(),
                    last_modified: o.last_modified().and_then(to_chrono),
                })
                .collect())
        })
    }

    fn create_bucket<'a>(&'a self, bucket: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            debug!("S3 create_bucket: bucket={} region={}", bucket, self.region);

            let mut req = self.client.create_bucket().bucket(bucket);
            if self.region != DEFAULT_REGION {
                req = req.create_bucket_configuration(
                    CreateBucketConfiguration::builder()
                        .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                        .build(),
                );
            }

            req.send()
                .await
                .map_err(|e| map_sdk_error("create_bucket", e))?;
            Ok(())
        })
    }

    fn delete_bucket<'a>(&'a self, bucket: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            debug!("S3 delete_bucket: bucket={}", bucket);

            self.client
                .delete_bucket()
                .bucket(bucket)
                .send()
                .await
                .map_err(|e| map_sdk_error("delete_bucket", e))?;
            Ok(())
        })
    }

    fn head_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> BackendFuture<'a, ObjectMeta> {
        Box::pin(async move {
            debug!("S3 head_object: bucket={} key={}", bucket, key);

            let resp = self
                .client
                .head_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| map_sdk_error("head_object", e))?;

            Ok(ObjectMeta {
                content_length: resp.content_length(),
                content_type: resp.content_type().map(str::to_string),
                e_tag: resp.e_tag().map(str::to_string),
                last_modified: resp.last_modified().and_then(to_chrono),
            })
        })
    }

    fn get_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> BackendFuture<'a, ObjectBody> {
        Box::pin(async move {
            debug!("S3 get_object: bucket={} key={}", bucket, key);

            let resp = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| map_sdk_error("get_object", e))?;

            let meta = ObjectMeta {
                content_length: resp.content_length(),
                content_type: resp.content_type().map(str::to_string),
                e_tag: resp.e_tag().map(str::to_string),
                last_modified: resp.last_modified().and_then(to_chrono),
            };
            let stream = ReaderStream::new(resp.body.into_async_read()).boxed();

            Ok(ObjectBody { meta, stream })
        })
    }

    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: UploadBody,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            debug!(
                "S3 put_object: bucket={} key={} bytes={}",
                bucket, key, body.content_length
            );

            let content_length = i64::try_from(body.content_length).map_err(|_| {
                anyhow::anyhow!("upload of {} bytes is too large", body.content_length)
            })?;

            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .content_length(content_length)
                .body(ByteStream::from_body_1_x(SizedStreamBody::new(body)))
                .send()
                .await
                .map_err(|e| map_sdk_error("put_object", e))?;
            Ok(())
        })
    }

    fn delete_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            debug!("S3 delete_object: bucket={} key={}", bucket, key);

            self.client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| map_sdk_error("delete_object", e))?;
            Ok(())
        })
    }

    fn delete_objects<'a>(
        &'a self,
        bucket: &'a str,
        keys: Vec<String>,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            debug!("S3 delete_objects: bucket={} keys={}", bucket, keys.len());

            let objects = keys
                .into_iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| map_sdk_error("delete_objects build", e))?;

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| map_sdk_error("delete_objects build", e))?;

            let resp = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| map_sdk_error("delete_objects", e))?;

            // Quiet mode reports only the keys that failed.
            let failed = resp.errors();
            if let Some(first) = failed.first() {
                anyhow::bail!(
                    "S3 delete_objects: {} key(s) not deleted, first {:?}: {} {}",
                    failed.len(),
                    first.key().unwrap_or_default(),
                    first.code().unwrap_or_default(),
                    first.message().unwrap_or_default()
                );
            }
            Ok(())
        })
    }
}

// -- Tests -------------------------------------------------------------------
