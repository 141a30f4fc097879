//! In-memory storage backend for tests.
//!
//! Buckets and objects live in a `BTreeMap` behind a mutex so listings come
//! back in key order. Every call is appended to a log, which lets tests
//! assert exactly which backend operations a request triggered. Individual
//! operations can be forced to fail.

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream;
use futures::{StreamExt, TryStreamExt};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use super::backend::{
    BackendFactory, BackendFuture, BucketEntry, ObjectBody, ObjectEntry, ObjectMeta,
    StorageBackend, UploadBody,
};
use crate::auth::Credentials;

#[derive(Default)]
struct State {
    buckets: BTreeMap<String, BTreeMap<String, Bytes>>,
    calls: Vec<String>,
    failing: HashSet<&'static str>,
}

/// Recording in-memory backend.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

/// Fixed timestamp reported for every bucket and object.
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(self, bucket: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .buckets
            .entry(bucket.to_string())
            .or_default();
        self
    }

    pub fn with_object(self, bucket: &str, key: &str, data: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), Bytes::from(data.to_string()));
        self
    }

    /// Make every call to `operation` fail.
    pub fn fail_on(self, operation: &'static str) -> Self {
        self.state.lock().unwrap().failing.insert(operation);
        self
    }

    /// Operations invoked so far, formatted as `name(args)`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let state = self.state.lock().unwrap();
        state.buckets.get(bucket)?.get(key).cloned()
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.state.lock().unwrap().buckets.contains_key(bucket)
    }

    fn run<T>(
        &self,
        operation: &'static str,
        call: String,
        f: impl FnOnce(&mut State) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.failing.contains(operation) {
            anyhow::bail!("{operation} failed");
        }
        f(&mut state)
    }
}

fn no_such_bucket(bucket: &str) -> anyhow::Error {
    anyhow::anyhow!("NoSuchBucket: {bucket}")
}

impl StorageBackend for MemoryBackend {
    fn list_buckets(&self) -> BackendFuture<'_, Vec<BucketEntry>> {
        let result = self.run("list_buckets", "list_buckets()".to_string(), |state| {
            Ok(state
                .buckets
                .keys()
                .map(|name| BucketEntry {
                    name: name.clone(),
                    creation_date: Some(fixed_time()),
                })
                .collect())
        });
        Box::pin(async move { result })
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: Option<&'a str>,
    ) -> BackendFuture<'a, Vec<ObjectEntry>> {
        let call = format!("list_objects({bucket}, {prefix:?})");
        let result = self.run("list_objects", call, |state| {
            let objects = state.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
            Ok(objects
                .iter()
                .filter(|(key, _)| prefix.map_or(true, |p| key.starts_with(p)))
                .map(|(key, data)| ObjectEntry {
                    key: key.clone(),
                    size: Some(data.len() as i64),
                    last_modified: Some(fixed_time()),
                })
                .collect())
        });
        Box::pin(async move { result })
    }

    fn create_bucket<'a>(&'a self, bucket: &'a str) -> BackendFuture<'a, ()> {
        let result = self.run("create_bucket", format!("create_bucket({bucket})"), |state| {
            if state.buckets.contains_key(bucket) {
                anyhow::bail!("BucketAlreadyOwnedByYou: {bucket}");
            }
            state.buckets.insert(bucket.to_string(), BTreeMap::new());
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn delete_bucket<'a>(&'a self, bucket: &'a str) -> BackendFuture<'a, ()> {
        let result = self.run("delete_bucket", format!("delete_bucket({bucket})"), |state| {
            let Some(objects) = state.buckets.get(bucket) else {
                return Err(no_such_bucket(bucket));
            };
            if !objects.is_empty() {
                anyhow::bail!("BucketNotEmpty: {bucket}");
            }
            state.buckets.remove(bucket);
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn head_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> BackendFuture<'a, ObjectMeta> {
        let result = self.run("head_object", format!("head_object({bucket}, {key})"), |state| {
            let data = state
                .buckets
                .get(bucket)
                .ok_or_else(|| no_such_bucket(bucket))?
                .get(key)
                .ok_or_else(|| anyhow::anyhow!("NoSuchKey: {key}"))?;
            Ok(meta_for(data))
        });
        Box::pin(async move { result })
    }

    fn get_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> BackendFuture<'a, ObjectBody> {
        let result = self.run("get_object", format!("get_object({bucket}, {key})"), |state| {
            let data = state
                .buckets
                .get(bucket)
                .ok_or_else(|| no_such_bucket(bucket))?
                .get(key)
                .ok_or_else(|| anyhow::anyhow!("NoSuchKey: {key}"))?
                .clone();
            let meta = meta_for(&data);
            // Split into two chunks to exercise streaming.
            let mid = data.len() / 2;
            let chunks = vec![Ok(data.slice(..mid)), Ok(data.slice(mid..))];
            Ok(ObjectBody {
                meta,
                stream: stream::iter(chunks).boxed(),
            })
        });
        Box::pin(async move { result })
    }

    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: UploadBody,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let UploadBody {
                content_length,
                stream,
            } = body;
            let data: Vec<u8> = stream.map_ok(|chunk| chunk.to_vec()).try_concat().await?;
            if data.len() as u64 != content_length {
                anyhow::bail!(
                    "IncompleteBody: expected {content_length} bytes, got {}",
                    data.len()
                );
            }
            let call = format!("put_object({bucket}, {key}, {content_length} bytes)");
            self.run("put_object", call, |state| {
                state
                    .buckets
                    .get_mut(bucket)
                    .ok_or_else(|| no_such_bucket(bucket))?
                    .insert(key.to_string(), Bytes::from(data));
                Ok(())
            })
        })
    }

    fn delete_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> BackendFuture<'a, ()> {
        let call = format!("delete_object({bucket}, {key})");
        let result = self.run("delete_object", call, |state| {
            // Deleting a missing key succeeds, as in S3.
            state
                .buckets
                .get_mut(bucket)
                .ok_or_else(|| no_such_bucket(bucket))?
                .remove(key);
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn delete_objects<'a>(
        &'a self,
        bucket: &'a str,
        keys: Vec<String>,
    ) -> BackendFuture<'a, ()> {
        let call = format!("delete_objects({bucket}, {keys:?})");
        let result = self.run("delete_objects", call, |state| {
            let objects = state
                .buckets
                .get_mut(bucket)
                .ok_or_else(|| no_such_bucket(bucket))?;
            for key in &keys {
                objects.remove(key);
            }
            Ok(())
        });
        Box::pin(async move { result })
    }
}

fn meta_for(data: &Bytes) -> ObjectMeta {
    ObjectMeta {
        content_length: Some(data.len() as i64),
        content_type: Some("application/octet-stream".to_string()),
        e_tag: Some("\"etag\"".to_string()),
        last_modified: Some(fixed_time()),
    }
}

/// One `make_backend` call as seen by [`MemoryBackendFactory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryCall {
    pub endpoint: String,
    pub region: String,
    pub credentials: Option<Credentials>,
}

/// Factory handing out one shared [`MemoryBackend`] and recording its inputs.
pub struct MemoryBackendFactory {
    backend: Arc<MemoryBackend>,
    calls: Mutex<Vec<FactoryCall>>,
    fail: bool,
}

impl MemoryBackendFactory {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self {
            backend,
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// A factory whose every construction attempt fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Arc::new(MemoryBackend::new()))
        }
    }

    pub fn calls(&self) -> Vec<FactoryCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl BackendFactory for MemoryBackendFactory {
    fn make_backend<'a>(
        &'a self,
        endpoint: &'a str,
        region: &'a str,
        credentials: Option<Credentials>,
    ) -> BackendFuture<'a, Arc<dyn StorageBackend>> {
        self.calls.lock().unwrap().push(FactoryCall {
            endpoint: endpoint.to_string(),
            region: region.to_string(),
            credentials,
        });
        let result = if self.fail {
            Err(anyhow::anyhow!("invalid endpoint {endpoint:?}"))
        } else {
            Ok(self.backend.clone() as Arc<dyn StorageBackend>)
        };
        Box::pin(async move { result })
    }
}
