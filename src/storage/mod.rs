//! Storage backends.
//!
//! The [`backend::StorageBackend`] trait abstracts over the remote
//! S3-compatible service. [`aws::S3BackendFactory`] builds real clients with
//! the AWS SDK; the in-memory backend exists for tests.

pub mod aws;
pub mod backend;
#[cfg(test)]
pub mod memory;
