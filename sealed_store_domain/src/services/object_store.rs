// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Object Store Port
//!
//! Infrastructure port for the object-store service the encryption layer
//! wraps. The wire protocol, request signing, retries, and backoff all live
//! behind this trait; the crypto layer sees buckets, keys, metadata maps,
//! and byte streams, nothing else.
//!
//! ## Contract Notes
//!
//! - `put_object` may retry internally; the body stream it receives
//!   supports bounded rewind to an anchor (see the caching encrypt stream),
//!   so a retry never forces plaintext to be re-read.
//! - `get_object` with a range returns exactly the ciphertext bytes of that
//!   range; range math against the trailing auth tag is the crypto layer's
//!   job.
//! - Transport errors surface as `StoreError` with the transport's own
//!   message preserved. This layer never retries them.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ClientError;
use crate::value_objects::StringMap;

/// Object metadata map (header name → value). Values pass through this
/// layer untouched; any HTTP-level encoding is the transport's concern.
pub type ObjectMetadata = StringMap;

/// Well-known metadata entry reporting the stored object's byte length.
/// Implementations populate it on `get_object` and `get_object_metadata`;
/// ranged decryption depends on it to locate the trailing auth tag.
pub const CONTENT_LENGTH_KEY: &str = "content-length";

/// Inclusive byte range `[start, end]` of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Result<Self, ClientError> {
        if end < start {
            return Err(ClientError::invalid_argument(format!(
                "byte range end {} precedes start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// A readable object body handed across the port boundary.
///
/// Bodies are single-reader streams. Helpers exist for the common test and
/// sidecar cases where the whole body is small enough to buffer.
pub struct ObjectBody {
    inner: Box<dyn AsyncRead + Send + Unpin>,
}

impl std::fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBody").finish_non_exhaustive()
    }
}

impl ObjectBody {
    pub fn new(reader: Box<dyn AsyncRead + Send + Unpin>) -> Self {
        Self { inner: reader }
    }

    /// Wraps an in-memory buffer as a body.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            inner: Box::new(std::io::Cursor::new(bytes)),
        }
    }

    pub fn into_inner(self) -> Box<dyn AsyncRead + Send + Unpin> {
        self.inner
    }

    /// Reads the body to completion. Intended for envelopes and sidecar
    /// objects, which are small; object content goes through the streaming
    /// wrappers instead.
    pub async fn collect(mut self) -> Result<Vec<u8>, ClientError> {
        let mut buffer = Vec::new();
        self.inner.read_to_end(&mut buffer).await?;
        Ok(buffer)
    }
}

impl AsyncRead for ObjectBody {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// One part of a multipart upload as reported by `list_parts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    pub part_number: u64,
    pub etag: String,
    pub size: u64,
}

/// Port to the object-store service. Implementations own transport,
/// signing, and retry behavior.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads an object; returns the store's etag.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
        body: ObjectBody,
    ) -> Result<String, ClientError>;

    /// Downloads an object, optionally a byte range of it.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<(ObjectMetadata, ObjectBody), ClientError>;

    /// Starts a multipart upload; returns the upload id.
    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String, ClientError>;

    /// Uploads one part; returns the part's etag.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u64,
        body: ObjectBody,
        is_last: bool,
    ) -> Result<String, ClientError>;

    /// Completes a multipart upload from `(part_number, etag)` pairs.
    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[(u64, String)],
    ) -> Result<(), ClientError>;

    /// Aborts a multipart upload, discarding stored parts.
    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> Result<(), ClientError>;

    /// Lists the parts uploaded so far.
    async fn list_parts(&self, bucket: &str, key: &str, upload_id: &str) -> Result<Vec<PartInfo>, ClientError>;

    /// Fetches object metadata without the body.
    async fn get_object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, ClientError>;
}
