// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Multipart Upload Pipeline
//!
//! Encrypting multipart uploads share one GCM message across all parts:
//! the cipher state created at initiate is borrowed by each part in turn
//! and the authentication tag flushes with the final part. Re-creating the
//! state between parts would corrupt the tag, so the per-upload context
//! owns it and parts check it out one at a time.
//!
//! The registry holds every in-flight upload in a single map keyed by
//! upload id, with a lightweight request-handle index resolving to upload
//! ids; both live behind one mutex and are inserted and removed together.
//!
//! Part numbers must arrive contiguously from 1. A part that overlaps
//! another part of the same upload, or arrives after the final part, is a
//! caller error surfaced as `ProtocolViolation`. Abort and upload failure
//! drop the context, zeroizing the CEK and discarding buffered state.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tracing::debug;

use sealed_store_domain::{
    CancellationToken, ClientError, ObjectBody, ObjectMetadata, PartInfo, StorageMode, UploadPartContext,
};

use crate::infrastructure::adapters::encrypt_stream::GcmEncryptState;
use crate::infrastructure::services::envelope_format as envelope;

use super::encryption_client::{prepare_encrypt_keys, EncryptionClient, PutOptions};

/// Handle returned by an encrypting initiate: the store's upload id plus a
/// process-local request handle that also resolves the upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartUploadHandle {
    pub upload_id: String,
    pub request_handle: u64,
}

type Context = UploadPartContext<GcmEncryptState>;

struct Registry {
    by_upload_id: HashMap<String, Context>,
    by_handle: HashMap<u64, String>,
    next_handle: u64,
}

/// In-flight upload contexts. Both indexes mutate together under one lock.
pub(crate) struct MultipartRegistry {
    inner: Mutex<Registry>,
}

impl MultipartRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Registry {
                by_upload_id: HashMap::new(),
                by_handle: HashMap::new(),
                next_handle: 1,
            }),
        }
    }

    fn register(&self, context: Context) -> u64 {
        let mut registry = self.inner.lock();
        let handle = registry.next_handle;
        registry.next_handle += 1;
        registry.by_handle.insert(handle, context.upload_id().to_string());
        registry.by_upload_id.insert(context.upload_id().to_string(), context);
        handle
    }

    /// Resolves a request handle to its upload id.
    pub(crate) fn resolve_handle(&self, handle: u64) -> Option<String> {
        self.inner.lock().by_handle.get(&handle).cloned()
    }

    fn checkout(&self, upload_id: &str, part_number: u64) -> Result<GcmEncryptState, ClientError> {
        let mut registry = self.inner.lock();
        let context = registry
            .by_upload_id
            .get_mut(upload_id)
            .ok_or_else(|| ClientError::protocol_violation(format!("unknown upload id {upload_id}")))?;
        context.checkout_stream(part_number)
    }

    fn checkin(&self, upload_id: &str, state: GcmEncryptState, etag: String, is_final: bool) {
        if let Some(context) = self.inner.lock().by_upload_id.get_mut(upload_id) {
            context.checkin_stream(state, etag, is_final);
        }
    }

    /// Removes the context and its handle entry together.
    fn remove(&self, upload_id: &str) -> Option<Context> {
        let mut registry = self.inner.lock();
        registry.by_handle.retain(|_, id| id != upload_id);
        registry.by_upload_id.remove(upload_id)
    }
}

impl EncryptionClient {
    /// Starts an encrypting multipart upload.
    ///
    /// Assembles the envelope and creates the upload's single cipher
    /// stream. In metadata mode the envelope rides on the initiate call; in
    /// instruction-file mode the sidecar is written at completion (V3 keeps
    /// its content-cipher keys on the object either way).
    pub async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        options: PutOptions,
    ) -> Result<MultipartUploadHandle, ClientError> {
        options.cancellation.ensure_active("initiate_multipart_upload")?;
        let suite = self.config.content_algorithm.suite();
        let mut instructions = self
            .assembly
            .assemble(&self.material, suite, options.encryption_context.as_ref())
            .await?;
        let (content_key, aad) = prepare_encrypt_keys(&mut instructions)?;

        let (mut metadata, _) = self.serialize_envelope(&instructions)?;
        if let Some(length) = options.content_length {
            metadata.insert(envelope::UNENCRYPTED_CONTENT_LENGTH.into(), length.to_string());
        }

        let state = GcmEncryptState::new(&content_key, instructions.iv(), &aad)?;
        let upload_id = self
            .store_call(
                "initiate_multipart",
                self.store.initiate_multipart(bucket, key, &metadata),
            )
            .await?;
        debug!(bucket, key, upload_id, "initiated encrypting multipart upload");

        let context = Context::new(upload_id.clone(), self.config.storage_mode, instructions, state);
        let request_handle = self.multipart.register(context);
        Ok(MultipartUploadHandle {
            upload_id,
            request_handle,
        })
    }

    /// Encrypts and uploads one part. Parts are serialized per upload and
    /// must arrive with contiguous part numbers from 1; `is_last` flushes
    /// the authentication tag after the part's ciphertext.
    ///
    /// On any failure the upload's context is torn down and the CEK
    /// zeroized; the caller aborts the store-side upload separately.
    pub async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u64,
        body: ObjectBody,
        is_last: bool,
        cancellation: CancellationToken,
    ) -> Result<String, ClientError> {
        let mut state = self.multipart.checkout(upload_id, part_number)?;

        let ciphertext = match encrypt_part_body(&mut state, body, is_last, &cancellation).await {
            Ok(ciphertext) => ciphertext,
            Err(e) => {
                self.multipart.remove(upload_id);
                return Err(e);
            }
        };

        let result = self
            .store_call(
                "upload_part",
                self.store
                    .upload_part(bucket, key, upload_id, part_number, ObjectBody::from_bytes(ciphertext), is_last),
            )
            .await;
        match result {
            Ok(etag) => {
                self.multipart.checkin(upload_id, state, etag.clone(), is_last);
                Ok(etag)
            }
            Err(e) => {
                self.multipart.remove(upload_id);
                Err(e)
            }
        }
    }

    /// Completes a multipart upload. In instruction-file mode the sidecar
    /// is written now, from the envelope assembled at initiate.
    pub async fn complete_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<(), ClientError> {
        let context = self
            .multipart
            .remove(upload_id)
            .ok_or_else(|| ClientError::protocol_violation(format!("unknown upload id {upload_id}")))?;
        if !context.final_part_seen() {
            return Err(ClientError::protocol_violation(format!(
                "upload {upload_id} completed before its final part"
            )));
        }
        let storage_mode = context.storage_mode();
        let (instructions, parts) = context.into_completion();

        self.store_call(
            "complete_multipart",
            self.store.complete_multipart(bucket, key, upload_id, &parts),
        )
        .await?;

        if storage_mode == StorageMode::InstructionFile {
            let suite = instructions.algorithm_suite();
            let sidecar_map = if suite.is_committing() {
                envelope::encode_v3_wrap_keys(&instructions)?
            } else {
                envelope::encode_v2(&instructions)?
            };
            let sidecar_key = envelope::instruction_file_key(key);
            self.store_call(
                "put_object",
                self.store.put_object(
                    bucket,
                    &sidecar_key,
                    &ObjectMetadata::new(),
                    ObjectBody::from_bytes(envelope::sidecar_body(&sidecar_map)?),
                ),
            )
            .await?;
        }
        debug!(bucket, key, upload_id, "completed encrypting multipart upload");
        Ok(())
    }

    /// Aborts a multipart upload: the context and its buffered cipher
    /// state are dropped, the CEK zeroized, and the store-side upload
    /// discarded.
    pub async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<(), ClientError> {
        // Drop before the store call so key material dies even when the
        // transport fails.
        drop(self.multipart.remove(upload_id));
        self.store_call("abort_multipart", self.store.abort_multipart(bucket, key, upload_id))
            .await
    }

    /// Lists the parts uploaded so far. Passthrough.
    pub async fn list_parts(&self, bucket: &str, key: &str, upload_id: &str) -> Result<Vec<PartInfo>, ClientError> {
        self.store_call("list_parts", self.store.list_parts(bucket, key, upload_id))
            .await
    }

    /// Resolves a process-local request handle to its upload id.
    pub fn upload_id_for_handle(&self, request_handle: u64) -> Option<String> {
        self.multipart.resolve_handle(request_handle)
    }
}

/// Streams one part's plaintext through the shared cipher state, appending
/// the tag when the part is final.
async fn encrypt_part_body(
    state: &mut GcmEncryptState,
    body: ObjectBody,
    is_last: bool,
    cancellation: &CancellationToken,
) -> Result<Vec<u8>, ClientError> {
    let mut reader = body;
    let mut ciphertext = Vec::new();
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        cancellation.ensure_active("upload_part")?;
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        state.encrypt_in_place(&mut chunk[..n])?;
        ciphertext.extend_from_slice(&chunk[..n]);
    }
    if is_last {
        state.finalize();
        let mut tag = [0u8; 16];
        let n = state.drain_tag(&mut tag);
        ciphertext.extend_from_slice(&tag[..n]);
    }
    Ok(ciphertext)
}
