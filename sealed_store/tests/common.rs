// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shared test doubles: an in-memory object store and a deterministic
//! key-provider mock that enforces encryption-context binding the way the
//! real service does.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use zeroize::Zeroizing;

use sealed_store_domain::services::object_store::CONTENT_LENGTH_KEY;
use sealed_store_domain::{
    ByteRange, ClientError, DataKey, KeyProvider, ObjectBody, ObjectMetadata, ObjectStore, PartInfo, StringMap,
};

#[derive(Clone)]
pub struct StoredObject {
    pub metadata: ObjectMetadata,
    pub bytes: Vec<u8>,
}

struct PendingUpload {
    bucket: String,
    key: String,
    metadata: ObjectMetadata,
    parts: BTreeMap<u64, Vec<u8>>,
}

/// In-memory [`ObjectStore`] with multipart staging and inclusive byte
/// ranges, plus inspection and tamper hooks for the tests.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    uploads: Mutex<HashMap<String, PendingUpload>>,
    counter: Mutex<u64>,
}

impl InMemoryObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn object_id(bucket: &str, key: &str) -> String {
        format!("{bucket}/{key}")
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects.lock().get(&Self::object_id(bucket, key)).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn delete(&self, bucket: &str, key: &str) {
        self.objects.lock().remove(&Self::object_id(bucket, key));
    }

    /// Mutates a stored object in place, for tamper tests.
    pub fn corrupt<F: FnOnce(&mut StoredObject)>(&self, bucket: &str, key: &str, mutate: F) {
        let mut objects = self.objects.lock();
        let stored = objects
            .get_mut(&Self::object_id(bucket, key))
            .expect("corrupt target must exist");
        mutate(stored);
    }

    fn metadata_with_length(stored: &StoredObject) -> ObjectMetadata {
        let mut metadata = stored.metadata.clone();
        metadata.insert(CONTENT_LENGTH_KEY.to_string(), stored.bytes.len().to_string());
        metadata
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
        body: ObjectBody,
    ) -> Result<String, ClientError> {
        let bytes = body.collect().await?;
        let mut counter = self.counter.lock();
        *counter += 1;
        let etag = format!("etag-{}", *counter);
        drop(counter);
        self.objects.lock().insert(
            Self::object_id(bucket, key),
            StoredObject {
                metadata: metadata.clone(),
                bytes,
            },
        );
        Ok(etag)
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<(ObjectMetadata, ObjectBody), ClientError> {
        let stored = self
            .object(bucket, key)
            .ok_or_else(|| ClientError::store_error(format!("NoSuchKey: {bucket}/{key}")))?;
        let metadata = Self::metadata_with_length(&stored);
        let bytes = match range {
            None => stored.bytes,
            Some(range) => {
                let start = range.start as usize;
                if start >= stored.bytes.len() {
                    return Err(ClientError::store_error("InvalidRange: start beyond object"));
                }
                let end = (range.end as usize).min(stored.bytes.len() - 1);
                stored.bytes[start..=end].to_vec()
            }
        };
        Ok((metadata, ObjectBody::from_bytes(bytes)))
    }

    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String, ClientError> {
        let mut counter = self.counter.lock();
        *counter += 1;
        let upload_id = format!("upload-{}", *counter);
        drop(counter);
        self.uploads.lock().insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                metadata: metadata.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: u64,
        body: ObjectBody,
        _is_last: bool,
    ) -> Result<String, ClientError> {
        let bytes = body.collect().await?;
        let mut uploads = self.uploads.lock();
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| ClientError::store_error(format!("NoSuchUpload: {upload_id}")))?;
        upload.parts.insert(part_number, bytes);
        Ok(format!("part-etag-{part_number}"))
    }

    async fn complete_multipart(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        parts: &[(u64, String)],
    ) -> Result<(), ClientError> {
        let upload = self
            .uploads
            .lock()
            .remove(upload_id)
            .ok_or_else(|| ClientError::store_error(format!("NoSuchUpload: {upload_id}")))?;
        let mut bytes = Vec::new();
        for (part_number, _etag) in parts {
            let part = upload
                .parts
                .get(part_number)
                .ok_or_else(|| ClientError::store_error(format!("InvalidPart: {part_number}")))?;
            bytes.extend_from_slice(part);
        }
        self.objects.lock().insert(
            Self::object_id(&upload.bucket, &upload.key),
            StoredObject {
                metadata: upload.metadata,
                bytes,
            },
        );
        Ok(())
    }

    async fn abort_multipart(&self, _bucket: &str, _key: &str, upload_id: &str) -> Result<(), ClientError> {
        self.uploads.lock().remove(upload_id);
        Ok(())
    }

    async fn list_parts(&self, _bucket: &str, _key: &str, upload_id: &str) -> Result<Vec<PartInfo>, ClientError> {
        let uploads = self.uploads.lock();
        let upload = uploads
            .get(upload_id)
            .ok_or_else(|| ClientError::store_error(format!("NoSuchUpload: {upload_id}")))?;
        Ok(upload
            .parts
            .iter()
            .map(|(part_number, bytes)| PartInfo {
                part_number: *part_number,
                etag: format!("part-etag-{part_number}"),
                size: bytes.len() as u64,
            })
            .collect())
    }

    async fn get_object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, ClientError> {
        let stored = self
            .object(bucket, key)
            .ok_or_else(|| ClientError::store_error(format!("NoSuchKey: {bucket}/{key}")))?;
        Ok(Self::metadata_with_length(&stored))
    }
}

struct KmsEntry {
    plaintext: Vec<u8>,
    context: StringMap,
}

/// Deterministic [`KeyProvider`] double. Data keys are tracked by their
/// ciphertext blob; decryption fails like the real service when the
/// supplied encryption context differs from the one used at generation.
#[derive(Default)]
pub struct MockKeyProvider {
    state: Mutex<HashMap<Vec<u8>, KmsEntry>>,
    counter: Mutex<u64>,
}

impl MockKeyProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of data keys generated so far.
    pub fn keys_issued(&self) -> u64 {
        *self.counter.lock()
    }
}

#[async_trait]
impl KeyProvider for MockKeyProvider {
    async fn generate_data_key(
        &self,
        key_id: &str,
        encryption_context: &StringMap,
        key_spec: &str,
    ) -> Result<DataKey, ClientError> {
        assert_eq!(key_spec, "AES_256", "only AES_256 data keys are modelled");
        let mut counter = self.counter.lock();
        *counter += 1;
        let serial = *counter;
        drop(counter);

        let mut plaintext = vec![0x5Au8; 32];
        plaintext[..8].copy_from_slice(&serial.to_be_bytes());
        let blob = format!("kms:{key_id}:{serial}").into_bytes();
        self.state.lock().insert(
            blob.clone(),
            KmsEntry {
                plaintext: plaintext.clone(),
                context: encryption_context.clone(),
            },
        );
        Ok(DataKey {
            plaintext: Zeroizing::new(plaintext),
            ciphertext_blob: blob,
        })
    }

    async fn decrypt(
        &self,
        ciphertext_blob: &[u8],
        encryption_context: &StringMap,
    ) -> Result<Zeroizing<Vec<u8>>, ClientError> {
        let state = self.state.lock();
        let entry = state
            .get(ciphertext_blob)
            .ok_or_else(|| ClientError::crypto_error("KMS decrypt failed: unknown ciphertext"))?;
        if &entry.context != encryption_context {
            return Err(ClientError::crypto_error(
                "KMS decrypt failed: encryption context mismatch",
            ));
        }
        Ok(Zeroizing::new(entry.plaintext.clone()))
    }
}

pub const BUCKET: &str = "test-bucket";

/// Installs a test subscriber once so tracing output shows up under
/// `cargo test -- --nocapture`.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}
