// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Encryption Client
//!
//! The application-layer client wrapping crypto around every object-store
//! operation. One client value serves a whole process: it is `Send + Sync`,
//! holds its materials and key-provider handle for its lifetime (the
//! provider is constructed before the client, never lazily), and validates
//! its policy configuration before any I/O is possible.
//!
//! ## Encrypt path
//!
//! assemble instructions → (committing suite: derive commitment and content
//! key) → wrap the body in a caching encrypt stream → serialize the
//! envelope into metadata or a `.instruction` sidecar → upload.
//!
//! ## Decrypt path
//!
//! classify the stored schema → fetch the sidecar if one is in play →
//! check the suite against profile and policy → unwrap the CEK → (committing
//! suite: verify the key commitment, then derive the content key) → wrap
//! the body in the matching decrypt stream.
//!
//! Ranged reads bypass GCM authentication by translating the nonce to a
//! CTR position; the returned bytes are not authenticated and the range
//! start must be block aligned.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use sealed_store_domain::services::object_store::CONTENT_LENGTH_KEY;
use sealed_store_domain::{
    validate_client_policy, validate_decrypt, ByteRange, CancellationToken, ClientError, CommitmentPolicy,
    ContentEncryptionAlgorithm, EncryptionInstructions, KeyProvider, Material, ObjectBody, ObjectMetadata,
    ObjectStore, SecurityProfile, StorageMode, StringMap,
};

use crate::infrastructure::adapters::decrypt_stream::{
    AsyncCbcDecryptStream, AsyncCtrDecryptStream, AsyncGcmDecryptStream,
};
use crate::infrastructure::adapters::encrypt_stream::AsyncCachingGcmEncryptStream;
use crate::infrastructure::adapters::kdf::{commitment_eq, derive_content_key, derive_key_commitment};
use crate::infrastructure::services::envelope_format::{
    self as envelope, DecodedEnvelope, EnvelopeSchema,
};
use crate::infrastructure::services::material_assembly::MaterialAssembly;

use super::multipart_upload::MultipartRegistry;

/// Client configuration fixed at construction.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Which envelope generations this client will read.
    pub security_profile: SecurityProfile,
    /// Whether committing ciphertext is written and required on read.
    pub commitment_policy: CommitmentPolicy,
    /// Content algorithm used for every encrypting operation.
    pub content_algorithm: ContentEncryptionAlgorithm,
    /// Where the envelope rides.
    pub storage_mode: StorageMode,
    /// Timeout applied to each object-store call.
    pub store_timeout: Duration,
    /// Timeout applied to each key-provider call.
    pub key_provider_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            security_profile: SecurityProfile::V4,
            commitment_policy: CommitmentPolicy::RequireEncryptAllowDecrypt,
            content_algorithm: ContentEncryptionAlgorithm::AesGcmWithCommitment,
            storage_mode: StorageMode::ObjectMetadata,
            store_timeout: Duration::from_secs(300),
            key_provider_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the security profile
    pub fn with_security_profile(mut self, profile: SecurityProfile) -> Self {
        self.security_profile = profile;
        self
    }

    /// Sets the commitment policy
    pub fn with_commitment_policy(mut self, policy: CommitmentPolicy) -> Self {
        self.commitment_policy = policy;
        self
    }

    /// Sets the content encryption algorithm
    pub fn with_content_algorithm(mut self, algorithm: ContentEncryptionAlgorithm) -> Self {
        self.content_algorithm = algorithm;
        self
    }

    /// Sets the envelope storage mode
    pub fn with_storage_mode(mut self, mode: StorageMode) -> Self {
        self.storage_mode = mode;
        self
    }

    /// Sets the object-store call timeout
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Sets the key-provider call timeout
    pub fn with_key_provider_timeout(mut self, timeout: Duration) -> Self {
        self.key_provider_timeout = timeout;
        self
    }
}

/// Per-request options for encrypting puts.
#[derive(Default)]
pub struct PutOptions {
    /// KMS encryption context override (KMS materials only).
    pub encryption_context: Option<StringMap>,
    /// Plaintext length, when the caller knows it; recorded in metadata.
    pub content_length: Option<u64>,
    pub cancellation: CancellationToken,
}

/// Per-request options for decrypting gets.
#[derive(Default)]
pub struct GetOptions {
    /// Ciphertext byte range; start must be 16-byte aligned.
    pub range: Option<ByteRange>,
    /// KMS encryption context sent on decrypt (KMS materials only).
    pub encryption_context: Option<StringMap>,
    pub cancellation: CancellationToken,
}

/// Client-side object encryption over an [`ObjectStore`].
pub struct EncryptionClient {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) material: Material,
    pub(crate) config: ClientConfig,
    pub(crate) assembly: MaterialAssembly,
    pub(crate) multipart: MultipartRegistry,
}

impl std::fmt::Debug for EncryptionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionClient").finish_non_exhaustive()
    }
}

impl EncryptionClient {
    /// Builds a client, validating the policy tuple before anything else.
    ///
    /// KMS materials require a key provider; the handle is taken here, at
    /// construction, and shared for the client's lifetime.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        material: Material,
        key_provider: Option<Arc<dyn KeyProvider>>,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        validate_client_policy(
            config.security_profile,
            config.commitment_policy,
            config.content_algorithm,
        )?;
        if material.is_kms() && key_provider.is_none() {
            return Err(ClientError::invalid_argument(
                "KMS materials require a key provider at construction",
            ));
        }
        let assembly = MaterialAssembly::new(key_provider, config.key_provider_timeout);
        Ok(Self {
            store,
            material,
            config,
            assembly,
            multipart: MultipartRegistry::new(),
        })
    }

    /// Encrypts and uploads an object; returns the store's etag.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectBody,
        options: PutOptions,
    ) -> Result<String, ClientError> {
        options.cancellation.ensure_active("put_object")?;
        let suite = self.config.content_algorithm.suite();
        let mut instructions = self
            .assembly
            .assemble(&self.material, suite, options.encryption_context.as_ref())
            .await?;
        let (content_key, aad) = prepare_encrypt_keys(&mut instructions)?;

        let (mut metadata, sidecar) = self.serialize_envelope(&instructions)?;
        if let Some(length) = options.content_length {
            metadata.insert(envelope::UNENCRYPTED_CONTENT_LENGTH.into(), length.to_string());
        }

        let stream = AsyncCachingGcmEncryptStream::new(
            body,
            &content_key,
            instructions.iv(),
            &aad,
            options.cancellation.clone(),
        )?;
        debug!(bucket, key, suite = %suite, "encrypting put");
        let etag = self
            .store_call(
                "put_object",
                self.store.put_object(bucket, key, &metadata, ObjectBody::new(Box::new(stream))),
            )
            .await?;

        if let Some(sidecar_map) = sidecar {
            let sidecar_key = envelope::instruction_file_key(key);
            let body = envelope::sidecar_body(&sidecar_map)?;
            self.store_call(
                "put_object",
                self.store
                    .put_object(bucket, &sidecar_key, &ObjectMetadata::new(), ObjectBody::from_bytes(body)),
            )
            .await?;
        }
        Ok(etag)
    }

    /// Downloads and decrypts an object.
    ///
    /// Full gets return an authenticated stream: consume it entirely before
    /// trusting any byte. Ranged gets return unauthenticated plaintext.
    pub async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        options: GetOptions,
    ) -> Result<(ObjectMetadata, ObjectBody), ClientError> {
        options.cancellation.ensure_active("get_object")?;
        match options.range {
            Some(range) => self.get_object_ranged(bucket, key, range, options).await,
            None => self.get_object_full(bucket, key, options).await,
        }
    }

    /// Fetches object metadata without the body. Passthrough.
    pub async fn get_object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, ClientError> {
        self.store_call("get_object_metadata", self.store.get_object_metadata(bucket, key))
            .await
    }

    async fn get_object_full(
        &self,
        bucket: &str,
        key: &str,
        options: GetOptions,
    ) -> Result<(ObjectMetadata, ObjectBody), ClientError> {
        let (metadata, body) = self
            .store_call("get_object", self.store.get_object(bucket, key, None))
            .await?;
        let envelope = self.load_envelope(bucket, key, &metadata).await?;
        self.check_decrypt_allowed(&envelope)?;
        let instructions = self
            .assembly
            .recover(&self.material, &envelope, options.encryption_context.as_ref())
            .await?;
        let (content_key, aad) = prepare_decrypt_keys(&instructions)?;

        let suite = instructions.algorithm_suite();
        debug!(bucket, key, suite = %suite, schema = ?envelope.schema, "decrypting get");
        let plaintext: ObjectBody = match suite.tag_len() {
            Some(tag_len) => ObjectBody::new(Box::new(AsyncGcmDecryptStream::new(
                body,
                &content_key,
                instructions.iv(),
                &aad,
                tag_len,
                options.cancellation.clone(),
            )?)),
            None => ObjectBody::new(Box::new(AsyncCbcDecryptStream::new(
                body,
                &content_key,
                instructions.iv(),
                options.cancellation.clone(),
            )?)),
        };
        Ok((metadata, plaintext))
    }

    async fn get_object_ranged(
        &self,
        bucket: &str,
        key: &str,
        range: ByteRange,
        options: GetOptions,
    ) -> Result<(ObjectMetadata, ObjectBody), ClientError> {
        if range.start % 16 != 0 {
            return Err(ClientError::invalid_argument(format!(
                "ranged read start {} is not a multiple of the 16-byte cipher block",
                range.start
            )));
        }
        let metadata = self
            .store_call("get_object_metadata", self.store.get_object_metadata(bucket, key))
            .await?;
        let envelope = self.load_envelope(bucket, key, &metadata).await?;
        self.check_decrypt_allowed(&envelope)?;

        let suite = envelope.suite;
        let tag_len = suite.tag_len().ok_or_else(|| {
            ClientError::NotSupported("ranged reads require an authenticated content suite".to_string())
        })?;
        let total_ciphertext_len: u64 = metadata
            .get(CONTENT_LENGTH_KEY)
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| ClientError::store_error("store did not report the object's content length"))?;

        let instructions = self
            .assembly
            .recover(&self.material, &envelope, options.encryption_context.as_ref())
            .await?;
        let (content_key, _aad) = prepare_decrypt_keys(&instructions)?;

        let (_, body) = self
            .store_call("get_object", self.store.get_object(bucket, key, Some(range)))
            .await?;
        warn!(bucket, key, start = range.start, end = range.end, "ranged read returns unauthenticated plaintext");
        let stream = AsyncCtrDecryptStream::new(
            body,
            &content_key,
            instructions.iv(),
            tag_len,
            range,
            total_ciphertext_len,
            options.cancellation.clone(),
        )?;
        Ok((metadata, ObjectBody::new(Box::new(stream))))
    }

    /// Serializes the envelope per storage mode and suite. Returns
    /// `(object_metadata, optional sidecar map)`.
    pub(crate) fn serialize_envelope(
        &self,
        instructions: &EncryptionInstructions,
    ) -> Result<(ObjectMetadata, Option<ObjectMetadata>), ClientError> {
        let suite = instructions.algorithm_suite();
        match (self.config.storage_mode, suite.is_committing()) {
            (StorageMode::ObjectMetadata, true) => Ok((envelope::encode_v3(instructions)?, None)),
            (StorageMode::ObjectMetadata, false) => Ok((envelope::encode_v2(instructions)?, None)),
            (StorageMode::InstructionFile, true) => Ok((
                envelope::encode_v3_object_keys(instructions)?,
                Some(envelope::encode_v3_wrap_keys(instructions)?),
            )),
            (StorageMode::InstructionFile, false) => {
                Ok((ObjectMetadata::new(), Some(envelope::encode_v2(instructions)?)))
            }
        }
    }

    /// Classifies the stored schema and produces a decoded envelope,
    /// fetching the sidecar object when one is in play.
    async fn load_envelope(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<DecodedEnvelope, ClientError> {
        match envelope::classify_metadata(metadata) {
            Some(EnvelopeSchema::V1) => envelope::decode_v1(metadata),
            Some(EnvelopeSchema::V2) => envelope::decode_v2(metadata),
            Some(EnvelopeSchema::V3Metadata) => envelope::decode_v3(metadata, None, EnvelopeSchema::V3Metadata),
            Some(EnvelopeSchema::V3InstructionFile) => {
                let sidecar = self.fetch_sidecar(bucket, key).await.map_err(|e| {
                    ClientError::invalid_data(format!("object names an instruction file that cannot be read: {e}"))
                })?;
                envelope::decode_v3(metadata, Some(&sidecar), EnvelopeSchema::V3InstructionFile)
            }
            None => {
                // Last resort: probe for a sidecar carrying the whole
                // envelope (V2 instruction-file mode, or a V1-era sidecar).
                let sidecar = match self.fetch_sidecar(bucket, key).await {
                    Ok(map) => map,
                    Err(_) => {
                        return Err(ClientError::NotEncrypted(format!(
                            "{key} carries no envelope metadata and no instruction file"
                        )))
                    }
                };
                if sidecar.contains_key(envelope::KEY_V2) {
                    envelope::decode_v2(&sidecar)
                } else if sidecar.contains_key(envelope::KEY_V1) {
                    envelope::decode_v1(&sidecar)
                } else {
                    Err(ClientError::NotEncrypted(format!(
                        "{key} instruction file carries no recognisable envelope"
                    )))
                }
            }
        }
    }

    async fn fetch_sidecar(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, ClientError> {
        let sidecar_key = envelope::instruction_file_key(key);
        let (_, body) = self
            .store_call("get_object", self.store.get_object(bucket, &sidecar_key, None))
            .await?;
        envelope::parse_sidecar_body(&body.collect().await?)
    }

    /// Profile and policy gating for a decoded envelope, before unwrap.
    fn check_decrypt_allowed(&self, envelope: &DecodedEnvelope) -> Result<(), ClientError> {
        let profile = self.config.security_profile;
        // The V1-era "kms" wrap predates context binding; it is legacy
        // regardless of the content suite.
        let legacy_wrap = envelope.wrap_algorithm.is_none()
            || envelope.wrap_algorithm.as_deref() == Some(envelope::WRAP_KMS);
        if legacy_wrap && !profile.allows_legacy_decrypt() {
            return Err(ClientError::unsupported_algorithm(format!(
                "legacy envelope requires a legacy-enabled security profile, configured profile is {:?}",
                profile
            )));
        }
        validate_decrypt(profile, self.config.commitment_policy, envelope.suite)
    }

    pub(crate) async fn store_call<T>(
        &self,
        operation: &str,
        fut: impl std::future::Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        tokio::time::timeout(self.config.store_timeout, fut)
            .await
            .map_err(|_| ClientError::TimeoutError(format!("object store {operation} timed out")))?
    }
}

/// Derives the stream key and associated data for an encrypting operation,
/// attaching the key commitment for committing suites.
pub(crate) fn prepare_encrypt_keys(
    instructions: &mut EncryptionInstructions,
) -> Result<(zeroize::Zeroizing<Vec<u8>>, Vec<u8>), ClientError> {
    let suite = instructions.algorithm_suite();
    if !suite.is_committing() {
        return Ok((
            zeroize::Zeroizing::new(instructions.envelope_key().to_vec()),
            Vec::new(),
        ));
    }
    let message_id = instructions
        .message_id()
        .ok_or_else(|| ClientError::internal_error("committing suite without a message id"))?
        .to_vec();
    let commitment = derive_key_commitment(instructions.envelope_key(), &message_id, suite)?;
    instructions.set_key_commitment(commitment)?;
    let content_key = derive_content_key(instructions.envelope_key(), &message_id, suite)?;
    Ok((content_key, suite.suite_id_bytes().to_vec()))
}

/// Derives the stream key and associated data for a decrypting operation.
///
/// For committing suites the stored commitment is verified in constant
/// time first; the content key is only derived after the commitment holds.
pub(crate) fn prepare_decrypt_keys(
    instructions: &EncryptionInstructions,
) -> Result<(zeroize::Zeroizing<Vec<u8>>, Vec<u8>), ClientError> {
    let suite = instructions.algorithm_suite();
    if !suite.is_committing() {
        return Ok((
            zeroize::Zeroizing::new(instructions.envelope_key().to_vec()),
            Vec::new(),
        ));
    }
    let message_id = instructions
        .message_id()
        .ok_or_else(|| ClientError::invalid_data("committing object without a message id"))?;
    let stored = instructions
        .key_commitment()
        .ok_or_else(|| ClientError::invalid_data("committing object without a key commitment"))?;
    let derived = derive_key_commitment(instructions.envelope_key(), message_id, suite)?;
    if !commitment_eq(&derived, stored) {
        return Err(ClientError::KeyCommitmentMismatch(
            "stored key commitment does not match the unwrapped key".to_string(),
        ));
    }
    let content_key = derive_content_key(instructions.envelope_key(), message_id, suite)?;
    Ok((content_key, suite.suite_id_bytes().to_vec()))
}
