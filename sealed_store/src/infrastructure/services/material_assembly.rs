// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Material Assembly Service
//!
//! Builds [`EncryptionInstructions`] at encrypt time and recovers them at
//! decrypt time. This is the only place the key-wrap suite branches on the
//! material kind; everything downstream sees an instructions value.
//!
//! ## Wrap operations
//!
//! - **RSA-OAEP-SHA1** - the inner-wrap structure is OAEP-encrypted under
//!   the caller's public key.
//! - **AES/GCM** - the inner-wrap structure is sealed under the caller's
//!   AES key with the canonical CEK-algorithm string as associated data;
//!   the stored blob is `nonce(12) ‖ ciphertext ‖ tag(16)`.
//! - **kms+context** - the provider generates the data key; the reserved
//!   `aws:x-amz-cek-alg` entry is injected into the context sent to KMS.
//!   V2 stores the full context as the material description; V3 keeps the
//!   user's context separate and re-injects the reserved entry on decrypt.
//!
//! Unwrap inverts each path exactly, verifying the inner-wrap's embedded
//! algorithm against the suite actually observed on the object.

use std::sync::Arc;
use std::time::Duration;

use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use zeroize::Zeroizing;

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};

use sealed_store_domain::value_objects::material::{reject_reserved_key, Material, RESERVED_CEK_ALG_KEY};
use sealed_store_domain::{
    AlgorithmSuite, ClientError, EncryptionInstructions, KeyProvider, StringMap, DATA_KEY_SPEC_AES_256,
};

use crate::infrastructure::adapters::content_cipher::{ecb_unwrap_key, GCM_NONCE_LEN, GCM_TAG_LEN};
use crate::infrastructure::adapters::entropy::Entropy;
use crate::infrastructure::services::envelope_format::{
    pack_inner_wrap, parse_inner_wrap, DecodedEnvelope, EnvelopeSchema, V3_CONTENT_IV, WRAP_AES_GCM, WRAP_KMS,
    WRAP_KMS_CONTEXT, WRAP_RSA_OAEP_SHA1,
};

/// Assembles and recovers per-object encryption instructions.
pub struct MaterialAssembly {
    entropy: Entropy,
    key_provider: Option<Arc<dyn KeyProvider>>,
    key_provider_timeout: Duration,
}

impl MaterialAssembly {
    pub fn new(key_provider: Option<Arc<dyn KeyProvider>>, key_provider_timeout: Duration) -> Self {
        Self {
            entropy: Entropy::new(),
            key_provider,
            key_provider_timeout,
        }
    }

    fn provider(&self) -> Result<&Arc<dyn KeyProvider>, ClientError> {
        self.key_provider
            .as_ref()
            .ok_or_else(|| ClientError::internal_error("KMS materials configured without a key provider"))
    }

    /// Builds fresh instructions for an encrypting operation.
    ///
    /// `request_context` is the caller's per-request KMS encryption
    /// context; it overrides the context configured on the material and is
    /// rejected for non-KMS materials.
    pub async fn assemble(
        &self,
        material: &Material,
        suite: AlgorithmSuite,
        request_context: Option<&StringMap>,
    ) -> Result<EncryptionInstructions, ClientError> {
        if request_context.is_some() && !material.is_kms() {
            return Err(ClientError::invalid_argument(
                "per-request encryption context requires KMS materials",
            ));
        }

        let (iv, message_id) = if suite.is_committing() {
            (
                V3_CONTENT_IV.to_vec(),
                Some(self.entropy.random_bytes(suite.message_id_len())?),
            )
        } else {
            (self.entropy.random_bytes(suite.iv_len())?, None)
        };

        match material {
            Material::Asymmetric { key_pair, description, .. } => {
                let cek = self.entropy.random_key(suite.key_len())?;
                let inner = pack_inner_wrap(&cek, suite.cek_algorithm())?;
                let encrypted = rsa_oaep_sha1_encrypt(key_pair, &inner)?;
                EncryptionInstructions::new(
                    cek,
                    encrypted,
                    iv,
                    WRAP_RSA_OAEP_SHA1,
                    suite,
                    description.clone(),
                    StringMap::new(),
                    message_id,
                )
            }
            Material::Symmetric { key, description, .. } => {
                let cek = self.entropy.random_key(suite.key_len())?;
                let inner = pack_inner_wrap(&cek, suite.cek_algorithm())?;
                let nonce = self.entropy.random_bytes(GCM_NONCE_LEN)?;
                let cipher = Aes256Gcm::new_from_slice(key.as_slice())
                    .map_err(|e| ClientError::crypto_error(format!("AES key wrap init failed: {e}")))?;
                let sealed = cipher
                    .encrypt(
                        Nonce::from_slice(&nonce),
                        Payload {
                            msg: &inner,
                            aad: suite.cek_algorithm().as_bytes(),
                        },
                    )
                    .map_err(|e| ClientError::crypto_error(format!("AES key wrap failed: {e}")))?;
                let mut encrypted = nonce;
                encrypted.extend_from_slice(&sealed);
                EncryptionInstructions::new(
                    cek,
                    encrypted,
                    iv,
                    WRAP_AES_GCM,
                    suite,
                    description.clone(),
                    StringMap::new(),
                    message_id,
                )
            }
            Material::Kms {
                key_id,
                encryption_context,
                ..
            } => {
                let user_context = request_context.unwrap_or(encryption_context);
                reject_reserved_key(user_context)?;
                let kms_context = with_reserved_key(user_context, suite);

                let data_key = self
                    .with_timeout(
                        "generate_data_key",
                        self.provider()?
                            .generate_data_key(key_id, &kms_context, DATA_KEY_SPEC_AES_256),
                    )
                    .await?;
                if data_key.plaintext.len() != suite.key_len() {
                    return Err(ClientError::key_provider_error(format!(
                        "provider returned a {}-byte data key, suite requires {}",
                        data_key.plaintext.len(),
                        suite.key_len()
                    )));
                }

                // V2 publishes the full context (reserved entry included) as
                // the material description; V3 keeps the user context.
                let (description, context) = if suite.is_committing() {
                    (StringMap::new(), user_context.clone())
                } else {
                    (kms_context, StringMap::new())
                };
                EncryptionInstructions::new(
                    data_key.plaintext,
                    data_key.ciphertext_blob,
                    iv,
                    WRAP_KMS_CONTEXT,
                    suite,
                    description,
                    context,
                    message_id,
                )
            }
        }
    }

    /// Recovers instructions from a decoded envelope by unwrapping the CEK.
    ///
    /// `request_context` follows the decrypt-side contract: when present it
    /// is the context sent to the provider, and it must agree with the
    /// context recovered from metadata (superset for V2 envelopes, exact
    /// for V3).
    pub async fn recover(
        &self,
        material: &Material,
        envelope: &DecodedEnvelope,
        request_context: Option<&StringMap>,
    ) -> Result<EncryptionInstructions, ClientError> {
        if request_context.is_some() && !material.is_kms() {
            return Err(ClientError::invalid_argument(
                "per-request encryption context requires KMS materials",
            ));
        }

        let suite = envelope.suite;
        let cek = match envelope.wrap_algorithm.as_deref() {
            None => self.unwrap_v1(material, envelope).await?,
            Some(WRAP_RSA_OAEP_SHA1) => {
                let key_pair = match material {
                    Material::Asymmetric { key_pair, .. } => key_pair,
                    _ => {
                        return Err(ClientError::invalid_argument(
                            "object was wrapped with RSA-OAEP-SHA1 but the configured material is not an RSA key pair",
                        ))
                    }
                };
                let inner = rsa_oaep_sha1_decrypt(key_pair, &envelope.encrypted_key)?;
                parse_inner_wrap(&inner, suite.cek_algorithm())?
            }
            Some(WRAP_AES_GCM) => {
                let key = match material {
                    Material::Symmetric { key, .. } => key,
                    _ => {
                        return Err(ClientError::invalid_argument(
                            "object was wrapped with AES/GCM but the configured material is not a symmetric key",
                        ))
                    }
                };
                if envelope.encrypted_key.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
                    return Err(ClientError::invalid_data("AES-wrapped key blob is too short"));
                }
                let (nonce, sealed) = envelope.encrypted_key.split_at(GCM_NONCE_LEN);
                let cipher = Aes256Gcm::new_from_slice(key.as_slice())
                    .map_err(|e| ClientError::crypto_error(format!("AES key unwrap init failed: {e}")))?;
                let inner = Zeroizing::new(
                    cipher
                        .decrypt(
                            Nonce::from_slice(nonce),
                            Payload {
                                msg: sealed,
                                aad: suite.cek_algorithm().as_bytes(),
                            },
                        )
                        .map_err(|_| ClientError::crypto_error("AES key unwrap failed"))?,
                );
                parse_inner_wrap(&inner, suite.cek_algorithm())?
            }
            Some(WRAP_KMS_CONTEXT | WRAP_KMS) => {
                let stored_context = stored_kms_context(envelope);
                let kms_context = match request_context {
                    Some(user_context) => {
                        reject_reserved_key(user_context)?;
                        with_reserved_key(user_context, suite)
                    }
                    None => stored_context.clone(),
                };
                let plaintext = self
                    .with_timeout(
                        "decrypt",
                        self.provider()?.decrypt(&envelope.encrypted_key, &kms_context),
                    )
                    .await?;
                if request_context.is_some() {
                    verify_context_agreement(&kms_context, &stored_context, envelope.schema)?;
                }
                plaintext
            }
            Some(other) => {
                return Err(ClientError::unsupported_algorithm(format!("wrap algorithm {other:?}")));
            }
        };

        if cek.len() != suite.key_len() {
            return Err(ClientError::invalid_data(format!(
                "unwrapped CEK is {} bytes, suite requires {}",
                cek.len(),
                suite.key_len()
            )));
        }

        let mut instructions = EncryptionInstructions::new(
            cek,
            envelope.encrypted_key.clone(),
            envelope.iv.clone(),
            envelope.wrap_algorithm.clone().unwrap_or_default(),
            suite,
            envelope.material_description.clone(),
            envelope.encryption_context.clone(),
            envelope.message_id.clone(),
        )?;
        if let Some(commitment) = &envelope.key_commitment {
            instructions.set_stored_commitment(commitment.clone());
        }
        Ok(instructions)
    }

    /// V1 envelopes carry no wrap identifier; the configured material
    /// selects the unwrap path. RSA wraps the raw CEK, AES uses the
    /// ECB legacy wrap, and KMS-era objects used the material description
    /// as the encryption context.
    async fn unwrap_v1(
        &self,
        material: &Material,
        envelope: &DecodedEnvelope,
    ) -> Result<Zeroizing<Vec<u8>>, ClientError> {
        match material {
            Material::Asymmetric { key_pair, .. } => rsa_oaep_sha1_decrypt(key_pair, &envelope.encrypted_key),
            Material::Symmetric { key, .. } => Ok(Zeroizing::new(ecb_unwrap_key(
                key.as_slice(),
                &envelope.encrypted_key,
            )?)),
            Material::Kms { .. } => {
                self.with_timeout(
                    "decrypt",
                    self.provider()?
                        .decrypt(&envelope.encrypted_key, &envelope.material_description),
                )
                .await
            }
        }
    }

    async fn with_timeout<T>(
        &self,
        operation: &str,
        fut: impl std::future::Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        tokio::time::timeout(self.key_provider_timeout, fut)
            .await
            .map_err(|_| ClientError::TimeoutError(format!("key provider {operation} timed out")))?
    }
}

/// Reconstructs the encryption context that was sent to KMS at encrypt
/// time, from stored metadata alone. V2 stored the full context as the
/// material description (the V1-era `kms` wrap used the description map the
/// same way); V3 stores the user context and the reserved entry is
/// reinjected from the suite.
fn stored_kms_context(envelope: &DecodedEnvelope) -> StringMap {
    match envelope.schema {
        EnvelopeSchema::V3Metadata | EnvelopeSchema::V3InstructionFile => {
            with_reserved_key(&envelope.encryption_context, envelope.suite)
        }
        _ => envelope.material_description.clone(),
    }
}

/// Returns `context` with the reserved CEK-algorithm entry injected.
fn with_reserved_key(context: &StringMap, suite: AlgorithmSuite) -> StringMap {
    let mut full = context.clone();
    full.insert(RESERVED_CEK_ALG_KEY.to_string(), suite.cek_algorithm().to_string());
    full
}

/// Verifies the caller-supplied context against the metadata-recovered one:
/// superset for V2 envelopes, exact equality for V3.
fn verify_context_agreement(
    supplied: &StringMap,
    stored: &StringMap,
    schema: EnvelopeSchema,
) -> Result<(), ClientError> {
    let agrees = match schema {
        EnvelopeSchema::V3Metadata | EnvelopeSchema::V3InstructionFile => supplied == stored,
        _ => stored
            .iter()
            .all(|(key, value)| supplied.get(key) == Some(value)),
    };
    if !agrees {
        return Err(ClientError::EncryptionContextMismatch(
            "supplied encryption context disagrees with the object's stored context".to_string(),
        ));
    }
    Ok(())
}

fn rsa_oaep_sha1_encrypt(key_pair: &RsaPrivateKey, plaintext: &[u8]) -> Result<Vec<u8>, ClientError> {
    let public_key = RsaPublicKey::from(key_pair);
    let mut rng = rand::rngs::OsRng;
    public_key
        .encrypt(&mut rng, Oaep::new::<Sha1>(), plaintext)
        .map_err(|e| ClientError::crypto_error(format!("RSA key wrap failed: {e}")))
}

fn rsa_oaep_sha1_decrypt(key_pair: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, ClientError> {
    key_pair
        .decrypt(Oaep::new::<Sha1>(), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| ClientError::crypto_error("RSA key unwrap failed"))
}
