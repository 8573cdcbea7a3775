// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Encryption Instructions Value Object
//!
//! The per-object envelope record. An instructions value is assembled once
//! at encrypt time (fresh CEK, fresh IV, wrap output) and reconstructed once
//! at decrypt time (unwrapped CEK, stored IV, stored commitment), and is the
//! only structure the streaming and codec layers ever see.
//!
//! ## Invariants
//!
//! - CEK and IV lengths match the algorithm suite
//! - The CEK is zeroized when the record is dropped
//! - Committing-suite records always carry a message-id; the commitment is
//!   attached after derivation and before anything is written
//!
//! The original system this design descends from held two overlapping
//! envelope record types; they are collapsed here into this single record
//! with the superset of fields, optional where a format omits them.

use zeroize::Zeroizing;

use crate::error::ClientError;
use crate::value_objects::algorithm_suite::AlgorithmSuite;
use crate::value_objects::material::StringMap;

/// Per-object encryption envelope: CEK, wrap output, IV, algorithm
/// identifiers, and (for committing suites) message-id and key commitment.
pub struct EncryptionInstructions {
    /// Plaintext content-encryption key. Zeroized on drop.
    envelope_key: Zeroizing<Vec<u8>>,
    /// CEK ciphertext as produced by the wrap operation.
    encrypted_envelope_key: Vec<u8>,
    /// Content-cipher IV/nonce.
    iv: Vec<u8>,
    /// Canonical wrap-algorithm string (`kms+context`, `RSA-OAEP-SHA1`, …).
    wrap_algorithm: String,
    algorithm_suite: AlgorithmSuite,
    /// Material description riding with non-KMS envelopes.
    material_description: StringMap,
    /// KMS encryption context; separate from the description for V3.
    encryption_context: StringMap,
    /// HKDF salt for the committing suite.
    message_id: Option<Vec<u8>>,
    /// Derived key commitment for the committing suite.
    key_commitment: Option<Vec<u8>>,
}

impl EncryptionInstructions {
    /// Builds an instructions record, validating lengths against the suite.
    ///
    /// The key commitment is intentionally absent here; committing-suite
    /// callers derive and attach it with [`set_key_commitment`] before the
    /// envelope is serialized.
    ///
    /// [`set_key_commitment`]: EncryptionInstructions::set_key_commitment
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        envelope_key: Zeroizing<Vec<u8>>,
        encrypted_envelope_key: Vec<u8>,
        iv: Vec<u8>,
        wrap_algorithm: impl Into<String>,
        algorithm_suite: AlgorithmSuite,
        material_description: StringMap,
        encryption_context: StringMap,
        message_id: Option<Vec<u8>>,
    ) -> Result<Self, ClientError> {
        if envelope_key.len() != algorithm_suite.key_len() {
            return Err(ClientError::invalid_data(format!(
                "envelope key is {} bytes, suite {} requires {}",
                envelope_key.len(),
                algorithm_suite,
                algorithm_suite.key_len()
            )));
        }
        if iv.len() != algorithm_suite.iv_len() {
            return Err(ClientError::invalid_data(format!(
                "IV is {} bytes, suite {} requires {}",
                iv.len(),
                algorithm_suite,
                algorithm_suite.iv_len()
            )));
        }
        if algorithm_suite.is_committing() {
            match &message_id {
                None => {
                    return Err(ClientError::invalid_data(
                        "committing suite requires a message id",
                    ));
                }
                Some(id) if id.len() != algorithm_suite.message_id_len() => {
                    return Err(ClientError::invalid_data(format!(
                        "message id is {} bytes, suite requires {}",
                        id.len(),
                        algorithm_suite.message_id_len()
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(Self {
            envelope_key,
            encrypted_envelope_key,
            iv,
            wrap_algorithm: wrap_algorithm.into(),
            algorithm_suite,
            material_description,
            encryption_context,
            message_id,
            key_commitment: None,
        })
    }

    /// Attaches the derived key commitment.
    pub fn set_key_commitment(&mut self, commitment: Vec<u8>) -> Result<(), ClientError> {
        if commitment.len() != self.algorithm_suite.kd_output_len() {
            return Err(ClientError::invalid_data(format!(
                "key commitment is {} bytes, suite requires {}",
                commitment.len(),
                self.algorithm_suite.kd_output_len()
            )));
        }
        self.key_commitment = Some(commitment);
        Ok(())
    }

    /// Attaches a commitment read back from stored metadata (decrypt side).
    pub fn set_stored_commitment(&mut self, commitment: Vec<u8>) {
        self.key_commitment = Some(commitment);
    }

    pub fn envelope_key(&self) -> &[u8] {
        &self.envelope_key
    }

    pub fn encrypted_envelope_key(&self) -> &[u8] {
        &self.encrypted_envelope_key
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    pub fn wrap_algorithm(&self) -> &str {
        &self.wrap_algorithm
    }

    pub fn algorithm_suite(&self) -> AlgorithmSuite {
        self.algorithm_suite
    }

    pub fn material_description(&self) -> &StringMap {
        &self.material_description
    }

    pub fn encryption_context(&self) -> &StringMap {
        &self.encryption_context
    }

    pub fn message_id(&self) -> Option<&[u8]> {
        self.message_id.as_deref()
    }

    pub fn key_commitment(&self) -> Option<&[u8]> {
        self.key_commitment.as_deref()
    }
}

impl std::fmt::Debug for EncryptionInstructions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The plaintext CEK never appears in logs.
        f.debug_struct("EncryptionInstructions")
            .field("algorithm_suite", &self.algorithm_suite)
            .field("wrap_algorithm", &self.wrap_algorithm)
            .field("iv_len", &self.iv.len())
            .field("encrypted_key_len", &self.encrypted_envelope_key.len())
            .field("has_message_id", &self.message_id.is_some())
            .field("has_commitment", &self.key_commitment.is_some())
            .finish()
    }
}
