// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Policy Service
//!
//! Stateless domain rules governing which algorithm suites a client may use
//! for encrypt and which it may accept for decrypt. Two orthogonal settings
//! are fixed at client construction:
//!
//! - **Security profile** - which *legacy read* formats are tolerated.
//!   `V2`/`V4` read only their own generation; the `…AndLegacy` variants
//!   additionally read CBC/V1-era objects. Encrypt is never downgraded by
//!   any profile.
//! - **Commitment policy** - whether the client must *write* committing
//!   ciphertext and whether it must *require* commitment when reading.
//!
//! The construction-time validity table:
//!
//! | Content algorithm \ Policy | Forbid… | RequireEncryptAllowDecrypt | RequireEncryptRequireDecrypt |
//! |---------------------------|---------|----------------------------|------------------------------|
//! | AES-GCM (non-committing)  | legal   | reject                     | reject                       |
//! | AES-GCM with commitment   | reject  | legal                      | legal                        |
//!
//! V2-class clients additionally reject commitment-enabling policies with
//! `NotSupported`: the V2 wire formats have nowhere to carry a commitment.
//!
//! All checks here run before any I/O.

use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::value_objects::AlgorithmSuite;

/// Which envelope generations a client will read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityProfile {
    /// Read V2-generation envelopes only.
    V2,
    /// Read V2-generation envelopes plus CBC/V1 legacy objects.
    V2AndLegacy,
    /// Read V3 (committing-capable) envelopes plus V2 GCM envelopes.
    V4,
    /// As `V4`, plus CBC/V1 legacy objects.
    V4AndLegacy,
}

impl SecurityProfile {
    /// Whether legacy (CBC / V1-era) objects may be decrypted.
    pub fn allows_legacy_decrypt(&self) -> bool {
        matches!(self, SecurityProfile::V2AndLegacy | SecurityProfile::V4AndLegacy)
    }

    /// Whether this is a V4-class profile (committing formats available).
    pub fn is_v4_class(&self) -> bool {
        matches!(self, SecurityProfile::V4 | SecurityProfile::V4AndLegacy)
    }
}

/// Whether the client writes, and insists on reading, committing ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitmentPolicy {
    /// Write non-committing ciphertext; read anything the profile allows.
    ForbidEncryptAllowDecrypt,
    /// Write committing ciphertext; still read non-committing objects.
    RequireEncryptAllowDecrypt,
    /// Write committing ciphertext; refuse non-committing objects on read.
    RequireEncryptRequireDecrypt,
}

impl CommitmentPolicy {
    /// Whether encrypt must use a committing suite.
    pub fn requires_commit_on_encrypt(&self) -> bool {
        !matches!(self, CommitmentPolicy::ForbidEncryptAllowDecrypt)
    }

    /// Whether decrypt must see a committing suite.
    pub fn requires_commit_on_decrypt(&self) -> bool {
        matches!(self, CommitmentPolicy::RequireEncryptRequireDecrypt)
    }
}

/// Configured content-encryption algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentEncryptionAlgorithm {
    /// AES-256-GCM without key commitment (V2 generation).
    AesGcm,
    /// AES-256-GCM with HKDF-SHA512 commitment (V3 generation).
    AesGcmWithCommitment,
}

impl ContentEncryptionAlgorithm {
    /// The suite descriptor this configuration encrypts with.
    pub fn suite(&self) -> AlgorithmSuite {
        match self {
            ContentEncryptionAlgorithm::AesGcm => AlgorithmSuite::AES_256_GCM_IV12_TAG16_NO_KDF,
            ContentEncryptionAlgorithm::AesGcmWithCommitment => AlgorithmSuite::AES_256_GCM_HKDF_SHA512_COMMIT_KEY,
        }
    }
}

/// Where the envelope rides: object metadata or a sidecar object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageMode {
    /// Envelope fields as object metadata entries.
    #[default]
    ObjectMetadata,
    /// Envelope fields in a `<key>.instruction` sidecar object.
    InstructionFile,
}

/// Validates a `(profile, policy, algorithm)` tuple at client construction.
///
/// Order matters for the error surface: a V2-class client asked for any
/// commitment-enabling policy fails `NotSupported` before the generic
/// policy table is consulted.
pub fn validate_client_policy(
    profile: SecurityProfile,
    policy: CommitmentPolicy,
    algorithm: ContentEncryptionAlgorithm,
) -> Result<(), ClientError> {
    if !profile.is_v4_class() && policy.requires_commit_on_encrypt() {
        return Err(ClientError::NotSupported(format!(
            "security profile {:?} cannot honor commitment policy {:?}",
            profile, policy
        )));
    }
    if !profile.is_v4_class() && algorithm == ContentEncryptionAlgorithm::AesGcmWithCommitment {
        return Err(ClientError::NotSupported(format!(
            "security profile {:?} cannot write committing ciphertext",
            profile
        )));
    }
    match (algorithm, policy) {
        (ContentEncryptionAlgorithm::AesGcm, CommitmentPolicy::ForbidEncryptAllowDecrypt) => Ok(()),
        (ContentEncryptionAlgorithm::AesGcm, _) => Err(ClientError::policy_violation(format!(
            "content algorithm {:?} is non-committing but policy {:?} requires commitment on encrypt",
            algorithm, policy
        ))),
        (ContentEncryptionAlgorithm::AesGcmWithCommitment, CommitmentPolicy::ForbidEncryptAllowDecrypt) => {
            Err(ClientError::policy_violation(format!(
                "content algorithm {:?} commits but policy {:?} forbids commitment on encrypt",
                algorithm, policy
            )))
        }
        (ContentEncryptionAlgorithm::AesGcmWithCommitment, _) => Ok(()),
    }
}

/// Validates a stored suite against the client configuration at decrypt
/// time.
///
/// Legacy suites require an `…AndLegacy` profile; non-committing suites are
/// refused under `RequireEncryptRequireDecrypt`.
pub fn validate_decrypt(
    profile: SecurityProfile,
    policy: CommitmentPolicy,
    stored_suite: AlgorithmSuite,
) -> Result<(), ClientError> {
    if stored_suite.is_legacy() && !profile.allows_legacy_decrypt() {
        return Err(ClientError::unsupported_algorithm(format!(
            "legacy suite {} requires a legacy-enabled security profile, configured profile is {:?}",
            stored_suite, profile
        )));
    }
    if stored_suite.is_committing() && !profile.is_v4_class() {
        return Err(ClientError::unsupported_algorithm(format!(
            "suite {} requires a V4-class security profile, configured profile is {:?}",
            stored_suite, profile
        )));
    }
    if !stored_suite.is_committing() && policy.requires_commit_on_decrypt() {
        return Err(ClientError::policy_violation(format!(
            "stored suite {} does not commit but policy {:?} requires commitment on decrypt",
            stored_suite, policy
        )));
    }
    Ok(())
}
