// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Algorithm Suite Value Object
//!
//! This module defines the algorithm suite descriptor for the sealed store
//! encryption client. A suite is an immutable value that fully describes one
//! content-encryption configuration: cipher, IV and tag geometry, key
//! derivation behavior, and the canonical string the suite travels under in
//! object metadata.
//!
//! ## Overview
//!
//! The suite descriptor provides:
//!
//! - **Single Dispatch Point**: The whole pipeline is parameterized by a
//!   suite value; there are no per-format client subtypes
//! - **Length Table**: IV, tag, message-id, key, and KDF output lengths are
//!   data, not code
//! - **Canonical Strings**: The exact metadata representation of each suite
//! - **Commitment Awareness**: Whether the suite derives a key commitment
//!
//! ## Supported Suites
//!
//! | Suite | Cipher | IV | Tag | Commitment |
//! |-------|--------|----|-----|------------|
//! | `AES_256_CBC_IV16_NO_KDF` | AES-256-CBC PKCS7 | 16 | - | no (decrypt only) |
//! | `AES_256_GCM_IV12_TAG16_NO_KDF` | AES-256-GCM | 12 | 16 | no |
//! | `AES_256_GCM_HKDF_SHA512_COMMIT_KEY` | AES-256-GCM + HKDF-SHA512 | 12 | 16 | yes |

use serde::{Deserialize, Serialize};

/// Identifier for an algorithm suite.
///
/// The numeric discriminants are the two-byte suite ids that appear on the
/// wire; the committing suite's canonical metadata string (`"115"`) is the
/// decimal rendering of its id `0x0073`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmSuiteId {
    /// Legacy AES-256-CBC with PKCS7 padding, no key derivation. Decrypt only.
    Aes256CbcIv16NoKdf,
    /// AES-256-GCM, 12-byte IV, 16-byte tag, no key derivation.
    Aes256GcmIv12Tag16NoKdf,
    /// AES-256-GCM with HKDF-SHA512 derived content key and key commitment.
    Aes256GcmHkdfSha512CommitKey,
}

/// Immutable descriptor of one content-encryption configuration.
///
/// All pipeline stages branch on data held here rather than on client
/// subtypes: stream construction reads the IV/tag geometry, the envelope
/// codec reads the canonical string, and the policy engine reads the
/// commitment flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmSuite {
    id: AlgorithmSuiteId,
    /// Two-byte suite id as written into the committed-key AAD.
    suite_id: u16,
    /// Content-cipher IV/nonce length in bytes.
    iv_len: usize,
    /// Authentication tag length in bytes; `None` for the CBC legacy suite.
    tag_len: Option<usize>,
    /// Message-id (HKDF salt) length in bytes; zero for non-committing suites.
    message_id_len: usize,
    /// Content-encryption key length in bytes.
    key_len: usize,
    /// Key-derivation output length in bytes (commitment length).
    kd_output_len: usize,
    /// Canonical content-encryption algorithm string for object metadata.
    cek_algorithm: &'static str,
}

impl AlgorithmSuite {
    /// Legacy AES-256-CBC-PKCS7 suite. Read side only.
    pub const AES_256_CBC_IV16_NO_KDF: AlgorithmSuite = AlgorithmSuite {
        id: AlgorithmSuiteId::Aes256CbcIv16NoKdf,
        suite_id: 0x0070,
        iv_len: 16,
        tag_len: None,
        message_id_len: 0,
        key_len: 32,
        kd_output_len: 0,
        cek_algorithm: "AES/CBC/PKCS5Padding",
    };

    /// AES-256-GCM without key commitment.
    pub const AES_256_GCM_IV12_TAG16_NO_KDF: AlgorithmSuite = AlgorithmSuite {
        id: AlgorithmSuiteId::Aes256GcmIv12Tag16NoKdf,
        suite_id: 0x0072,
        iv_len: 12,
        tag_len: Some(16),
        message_id_len: 0,
        key_len: 32,
        kd_output_len: 0,
        cek_algorithm: "AES/GCM/NoPadding",
    };

    /// AES-256-GCM with HKDF-SHA512 content-key derivation and key
    /// commitment. The canonical string is the decimal suite id.
    pub const AES_256_GCM_HKDF_SHA512_COMMIT_KEY: AlgorithmSuite = AlgorithmSuite {
        id: AlgorithmSuiteId::Aes256GcmHkdfSha512CommitKey,
        suite_id: 0x0073,
        iv_len: 12,
        tag_len: Some(16),
        message_id_len: 12,
        key_len: 32,
        kd_output_len: 32,
        cek_algorithm: "115",
    };

    /// Looks a suite up by its canonical content-encryption string.
    ///
    /// Returns `None` for strings outside the supported table; callers map
    /// that to an unsupported-algorithm error with surrounding context.
    pub fn from_cek_algorithm(value: &str) -> Option<AlgorithmSuite> {
        match value {
            "AES/CBC/PKCS5Padding" => Some(Self::AES_256_CBC_IV16_NO_KDF),
            "AES/GCM/NoPadding" => Some(Self::AES_256_GCM_IV12_TAG16_NO_KDF),
            "115" => Some(Self::AES_256_GCM_HKDF_SHA512_COMMIT_KEY),
            _ => None,
        }
    }

    /// Looks a suite up by its two-byte id.
    pub fn from_suite_id(id: u16) -> Option<AlgorithmSuite> {
        match id {
            0x0070 => Some(Self::AES_256_CBC_IV16_NO_KDF),
            0x0072 => Some(Self::AES_256_GCM_IV12_TAG16_NO_KDF),
            0x0073 => Some(Self::AES_256_GCM_HKDF_SHA512_COMMIT_KEY),
            _ => None,
        }
    }

    pub fn id(&self) -> AlgorithmSuiteId {
        self.id
    }

    pub fn suite_id(&self) -> u16 {
        self.suite_id
    }

    /// Two-byte big-endian suite id, used as GCM associated data and in the
    /// HKDF info labels of the committing suite.
    pub fn suite_id_bytes(&self) -> [u8; 2] {
        self.suite_id.to_be_bytes()
    }

    pub fn iv_len(&self) -> usize {
        self.iv_len
    }

    pub fn tag_len(&self) -> Option<usize> {
        self.tag_len
    }

    pub fn message_id_len(&self) -> usize {
        self.message_id_len
    }

    pub fn key_len(&self) -> usize {
        self.key_len
    }

    pub fn kd_output_len(&self) -> usize {
        self.kd_output_len
    }

    pub fn cek_algorithm(&self) -> &'static str {
        self.cek_algorithm
    }

    /// Whether this suite derives and verifies a key commitment.
    pub fn is_committing(&self) -> bool {
        self.id == AlgorithmSuiteId::Aes256GcmHkdfSha512CommitKey
    }

    /// Whether this suite is a legacy format readable only under an
    /// `…AndLegacy` security profile.
    pub fn is_legacy(&self) -> bool {
        self.id == AlgorithmSuiteId::Aes256CbcIv16NoKdf
    }

    /// Whether this suite carries a GCM authentication tag.
    pub fn is_authenticated(&self) -> bool {
        self.tag_len.is_some()
    }
}

impl std::fmt::Display for AlgorithmSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id {
            AlgorithmSuiteId::Aes256CbcIv16NoKdf => write!(f, "AES-256-CBC-IV16-NO-KDF"),
            AlgorithmSuiteId::Aes256GcmIv12Tag16NoKdf => write!(f, "AES-256-GCM-IV12-TAG16-NO-KDF"),
            AlgorithmSuiteId::Aes256GcmHkdfSha512CommitKey => {
                write!(f, "AES-256-GCM-HKDF-SHA512-COMMIT-KEY")
            }
        }
    }
}
