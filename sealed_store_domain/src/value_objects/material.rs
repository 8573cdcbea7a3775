// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Encryption Materials Value Object
//!
//! This module defines the key-encrypting-key (KEK) material supplied by the
//! caller at client construction. Exactly one KEK kind is carried per
//! material value: an RSA key pair, a symmetric AES key, or a KMS key
//! identifier with its encryption context.
//!
//! ## Overview
//!
//! - **Sum Type**: The `Material` enum makes "exactly one of asymmetric,
//!   symmetric, KMS" a structural invariant rather than a runtime check
//! - **Reserved-Key Guard**: Caller-supplied description/context maps are
//!   rejected when they contain the reserved `aws:x-amz-cek-alg` entry
//! - **Memory Hygiene**: The symmetric KEK is zeroized on drop
//! - **Immutability**: Materials are constructed once and never mutated;
//!   the client holds them for its whole lifetime
//!
//! ## KEK Kinds
//!
//! | Kind | Algorithm tag | Wrap operation |
//! |------|---------------|----------------|
//! | Asymmetric | `RSA-OAEP-SHA1` | RSA-OAEP over the inner wrap |
//! | Symmetric | `AES/GCM` | AES-GCM over the inner wrap |
//! | KMS | `kms+context` | KMS `GenerateDataKey` / `Decrypt` |

use std::collections::BTreeMap;

use rsa::RsaPrivateKey;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::ClientError;

/// Reserved encryption-context key injected by the client on KMS wraps.
///
/// Caller-supplied maps containing this key are rejected at the boundary;
/// the value is always derived from the configured content algorithm.
pub const RESERVED_CEK_ALG_KEY: &str = "aws:x-amz-cek-alg";

/// Material description / encryption context map.
///
/// A `BTreeMap` keeps the serialized JSON rendering deterministic, which the
/// decrypt-side exact-equality context check depends on.
pub type StringMap = BTreeMap<String, String>;

/// Asymmetric KEK algorithm kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsymmetricAlgorithm {
    /// RSA-OAEP with SHA-1 digest and MGF1-SHA1.
    RsaOaepSha1,
}

/// Symmetric KEK algorithm kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetricAlgorithm {
    /// AES-GCM key wrap with the CEK algorithm string as associated data.
    AesGcm,
}

/// KMS KEK algorithm kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KmsAlgorithm {
    /// KMS data-key generation bound to an encryption context.
    KmsContext,
}

/// A symmetric key-encrypting key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKek {
    bytes: Vec<u8>,
}

impl SymmetricKek {
    /// Wraps raw AES-256 key bytes. Rejects any other length.
    pub fn new(bytes: Vec<u8>) -> Result<Self, ClientError> {
        if bytes.len() != 32 {
            return Err(ClientError::invalid_argument(format!(
                "symmetric KEK must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for SymmetricKek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key bytes.
        f.debug_struct("SymmetricKek").field("len", &self.bytes.len()).finish()
    }
}

/// Caller-owned key-encrypting material, one kind per value.
#[derive(Debug, Clone)]
pub enum Material {
    /// RSA key pair; the private key also yields the public half.
    Asymmetric {
        kind: AsymmetricAlgorithm,
        key_pair: RsaPrivateKey,
        description: StringMap,
    },
    /// Locally-held AES key.
    Symmetric {
        kind: SymmetricAlgorithm,
        key: SymmetricKek,
        description: StringMap,
    },
    /// KMS key identifier plus the encryption context sent on every call.
    Kms {
        kind: KmsAlgorithm,
        key_id: String,
        encryption_context: StringMap,
    },
}

impl Material {
    /// Creates RSA-OAEP-SHA1 materials from a key pair.
    pub fn rsa_oaep_sha1(key_pair: RsaPrivateKey) -> Self {
        Material::Asymmetric {
            kind: AsymmetricAlgorithm::RsaOaepSha1,
            key_pair,
            description: StringMap::new(),
        }
    }

    /// Creates AES-GCM materials from raw AES-256 key bytes.
    pub fn aes_gcm(key_bytes: Vec<u8>) -> Result<Self, ClientError> {
        Ok(Material::Symmetric {
            kind: SymmetricAlgorithm::AesGcm,
            key: SymmetricKek::new(key_bytes)?,
            description: StringMap::new(),
        })
    }

    /// Creates KMS materials with the context sent on every KMS call.
    ///
    /// The context map may not contain the reserved `aws:x-amz-cek-alg`
    /// entry; that value is injected by the client itself.
    pub fn kms_context(key_id: impl Into<String>, encryption_context: StringMap) -> Result<Self, ClientError> {
        reject_reserved_key(&encryption_context)?;
        Ok(Material::Kms {
            kind: KmsAlgorithm::KmsContext,
            key_id: key_id.into(),
            encryption_context,
        })
    }

    /// Attaches a material-description map to non-KMS materials.
    ///
    /// Rejected for KMS materials (KMS carries an encryption context
    /// instead) and for maps containing the reserved key.
    pub fn with_description(self, description: StringMap) -> Result<Self, ClientError> {
        reject_reserved_key(&description)?;
        match self {
            Material::Asymmetric { kind, key_pair, .. } => Ok(Material::Asymmetric {
                kind,
                key_pair,
                description,
            }),
            Material::Symmetric { kind, key, .. } => Ok(Material::Symmetric { kind, key, description }),
            Material::Kms { .. } => Err(ClientError::invalid_argument(
                "KMS materials carry an encryption context, not a material description",
            )),
        }
    }

    /// The material-description map; empty for KMS materials.
    pub fn description(&self) -> &StringMap {
        static EMPTY: StringMap = StringMap::new();
        match self {
            Material::Asymmetric { description, .. } | Material::Symmetric { description, .. } => description,
            Material::Kms { .. } => &EMPTY,
        }
    }

    pub fn is_kms(&self) -> bool {
        matches!(self, Material::Kms { .. })
    }
}

/// Rejects any caller-supplied map carrying the reserved CEK-alg key.
pub fn reject_reserved_key(map: &StringMap) -> Result<(), ClientError> {
    if map.contains_key(RESERVED_CEK_ALG_KEY) {
        return Err(ClientError::invalid_argument(format!(
            "encryption context key {RESERVED_CEK_ALG_KEY} is reserved"
        )));
    }
    Ok(())
}
