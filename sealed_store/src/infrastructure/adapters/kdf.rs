// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Key Derivation Adapter
//!
//! HKDF-SHA512 derivation for the committing suite. Two values are derived
//! from the same `(CEK, message-id)` pair under different info labels:
//!
//! - `suite_id ‖ "DERIVEKEY"` → the content-encryption key actually fed to
//!   AES-GCM
//! - `suite_id ‖ "COMMITKEY"` → the key commitment stored in the envelope
//!
//! The commitment comparison is constant time; the check runs before the
//! content key is derived, so a tampered commitment fails without touching
//! the ciphertext.

use hkdf::Hkdf;
use sha2::Sha512;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use sealed_store_domain::{AlgorithmSuite, ClientError};

/// Info label deriving the content-encryption key.
const DERIVE_KEY_LABEL: &[u8] = b"DERIVEKEY";

/// Info label deriving the key commitment.
const COMMIT_KEY_LABEL: &[u8] = b"COMMITKEY";

fn expand(
    cek: &[u8],
    message_id: &[u8],
    suite: AlgorithmSuite,
    label: &[u8],
    out_len: usize,
) -> Result<Vec<u8>, ClientError> {
    let mut info = Vec::with_capacity(2 + label.len());
    info.extend_from_slice(&suite.suite_id_bytes());
    info.extend_from_slice(label);

    let hkdf = Hkdf::<Sha512>::new(Some(message_id), cek);
    let mut okm = vec![0u8; out_len];
    hkdf.expand(&info, &mut okm)
        .map_err(|e| ClientError::crypto_error(format!("HKDF expand failed: {}", e)))?;
    Ok(okm)
}

/// Derives the content-encryption key for a committing-suite object.
pub fn derive_content_key(
    cek: &[u8],
    message_id: &[u8],
    suite: AlgorithmSuite,
) -> Result<Zeroizing<Vec<u8>>, ClientError> {
    Ok(Zeroizing::new(expand(
        cek,
        message_id,
        suite,
        DERIVE_KEY_LABEL,
        suite.key_len(),
    )?))
}

/// Derives the key commitment for a committing-suite object.
pub fn derive_key_commitment(cek: &[u8], message_id: &[u8], suite: AlgorithmSuite) -> Result<Vec<u8>, ClientError> {
    expand(cek, message_id, suite, COMMIT_KEY_LABEL, suite.kd_output_len())
}

/// Constant-time equality for commitment values.
pub fn commitment_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
