// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Entropy Adapter
//!
//! Cryptographically secure random bytes for CEKs, IVs, nonces, and message
//! ids. Generated IVs and message ids are rejected when they come back all
//! zero; a zero value here means the platform RNG is broken, and an all-zero
//! nonce must never reach a cipher.

use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use sealed_store_domain::ClientError;

/// Secure random source. Cheap to clone conceptually; the client holds one
/// instance for its lifetime.
pub struct Entropy {
    rng: SystemRandom,
}

impl Default for Entropy {
    fn default() -> Self {
        Self::new()
    }
}

impl Entropy {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    /// Fills `buf` with random bytes.
    pub fn fill(&self, buf: &mut [u8]) -> Result<(), ClientError> {
        self.rng
            .fill(buf)
            .map_err(|e| ClientError::crypto_error(format!("random generation failed: {:?}", e)))
    }

    /// Generates `len` random bytes, rejecting an all-zero result.
    pub fn random_bytes(&self, len: usize) -> Result<Vec<u8>, ClientError> {
        let mut bytes = vec![0u8; len];
        self.fill(&mut bytes)?;
        if len > 0 && bytes.iter().all(|&b| b == 0) {
            return Err(ClientError::invalid_data(
                "random source produced an all-zero value",
            ));
        }
        Ok(bytes)
    }

    /// Generates key material in a zeroize-on-drop container.
    pub fn random_key(&self, len: usize) -> Result<Zeroizing<Vec<u8>>, ClientError> {
        Ok(Zeroizing::new(self.random_bytes(len)?))
    }
}
