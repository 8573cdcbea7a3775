// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Key Provider Port
//!
//! Infrastructure port for the external key-management service. The
//! provider generates per-object data keys (returning both the plaintext
//! key and the ciphertext blob that travels in the envelope) and decrypts
//! blobs back to plaintext keys. Credentials, endpoints, and transport
//! belong to the implementation; the handle is constructed once at client
//! initialization and shared behind an `Arc` - there is no lazily
//! initialized global.

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::error::ClientError;
use crate::value_objects::StringMap;

/// Key spec requested from the provider for content-encryption keys.
pub const DATA_KEY_SPEC_AES_256: &str = "AES_256";

/// A generated data key: plaintext half for local encryption, ciphertext
/// half for the envelope. The plaintext is zeroized on drop.
pub struct DataKey {
    pub plaintext: Zeroizing<Vec<u8>>,
    pub ciphertext_blob: Vec<u8>,
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataKey")
            .field("plaintext_len", &self.plaintext.len())
            .field("ciphertext_len", &self.ciphertext_blob.len())
            .finish()
    }
}

/// Port to the key-management service.
///
/// The encryption context is authenticated by the provider: `decrypt` fails
/// when the supplied context differs from the one given at generation.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Generates a fresh data key under `key_id`, bound to
    /// `encryption_context`.
    async fn generate_data_key(
        &self,
        key_id: &str,
        encryption_context: &StringMap,
        key_spec: &str,
    ) -> Result<DataKey, ClientError>;

    /// Decrypts a ciphertext blob under the same encryption context it was
    /// generated with.
    async fn decrypt(
        &self,
        ciphertext_blob: &[u8],
        encryption_context: &StringMap,
    ) -> Result<Zeroizing<Vec<u8>>, ClientError>;
}
