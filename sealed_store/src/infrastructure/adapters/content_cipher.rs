// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Content Cipher Adapters
//!
//! This module provides the cipher primitives behind the streaming layer:
//! an incremental AES-256-GCM engine, the GCM-nonce to CTR-counter
//! translation used for ranged reads, and the legacy CBC/ECB decrypt
//! primitives.
//!
//! ## Why an incremental GCM engine
//!
//! The streaming contract feeds one GCM message across many reads - and,
//! for multipart uploads, across many parts - with the authentication tag
//! produced exactly once at end-of-stream. The one-shot AEAD API cannot
//! express that, so the engine is assembled from the same parts the
//! one-shot implementation uses internally: AES-CTR with a 32-bit
//! big-endian counter over the pre-counter block `J0`, and GHASH over the
//! associated data and ciphertext. One-shot key-wrap operations still go
//! through the high-level AEAD API in the assembly layer.
//!
//! ## Counter layout
//!
//! For a 12-byte nonce, `J0 = nonce ‖ 0x00000001`. Block `J0` produces the
//! tag mask; content keystream starts at `J0 + 1`. A ranged read at byte
//! offset `p` (16-aligned) therefore seeks the keystream to block
//! `1 + p / 16`.

use aes::cipher::Array as GenericArray;
use aes::cipher::{BlockModeDecrypt, KeyIvInit, StreamCipher, StreamCipherSeek};
use aes::Aes256;
use ghash::universal_hash::{KeyInit as UhKeyInit, UniversalHash};
use ghash::GHash;
use subtle::ConstantTimeEq;

use sealed_store_domain::ClientError;

/// AES-256 in CTR mode with a 32-bit big-endian counter, as used by GCM.
pub type Aes256Ctr = ctr::Ctr32BE<Aes256>;

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256EcbDec = ecb::Decryptor<Aes256>;

/// GCM nonce length this implementation supports.
pub const GCM_NONCE_LEN: usize = 12;

/// GCM authentication tag length.
pub const GCM_TAG_LEN: usize = 16;

/// AES block length.
pub const AES_BLOCK_LEN: usize = 16;

/// Largest plaintext a single GCM message may carry (2^39 - 256 bits).
pub const MAX_GCM_PLAINTEXT_LEN: u64 = (1 << 36) - 32;

/// Builds the GCM pre-counter block `J0` for a 12-byte nonce.
pub fn gcm_pre_counter_block(nonce: &[u8]) -> Result<[u8; 16], ClientError> {
    if nonce.len() != GCM_NONCE_LEN {
        return Err(ClientError::invalid_argument(format!(
            "GCM nonce must be {} bytes, got {}",
            GCM_NONCE_LEN,
            nonce.len()
        )));
    }
    let mut j0 = [0u8; 16];
    j0[..GCM_NONCE_LEN].copy_from_slice(nonce);
    j0[15] = 1;
    Ok(j0)
}

/// Positions an AES-CTR keystream for a ranged read of a GCM-encrypted
/// object.
///
/// `byte_offset` is the offset into the original ciphertext and must be a
/// multiple of the AES block size; ranged decryption cannot start inside a
/// keystream block.
pub fn ctr_keystream_at(key: &[u8], nonce: &[u8], byte_offset: u64) -> Result<Aes256Ctr, ClientError> {
    if key.len() != 32 {
        return Err(ClientError::invalid_argument(format!(
            "AES-256 requires a 32-byte key, got {}",
            key.len()
        )));
    }
    if byte_offset % AES_BLOCK_LEN as u64 != 0 {
        return Err(ClientError::invalid_argument(format!(
            "ranged read offset {} is not a multiple of the {}-byte cipher block",
            byte_offset, AES_BLOCK_LEN
        )));
    }
    let j0 = gcm_pre_counter_block(nonce)?;
    let mut cipher = Aes256Ctr::new(GenericArray::from_slice(key), GenericArray::from_slice(&j0));
    // Skip the tag-mask block at J0, then the per-range block delta.
    cipher
        .try_seek(AES_BLOCK_LEN as u64 + byte_offset)
        .map_err(|e| ClientError::invalid_argument(format!("ranged read offset out of counter space: {}", e)))?;
    Ok(cipher)
}

/// Incremental AES-256-GCM over a single message.
///
/// Construct once per object (or per multipart upload), feed chunks of any
/// size, finalize exactly once. Encryption and decryption halves differ
/// only in whether GHASH sees the bytes before or after the keystream is
/// applied.
pub struct GcmCipherCore {
    ctr: Aes256Ctr,
    ghash: GHash,
    /// `E(J0)`, XORed into the GHASH output to form the tag.
    tag_mask: [u8; 16],
    aad_len: u64,
    data_len: u64,
    /// Pending sub-block bytes not yet fed to GHASH.
    partial: [u8; 16],
    partial_len: usize,
}

impl GcmCipherCore {
    pub fn new(key: &[u8], nonce: &[u8], aad: &[u8]) -> Result<Self, ClientError> {
        if key.len() != 32 {
            return Err(ClientError::invalid_argument(format!(
                "AES-256-GCM requires a 32-byte key, got {}",
                key.len()
            )));
        }
        let j0 = gcm_pre_counter_block(nonce)?;

        // H = AES_K(0^128), the GHASH key.
        use aes::cipher::{BlockCipherEncrypt, KeyInit};
        let block_cipher = Aes256::new(GenericArray::from_slice(key));
        let mut h = GenericArray::clone_from_slice(&[0u8; 16]);
        block_cipher.encrypt_block(&mut h);

        let mut ghash = GHash::new(&h);
        ghash.update_padded(aad);

        let mut ctr = Aes256Ctr::new(GenericArray::from_slice(key), GenericArray::from_slice(&j0));
        let mut tag_mask = [0u8; 16];
        ctr.apply_keystream(&mut tag_mask);

        Ok(Self {
            ctr,
            ghash,
            tag_mask,
            aad_len: aad.len() as u64,
            data_len: 0,
            partial: [0u8; 16],
            partial_len: 0,
        })
    }

    /// Encrypts a chunk in place and folds the ciphertext into the tag.
    pub fn encrypt_chunk(&mut self, buf: &mut [u8]) -> Result<(), ClientError> {
        self.check_message_len(buf.len())?;
        self.ctr.apply_keystream(buf);
        self.ghash_feed(buf);
        self.data_len += buf.len() as u64;
        Ok(())
    }

    /// Decrypts a chunk in place, folding the ciphertext into the tag
    /// first.
    pub fn decrypt_chunk(&mut self, buf: &mut [u8]) -> Result<(), ClientError> {
        self.check_message_len(buf.len())?;
        self.ghash_feed(buf);
        self.ctr.apply_keystream(buf);
        self.data_len += buf.len() as u64;
        Ok(())
    }

    /// Completes the message and returns the authentication tag.
    pub fn finalize_tag(mut self) -> [u8; 16] {
        if self.partial_len > 0 {
            let len = self.partial_len;
            let buf = self.partial;
            self.ghash.update_padded(&buf[..len]);
        }
        let mut len_block = [0u8; 16];
        len_block[..8].copy_from_slice(&(self.aad_len * 8).to_be_bytes());
        len_block[8..].copy_from_slice(&(self.data_len * 8).to_be_bytes());
        self.ghash.update(&[len_block.into()]);

        let s = self.ghash.finalize();
        let mut tag = [0u8; 16];
        for (i, byte) in tag.iter_mut().enumerate() {
            *byte = s[i] ^ self.tag_mask[i];
        }
        tag
    }

    /// Completes a decryption and verifies the received tag in constant
    /// time.
    pub fn verify_tag(self, received: &[u8]) -> Result<(), ClientError> {
        let computed = self.finalize_tag();
        if computed.ct_eq(received).into() {
            Ok(())
        } else {
            Err(ClientError::crypto_error("authentication tag mismatch"))
        }
    }

    fn check_message_len(&self, additional: usize) -> Result<(), ClientError> {
        if self.data_len + additional as u64 > MAX_GCM_PLAINTEXT_LEN {
            return Err(ClientError::invalid_argument(format!(
                "GCM message would exceed the {} byte limit",
                MAX_GCM_PLAINTEXT_LEN
            )));
        }
        Ok(())
    }

    fn ghash_feed(&mut self, mut data: &[u8]) {
        if self.partial_len > 0 {
            let take = (16 - self.partial_len).min(data.len());
            self.partial[self.partial_len..self.partial_len + take].copy_from_slice(&data[..take]);
            self.partial_len += take;
            data = &data[take..];
            if self.partial_len == 16 {
                self.ghash.update(&[self.partial.into()]);
                self.partial_len = 0;
            }
        }
        let full = data.len() - data.len() % 16;
        for chunk in data[..full].chunks_exact(16) {
            self.ghash.update(&[GenericArray::clone_from_slice(chunk)]);
        }
        let rest = &data[full..];
        self.partial[..rest.len()].copy_from_slice(rest);
        self.partial_len = rest.len();
    }
}

/// Strips PKCS7 padding, validating every pad byte.
pub fn pkcs7_unpad(data: &[u8]) -> Result<&[u8], ClientError> {
    let pad = *data
        .last()
        .ok_or_else(|| ClientError::crypto_error("padded plaintext is empty"))? as usize;
    if pad == 0 || pad > AES_BLOCK_LEN || pad > data.len() {
        return Err(ClientError::crypto_error("invalid padding"));
    }
    if data[data.len() - pad..].iter().any(|&b| b as usize != pad) {
        return Err(ClientError::crypto_error("invalid padding"));
    }
    Ok(&data[..data.len() - pad])
}

/// Incremental AES-256-CBC decryption (legacy content format).
///
/// Feeds must stay block-aligned; the stream wrapper handles buffering and
/// the PKCS7 unpad of the final block.
pub struct CbcDecryptCore {
    dec: Aes256CbcDec,
}

impl CbcDecryptCore {
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, ClientError> {
        if key.len() != 32 {
            return Err(ClientError::invalid_argument(format!(
                "AES-256-CBC requires a 32-byte key, got {}",
                key.len()
            )));
        }
        if iv.len() != AES_BLOCK_LEN {
            return Err(ClientError::invalid_argument(format!(
                "AES-CBC requires a {}-byte IV, got {}",
                AES_BLOCK_LEN,
                iv.len()
            )));
        }
        Ok(Self {
            dec: Aes256CbcDec::new(GenericArray::from_slice(key), GenericArray::from_slice(iv)),
        })
    }

    /// Decrypts whole blocks in place. `buf` length must be a multiple of
    /// the block size.
    pub fn decrypt_blocks(&mut self, buf: &mut [u8]) -> Result<(), ClientError> {
        if buf.len() % AES_BLOCK_LEN != 0 {
            return Err(ClientError::internal_error("CBC feed is not block aligned"));
        }
        for chunk in buf.chunks_exact_mut(AES_BLOCK_LEN) {
            self.dec.decrypt_block(GenericArray::from_mut_slice(chunk));
        }
        Ok(())
    }
}

/// One-shot AES-256-ECB decrypt with PKCS7 unpadding, for the V1-era
/// symmetric key wrap. Decrypt only.
pub fn ecb_unwrap_key(kek: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, ClientError> {
    use aes::cipher::KeyInit;
    if kek.len() != 32 {
        return Err(ClientError::invalid_argument(format!(
            "AES-256-ECB unwrap requires a 32-byte key, got {}",
            kek.len()
        )));
    }
    if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_LEN != 0 {
        return Err(ClientError::invalid_data(
            "ECB-wrapped key length is not a positive multiple of the block size",
        ));
    }
    let mut dec = Aes256EcbDec::new(GenericArray::from_slice(kek));
    let mut buf = ciphertext.to_vec();
    for chunk in buf.chunks_exact_mut(AES_BLOCK_LEN) {
        dec.decrypt_block(GenericArray::from_mut_slice(chunk));
    }
    let unpadded = pkcs7_unpad(&buf)?.to_vec();
    Ok(unpadded)
}
