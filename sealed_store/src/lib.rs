// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sealed Store
//!
//! Client-side object encryption for object stores. Plaintext is encrypted
//! before upload and decrypted after download; the store only ever sees
//! ciphertext, and keys never leave the caller's trust boundary except as
//! ciphertext blobs produced by a key-management service.
//!
//! ## Architecture Overview
//!
//! The crate follows the layered layout of its sibling projects:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Application Layer                          │
//! │  (EncryptionClient, multipart pipeline)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                             │
//! │  (suites, materials, instructions, policy, ports)           │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Infrastructure Layer                         │
//! │  (cipher engines, streams, envelope codec, key wrap)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Concepts
//!
//! ### Envelope encryption
//! Every object gets a fresh content-encryption key (CEK). The CEK is
//! wrapped by the caller's key-encrypting key - an RSA key pair, an AES
//! key, or a KMS key - and the wrapped blob travels alongside the
//! ciphertext as the object's *envelope*, either in metadata mapkeys or in
//! a `.instruction` sidecar object.
//!
//! ### Format generations
//! Three envelope generations are understood: V1 (CBC, read-only legacy),
//! V2 (AES-GCM), and V3 (AES-GCM with an HKDF-SHA512 derived content key
//! and a key commitment binding the CEK to its ciphertext).
//!
//! ### Policy
//! A security profile gates which legacy generations a client will *read*;
//! a commitment policy governs whether it must *write* committing
//! ciphertext and insist on it when reading. Both are checked at
//! construction, before any I/O.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sealed_store::{ClientConfig, EncryptionClient, GetOptions, PutOptions};
//! use sealed_store_domain::{Material, ObjectBody, StringMap};
//!
//! # async fn example(
//! #     store: Arc<dyn sealed_store_domain::ObjectStore>,
//! #     kms: Arc<dyn sealed_store_domain::KeyProvider>,
//! # ) -> Result<(), sealed_store_domain::ClientError> {
//! let material = Material::kms_context("alias/my-key", StringMap::new())?;
//! let client = EncryptionClient::new(store, material, Some(kms), ClientConfig::default())?;
//!
//! client
//!     .put_object("bucket", "report.pdf", ObjectBody::from_bytes(b"secret".to_vec()), PutOptions::default())
//!     .await?;
//! let (_metadata, body) = client.get_object("bucket", "report.pdf", GetOptions::default()).await?;
//! let plaintext = body.collect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Streaming
//!
//! Bodies are streamed through cipher wrappers; nothing buffers the whole
//! object. Decrypting streams verify the GCM tag at end-of-stream - always
//! consume a decrypted stream fully before trusting any byte of it. Ranged
//! reads are served through a CTR translation of the GCM keystream and are
//! not authenticated.

pub mod application;
pub mod infrastructure;

// Re-export the client surface and the domain types callers need with it.
pub use application::services::{ClientConfig, EncryptionClient, GetOptions, MultipartUploadHandle, PutOptions};
pub use infrastructure::adapters::from_io_error;
pub use sealed_store_domain::{
    AlgorithmSuite, ByteRange, CancellationToken, ClientError, CommitmentPolicy, ContentEncryptionAlgorithm,
    KeyProvider, Material, ObjectBody, ObjectMetadata, ObjectStore, SecurityProfile, StorageMode, StringMap,
};
