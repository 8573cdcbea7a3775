// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sealed Store Domain
//!
//! The domain layer of the sealed store client-side object encryption
//! library. It holds the business rules of the cryptographic envelope and
//! is independent of any transport, runtime, or cipher implementation.
//!
//! ## Module Structure
//!
//! - **`value_objects`** - immutable, self-validating values: algorithm
//!   suite descriptors, key-encrypting materials, the per-object envelope
//!   record, the cancellation token
//! - **`entities`** - the per-multipart-upload context (identity = upload
//!   id, mutable bookkeeping state)
//! - **`services`** - the stateless policy engine plus the async ports this
//!   layer consumes: `ObjectStore` and `KeyProvider`
//! - **`error`** - the workspace-wide `ClientError` sum type
//!
//! ## Design Rules
//!
//! - One pipeline, parameterized by an [`AlgorithmSuite`] value; no
//!   per-format client hierarchies
//! - Exactly one KEK kind per [`Material`] value, enforced structurally
//! - Key bytes live in zeroize-on-drop containers and never appear in
//!   `Debug` output
//! - All policy checks run before any I/O

pub mod entities;
pub mod error;
pub mod services;
pub mod value_objects;

// Re-export commonly used types for convenient access
// These exports provide a clean API surface for consumers of the domain layer
pub use entities::UploadPartContext;
pub use error::ClientError;
pub use services::{
    validate_client_policy, validate_decrypt, ByteRange, CommitmentPolicy, ContentEncryptionAlgorithm, DataKey,
    KeyProvider, ObjectBody, ObjectMetadata, ObjectStore, PartInfo, SecurityProfile, StorageMode,
    DATA_KEY_SPEC_AES_256,
};
pub use value_objects::{
    AlgorithmSuite, AlgorithmSuiteId, CancellationToken, EncryptionInstructions, Material, StringMap,
    RESERVED_CEK_ALG_KEY,
};
