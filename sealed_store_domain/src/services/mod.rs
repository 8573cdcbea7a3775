// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Services Module
//!
//! Stateless domain rules (the policy service) and the async infrastructure
//! ports this layer consumes but does not implement: the object store and
//! the key provider. Port implementations live in the infrastructure layer
//! of the main crate and in test doubles.

pub mod key_provider;
pub mod object_store;
pub mod policy_service;

pub use key_provider::{DataKey, KeyProvider, DATA_KEY_SPEC_AES_256};
pub use object_store::{ByteRange, ObjectBody, ObjectMetadata, ObjectStore, PartInfo};
pub use policy_service::{
    validate_client_policy, validate_decrypt, CommitmentPolicy, ContentEncryptionAlgorithm, SecurityProfile,
    StorageMode,
};
