// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Value Objects Module
//!
//! Immutable, self-validating values of the encryption domain: algorithm
//! suite descriptors, key-encrypting materials, the per-object envelope
//! record, and the cancellation token handed to streaming calls.

pub mod algorithm_suite;
pub mod cancellation;
pub mod encryption_instructions;
pub mod material;

pub use algorithm_suite::{AlgorithmSuite, AlgorithmSuiteId};
pub use cancellation::CancellationToken;
pub use encryption_instructions::EncryptionInstructions;
pub use material::{
    reject_reserved_key, AsymmetricAlgorithm, KmsAlgorithm, Material, StringMap, SymmetricAlgorithm, SymmetricKek,
    RESERVED_CEK_ALG_KEY,
};
