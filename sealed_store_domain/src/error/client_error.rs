// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Client Error System
//!
//! This module provides the error system for the sealed store encryption
//! client. It implements a structured error handling strategy that
//! categorizes failures, provides actionable error messages, and keeps the
//! cryptographic failure surface distinct from transport failures.
//!
//! ## Overview
//!
//! The error system is designed around a small number of stable tags:
//!
//! - **Envelope errors**: `UnsupportedAlgorithm`, `InvalidData`,
//!   `NotEncrypted` - the stored envelope cannot be understood or is not
//!   present.
//! - **Cryptographic errors**: `CryptoError`, `KeyCommitmentMismatch` -
//!   a primitive failed or an authenticity check did not hold. These are
//!   terminal: they are surfaced immediately and never retried.
//! - **Policy errors**: `PolicyViolation`, `NotSupported` - the configured
//!   security profile or commitment policy forbids the operation.
//! - **Caller errors**: `InvalidArgument`, `ProtocolViolation`,
//!   `EncryptionContextMismatch` - the caller supplied something the
//!   contract rejects.
//! - **Transport errors**: `StoreError`, `KeyProviderError`, `IoError`,
//!   `TimeoutError` - failures of the external collaborators, propagated
//!   with their kind intact. The encryption layer does not retry them.
//! - **Lifecycle**: `Cancelled` - the operation observed a cancellation
//!   token mid-stream.
//!
//! ## Error Handling Patterns
//!
//! Errors are created through the helper constructors and propagated with
//! `?`. Cryptographic functions return a `Result`; streaming wrappers
//! surface errors on the read call that detects them.

use thiserror::Error;

/// Domain-specific errors for the client-side object encryption system.
///
/// Each variant carries a descriptive message. Variant names are the stable
/// error tags of the system contract; match on the variant, not on the
/// message text.
///
/// ## Design Principles
///
/// - **Specific**: Each variant represents a specific failure mode
/// - **Actionable**: Messages provide enough context for debugging
/// - **Categorized**: Variants group into envelope / crypto / policy /
///   caller / transport classes for systematic handling
/// - **Terminal crypto**: Cryptographic failures are never retried
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Failed to decrypt: {0}")]
    CryptoError(String),

    #[error("Key commitment mismatch: {0}")]
    KeyCommitmentMismatch(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Encryption context mismatch: {0}")]
    EncryptionContextMismatch(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Object is not encrypted: {0}")]
    NotEncrypted(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Object store error: {0}")]
    StoreError(String),

    #[error("Key provider error: {0}")]
    KeyProviderError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ClientError {
    /// Creates a new unsupported-algorithm error
    pub fn unsupported_algorithm(msg: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(msg.into())
    }

    /// Creates a new invalid-data error (broken envelope structure)
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Creates a new cryptographic error
    pub fn crypto_error(msg: impl Into<String>) -> Self {
        Self::CryptoError(msg.into())
    }

    /// Creates a new policy violation error
    pub fn policy_violation(msg: impl Into<String>) -> Self {
        Self::PolicyViolation(msg.into())
    }

    /// Creates a new invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates a new protocol violation error
    pub fn protocol_violation(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    /// Creates a new object store transport error
    pub fn store_error(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    /// Creates a new key provider transport error
    pub fn key_provider_error(msg: impl Into<String>) -> Self {
        Self::KeyProviderError(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Checks if the error is recoverable by retrying the transport call.
    ///
    /// Cryptographic errors are never recoverable; only transport-class
    /// failures may be retried, and the retry belongs to the store layer,
    /// not to this crate.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ClientError::TimeoutError(_) | ClientError::StoreError(_) | ClientError::IoError(_)
        )
    }

    /// Checks if the error is a security-relevant failure
    pub fn is_security_error(&self) -> bool {
        matches!(
            self,
            ClientError::CryptoError(_)
                | ClientError::KeyCommitmentMismatch(_)
                | ClientError::EncryptionContextMismatch(_)
                | ClientError::PolicyViolation(_)
        )
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::UnsupportedAlgorithm(_) => "envelope",
            ClientError::InvalidData(_) => "envelope",
            ClientError::NotEncrypted(_) => "envelope",
            ClientError::CryptoError(_) => "crypto",
            ClientError::KeyCommitmentMismatch(_) => "crypto",
            ClientError::PolicyViolation(_) => "policy",
            ClientError::NotSupported(_) => "policy",
            ClientError::EncryptionContextMismatch(_) => "caller",
            ClientError::InvalidArgument(_) => "caller",
            ClientError::ProtocolViolation(_) => "caller",
            ClientError::Cancelled(_) => "cancellation",
            ClientError::StoreError(_) => "transport",
            ClientError::KeyProviderError(_) => "transport",
            ClientError::IoError(_) => "transport",
            ClientError::TimeoutError(_) => "transport",
            ClientError::SerializationError(_) => "serialization",
            ClientError::InternalError(_) => "internal",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        // Streams carry domain errors through std::io; recover the original
        // variant instead of flattening it into a transport error.
        if let Some(inner) = err.get_ref().and_then(|inner| inner.downcast_ref::<ClientError>()) {
            return inner.clone();
        }
        ClientError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::SerializationError(err.to_string())
    }
}
