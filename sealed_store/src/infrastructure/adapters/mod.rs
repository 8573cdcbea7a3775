// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Adapters
//!
//! Concrete cryptographic building blocks: the content cipher engines, the
//! entropy source, HKDF derivation, and the streaming wrappers that carry
//! object bodies through them.

pub mod content_cipher;
pub mod decrypt_stream;
pub mod encrypt_stream;
pub mod entropy;
pub mod kdf;

use sealed_store_domain::ClientError;

/// Wraps a domain error for transport through `std::io` stream traits.
pub(crate) fn to_io_error(err: ClientError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err)
}

/// Recovers the domain error from an `std::io::Error`, falling back to the
/// IO transport kind for errors raised by the underlying source.
pub fn from_io_error(err: std::io::Error) -> ClientError {
    err.into()
}
