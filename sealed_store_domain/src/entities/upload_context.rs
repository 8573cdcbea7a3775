// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Upload Part Context Entity
//!
//! Per-multipart-upload state, identified by the store's upload id. The
//! context owns the single encrypting cipher stream for the upload's whole
//! lifetime: the GCM state (and therefore the final authentication tag)
//! spans all parts, so re-creating the stream between parts would corrupt
//! the tag. Parts borrow the stream one at a time through an explicit
//! checkout/checkin pair; a second checkout while one is outstanding is the
//! caller error the contract names `ProtocolViolation`.
//!
//! ## Invariants
//!
//! - Part numbers are contiguous from 1
//! - No part may follow the final part
//! - At most one part may hold the stream at a time

use crate::error::ClientError;
use crate::services::policy_service::StorageMode;
use crate::value_objects::EncryptionInstructions;

/// State of one in-flight multipart upload.
///
/// Generic over the encrypting stream type `S`, which the application layer
/// supplies; this entity only manages ownership and ordering.
pub struct UploadPartContext<S> {
    upload_id: String,
    storage_mode: StorageMode,
    instructions: EncryptionInstructions,
    /// IV the stream was started with; recorded in the envelope.
    first_iv: Vec<u8>,
    /// Next part number the contract will accept.
    next_part_number: u64,
    final_part_seen: bool,
    /// The upload's cipher stream; `None` while a part has it checked out.
    stream: Option<S>,
    /// `(part_number, etag)` pairs for completion.
    parts: Vec<(u64, String)>,
}

impl<S> UploadPartContext<S> {
    pub fn new(
        upload_id: impl Into<String>,
        storage_mode: StorageMode,
        instructions: EncryptionInstructions,
        stream: S,
    ) -> Self {
        let first_iv = instructions.iv().to_vec();
        Self {
            upload_id: upload_id.into(),
            storage_mode,
            instructions,
            first_iv,
            next_part_number: 1,
            final_part_seen: false,
            stream: Some(stream),
            parts: Vec::new(),
        }
    }

    /// Borrows the cipher stream for `part_number`.
    ///
    /// Fails with `ProtocolViolation` when parts arrive out of order, after
    /// the final part, or while another part still holds the stream.
    pub fn checkout_stream(&mut self, part_number: u64) -> Result<S, ClientError> {
        if self.final_part_seen {
            return Err(ClientError::protocol_violation(format!(
                "upload {} already received its final part",
                self.upload_id
            )));
        }
        if part_number != self.next_part_number {
            return Err(ClientError::protocol_violation(format!(
                "upload {} expected part {}, got part {}",
                self.upload_id, self.next_part_number, part_number
            )));
        }
        self.stream.take().ok_or_else(|| {
            ClientError::protocol_violation(format!(
                "upload {} part {} attempted while another part holds the cipher stream",
                self.upload_id, part_number
            ))
        })
    }

    /// Returns the stream after a part completes and records its etag.
    pub fn checkin_stream(&mut self, stream: S, etag: String, is_final: bool) {
        self.parts.push((self.next_part_number, etag));
        self.next_part_number += 1;
        self.final_part_seen = is_final;
        self.stream = Some(stream);
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.storage_mode
    }

    pub fn instructions(&self) -> &EncryptionInstructions {
        &self.instructions
    }

    pub fn first_iv(&self) -> &[u8] {
        &self.first_iv
    }

    pub fn final_part_seen(&self) -> bool {
        self.final_part_seen
    }

    pub fn parts(&self) -> &[(u64, String)] {
        &self.parts
    }

    /// Consumes the context for completion, yielding the instructions and
    /// collected parts. Dropping the returned instructions zeroizes the CEK.
    pub fn into_completion(self) -> (EncryptionInstructions, Vec<(u64, String)>) {
        (self.instructions, self.parts)
    }
}
