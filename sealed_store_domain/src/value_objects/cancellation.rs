// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Cancellation Token
//!
//! Clone-able token for cancelling in-flight operations. Every streaming
//! call accepts one; on cancellation the cipher state is dropped, key
//! material is zeroized, and the operation reports `Cancelled`. There is no
//! resume.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::error::ClientError;

/// Cancellation token for signaling that an operation should stop.
///
/// Lightweight and clone-able; all clones observe the same flag.
#[derive(Clone)]
pub struct CancellationToken {
    /// Shared cancellation flag
    cancelled: Arc<AtomicBool>,
    /// Notification for async waiters
    notify: Arc<Notify>,
}

impl CancellationToken {
    /// Create a new, un-cancelled token
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Cancel this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Check if cancelled (non-blocking)
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for cancellation (async)
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        loop {
            self.notify.notified().await;
            if self.is_cancelled() {
                return;
            }
        }
    }

    /// Returns `Cancelled` if the token has fired; used at stream read
    /// boundaries.
    pub fn ensure_active(&self, operation: &str) -> Result<(), ClientError> {
        if self.is_cancelled() {
            return Err(ClientError::Cancelled(operation.to_string()));
        }
        Ok(())
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
