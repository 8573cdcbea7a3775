// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error Module
//!
//! Error types for the client-side object encryption domain. The module
//! defines a single sum-of-errors, [`ClientError`], that every layer of the
//! workspace returns; there are no panics or exception-style control flow in
//! non-test code.

mod client_error;

pub use client_error::ClientError;
