// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Decrypting Stream Wrappers
//!
//! Stream wrappers for the download side:
//!
//! - **GCM decrypt** - holds back the trailing 16 bytes until end-of-stream,
//!   then verifies the authentication tag. Callers MUST consume the entire
//!   stream before trusting any byte; verification only completes at EOF.
//! - **CTR ranged decrypt** - decrypts a byte range of a GCM object by
//!   translating the nonce to a counter position. The returned bytes are
//!   NOT authenticated; the range may stop short of the tag region, in
//!   which case the stream truncates there.
//! - **CBC decrypt** - legacy PKCS7-padded content, decrypt only.
//!
//! Every wrapper has a blocking and a non-blocking face producing identical
//! bytes, and checks its cancellation token on each read.

use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll};

use aes::cipher::StreamCipher;
use tokio::io::{AsyncRead, ReadBuf};

use sealed_store_domain::{ByteRange, CancellationToken, ClientError};

use super::content_cipher::{ctr_keystream_at, Aes256Ctr, CbcDecryptCore, GcmCipherCore, pkcs7_unpad, AES_BLOCK_LEN};
use super::to_io_error;

const SCRATCH_LEN: usize = 16 * 1024;

/// GCM decrypt state: withhold the candidate tag, decrypt the rest, verify
/// at end-of-stream.
pub(crate) struct GcmDecryptState {
    core: Option<GcmCipherCore>,
    tag_len: usize,
    holdback: Vec<u8>,
    verified: bool,
}

impl GcmDecryptState {
    pub(crate) fn new(key: &[u8], nonce: &[u8], aad: &[u8], tag_len: usize) -> Result<Self, ClientError> {
        Ok(Self {
            core: Some(GcmCipherCore::new(key, nonce, aad)?),
            tag_len,
            holdback: Vec::new(),
            verified: false,
        })
    }

    /// Feeds ciphertext, returning any plaintext that is certainly not
    /// part of the trailing tag.
    pub(crate) fn process(&mut self, input: &[u8]) -> Result<Vec<u8>, ClientError> {
        self.holdback.extend_from_slice(input);
        if self.holdback.len() <= self.tag_len {
            return Ok(Vec::new());
        }
        let release = self.holdback.len() - self.tag_len;
        let mut out: Vec<u8> = self.holdback.drain(..release).collect();
        self.core
            .as_mut()
            .ok_or_else(|| ClientError::internal_error("decrypt stream already finalized"))?
            .decrypt_chunk(&mut out)?;
        Ok(out)
    }

    /// Verifies the withheld tag at end-of-stream.
    pub(crate) fn finish(&mut self) -> Result<(), ClientError> {
        if self.verified {
            return Ok(());
        }
        let core = self
            .core
            .take()
            .ok_or_else(|| ClientError::internal_error("decrypt stream already finalized"))?;
        if self.holdback.len() != self.tag_len {
            return Err(ClientError::crypto_error(
                "ciphertext truncated before the authentication tag",
            ));
        }
        core.verify_tag(&self.holdback)?;
        self.verified = true;
        Ok(())
    }
}

/// Blocking GCM decrypt stream.
pub struct GcmDecryptStream<R> {
    inner: R,
    state: GcmDecryptState,
    out: Vec<u8>,
    out_pos: usize,
    done: bool,
    scratch: Box<[u8]>,
    cancellation: CancellationToken,
}

impl<R: Read> GcmDecryptStream<R> {
    pub fn new(
        inner: R,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        tag_len: usize,
        cancellation: CancellationToken,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            inner,
            state: GcmDecryptState::new(key, nonce, aad, tag_len)?,
            out: Vec::new(),
            out_pos: 0,
            done: false,
            scratch: vec![0u8; SCRATCH_LEN].into_boxed_slice(),
            cancellation,
        })
    }
}

impl<R: Read> Read for GcmDecryptStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.cancellation.ensure_active("decrypt stream").map_err(to_io_error)?;
        loop {
            if self.out_pos < self.out.len() {
                let n = buf.len().min(self.out.len() - self.out_pos);
                buf[..n].copy_from_slice(&self.out[self.out_pos..self.out_pos + n]);
                self.out_pos += n;
                return Ok(n);
            }
            if self.done {
                return Ok(0);
            }
            let n = self.inner.read(&mut self.scratch)?;
            if n == 0 {
                self.state.finish().map_err(to_io_error)?;
                self.done = true;
                continue;
            }
            self.out = self.state.process(&self.scratch[..n]).map_err(to_io_error)?;
            self.out_pos = 0;
        }
    }
}

/// Non-blocking GCM decrypt stream.
pub struct AsyncGcmDecryptStream<R> {
    inner: R,
    state: GcmDecryptState,
    out: Vec<u8>,
    out_pos: usize,
    done: bool,
    scratch: Box<[u8]>,
    cancellation: CancellationToken,
}

impl<R: AsyncRead + Unpin> AsyncGcmDecryptStream<R> {
    pub fn new(
        inner: R,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        tag_len: usize,
        cancellation: CancellationToken,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            inner,
            state: GcmDecryptState::new(key, nonce, aad, tag_len)?,
            out: Vec::new(),
            out_pos: 0,
            done: false,
            scratch: vec![0u8; SCRATCH_LEN].into_boxed_slice(),
            cancellation,
        })
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for AsyncGcmDecryptStream<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.cancellation.ensure_active("decrypt stream") {
            return Poll::Ready(Err(to_io_error(e)));
        }
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            if this.out_pos < this.out.len() {
                let n = buf.remaining().min(this.out.len() - this.out_pos);
                buf.put_slice(&this.out[this.out_pos..this.out_pos + n]);
                this.out_pos += n;
                return Poll::Ready(Ok(()));
            }
            if this.done {
                return Poll::Ready(Ok(()));
            }
            let mut scratch_buf = ReadBuf::new(&mut this.scratch);
            match Pin::new(&mut this.inner).poll_read(cx, &mut scratch_buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(())) => {
                    let n = scratch_buf.filled().len();
                    if n == 0 {
                        if let Err(e) = this.state.finish() {
                            return Poll::Ready(Err(to_io_error(e)));
                        }
                        this.done = true;
                        continue;
                    }
                    match this.state.process(&this.scratch[..n]) {
                        Ok(out) => {
                            this.out = out;
                            this.out_pos = 0;
                        }
                        Err(e) => return Poll::Ready(Err(to_io_error(e))),
                    }
                }
            }
        }
    }
}

/// Shared CTR ranged-read bookkeeping: keystream position plus tag-region
/// truncation.
struct CtrRangedState {
    cipher: Aes256Ctr,
    remaining: u64,
}

impl CtrRangedState {
    fn new(
        key: &[u8],
        nonce: &[u8],
        tag_len: usize,
        range: ByteRange,
        total_ciphertext_len: u64,
    ) -> Result<Self, ClientError> {
        let content_len = total_ciphertext_len
            .checked_sub(tag_len as u64)
            .ok_or_else(|| ClientError::invalid_data("object is shorter than its authentication tag"))?;
        let cipher = ctr_keystream_at(key, nonce, range.start)?;
        // Truncate the readable span where it overlaps the tag region.
        let remaining = if range.start >= content_len {
            0
        } else {
            (range.end + 1).min(content_len) - range.start
        };
        Ok(Self { cipher, remaining })
    }

    fn take(&mut self, available: usize) -> usize {
        (self.remaining.min(available as u64)) as usize
    }

    fn decrypt(&mut self, buf: &mut [u8]) {
        self.cipher.apply_keystream(buf);
        self.remaining -= buf.len() as u64;
    }
}

/// Blocking CTR decrypt stream for ranged reads of GCM objects.
///
/// Seeking is not supported; the range is fixed at construction.
pub struct CtrDecryptStream<R> {
    inner: R,
    state: CtrRangedState,
    cancellation: CancellationToken,
}

impl<R: Read> CtrDecryptStream<R> {
    pub fn new(
        inner: R,
        key: &[u8],
        nonce: &[u8],
        tag_len: usize,
        range: ByteRange,
        total_ciphertext_len: u64,
        cancellation: CancellationToken,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            inner,
            state: CtrRangedState::new(key, nonce, tag_len, range, total_ciphertext_len)?,
            cancellation,
        })
    }
}

impl<R: Read> Read for CtrDecryptStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cancellation.ensure_active("ranged decrypt stream").map_err(to_io_error)?;
        let want = self.state.take(buf.len());
        if want == 0 {
            return Ok(0);
        }
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 {
            return Ok(0);
        }
        self.state.decrypt(&mut buf[..n]);
        Ok(n)
    }
}

/// Non-blocking CTR decrypt stream for ranged reads of GCM objects.
pub struct AsyncCtrDecryptStream<R> {
    inner: R,
    state: CtrRangedState,
    scratch: Box<[u8]>,
    cancellation: CancellationToken,
}

impl<R: AsyncRead + Unpin> AsyncCtrDecryptStream<R> {
    pub fn new(
        inner: R,
        key: &[u8],
        nonce: &[u8],
        tag_len: usize,
        range: ByteRange,
        total_ciphertext_len: u64,
        cancellation: CancellationToken,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            inner,
            state: CtrRangedState::new(key, nonce, tag_len, range, total_ciphertext_len)?,
            scratch: vec![0u8; SCRATCH_LEN].into_boxed_slice(),
            cancellation,
        })
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for AsyncCtrDecryptStream<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.cancellation.ensure_active("ranged decrypt stream") {
            return Poll::Ready(Err(to_io_error(e)));
        }
        let want = this.state.take(buf.remaining().min(this.scratch.len()));
        if want == 0 {
            return Poll::Ready(Ok(()));
        }
        let mut scratch_buf = ReadBuf::new(&mut this.scratch[..want]);
        match Pin::new(&mut this.inner).poll_read(cx, &mut scratch_buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Ready(Ok(())) => {
                let n = scratch_buf.filled().len();
                if n > 0 {
                    this.state.decrypt(&mut this.scratch[..n]);
                    buf.put_slice(&this.scratch[..n]);
                }
                Poll::Ready(Ok(()))
            }
        }
    }
}

/// CBC decrypt state: hold back the final block for PKCS7 unpadding.
pub(crate) struct CbcDecryptState {
    core: CbcDecryptCore,
    pending: Vec<u8>,
}

impl CbcDecryptState {
    pub(crate) fn new(key: &[u8], iv: &[u8]) -> Result<Self, ClientError> {
        Ok(Self {
            core: CbcDecryptCore::new(key, iv)?,
            pending: Vec::new(),
        })
    }

    /// Feeds ciphertext, returning every decrypted block except the last
    /// full one (which may carry padding).
    pub(crate) fn process(&mut self, input: &[u8]) -> Result<Vec<u8>, ClientError> {
        self.pending.extend_from_slice(input);
        let full = self.pending.len() - self.pending.len() % AES_BLOCK_LEN;
        let release = full.saturating_sub(AES_BLOCK_LEN);
        if release == 0 {
            return Ok(Vec::new());
        }
        let mut out: Vec<u8> = self.pending.drain(..release).collect();
        self.core.decrypt_blocks(&mut out)?;
        Ok(out)
    }

    /// Decrypts and unpads the final block at end-of-stream.
    pub(crate) fn finish(&mut self) -> Result<Vec<u8>, ClientError> {
        if self.pending.len() != AES_BLOCK_LEN {
            return Err(ClientError::crypto_error(
                "ciphertext length is not a multiple of the cipher block",
            ));
        }
        let mut last: Vec<u8> = self.pending.drain(..).collect();
        self.core.decrypt_blocks(&mut last)?;
        Ok(pkcs7_unpad(&last)?.to_vec())
    }
}

/// Blocking CBC decrypt stream (legacy content format).
pub struct CbcDecryptStream<R> {
    inner: R,
    state: CbcDecryptState,
    out: Vec<u8>,
    out_pos: usize,
    done: bool,
    scratch: Box<[u8]>,
    cancellation: CancellationToken,
}

impl<R: Read> CbcDecryptStream<R> {
    pub fn new(
        inner: R,
        key: &[u8],
        iv: &[u8],
        cancellation: CancellationToken,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            inner,
            state: CbcDecryptState::new(key, iv)?,
            out: Vec::new(),
            out_pos: 0,
            done: false,
            scratch: vec![0u8; SCRATCH_LEN].into_boxed_slice(),
            cancellation,
        })
    }
}

impl<R: Read> Read for CbcDecryptStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.cancellation.ensure_active("decrypt stream").map_err(to_io_error)?;
        loop {
            if self.out_pos < self.out.len() {
                let n = buf.len().min(self.out.len() - self.out_pos);
                buf[..n].copy_from_slice(&self.out[self.out_pos..self.out_pos + n]);
                self.out_pos += n;
                return Ok(n);
            }
            if self.done {
                return Ok(0);
            }
            let n = self.inner.read(&mut self.scratch)?;
            if n == 0 {
                self.out = self.state.finish().map_err(to_io_error)?;
                self.out_pos = 0;
                self.done = true;
                continue;
            }
            self.out = self.state.process(&self.scratch[..n]).map_err(to_io_error)?;
            self.out_pos = 0;
        }
    }
}

/// Non-blocking CBC decrypt stream (legacy content format).
pub struct AsyncCbcDecryptStream<R> {
    inner: R,
    state: CbcDecryptState,
    out: Vec<u8>,
    out_pos: usize,
    done: bool,
    scratch: Box<[u8]>,
    cancellation: CancellationToken,
}

impl<R: AsyncRead + Unpin> AsyncCbcDecryptStream<R> {
    pub fn new(
        inner: R,
        key: &[u8],
        iv: &[u8],
        cancellation: CancellationToken,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            inner,
            state: CbcDecryptState::new(key, iv)?,
            out: Vec::new(),
            out_pos: 0,
            done: false,
            scratch: vec![0u8; SCRATCH_LEN].into_boxed_slice(),
            cancellation,
        })
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for AsyncCbcDecryptStream<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.cancellation.ensure_active("decrypt stream") {
            return Poll::Ready(Err(to_io_error(e)));
        }
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            if this.out_pos < this.out.len() {
                let n = buf.remaining().min(this.out.len() - this.out_pos);
                buf.put_slice(&this.out[this.out_pos..this.out_pos + n]);
                this.out_pos += n;
                return Poll::Ready(Ok(()));
            }
            if this.done {
                return Poll::Ready(Ok(()));
            }
            let mut scratch_buf = ReadBuf::new(&mut this.scratch);
            match Pin::new(&mut this.inner).poll_read(cx, &mut scratch_buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(())) => {
                    let n = scratch_buf.filled().len();
                    let result = if n == 0 {
                        this.done = true;
                        this.state.finish()
                    } else {
                        this.state.process(&this.scratch[..n])
                    };
                    match result {
                        Ok(out) => {
                            this.out = out;
                            this.out_pos = 0;
                        }
                        Err(e) => return Poll::Ready(Err(to_io_error(e))),
                    }
                }
            }
        }
    }
}
