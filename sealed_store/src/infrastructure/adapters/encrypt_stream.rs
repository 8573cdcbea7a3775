// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Encrypting Stream Wrappers
//!
//! Forward-only GCM encrypt streams over a plaintext source. Ciphertext is
//! produced as the source is read; the 16-byte authentication tag is
//! appended exactly once at end-of-stream.
//!
//! Two shapes exist, each with a blocking (`std::io::Read`) and a
//! non-blocking (`tokio::io::AsyncRead`) face that produce byte-identical
//! output:
//!
//! - **Plain** - encrypt and forget. Suitable when the transport never
//!   retries.
//! - **Caching** - retains every ciphertext byte emitted since an anchor
//!   position so a retrying transport can seek backwards and re-read
//!   without touching the plaintext source again. The anchor only advances
//!   when the caller acknowledges bytes via [`clear_to_position`]; the
//!   cache never discards unacknowledged bytes.
//!
//! All variants check a cancellation token on every read; a cancelled
//! stream drops its cipher state and surfaces `Cancelled`.
//!
//! [`clear_to_position`]: CachingGcmEncryptStream::clear_to_position

use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

use sealed_store_domain::{CancellationToken, ClientError};

use super::content_cipher::{GcmCipherCore, GCM_TAG_LEN};
use super::to_io_error;

const SCRATCH_LEN: usize = 16 * 1024;

/// Shared encrypt-side state machine: encrypt in place until the source
/// ends, then drain the tag once.
pub(crate) struct GcmEncryptState {
    core: Option<GcmCipherCore>,
    tag: [u8; GCM_TAG_LEN],
    tag_len: usize,
    tag_pos: usize,
}

impl GcmEncryptState {
    pub(crate) fn new(key: &[u8], nonce: &[u8], aad: &[u8]) -> Result<Self, ClientError> {
        Ok(Self {
            core: Some(GcmCipherCore::new(key, nonce, aad)?),
            tag: [0u8; GCM_TAG_LEN],
            tag_len: 0,
            tag_pos: 0,
        })
    }

    pub(crate) fn encrypt_in_place(&mut self, buf: &mut [u8]) -> Result<(), ClientError> {
        match self.core.as_mut() {
            Some(core) => core.encrypt_chunk(buf),
            None => Err(ClientError::internal_error("encrypt stream already finalized")),
        }
    }

    /// Seals the message. Idempotent; the tag is computed on the first
    /// call only.
    pub(crate) fn finalize(&mut self) {
        if let Some(core) = self.core.take() {
            self.tag = core.finalize_tag();
            self.tag_len = GCM_TAG_LEN;
        }
    }

    pub(crate) fn finalized(&self) -> bool {
        self.core.is_none()
    }

    pub(crate) fn tag_remaining(&self) -> usize {
        self.tag_len - self.tag_pos
    }

    pub(crate) fn drain_tag(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.tag_remaining());
        out[..n].copy_from_slice(&self.tag[self.tag_pos..self.tag_pos + n]);
        self.tag_pos += n;
        n
    }
}

/// Ciphertext retention window for bounded rewind.
///
/// Absolute positions are offsets into the full ciphertext-plus-tag output.
/// `[anchor, end)` is cached; reads proceed from `pos` which may be moved
/// anywhere inside the window.
pub(crate) struct RewindCache {
    bytes: Vec<u8>,
    anchor: u64,
    pos: u64,
}

impl RewindCache {
    pub(crate) fn new() -> Self {
        Self {
            bytes: Vec::new(),
            anchor: 0,
            pos: 0,
        }
    }

    pub(crate) fn end(&self) -> u64 {
        self.anchor + self.bytes.len() as u64
    }

    pub(crate) fn position(&self) -> u64 {
        self.pos
    }

    pub(crate) fn anchor(&self) -> u64 {
        self.anchor
    }

    pub(crate) fn append(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Copies cached bytes at `pos` into `out`; returns the count served.
    pub(crate) fn serve(&mut self, out: &mut [u8]) -> usize {
        if self.pos >= self.end() {
            return 0;
        }
        let offset = (self.pos - self.anchor) as usize;
        let n = out.len().min(self.bytes.len() - offset);
        out[..n].copy_from_slice(&self.bytes[offset..offset + n]);
        self.pos += n as u64;
        n
    }

    /// Copies cached bytes at `pos` into a `ReadBuf`; returns the count.
    pub(crate) fn serve_into(&mut self, out: &mut ReadBuf<'_>) -> usize {
        if self.pos >= self.end() {
            return 0;
        }
        let offset = (self.pos - self.anchor) as usize;
        let n = out.remaining().min(self.bytes.len() - offset);
        out.put_slice(&self.bytes[offset..offset + n]);
        self.pos += n as u64;
        n
    }

    pub(crate) fn seek_to(&mut self, position: u64) -> Result<(), ClientError> {
        if position < self.anchor || position > self.end() {
            return Err(ClientError::invalid_argument(format!(
                "seek position {} outside cached window [{}, {}]",
                position,
                self.anchor,
                self.end()
            )));
        }
        self.pos = position;
        Ok(())
    }

    pub(crate) fn clear_to(&mut self, position: u64) -> Result<(), ClientError> {
        if position < self.anchor || position > self.end() {
            return Err(ClientError::invalid_argument(format!(
                "clear position {} outside cached window [{}, {}]",
                position,
                self.anchor,
                self.end()
            )));
        }
        self.bytes.drain(..(position - self.anchor) as usize);
        self.anchor = position;
        if self.pos < position {
            self.pos = position;
        }
        Ok(())
    }
}

/// Blocking forward-only GCM encrypt stream.
pub struct GcmEncryptStream<R> {
    inner: R,
    state: GcmEncryptState,
    cancellation: CancellationToken,
}

impl<R: Read> GcmEncryptStream<R> {
    pub fn new(
        inner: R,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        cancellation: CancellationToken,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            inner,
            state: GcmEncryptState::new(key, nonce, aad)?,
            cancellation,
        })
    }
}

impl<R: Read> Read for GcmEncryptStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.cancellation.ensure_active("encrypt stream").map_err(to_io_error)?;
        loop {
            if self.state.tag_remaining() > 0 {
                return Ok(self.state.drain_tag(buf));
            }
            if self.state.finalized() {
                return Ok(0);
            }
            let n = self.inner.read(buf)?;
            if n == 0 {
                self.state.finalize();
                continue;
            }
            self.state.encrypt_in_place(&mut buf[..n]).map_err(to_io_error)?;
            return Ok(n);
        }
    }
}

/// Non-blocking forward-only GCM encrypt stream.
pub struct AsyncGcmEncryptStream<R> {
    inner: R,
    state: GcmEncryptState,
    cancellation: CancellationToken,
}

impl<R: AsyncRead + Unpin> AsyncGcmEncryptStream<R> {
    pub fn new(
        inner: R,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        cancellation: CancellationToken,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            inner,
            state: GcmEncryptState::new(key, nonce, aad)?,
            cancellation,
        })
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for AsyncGcmEncryptStream<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.cancellation.ensure_active("encrypt stream") {
            return Poll::Ready(Err(to_io_error(e)));
        }
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            if this.state.tag_remaining() > 0 {
                let mut tmp = [0u8; GCM_TAG_LEN];
                let want = buf.remaining().min(GCM_TAG_LEN);
                let n = this.state.drain_tag(&mut tmp[..want]);
                buf.put_slice(&tmp[..n]);
                return Poll::Ready(Ok(()));
            }
            if this.state.finalized() {
                return Poll::Ready(Ok(()));
            }
            let pre = buf.filled().len();
            match Pin::new(&mut this.inner).poll_read(cx, buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(())) => {
                    let n = buf.filled().len() - pre;
                    if n == 0 {
                        this.state.finalize();
                        continue;
                    }
                    if let Err(e) = this.state.encrypt_in_place(&mut buf.filled_mut()[pre..]) {
                        return Poll::Ready(Err(to_io_error(e)));
                    }
                    return Poll::Ready(Ok(()));
                }
            }
        }
    }
}

/// Blocking caching GCM encrypt stream with bounded rewind.
pub struct CachingGcmEncryptStream<R> {
    inner: R,
    state: GcmEncryptState,
    cache: RewindCache,
    scratch: Box<[u8]>,
    cancellation: CancellationToken,
}

impl<R: Read> CachingGcmEncryptStream<R> {
    pub fn new(
        inner: R,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        cancellation: CancellationToken,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            inner,
            state: GcmEncryptState::new(key, nonce, aad)?,
            cache: RewindCache::new(),
            scratch: vec![0u8; SCRATCH_LEN].into_boxed_slice(),
            cancellation,
        })
    }

    /// Current absolute read position.
    pub fn position(&self) -> u64 {
        self.cache.position()
    }

    /// Oldest position still rewindable.
    pub fn anchor(&self) -> u64 {
        self.cache.anchor()
    }

    /// Total ciphertext bytes produced so far (tag included once emitted).
    pub fn emitted(&self) -> u64 {
        self.cache.end()
    }

    /// Moves the read position anywhere inside `[anchor, emitted]`.
    pub fn seek_to_position(&mut self, position: u64) -> Result<(), ClientError> {
        self.cache.seek_to(position)
    }

    /// Acknowledges everything below `position`, releasing it from the
    /// cache and advancing the rewind anchor.
    pub fn clear_to_position(&mut self, position: u64) -> Result<(), ClientError> {
        self.cache.clear_to(position)
    }

    /// Pulls one more chunk of ciphertext (or tag) into the cache.
    /// Returns false at true end-of-stream.
    fn produce(&mut self) -> std::io::Result<bool> {
        if self.state.tag_remaining() > 0 {
            let mut tmp = [0u8; GCM_TAG_LEN];
            let n = self.state.drain_tag(&mut tmp);
            self.cache.append(&tmp[..n]);
            return Ok(true);
        }
        if self.state.finalized() {
            return Ok(false);
        }
        let n = self.inner.read(&mut self.scratch)?;
        if n == 0 {
            self.state.finalize();
            return Ok(true);
        }
        self.state.encrypt_in_place(&mut self.scratch[..n]).map_err(to_io_error)?;
        self.cache.append(&self.scratch[..n]);
        Ok(true)
    }
}

impl<R: Read> Read for CachingGcmEncryptStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.cancellation.ensure_active("encrypt stream").map_err(to_io_error)?;
        loop {
            let n = self.cache.serve(buf);
            if n > 0 {
                return Ok(n);
            }
            if !self.produce()? {
                return Ok(0);
            }
        }
    }
}

/// Non-blocking caching GCM encrypt stream with bounded rewind.
pub struct AsyncCachingGcmEncryptStream<R> {
    inner: R,
    state: GcmEncryptState,
    cache: RewindCache,
    scratch: Box<[u8]>,
    cancellation: CancellationToken,
}

impl<R: AsyncRead + Unpin> AsyncCachingGcmEncryptStream<R> {
    pub fn new(
        inner: R,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        cancellation: CancellationToken,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            inner,
            state: GcmEncryptState::new(key, nonce, aad)?,
            cache: RewindCache::new(),
            scratch: vec![0u8; SCRATCH_LEN].into_boxed_slice(),
            cancellation,
        })
    }

    pub fn position(&self) -> u64 {
        self.cache.position()
    }

    pub fn anchor(&self) -> u64 {
        self.cache.anchor()
    }

    pub fn emitted(&self) -> u64 {
        self.cache.end()
    }

    pub fn seek_to_position(&mut self, position: u64) -> Result<(), ClientError> {
        self.cache.seek_to(position)
    }

    pub fn clear_to_position(&mut self, position: u64) -> Result<(), ClientError> {
        self.cache.clear_to(position)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for AsyncCachingGcmEncryptStream<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.cancellation.ensure_active("encrypt stream") {
            return Poll::Ready(Err(to_io_error(e)));
        }
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            if this.cache.serve_into(buf) > 0 {
                return Poll::Ready(Ok(()));
            }
            if this.state.tag_remaining() > 0 {
                let mut tmp = [0u8; GCM_TAG_LEN];
                let n = this.state.drain_tag(&mut tmp);
                this.cache.append(&tmp[..n]);
                continue;
            }
            if this.state.finalized() {
                return Poll::Ready(Ok(()));
            }
            let mut scratch_buf = ReadBuf::new(&mut this.scratch);
            match Pin::new(&mut this.inner).poll_read(cx, &mut scratch_buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(())) => {
                    let n = scratch_buf.filled().len();
                    if n == 0 {
                        this.state.finalize();
                        continue;
                    }
                    if let Err(e) = this.state.encrypt_in_place(&mut this.scratch[..n]) {
                        return Poll::Ready(Err(to_io_error(e)));
                    }
                    this.cache.append(&this.scratch[..n]);
                }
            }
        }
    }
}
