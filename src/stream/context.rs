// Cancellation-aware stream adapters.
//
// `ContextReader` and `ContextWriter` bind a stream end to a
// `CancellationToken` and expose plain `Read`/`Write`, so transforms that
// know nothing about cancellation (flate2 encoders, `io::copy`) still stop
// as soon as the token fires. Bytes pass through unchanged.
//
// Once the token has fired, every failure is reported as the cancellation
// error, even when the immediate cause was the peer giving up (for example
// a broken pipe after the reader was cancelled and dropped).

use std::io::{self, Read, Write};

use crate::cancel::CancellationToken;
use crate::codec::WriteClose;

/// A byte source whose blocking wait can be raced against a token.
pub trait CancellableRead: Send {
    /// Like `Read::read`, but returns the token's cancellation error as soon
    /// as the token fires while waiting for data.
    fn read_cancellable(&mut self, buf: &mut [u8], token: &CancellationToken) -> io::Result<usize>;
}

/// A byte sink whose blocking wait can be raced against a token.
pub trait CancellableWrite: Send {
    /// Like `Write::write`, but returns the token's cancellation error as
    /// soon as the token fires while waiting for the peer.
    fn write_cancellable(&mut self, buf: &[u8], token: &CancellationToken) -> io::Result<usize>;

    /// Release the sink. Must be idempotent.
    fn close(&mut self) -> io::Result<()>;
}

// ---------------------------------------------------------------------------
// ContextReader
// ---------------------------------------------------------------------------

/// `Read` adapter that fails with a cancellation error once its token fires.
pub struct ContextReader<R> {
    token: CancellationToken,
    inner: R,
}

impl<R: CancellableRead> ContextReader<R> {
    pub fn new(token: CancellationToken, inner: R) -> Self {
        Self { token, inner }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: CancellableRead> Read for ContextReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(err) = self.token.error() {
            return Err(err);
        }
        self.inner
            .read_cancellable(buf, &self.token)
            .map_err(|e| self.token.error().unwrap_or(e))
    }
}

// ---------------------------------------------------------------------------
// ContextWriter
// ---------------------------------------------------------------------------

/// `Write` adapter that fails with a cancellation error once its token fires.
pub struct ContextWriter<W> {
    token: CancellationToken,
    inner: W,
}

impl<W: CancellableWrite> ContextWriter<W> {
    pub fn new(token: CancellationToken, inner: W) -> Self {
        Self { token, inner }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl<W: CancellableWrite> Write for ContextWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(err) = self.token.error() {
            return Err(err);
        }
        self.inner
            .write_cancellable(buf, &self.token)
            .map_err(|e| self.token.error().unwrap_or(e))
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.token.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<W: CancellableWrite> WriteClose for ContextWriter<W> {
    /// Closing always succeeds, however many cleanup paths call it.
    fn close(&mut self) -> io::Result<()> {
        if let Err(e) = self.inner.close() {
            log::debug!("ignoring error while closing stream: {e}");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
