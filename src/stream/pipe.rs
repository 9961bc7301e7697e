// In-process byte pipe.
//
// The pipe is a rendezvous channel of byte chunks: a write blocks until the
// reader takes the chunk, so the producer can never run ahead of the
// consumer by more than one chunk. Both ends can race their wait against a
// cancellation token (see `stream::context`).
//
// Close semantics:
//   - Closing the write end (explicitly, through a `PipeCloser`, or by
//     dropping the writer) makes the reader see end-of-stream.
//   - Writing to a closed pipe, or to a pipe whose reader is gone, fails
//     with `BrokenPipe`.
//   - `close` is idempotent and never fails.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

use crate::cancel::CancellationToken;
use crate::stream::context::{CancellableRead, CancellableWrite};

/// Create a connected pipe.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let (data_tx, data_rx) = channel::bounded(0);
    let (closed_tx, closed_rx) = channel::bounded(0);
    let shared = Arc::new(Shared {
        closed: Mutex::new(Some(closed_tx)),
    });

    let writer = PipeWriter {
        data: data_tx,
        closed: closed_rx.clone(),
        shared,
    };
    let reader = PipeReader {
        data: data_rx,
        closed: closed_rx,
        pending: Vec::new(),
        pos: 0,
    };
    (writer, reader)
}

struct Shared {
    /// Dropped on close, which disconnects every `closed` receiver.
    closed: Mutex<Option<Sender<()>>>,
}

impl Shared {
    fn close(&self) {
        if self
            .closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            log::trace!("pipe write end closed");
        }
    }
}

fn is_closed(closed: &Receiver<()>) -> bool {
    matches!(closed.try_recv(), Err(TryRecvError::Disconnected))
}

fn closed_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "write on closed pipe")
}

fn reader_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "read end of pipe closed")
}

fn cancelled(token: Option<&CancellationToken>) -> io::Error {
    token
        .and_then(CancellationToken::error)
        .unwrap_or_else(|| io::Error::other("pipe wait cancelled"))
}

// ---------------------------------------------------------------------------
// Write end
// ---------------------------------------------------------------------------

/// The write end of a [`pipe`].
pub struct PipeWriter {
    data: Sender<Vec<u8>>,
    closed: Receiver<()>,
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// A handle that can close this pipe after the writer has been moved
    /// into a transform that owns it.
    pub fn closer(&self) -> PipeCloser {
        PipeCloser {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Close the write end. Idempotent.
    pub fn close(&mut self) -> io::Result<()> {
        self.shared.close();
        Ok(())
    }

    fn send(&self, buf: &[u8], token: Option<&CancellationToken>) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if is_closed(&self.closed) {
            return Err(closed_pipe());
        }

        let never = channel::never();
        let done = token.map_or(&never, CancellationToken::done);
        crossbeam::select! {
            send(self.data, buf.to_vec()) -> res => match res {
                Ok(()) => Ok(buf.len()),
                Err(_) => Err(reader_gone()),
            },
            recv(self.closed) -> _ => Err(closed_pipe()),
            recv(done) -> _ => Err(cancelled(token)),
        }
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf, None)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CancellableWrite for PipeWriter {
    fn write_cancellable(&mut self, buf: &[u8], token: &CancellationToken) -> io::Result<usize> {
        self.send(buf, Some(token))
    }

    fn close(&mut self) -> io::Result<()> {
        PipeWriter::close(self)
    }
}

/// Closes the write end of a pipe from outside the writer.
#[derive(Clone)]
pub struct PipeCloser {
    shared: Arc<Shared>,
}

impl PipeCloser {
    /// Close the write end. Idempotent.
    pub fn close(&self) {
        self.shared.close();
    }
}

// ---------------------------------------------------------------------------
// Read end
// ---------------------------------------------------------------------------

/// The read end of a [`pipe`].
pub struct PipeReader {
    data: Receiver<Vec<u8>>,
    closed: Receiver<()>,
    /// Tail of the last chunk that did not fit into the caller's buffer.
    pending: Vec<u8>,
    pos: usize,
}

impl PipeReader {
    fn take_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = (self.pending.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        if self.pos == self.pending.len() {
            self.pending.clear();
            self.pos = 0;
        }
        n
    }

    fn deliver(&mut self, chunk: Vec<u8>, buf: &mut [u8]) -> usize {
        self.pending = chunk;
        self.pos = 0;
        self.take_pending(buf)
    }

    fn recv(&mut self, buf: &mut [u8], token: Option<&CancellationToken>) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos < self.pending.len() {
            return Ok(self.take_pending(buf));
        }

        let never = channel::never();
        let done = token.map_or(&never, CancellationToken::done);
        let received = crossbeam::select! {
            recv(self.data) -> msg => msg.ok(),
            // Pick up a chunk that raced with close.
            recv(self.closed) -> _ => self.data.try_recv().ok(),
            recv(done) -> _ => return Err(cancelled(token)),
        };

        Ok(match received {
            Some(chunk) => self.deliver(chunk, buf),
            None => 0,
        })
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf, None)
    }
}

impl CancellableRead for PipeReader {
    fn read_cancellable(&mut self, buf: &mut [u8], token: &CancellationToken) -> io::Result<usize> {
        self.recv(buf, Some(token))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn bytes_flow_in_order() {
        let (mut writer, mut reader) = pipe();
        let producer = thread::spawn(move || {
            writer.write_all(b"hello ").unwrap();
            writer.write_all(b"pipe").unwrap();
        });

        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        producer.join().unwrap();
        assert_eq!(out, "hello pipe");
    }

    #[test]
    fn small_reads_split_large_chunks() {
        let (mut writer, mut reader) = pipe();
        let data: Vec<u8> = (0..=255).collect();
        let expected = data.clone();
        let producer = thread::spawn(move || writer.write_all(&data).unwrap());

        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        producer.join().unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn closer_releases_blocked_reader() {
        let (writer, mut reader) = pipe();
        let closer = writer.closer();
        let consumer = thread::spawn(move || {
            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap();
            out
        });

        thread::sleep(Duration::from_millis(20));
        closer.close();
        closer.close();
        assert!(consumer.join().unwrap().is_empty());
        drop(writer);
    }

    #[test]
    fn write_after_close_fails() {
        let (mut writer, _reader) = pipe();
        writer.close().unwrap();
        writer.close().unwrap();
        let err = writer.write(b"late").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn dropping_reader_breaks_writer() {
        let (mut writer, reader) = pipe();
        drop(reader);
        let err = writer.write_all(b"nobody listens").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn dropping_writer_is_end_of_stream() {
        let (writer, mut reader) = pipe();
        drop(writer);
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn empty_write_does_not_block() {
        let (mut writer, _reader) = pipe();
        assert_eq!(writer.write(&[]).unwrap(), 0);
    }

    #[test]
    fn cancellation_unblocks_pending_write() {
        let (mut writer, _reader) = pipe();
        let token = CancellationToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        let err = writer.write_cancellable(b"stuck", &token).unwrap_err();
        assert!(crate::cancel::is_cancellation(&err));
        handle.join().unwrap();
    }

    #[test]
    fn cancellation_unblocks_pending_read() {
        let (_writer, mut reader) = pipe();
        let token = CancellationToken::new().with_timeout(Duration::from_millis(20));
        let mut buf = [0u8; 8];
        let err = reader.read_cancellable(&mut buf, &token).unwrap_err();
        assert_eq!(
            crate::cancel::cancel_reason(&err),
            Some(crate::cancel::CancelReason::DeadlineExceeded)
        );
    }
}
