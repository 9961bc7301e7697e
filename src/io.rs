// Transfer helpers.
//
// `transfer()` drives one client operation from a reader to a writer and
// waits for its outcome; `compress_file()` and `decompress_file()` do the
// same between two paths with buffered I/O. With the `file-io` feature a
// SHA-256 of the produced output is computed as it is written.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::cancel::CancellationToken;
use crate::client::{Client, Direction};
use crate::error::StreamError;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStats {
    pub direction: Direction,
    /// Bytes consumed from the input.
    pub input_size: u64,
    /// Bytes written to the output.
    pub output_size: u64,
    /// SHA-256 of the output (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

impl TransferStats {
    /// Output size relative to input size; `None` for empty input.
    pub fn ratio(&self) -> Option<f64> {
        (self.input_size > 0).then(|| self.output_size as f64 / self.input_size as f64)
    }

    pub fn output_sha256_hex(&self) -> Option<String> {
        self.output_sha256
            .map(|digest| digest.iter().map(|b| format!("{b:02x}")).collect())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("opening {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("creating {}: {source}", path.display())]
    Create { path: PathBuf, source: io::Error },

    /// Reading the operation's output failed and the operation did not
    /// report an error of its own in time.
    #[error("reading transformed data: {0}")]
    Read(#[source] io::Error),

    #[error("writing output: {0}")]
    Output(#[source] io::Error),

    #[error(transparent)]
    Operation(#[from] StreamError),
}

impl TransferError {
    /// Whether the transfer stopped because its token was cancelled.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Operation(e) => e.is_cancelled(),
            Self::Read(e) => crate::cancel::is_cancellation(e),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default buffer size
// ---------------------------------------------------------------------------

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

/// How long a transfer whose output failed to read waits for the outcome.
const OUTCOME_GRACE: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// transfer
// ---------------------------------------------------------------------------

/// Run one operation over `input` and copy everything it produces into
/// `output`.
///
/// The output is flushed before the outcome is awaited. If writing the
/// output fails, the operation is abandoned and `TransferError::Output`
/// returned. When reading the output fails (it only does so on
/// cancellation), the operation's own error is preferred if it arrives
/// shortly after.
pub fn transfer<R, W>(
    client: &Client,
    token: &CancellationToken,
    direction: Direction,
    input: R,
    output: &mut W,
) -> Result<TransferStats, TransferError>
where
    R: Read + Send + 'static,
    W: Write + ?Sized,
{
    let consumed = Arc::new(AtomicU64::new(0));
    let input = CountingReader {
        inner: input,
        count: Arc::clone(&consumed),
    };

    let (mut stream, outcome) = client.run(direction, token, input);
    let mut sink = TallyWriter::new(output);
    let copied = pump(&mut stream, &mut sink).and_then(|_| sink.flush().map_err(Pump::Write));
    // Dropping the read end unblocks a worker still writing into the pipe.
    drop(stream);

    match copied {
        Ok(()) => outcome.wait()?,
        Err(Pump::Write(e)) => {
            log::debug!("{} output write failed: {e}", direction.name());
            return Err(TransferError::Output(e));
        }
        Err(Pump::Read(e)) => {
            // The worker may be stuck on an input read that cannot observe
            // the token, so its outcome is only awaited briefly.
            return match outcome.wait_timeout(OUTCOME_GRACE) {
                Ok(Err(op)) => Err(TransferError::Operation(op)),
                Ok(Ok(())) | Err(_) => Err(TransferError::Read(e)),
            };
        }
    }

    let (output_size, output_sha256) = sink.finish();
    let stats = TransferStats {
        direction,
        input_size: consumed.load(Ordering::Relaxed),
        output_size,
        output_sha256,
    };
    log::info!(
        "{}: {} bytes in, {} bytes out",
        direction.name(),
        stats.input_size,
        stats.output_size
    );
    Ok(stats)
}

/// Compress the file at `input_path` into `output_path`.
pub fn compress_file(
    client: &Client,
    token: &CancellationToken,
    input_path: &Path,
    output_path: &Path,
) -> Result<TransferStats, TransferError> {
    transfer_file(client, token, Direction::Compress, input_path, output_path)
}

/// Decompress the file at `input_path` into `output_path`.
pub fn decompress_file(
    client: &Client,
    token: &CancellationToken,
    input_path: &Path,
    output_path: &Path,
) -> Result<TransferStats, TransferError> {
    transfer_file(client, token, Direction::Decompress, input_path, output_path)
}

fn transfer_file(
    client: &Client,
    token: &CancellationToken,
    direction: Direction,
    input_path: &Path,
    output_path: &Path,
) -> Result<TransferStats, TransferError> {
    let input = open(input_path)?;
    let output = File::create(output_path).map_err(|source| TransferError::Create {
        path: output_path.to_path_buf(),
        source,
    })?;
    let mut output = BufWriter::with_capacity(BUF_SIZE, output);
    transfer(client, token, direction, input, &mut output)
}

/// Open `path` for buffered streaming reads.
pub fn open(path: &Path) -> Result<BufReader<File>, TransferError> {
    let file = File::open(path).map_err(|source| TransferError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::with_capacity(BUF_SIZE, file))
}

// ---------------------------------------------------------------------------
// Copy loop
// ---------------------------------------------------------------------------

/// Which side of a copy failed.
enum Pump {
    Read(io::Error),
    Write(io::Error),
}

fn pump<R: Read + ?Sized, W: Write + ?Sized>(reader: &mut R, writer: &mut W) -> Result<(), Pump> {
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Pump::Read(e)),
        };
        writer.write_all(&buf[..n]).map_err(Pump::Write)?;
    }
}

// ---------------------------------------------------------------------------
// Counting adapters
// ---------------------------------------------------------------------------

/// Counts bytes as the worker thread reads them.
struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Counts (and with `file-io`, hashes) bytes on their way to the output.
struct TallyWriter<'a, W: ?Sized> {
    inner: &'a mut W,
    written: u64,
    #[cfg(feature = "file-io")]
    hasher: sha2::Sha256,
}

impl<'a, W: Write + ?Sized> TallyWriter<'a, W> {
    fn new(inner: &'a mut W) -> Self {
        Self {
            inner,
            written: 0,
            #[cfg(feature = "file-io")]
            hasher: sha2::Sha256::new(),
        }
    }

    fn finish(self) -> (u64, Option<[u8; 32]>) {
        #[cfg(feature = "file-io")]
        let digest = Some(self.hasher.finalize().into());
        #[cfg(not(feature = "file-io"))]
        let digest: Option<[u8; 32]> = None;
        (self.written, digest)
    }
}

impl<W: Write + ?Sized> Write for TallyWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        #[cfg(feature = "file-io")]
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
