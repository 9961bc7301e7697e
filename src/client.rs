// Streaming compression client.
//
// Each `compress`/`decompress` call wires up its own pipeline:
//
//   input ──> [worker thread: transform] ──> pipe ──> ContextReader ──> caller
//                                  │
//                                  └──> Outcome (deposited after pipe close)
//
// The call returns at once; the worker runs concurrently with the caller
// draining the output. The pipe gives backpressure, and both of its ends
// observe the caller's cancellation token. Nothing mutable is shared
// between calls, so one `Client` can serve any number of threads.

use std::io::{self, Read};
use std::thread;

use crate::cancel::CancellationToken;
use crate::codec::{self, Codec, Config, ReadClose, WriteClose};
use crate::error::{ConfigError, StreamError};
use crate::outcome::{self, Outcome, OutcomeResult};
use crate::stream::{ContextReader, ContextWriter, PipeCloser, PipeReader, pipe};

/// The live output of an operation: read it to the end, then wait the
/// [`Outcome`] to learn whether the operation succeeded.
pub type Output = ContextReader<PipeReader>;

/// Which way bytes are transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Compress,
    Decompress,
}

impl Direction {
    pub fn name(self) -> &'static str {
        match self {
            Self::Compress => "compress",
            Self::Decompress => "decompress",
        }
    }
}

/// Streaming codec client. Immutable after construction.
#[derive(Clone, Debug)]
pub struct Client {
    codec: Codec,
}

impl Default for Client {
    /// A client for the default format (gzip).
    fn default() -> Self {
        Self {
            codec: Codec::builtin(codec::Format::DEFAULT),
        }
    }
}

impl Client {
    /// Build a client from a validated configuration.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let codec = codec::resolve(&config)?;
        log::debug!("client configured for {} format", codec.name());
        Ok(Self { codec })
    }

    /// Build a client from zero or one configuration. No configuration
    /// selects the default format; more than one is an error.
    pub fn from_configs<I>(configs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = Config>,
    {
        let mut configs = configs.into_iter();
        match (configs.next(), configs.next()) {
            (None, _) => Ok(Self::default()),
            (Some(config), None) => Self::new(config),
            (Some(_), Some(_)) => Err(ConfigError::MultipleConfigs(2 + configs.count())),
        }
    }

    /// Name of the configured format, or `"custom"` for caller-supplied
    /// transforms.
    pub fn format(&self) -> &'static str {
        self.codec.name()
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Run one operation in the given direction.
    pub fn run<R>(&self, direction: Direction, token: &CancellationToken, input: R) -> (Output, Outcome)
    where
        R: Read + Send + 'static,
    {
        match direction {
            Direction::Compress => self.compress(token, input),
            Direction::Decompress => self.decompress(token, input),
        }
    }

    /// Compress `input` in the background.
    ///
    /// Returns the compressed stream and the slot that receives the result
    /// once the stream has been closed.
    pub fn compress<R>(&self, token: &CancellationToken, input: R) -> (Output, Outcome)
    where
        R: Read + Send + 'static,
    {
        let (writer, reader) = pipe();
        let closer = ClosePipe(writer.closer());
        let output = ContextReader::new(token.clone(), reader);
        let sink = ContextWriter::new(token.clone(), writer);

        let (deposit, outcome) = outcome::slot();
        let codec = self.codec.clone();
        let format = self.format();
        log::debug!("compress ({format}) started");
        // Built on the worker, so a failed spawn drops no encoder that
        // would write into the pipe.
        let spawned = thread::Builder::new()
            .name("pipezip-compress".into())
            .spawn(move || {
                let compressor = codec.compress(Box::new(sink));
                let result = drain_into(input, compressor, closer);
                log_finished(Direction::Compress, format, &result);
                deposit.deposit(result);
            });

        match spawned {
            Ok(_) => (output, outcome),
            // The closure, and with it the pipe writer, is already dropped.
            Err(e) => (output, Outcome::ready(Err(StreamError::Spawn(e)))),
        }
    }

    /// Decompress `input` in the background.
    ///
    /// The decompressor is built on the calling thread first. If that fails
    /// (for instance on a bad header), the output is closed right away and
    /// the returned outcome already holds the error.
    pub fn decompress<R>(&self, token: &CancellationToken, input: R) -> (Output, Outcome)
    where
        R: Read + Send + 'static,
    {
        let (writer, reader) = pipe();
        let output = ContextReader::new(token.clone(), reader);
        let mut writer = ContextWriter::new(token.clone(), writer);
        log::debug!("decompress ({}) started", self.format());

        let decompressor = match self.codec.decompress(Box::new(input)) {
            Ok(decompressor) => decompressor,
            Err(e) => {
                let _ = writer.close();
                let result = Err(StreamError::CreateDecompressor(e));
                log_finished(Direction::Decompress, self.format(), &result);
                return (output, Outcome::ready(result));
            }
        };

        let (deposit, outcome) = outcome::slot();
        let format = self.format();
        let spawned = thread::Builder::new()
            .name("pipezip-decompress".into())
            .spawn(move || {
                let result = drain_from(decompressor, &mut writer);
                let _ = writer.close();
                log_finished(Direction::Decompress, format, &result);
                deposit.deposit(result);
            });

        match spawned {
            Ok(_) => (output, outcome),
            Err(e) => (output, Outcome::ready(Err(StreamError::Spawn(e)))),
        }
    }
}

/// Closes the pipe when dropped, unwinding included.
struct ClosePipe(PipeCloser);

impl Drop for ClosePipe {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Copy all of `input` into the compressor, then close it to flush the
/// stream trailer. The compressor is closed on success only; a copy
/// failure wins over a close failure.
///
/// `_closer` is dropped before `compressor`, so the pipe is already shut
/// when an encoder's destructor tries to finish a failed stream.
fn drain_into(
    mut input: impl Read,
    mut compressor: Box<dyn WriteClose>,
    closer: ClosePipe,
) -> OutcomeResult {
    let _closer = closer;
    let copied = io::copy(&mut input, &mut compressor).map_err(StreamError::Compress)?;
    log::trace!("compressor consumed {copied} bytes");
    compressor.close().map_err(StreamError::CloseCompressor)
}

/// Copy all decompressed bytes into the pipe, then close the decompressor.
fn drain_from(mut decompressor: Box<dyn ReadClose>, output: &mut impl io::Write) -> OutcomeResult {
    let copied = io::copy(&mut decompressor, output).map_err(StreamError::Decompress)?;
    log::trace!("decompressor produced {copied} bytes");
    decompressor.close().map_err(StreamError::CloseDecompressor)
}

fn log_finished(direction: Direction, format: &str, result: &OutcomeResult) {
    match result {
        Ok(()) => log::debug!("{} ({format}) finished", direction.name()),
        Err(e) if e.is_cancelled() => log::debug!("{} ({format}) cancelled: {e}", direction.name()),
        Err(e) => log::warn!("{} ({format}) failed: {e}", direction.name()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
