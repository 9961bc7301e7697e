// Error types shared by the codec registry and the streaming client.

use std::io;

use crate::cancel::{self, CancelReason};

/// Invalid client configuration. Returned synchronously at construction.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown compression format {0:?}")]
    UnknownFormat(String),

    #[error("validating configuration: must configure both compressor and decompressor (compressor missing)")]
    MissingCompressor,

    #[error("validating configuration: must configure both compressor and decompressor (decompressor missing)")]
    MissingDecompressor,

    #[error("only one config can be passed, got {0}")]
    MultipleConfigs(usize),
}

/// Terminal failure of a background compress/decompress operation,
/// delivered through its `Outcome`.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("creating decompressor: {0}")]
    CreateDecompressor(#[source] io::Error),

    #[error("compressing data: {0}")]
    Compress(#[source] io::Error),

    #[error("closing compressor: {0}")]
    CloseCompressor(#[source] io::Error),

    #[error("decompressing data: {0}")]
    Decompress(#[source] io::Error),

    #[error("closing decompressor: {0}")]
    CloseDecompressor(#[source] io::Error),

    #[error("starting background worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("background worker exited without reporting an outcome")]
    Aborted,
}

impl StreamError {
    /// The underlying I/O error, if any.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::CreateDecompressor(e)
            | Self::Compress(e)
            | Self::CloseCompressor(e)
            | Self::Decompress(e)
            | Self::CloseDecompressor(e)
            | Self::Spawn(e) => Some(e),
            Self::Aborted => None,
        }
    }

    /// Whether the operation stopped because its cancellation token fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_reason().is_some()
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.io_error().and_then(cancel::cancel_reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::Cancelled;

    #[test]
    fn unknown_format_message_contains_name() {
        let err = ConfigError::UnknownFormat("badFormat".into());
        assert!(err.to_string().contains("badFormat"));
    }

    #[test]
    fn partial_override_messages_name_the_rule() {
        for err in [ConfigError::MissingCompressor, ConfigError::MissingDecompressor] {
            assert!(
                err.to_string()
                    .contains("must configure both compressor and decompressor")
            );
        }
    }

    #[test]
    fn cancellation_is_detected_through_wrapping() {
        let cancelled = StreamError::Compress(
            Cancelled {
                reason: CancelReason::DeadlineExceeded,
            }
            .into_io(),
        );
        assert!(cancelled.is_cancelled());
        assert_eq!(
            cancelled.cancel_reason(),
            Some(CancelReason::DeadlineExceeded)
        );
        assert_eq!(cancelled.to_string(), "compressing data: deadline exceeded");

        let plain = StreamError::Decompress(io::Error::other("boom"));
        assert!(!plain.is_cancelled());
        assert!(!StreamError::Aborted.is_cancelled());
    }

    #[test]
    fn source_chain_reaches_io_error() {
        let err = StreamError::CloseCompressor(io::Error::other("flush failed"));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "flush failed");
    }
}
