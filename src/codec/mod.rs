// Codec registry.
//
// Maps a format name to a pair of transform constructors, or accepts a
// caller-supplied pair verbatim. Built-in formats:
//
// - `gzip`: flate2 gzip member stream (default, also selected by "")
// - `zlib`: flate2 zlib stream
// - `noop`: identity transforms, bytes pass through unchanged
//
// Every constructor call yields an independent transform instance, so one
// codec can serve any number of concurrent operations.

pub mod gzip;
pub mod passthrough;
pub mod zlib;

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Transform traits
// ---------------------------------------------------------------------------

/// A byte sink with an explicit close step.
///
/// For compressors, `close` writes any buffered compressed data and the
/// stream trailer to the wrapped sink.
pub trait WriteClose: Write + Send {
    fn close(&mut self) -> io::Result<()>;
}

/// A byte source with an explicit close step.
pub trait ReadClose: Read + Send {
    fn close(&mut self) -> io::Result<()>;
}

impl<W: WriteClose + ?Sized> WriteClose for Box<W> {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

impl<R: ReadClose + ?Sized> ReadClose for Box<R> {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Builds a compressing sink on top of `sink`.
pub type Compressor = Arc<dyn Fn(Box<dyn WriteClose>) -> Box<dyn WriteClose> + Send + Sync>;

/// Builds a decompressing source on top of `source`. May read from the
/// source to validate the stream header.
pub type Decompressor =
    Arc<dyn Fn(Box<dyn Read + Send>) -> io::Result<Box<dyn ReadClose>> + Send + Sync>;

/// Wrap a closure as a [`Compressor`].
pub fn compressor<F>(f: F) -> Compressor
where
    F: Fn(Box<dyn WriteClose>) -> Box<dyn WriteClose> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`Decompressor`].
pub fn decompressor<F>(f: F) -> Decompressor
where
    F: Fn(Box<dyn Read + Send>) -> io::Result<Box<dyn ReadClose>> + Send + Sync + 'static,
{
    Arc::new(f)
}

// ---------------------------------------------------------------------------
// Formats
// ---------------------------------------------------------------------------

/// Built-in compression formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    #[default]
    Gzip,
    Zlib,
    Noop,
}

impl Format {
    /// Format used when none is configured.
    pub const DEFAULT: Format = Format::Gzip;

    /// All built-in formats, in listing order.
    pub const ALL: [Format; 3] = [Format::Gzip, Format::Zlib, Format::Noop];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Zlib => "zlib",
            Self::Noop => "noop",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = ConfigError;

    /// The empty string selects [`Format::DEFAULT`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Self::DEFAULT),
            "gzip" => Ok(Self::Gzip),
            "zlib" => Ok(Self::Zlib),
            "noop" => Ok(Self::Noop),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

/// Names of the built-in formats. Does not include custom codecs.
pub fn available_formats() -> &'static [&'static str] {
    static NAMES: [&str; 3] = [
        Format::ALL[0].name(),
        Format::ALL[1].name(),
        Format::ALL[2].name(),
    ];
    &NAMES
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Client configuration.
///
/// When `compressor` and `decompressor` are both set they are used verbatim
/// and `format` is ignored. Setting only one of them is an error.
#[derive(Clone, Default)]
pub struct Config {
    pub format: String,
    pub compressor: Option<Compressor>,
    pub decompressor: Option<Decompressor>,
}

impl Config {
    pub fn with_format(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            ..Default::default()
        }
    }

    pub fn with_transforms(compressor: Compressor, decompressor: Decompressor) -> Self {
        Self {
            format: String::new(),
            compressor: Some(compressor),
            decompressor: Some(decompressor),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("format", &self.format)
            .field("compressor", &self.compressor.as_ref().map(|_| "custom"))
            .field("decompressor", &self.decompressor.as_ref().map(|_| "custom"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// A resolved compressor/decompressor pair.
#[derive(Clone)]
pub struct Codec {
    format: Option<Format>,
    compressor: Compressor,
    decompressor: Decompressor,
}

impl Codec {
    pub fn builtin(format: Format) -> Self {
        let (compressor, decompressor) = match format {
            Format::Gzip => (gzip::compressor(), gzip::decompressor()),
            Format::Zlib => (zlib::compressor(), zlib::decompressor()),
            Format::Noop => (passthrough::compressor(), passthrough::decompressor()),
        };
        Self {
            format: Some(format),
            compressor,
            decompressor,
        }
    }

    pub fn custom(compressor: Compressor, decompressor: Decompressor) -> Self {
        Self {
            format: None,
            compressor,
            decompressor,
        }
    }

    /// The built-in format, or `None` for a custom pair.
    pub fn format(&self) -> Option<Format> {
        self.format
    }

    /// Format name for display; custom pairs are shown as `"custom"`.
    pub fn name(&self) -> &'static str {
        self.format.map_or("custom", Format::name)
    }

    pub fn compress(&self, sink: Box<dyn WriteClose>) -> Box<dyn WriteClose> {
        (self.compressor)(sink)
    }

    pub fn decompress(&self, source: Box<dyn Read + Send>) -> io::Result<Box<dyn ReadClose>> {
        (self.decompressor)(source)
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").field("name", &self.name()).finish()
    }
}

/// Resolve a configuration into a codec.
pub fn resolve(config: &Config) -> Result<Codec, ConfigError> {
    match (&config.compressor, &config.decompressor) {
        (Some(c), Some(d)) => Ok(Codec::custom(Arc::clone(c), Arc::clone(d))),
        (Some(_), None) => Err(ConfigError::MissingDecompressor),
        (None, Some(_)) => Err(ConfigError::MissingCompressor),
        (None, None) => config.format.parse().map(Codec::builtin),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
