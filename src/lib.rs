//! Pipezip: streaming, cancellable compression and decompression.
//!
//! A [`Client`] turns any `Read` into a compressed (or decompressed)
//! stream. The transform runs on a background thread and hands its output
//! over an in-process pipe, so the caller reads results while the input is
//! still being consumed. Every operation observes a [`CancellationToken`]
//! and reports its final result through a single-use [`Outcome`].
//!
//! The crate provides:
//! - Cancellation tokens with deadlines (`cancel`)
//! - Cancellable pipe and stream adapters (`stream`)
//! - The codec registry with gzip, zlib and passthrough codecs (`codec`)
//! - The streaming client (`client`) and its completion slot (`outcome`)
//! - Reader/writer and file transfer helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use std::io::{Cursor, Read};
//! use pipezip::{CancellationToken, Client};
//!
//! let client = Client::default();
//! let token = CancellationToken::new();
//!
//! let (mut compressed, outcome) = client.compress(&token, Cursor::new(b"hello".to_vec()));
//! let mut packed = Vec::new();
//! compressed.read_to_end(&mut packed).unwrap();
//! outcome.wait().unwrap();
//!
//! let (mut plain, outcome) = client.decompress(&token, Cursor::new(packed));
//! let mut out = Vec::new();
//! plain.read_to_end(&mut out).unwrap();
//! outcome.wait().unwrap();
//! assert_eq!(out, b"hello");
//! ```

pub mod cancel;
pub mod client;
pub mod codec;
pub mod error;
pub mod io;
pub mod outcome;
pub mod stream;

#[cfg(feature = "cli")]
pub mod cli;

pub use cancel::{CancelReason, CancellationToken};
pub use client::{Client, Direction, Output};
pub use codec::{Config, Format, available_formats};
pub use error::{ConfigError, StreamError};
pub use outcome::Outcome;
