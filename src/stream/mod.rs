// Byte-stream plumbing for the streaming client.
//
// - `pipe`: rendezvous byte pipe connecting a background transform to the
//   caller
// - `context`: cancellation-aware adapters over pipe ends

pub mod context;
pub mod pipe;

pub use context::{CancellableRead, CancellableWrite, ContextReader, ContextWriter};
pub use pipe::{PipeCloser, PipeReader, PipeWriter, pipe};
