// Passthrough ("noop") codec: identity transforms.
//
// Useful for testing, and for data that is already compressed and would
// only grow under another pass.

use std::io::{self, Read};

use super::{Compressor, Decompressor, ReadClose};

/// The sink is returned as is, so closing the "compressor" closes the sink.
pub fn compressor() -> Compressor {
    super::compressor(|sink| sink)
}

pub fn decompressor() -> Decompressor {
    super::decompressor(|source| Ok(Box::new(NopClose::new(source))))
}

/// Adds a no-op `close` to any reader.
pub struct NopClose<R> {
    inner: R,
}

impl<R> NopClose<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for NopClose<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Send> ReadClose for NopClose<R> {
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn decompressor_returns_bytes_unchanged() {
        let data = b"\x1f\x8bnot really gzip".to_vec();
        let mut reader = (decompressor())(Box::new(Cursor::new(data.clone()))).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        reader.close().unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn nop_close_unwraps() {
        let reader = NopClose::new(Cursor::new(vec![1u8, 2, 3]));
        assert_eq!(reader.into_inner().into_inner(), vec![1, 2, 3]);
    }
}
