// Gzip codec (RFC 1952) via flate2.
//
// The decompressor reads and validates the fixed 10-byte member header up
// front, so garbage input fails at construction instead of after the
// caller has started reading. Concatenated members are decoded as one
// stream.

use std::io::{self, Cursor, Read, Write};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

use super::{Compressor, Decompressor, ReadClose, WriteClose};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const METHOD_DEFLATE: u8 = 8;
/// FLG bits 5-7 are reserved and must be zero.
const FLAG_RESERVED: u8 = 0xe0;
const HEADER_LEN: usize = 10;

pub fn compressor() -> Compressor {
    super::compressor(|sink| Box::new(GzipWriter::new(sink, Compression::default())))
}

pub fn decompressor() -> Decompressor {
    super::decompressor(|source| Ok(Box::new(GzipReader::new(source)?)))
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Gzip-compressing sink.
pub struct GzipWriter {
    encoder: GzEncoder<Box<dyn WriteClose>>,
}

impl GzipWriter {
    pub fn new(sink: Box<dyn WriteClose>, level: Compression) -> Self {
        Self {
            encoder: GzEncoder::new(sink, level),
        }
    }
}

impl Write for GzipWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

impl WriteClose for GzipWriter {
    /// Writes the remaining deflate blocks and the CRC/size trailer. The
    /// wrapped sink stays open.
    fn close(&mut self) -> io::Result<()> {
        self.encoder.try_finish()?;
        self.encoder.get_mut().flush()
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

type HeaderThenBody = io::Chain<Cursor<[u8; HEADER_LEN]>, Box<dyn Read + Send>>;

/// Gzip-decompressing source.
pub struct GzipReader {
    decoder: MultiGzDecoder<HeaderThenBody>,
}

impl GzipReader {
    /// Read and check the member header from `source`.
    pub fn new(mut source: Box<dyn Read + Send>) -> io::Result<Self> {
        let mut header = [0u8; HEADER_LEN];
        source.read_exact(&mut header).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                io::Error::new(e.kind(), "gzip: missing or truncated header")
            } else {
                e
            }
        })?;
        validate_header(&header)?;

        Ok(Self {
            decoder: MultiGzDecoder::new(Cursor::new(header).chain(source)),
        })
    }
}

fn validate_header(header: &[u8; HEADER_LEN]) -> io::Result<()> {
    if header[..2] != GZIP_MAGIC {
        return Err(invalid("gzip: invalid header"));
    }
    if header[2] != METHOD_DEFLATE {
        return Err(invalid(format!(
            "gzip: unsupported compression method {}",
            header[2]
        )));
    }
    if header[3] & FLAG_RESERVED != 0 {
        return Err(invalid("gzip: reserved header flags set"));
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

impl Read for GzipReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decoder.read(buf)
    }
}

impl ReadClose for GzipReader {
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::passthrough::NopClose;

    fn compress(data: &[u8]) -> Vec<u8> {
        let sink = VecSink::default();
        let out = sink.buf.clone();
        let mut writer = GzipWriter::new(Box::new(sink), Compression::default());
        writer.write_all(data).unwrap();
        writer.close().unwrap();
        drop(writer);
        let guard = out.lock().unwrap();
        guard.clone()
    }

    #[derive(Default)]
    struct VecSink {
        buf: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
    }

    impl Write for VecSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buf.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl WriteClose for VecSink {
        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn decompress(data: Vec<u8>) -> io::Result<Vec<u8>> {
        let mut reader = GzipReader::new(Box::new(Cursor::new(data)))?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        reader.close()?;
        Ok(out)
    }

    #[test]
    fn output_is_plain_gzip() {
        let data = b"Hello, world! This is test data. ".repeat(32);
        let compressed = compress(&data);
        assert_eq!(compressed[..2], GZIP_MAGIC);
        assert!(compressed.len() < data.len());

        let mut plain = Vec::new();
        flate2::read::GzDecoder::new(&compressed[..])
            .read_to_end(&mut plain)
            .unwrap();
        assert_eq!(plain, data);
    }

    #[test]
    fn roundtrip() {
        let data: Vec<u8> = (0..=255).cycle().take(10_000).collect();
        assert_eq!(decompress(compress(&data)).unwrap(), data);
    }

    #[test]
    fn empty_input_roundtrips() {
        let compressed = compress(b"");
        assert!(compressed.len() >= HEADER_LEN);
        assert!(decompress(compressed).unwrap().is_empty());
    }

    #[test]
    fn concatenated_members_are_decoded() {
        let mut data = compress(b"first ");
        data.extend(compress(b"second"));
        assert_eq!(decompress(data).unwrap(), b"first second");
    }

    #[test]
    fn short_garbage_fails_construction() {
        let err = GzipReader::new(Box::new(Cursor::new(b"foo".to_vec()))).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn bad_magic_fails_construction() {
        let err = GzipReader::new(Box::new(Cursor::new(vec![b'x'; 64]))).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn bad_method_fails_construction() {
        let mut data = compress(b"payload");
        data[2] = 7;
        let err = GzipReader::new(Box::new(Cursor::new(data))).err().unwrap();
        assert!(err.to_string().contains("method 7"));
    }

    #[test]
    fn corrupt_body_fails_on_read() {
        let mut data = compress(&b"abcdefgh".repeat(100));
        let len = data.len();
        for b in &mut data[HEADER_LEN..len - 8] {
            *b = !*b;
        }
        assert!(decompress(data).is_err());
    }

    #[test]
    fn constructor_reads_through_boxed_sources() {
        let source: Box<dyn Read + Send> = Box::new(NopClose::new(Cursor::new(compress(b"x"))));
        let mut reader = GzipReader::new(source).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"x");
    }
}
