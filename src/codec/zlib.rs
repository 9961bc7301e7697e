// Zlib codec (RFC 1950) via flate2.

use std::io::{self, Cursor, Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use super::{Compressor, Decompressor, ReadClose, WriteClose};

const METHOD_DEFLATE: u8 = 8;
const MAX_WINDOW_BITS: u8 = 7;
const FLAG_DICT: u8 = 0x20;

pub fn compressor() -> Compressor {
    super::compressor(|sink| Box::new(ZlibWriter::new(sink, Compression::default())))
}

pub fn decompressor() -> Decompressor {
    super::decompressor(|source| Ok(Box::new(ZlibReader::new(source)?)))
}

/// Zlib-compressing sink.
pub struct ZlibWriter {
    encoder: ZlibEncoder<Box<dyn WriteClose>>,
}

impl ZlibWriter {
    pub fn new(sink: Box<dyn WriteClose>, level: Compression) -> Self {
        Self {
            encoder: ZlibEncoder::new(sink, level),
        }
    }
}

impl Write for ZlibWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

impl WriteClose for ZlibWriter {
    fn close(&mut self) -> io::Result<()> {
        self.encoder.try_finish()?;
        self.encoder.get_mut().flush()
    }
}

/// Zlib-decompressing source.
pub struct ZlibReader {
    decoder: ZlibDecoder<io::Chain<Cursor<[u8; 2]>, Box<dyn Read + Send>>>,
}

impl ZlibReader {
    /// Read and check the two-byte stream header from `source`.
    pub fn new(mut source: Box<dyn Read + Send>) -> io::Result<Self> {
        let mut header = [0u8; 2];
        source.read_exact(&mut header).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                io::Error::new(e.kind(), "zlib: missing or truncated header")
            } else {
                e
            }
        })?;

        let [cmf, flg] = header;
        if cmf & 0x0f != METHOD_DEFLATE || cmf >> 4 > MAX_WINDOW_BITS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "zlib: invalid header",
            ));
        }
        if u16::from_be_bytes(header) % 31 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "zlib: header checksum mismatch",
            ));
        }
        if flg & FLAG_DICT != 0 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "zlib: preset dictionaries are not supported",
            ));
        }

        Ok(Self {
            decoder: ZlibDecoder::new(Cursor::new(header).chain(source)),
        })
    }
}

impl Read for ZlibReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decoder.read(buf)
    }
}

impl ReadClose for ZlibReader {
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}
