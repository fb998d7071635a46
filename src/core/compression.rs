//! Gzip payload decoding.

use flate2::read::MultiGzDecoder;
use std::io::Read;
use std::string::FromUtf8Error;

/// Outcome of decoding a message payload.
#[derive(Debug)]
pub enum Payload {
    /// Payload was gzip-compressed UTF-8 text.
    Decompressed(String),
    /// Payload could not be decoded; the event section is omitted.
    Skipped(DecodeFailure),
}

/// Why a payload was skipped.
#[derive(Debug)]
pub enum DecodeFailure {
    /// Not a gzip stream, or a corrupt one.
    NotGzip(std::io::Error),
    /// Decompressed bytes are not UTF-8.
    NotUtf8(FromUtf8Error),
}

impl Payload {
    /// Decompressed text, if decoding succeeded.
    pub fn text(&self) -> Option<&str> {
        match self {
            Payload::Decompressed(text) => Some(text),
            Payload::Skipped(_) => None,
        }
    }
}

/// Decompress a gzip payload (possibly multi-member) into UTF-8 text.
pub fn gunzip_utf8(data: &[u8]) -> Payload {
    // An empty buffer is an empty gzip stream.
    if data.is_empty() {
        return Payload::Decompressed(String::new());
    }

    let mut decoder = MultiGzDecoder::new(data);
    let mut decompressed = Vec::new();
    if let Err(e) = decoder.read_to_end(&mut decompressed) {
        return Payload::Skipped(DecodeFailure::NotGzip(e));
    }

    match String::from_utf8(decompressed) {
        Ok(text) => Payload::Decompressed(text),
        Err(e) => Payload::Skipped(DecodeFailure::NotUtf8(e)),
    }
}

/// Gzip-compress bytes. Used by the in-memory emulator and tests.
pub fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
