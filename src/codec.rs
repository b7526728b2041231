//! Payload codec: serialization plus threshold-gated gzip framing.
//!
//! Values produced by user loaders are serialized to a self-describing
//! byte payload and, when a descriptor asks for it and the payload is large
//! enough, wrapped in gzip framing. Decode detects the framing from the
//! gzip magic bytes, so readers never need to know whether a particular
//! entry was written compressed.
//!
//! The only external contract is round-trip fidelity:
//! `decode(encode(v)) == v` for every value a `Serialize` loader can
//! produce.
//!
//! # Null marker
//!
//! A memoized null result is stored as the single reserved byte `0x00`.
//! `encode` can never produce it (a serialized payload always begins with
//! a printable JSON byte), so readers can test [`is_null_marker`] before
//! decoding.
//!
//! # Example
//!
//! ```
//! use tiercache::codec;
//!
//! let bytes = codec::encode(&vec![1u32, 2, 3], false, 1024).unwrap();
//! let back: Vec<u32> = codec::decode(&bytes).unwrap();
//! assert_eq!(back, vec![1, 2, 3]);
//! ```

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// Gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Reserved payload marking a memoized null result.
pub const NULL_MARKER: [u8; 1] = [0x00];

/// Codec error types.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Failed to serialize a value
    #[error("serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Failed to deserialize a payload
    #[error("deserialization failed: {0}")]
    Deserialize(#[source] serde_json::Error),

    /// Failed to decompress a gzip-framed payload
    #[error("decompression failed: {0}")]
    Decompress(#[source] std::io::Error),
}

/// Check whether a payload is the reserved null marker.
#[inline]
#[must_use]
pub fn is_null_marker(data: &[u8]) -> bool {
    data.len() == 1 && data[0] == 0x00
}

/// Check whether a payload is gzip-framed by its magic bytes.
#[inline]
#[must_use]
pub fn is_compressed(data: &[u8]) -> bool {
    data.len() >= 2 && data[..2] == GZIP_MAGIC
}

/// Serialize a value, gzip-framing it when `compress` is set and the
/// serialized length reaches `threshold` bytes.
///
/// Compression failure is not fatal: the uncompressed payload is used and
/// the event is logged.
pub fn encode<T: Serialize>(
    value: &T,
    compress: bool,
    threshold: usize,
) -> Result<Vec<u8>, CodecError> {
    let data = serde_json::to_vec(value).map_err(CodecError::Serialize)?;
    debug_assert!(!is_null_marker(&data));

    if compress && data.len() >= threshold {
        match compress_bytes(&data) {
            Ok(framed) => return Ok(framed),
            Err(e) => {
                warn!(
                    error = %e,
                    uncompressed_len = data.len(),
                    "compression failed, storing uncompressed payload"
                );
            }
        }
    }
    Ok(data)
}

/// Deserialize a payload, transparently unwrapping gzip framing.
///
/// Framing is detected from the magic bytes, so plain and compressed
/// entries can coexist under one descriptor.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, CodecError> {
    if is_compressed(data) {
        let plain = decompress_bytes(data)?;
        serde_json::from_slice(&plain).map_err(CodecError::Deserialize)
    } else {
        serde_json::from_slice(data).map_err(CodecError::Deserialize)
    }
}

fn compress_bytes(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn decompress_bytes(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(CodecError::Decompress)?;
    Ok(out)
}
