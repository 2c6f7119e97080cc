//! Pluggable value compression, kept as an external collaborator to the
//! wire codec: the client calls `compress` before Set/Add/Replace/Append/
//! Prepend and `decompress` after Get/GAT, never on the ASCII numeric
//! payloads Incr/Decr exchange.

use crate::error::Error;

/// Transform a value's bytes on the way to or from the wire. A
/// [`NoopCompressor`] is the default; enable the `zlib` feature for
/// [`ZlibCompressor`].
pub trait Compressor: Send + Sync {
    fn compress(&self, value: Vec<u8>) -> Result<Vec<u8>, Error>;
    fn decompress(&self, value: Vec<u8>) -> Result<Vec<u8>, Error>;
}

/// A [`Compressor`] that does nothing. This is the default; use it if
/// transparent compression is undesired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn compress(&self, value: Vec<u8>) -> Result<Vec<u8>, Error> {
        Ok(value)
    }

    fn decompress(&self, value: Vec<u8>) -> Result<Vec<u8>, Error> {
        Ok(value)
    }
}

#[cfg(feature = "zlib")]
mod zlib {
    use std::io::{Read, Write};

    use flate2::read::ZlibDecoder;
    use flate2::write::ZlibEncoder;
    pub use flate2::Compression;

    use super::Compressor;
    use crate::error::Error;

    const MARKER_RAW: u8 = 0;
    const MARKER_ZLIB: u8 = 1;

    /// The minimum number of bytes before the compressor bothers
    /// compressing data; small values compress poorly once framing
    /// overhead is accounted for.
    pub const DEFAULT_MIN_BYTES: usize = 128;

    /// A [`Compressor`] that zlib-compresses values at or above a size
    /// threshold. Every value is prefixed with a one-byte marker
    /// recording whether it was actually compressed, since a value just
    /// under the threshold is stored raw and must still round-trip.
    #[derive(Debug, Clone, Copy)]
    pub struct ZlibCompressor {
        compression: Compression,
        min_bytes: usize,
    }

    impl ZlibCompressor {
        /// Construct a zlib compressor. Values shorter than `min_bytes`
        /// are left uncompressed.
        pub fn new(compression: Compression, min_bytes: usize) -> Self {
            ZlibCompressor {
                compression,
                min_bytes,
            }
        }
    }

    impl Default for ZlibCompressor {
        fn default() -> Self {
            ZlibCompressor::new(Compression::default(), DEFAULT_MIN_BYTES)
        }
    }

    impl Compressor for ZlibCompressor {
        fn compress(&self, value: Vec<u8>) -> Result<Vec<u8>, Error> {
            if value.len() < self.min_bytes {
                let mut out = Vec::with_capacity(value.len() + 1);
                out.push(MARKER_RAW);
                out.extend(value);
                return Ok(out);
            }

            let mut enc = ZlibEncoder::new(Vec::new(), self.compression);
            enc.write_all(&value)
                .map_err(|e| Error::protocol(format!("zlib compress: {}", e)))?;
            let compressed = enc
                .finish()
                .map_err(|e| Error::protocol(format!("zlib compress: {}", e)))?;

            let mut out = Vec::with_capacity(compressed.len() + 1);
            out.push(MARKER_ZLIB);
            out.extend(compressed);
            Ok(out)
        }

        fn decompress(&self, value: Vec<u8>) -> Result<Vec<u8>, Error> {
            if value.is_empty() {
                return Ok(value);
            }
            let (marker, rest) = value.split_at(1);
            match marker[0] {
                MARKER_ZLIB => {
                    let mut dec = ZlibDecoder::new(rest);
                    let mut out = Vec::new();
                    dec.read_to_end(&mut out)
                        .map_err(|e| Error::protocol(format!("zlib decompress: {}", e)))?;
                    Ok(out)
                }
                _ => Ok(rest.to_vec()),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_round_trip_above_threshold() {
            let compressor = ZlibCompressor::new(Compression::best(), 1);
            let value = b"0000000000000000000000000000000000000000000000".to_vec();
            let compressed = compressor.compress(value.clone()).unwrap();
            assert!(compressed.len() < value.len());
            let decompressed = compressor.decompress(compressed).unwrap();
            assert_eq!(value, decompressed);
        }

        #[test]
        fn test_round_trip_below_threshold() {
            let compressor = ZlibCompressor::new(Compression::best(), 1024);
            let value = b"tiny".to_vec();
            let stored = compressor.compress(value.clone()).unwrap();
            let restored = compressor.decompress(stored).unwrap();
            assert_eq!(value, restored);
        }
    }
}

#[cfg(feature = "zlib")]
pub use zlib::{Compression, ZlibCompressor, DEFAULT_MIN_BYTES};
