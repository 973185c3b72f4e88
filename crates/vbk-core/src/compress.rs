//! Per-chunk compression
//!
//! The algorithm is picked per backup but recorded on every chunk, so a
//! restore always decodes with whatever was used at write time.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Compression applied to a stored chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Stored as-is
    None,
    /// zlib/deflate stream at the default level
    #[default]
    #[serde(alias = "deflate")]
    Zlib,
    /// bzip2 block-sorting compression
    #[serde(alias = "bzip2")]
    Bz2,
}

impl CompressionAlgorithm {
    /// Name written into manifests
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Zlib => "zlib",
            CompressionAlgorithm::Bz2 => "bz2",
        }
    }

    /// Compress a chunk's raw bytes
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            CompressionAlgorithm::None => Ok(data.to_vec()),
            CompressionAlgorithm::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder
                    .write_all(data)
                    .map_err(|e| Error::Compression(e.to_string()))?;
                encoder
                    .finish()
                    .map_err(|e| Error::Compression(e.to_string()))
            }
            CompressionAlgorithm::Bz2 => {
                let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::default());
                encoder
                    .write_all(data)
                    .map_err(|e| Error::Compression(e.to_string()))?;
                encoder
                    .finish()
                    .map_err(|e| Error::Compression(e.to_string()))
            }
        }
    }

    /// Reverse [`compress`](Self::compress)
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            CompressionAlgorithm::None => Ok(data.to_vec()),
            CompressionAlgorithm::Zlib => {
                let mut out = Vec::new();
                ZlibDecoder::new(data)
                    .read_to_end(&mut out)
                    .map_err(|e| Error::Decompression(e.to_string()))?;
                Ok(out)
            }
            CompressionAlgorithm::Bz2 => {
                let mut out = Vec::new();
                BzDecoder::new(data)
                    .read_to_end(&mut out)
                    .map_err(|e| Error::Decompression(e.to_string()))?;
                Ok(out)
            }
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = Error;

    /// Parse a configured algorithm name (case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" | "no" => Ok(CompressionAlgorithm::None),
            "zlib" | "deflate" | "gzip" => Ok(CompressionAlgorithm::Zlib),
            "bz2" | "bzip2" => Ok(CompressionAlgorithm::Bz2),
            other => Err(Error::UnsupportedCompression(other.to_string())),
        }
    }
}
