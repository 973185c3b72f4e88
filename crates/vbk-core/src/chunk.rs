//! Chunk handling for content-addressed volume backups
//!
//! A volume is cut into fixed-size, offset-addressed chunks. Each chunk is
//! identified by the SHA-256 digest of its uncompressed bytes, so the same
//! content hashes identically whatever compression it is later stored with.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// Default object (chunk) size (50 MiB)
pub const OBJECT_SIZE_DEFAULT: usize = 50 * 1024 * 1024;

/// Default block size for block-level digests (32 KiB)
pub const BLOCK_SIZE_DEFAULT: usize = 32 * 1024;

/// SHA-256 digest identifying chunk content
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkDigest([u8; 32]);

impl ChunkDigest {
    /// Compute digest from data
    pub fn from_data(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&result);
        Self(digest)
    }

    /// Compute one digest per `block_size` slice of `data`.
    ///
    /// The last block may be shorter. A zero block size yields no digests.
    pub fn blocks(data: &[u8], block_size: usize) -> Vec<Self> {
        if block_size == 0 {
            return Vec::new();
        }
        data.chunks(block_size).map(Self::from_data).collect()
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidDigest(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(Error::InvalidDigest(format!(
                "Expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes);
        Ok(Self(digest))
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ChunkDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ChunkDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkDigest({})", &self.to_hex()[..16])
    }
}

// Digests travel as lowercase hex in manifests and block digest maps.
impl Serialize for ChunkDigest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChunkDigest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ChunkDigest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A chunk of volume data
#[derive(Clone)]
pub struct Chunk {
    /// Position in the volume's chunk sequence
    index: u64,
    /// Byte offset in the volume
    offset: u64,
    /// The chunk's digest (SHA-256 of raw data)
    digest: ChunkDigest,
    /// Raw (uncompressed) data
    data: Vec<u8>,
}

impl Chunk {
    /// Create a new chunk from raw data
    pub fn new(index: u64, offset: u64, data: Vec<u8>) -> Self {
        let digest = ChunkDigest::from_data(&data);
        Self {
            index,
            offset,
            digest,
            data,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Get the chunk's digest
    pub fn digest(&self) -> &ChunkDigest {
        &self.digest
    }

    /// Get the raw data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Length of the raw data in bytes
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume and return the data
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("index", &self.index)
            .field("offset", &self.offset)
            .field("len", &self.data.len())
            .field("digest", &self.digest)
            .finish()
    }
}

/// Number of chunks needed to cover `logical_size` bytes
pub fn chunk_count(logical_size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    logical_size.div_ceil(chunk_size)
}

/// Fixed-size chunker over an async byte stream
///
/// Every chunk except the last is exactly `chunk_size` bytes. Short reads
/// from the underlying stream are retried until the chunk is full or the
/// stream ends, so boundaries only depend on the stream content.
pub struct FixedChunker<R> {
    reader: R,
    chunk_size: usize,
    next_index: u64,
    offset: u64,
    finished: bool,
}

impl<R: AsyncRead + Unpin> FixedChunker<R> {
    /// Create a new fixed chunker with the given chunk size
    pub fn new(reader: R, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidChunkSize(chunk_size));
        }
        Ok(Self {
            reader,
            chunk_size,
            next_index: 0,
            offset: 0,
            finished: false,
        })
    }

    /// Read the next chunk, or `None` once the stream is exhausted
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < self.chunk_size {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                self.finished = true;
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);

        let chunk = Chunk::new(self.next_index, self.offset, buf);
        self.next_index += 1;
        self.offset += filled as u64;
        Ok(Some(chunk))
    }

    /// Total bytes consumed so far
    pub fn bytes_read(&self) -> u64 {
        self.offset
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}
