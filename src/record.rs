//! Encoded block records and their binary codec.
//!
//! A block record is the unit of storage and transport: a fixed 44-byte
//! header followed by the XOR payload. Layout, network byte order:
//!
//! ```text
//! file_size: u32 | block_size: u32 | seed: u32 | content_hash: [u8; 32] | payload: [u8; block_size]
//! ```
//!
//! The codec is deliberately dumb: it checks lengths, nothing else. Hash
//! verification lives in the decoder so that corrupt-but-parseable records
//! can still be surfaced and counted for diagnostics.

use serde::Deserialize;
use serde::Serialize;

use crate::constants::BLOCK_KEY_FILE_PREFIX;
use crate::constants::BLOCK_KEY_HASH_PREFIX;
use crate::constants::BLOCK_KEY_INDEX_PREFIX;
use crate::constants::CONTENT_HASH_LEN;
use crate::constants::MAX_BLOCK_SIZE;
use crate::constants::RECORD_HEADER_LEN;
use crate::error::RecordError;

/// One encoded block: the XOR of a seed-determined set of source chunks,
/// plus the header fields needed to replay that set. Immutable once built;
/// any number of blocks map to one source buffer and each survives or is
/// lost independently of its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedBlock {
    /// Total length of the original buffer in bytes.
    pub file_size: u32,
    /// Chunk size used at encode time; also the payload length.
    pub block_size: u32,
    /// Seed that deterministically reproduces the sampled source-index set.
    pub seed: u32,
    /// BLAKE3 hash of `payload`, computed at encode time.
    pub content_hash: [u8; 32],
    /// XOR combination of the sampled source chunks.
    pub payload: Vec<u8>,
}

impl EncodedBlock {
    /// Build a block from a freshly combined payload, computing its hash.
    pub fn new(file_size: u32, block_size: u32, seed: u32, payload: Vec<u8>) -> Self {
        debug_assert_eq!(payload.len(), block_size as usize);
        let content_hash = *blake3::hash(&payload).as_bytes();
        Self {
            file_size,
            block_size,
            seed,
            content_hash,
            payload,
        }
    }

    /// Number of source chunks the original buffer was split into.
    ///
    /// Zero when the header is internally inconsistent (zero block size);
    /// the decoder treats that as a protocol violation.
    pub fn source_block_count(&self) -> u32 {
        source_block_count(self.file_size, self.block_size)
    }

    /// Recompute the payload hash and compare against the header.
    pub fn verify_payload(&self) -> bool {
        blake3::hash(&self.payload).as_bytes() == &self.content_hash
    }

    /// Lowercase hex of the content hash, as used in block keys.
    pub fn content_hash_hex(&self) -> String {
        blake3::Hash::from(self.content_hash).to_hex().to_string()
    }

    /// Serialize to the fixed wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RECORD_HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.file_size.to_be_bytes());
        out.extend_from_slice(&self.block_size.to_be_bytes());
        out.extend_from_slice(&self.seed.to_be_bytes());
        out.extend_from_slice(&self.content_hash);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a record from the fixed wire layout.
    ///
    /// Fails with [`RecordError::TruncatedRecord`] when fewer than
    /// `44 + block_size` bytes are available. Trailing bytes beyond the
    /// declared payload are ignored. No hash verification happens here.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < RECORD_HEADER_LEN {
            return Err(RecordError::TruncatedRecord {
                len: bytes.len(),
                required: RECORD_HEADER_LEN,
            });
        }
        let file_size = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let block_size = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let seed = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        if block_size > MAX_BLOCK_SIZE {
            return Err(RecordError::OversizedBlock {
                block_size,
                max: MAX_BLOCK_SIZE,
            });
        }
        let required = RECORD_HEADER_LEN + block_size as usize;
        if bytes.len() < required {
            return Err(RecordError::TruncatedRecord {
                len: bytes.len(),
                required,
            });
        }
        let mut content_hash = [0u8; CONTENT_HASH_LEN];
        content_hash.copy_from_slice(&bytes[12..RECORD_HEADER_LEN]);
        let payload = bytes[RECORD_HEADER_LEN..required].to_vec();
        Ok(Self {
            file_size,
            block_size,
            seed,
            content_hash,
            payload,
        })
    }
}

/// `ceil(file_size / block_size)`, the source chunk count K.
///
/// Returns zero for a zero block size rather than dividing by it; callers
/// reject that case as a protocol violation.
pub fn source_block_count(file_size: u32, block_size: u32) -> u32 {
    if block_size == 0 {
        return 0;
    }
    ((u64::from(file_size) + u64::from(block_size) - 1) / u64::from(block_size)) as u32
}

/// BLAKE3 content hash of a whole source buffer, used to namespace its
/// blocks in the store.
pub fn source_hash(data: &[u8]) -> blake3::Hash {
    blake3::hash(data)
}

/// XOR `src` into `dst` element-wise.
pub(crate) fn xor_in_place(dst: &mut [u8], src: &[u8]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d ^= *s;
    }
}

/// Compose the persisted key for one block:
/// `FileHash__<source hash>__Block__<index>__BlockHash_<content hash>`.
///
/// The two embedded hashes are the load-bearing parts; the index is a
/// human diagnostic recording emission order. Keys from different source
/// files can never collide, and identical payloads for the same file
/// deduplicate naturally.
pub fn block_key(source: &blake3::Hash, index: u64, content_hash: &[u8; 32]) -> String {
    format!(
        "{BLOCK_KEY_FILE_PREFIX}{}{BLOCK_KEY_INDEX_PREFIX}{index}{BLOCK_KEY_HASH_PREFIX}{}",
        source.to_hex(),
        blake3::Hash::from(*content_hash).to_hex(),
    )
}

/// Key prefix shared by all blocks of one source file.
pub fn block_key_prefix(source: &blake3::Hash) -> String {
    format!("{BLOCK_KEY_FILE_PREFIX}{}{BLOCK_KEY_INDEX_PREFIX}", source.to_hex())
}

/// The parsed components of a block key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockKeyParts {
    /// Hex of the whole-file content hash.
    pub source_hash_hex: String,
    /// Emission index recorded at encode time.
    pub index: u64,
    /// Hex of the block payload hash.
    pub content_hash_hex: String,
}

/// Split a block key back into its components. Returns `None` for keys
/// that do not follow the naming convention.
pub fn parse_block_key(key: &str) -> Option<BlockKeyParts> {
    let rest = key.strip_prefix(BLOCK_KEY_FILE_PREFIX)?;
    let (source_hash_hex, rest) = rest.split_once(BLOCK_KEY_INDEX_PREFIX)?;
    let (index, content_hash_hex) = rest.split_once(BLOCK_KEY_HASH_PREFIX)?;
    let index = index.parse().ok()?;
    if source_hash_hex.is_empty() || content_hash_hex.is_empty() {
        return None;
    }
    Some(BlockKeyParts {
        source_hash_hex: source_hash_hex.to_string(),
        index,
        content_hash_hex: content_hash_hex.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> EncodedBlock {
        EncodedBlock::new(10_000, 1000, 42, vec![0xAB; 1000])
    }

    #[test]
    fn wire_round_trip() {
        let block = sample_block();
        let bytes = block.to_bytes();
        assert_eq!(bytes.len(), RECORD_HEADER_LEN + 1000);
        let back = EncodedBlock::from_bytes(&bytes).expect("parse");
        assert_eq!(block, back);
    }

    #[test]
    fn short_header_is_truncated() {
        let err = EncodedBlock::from_bytes(&[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            RecordError::TruncatedRecord {
                len: 10,
                required: RECORD_HEADER_LEN
            }
        );
    }

    #[test]
    fn short_payload_is_truncated() {
        let block = sample_block();
        let mut bytes = block.to_bytes();
        bytes.truncate(RECORD_HEADER_LEN + 999);
        let err = EncodedBlock::from_bytes(&bytes).unwrap_err();
        assert_eq!(
            err,
            RecordError::TruncatedRecord {
                len: RECORD_HEADER_LEN + 999,
                required: RECORD_HEADER_LEN + 1000,
            }
        );
    }

    #[test]
    fn absurd_block_size_rejected_before_allocation() {
        let mut bytes = sample_block().to_bytes();
        bytes[4..8].copy_from_slice(&u32::MAX.to_be_bytes());
        let err = EncodedBlock::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, RecordError::OversizedBlock { .. }));
    }

    #[test]
    fn hash_verification_detects_flipped_byte() {
        let mut block = sample_block();
        assert!(block.verify_payload());
        block.payload[17] ^= 0x01;
        assert!(!block.verify_payload());
    }

    #[test]
    fn header_is_big_endian() {
        let block = EncodedBlock::new(0x0102_0304, 4, 0x0A0B_0C0D, vec![1, 2, 3, 4]);
        let bytes = block.to_bytes();
        assert_eq!(&bytes[0..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[8..12], &[0x0A, 0x0B, 0x0C, 0x0D]);
    }

    #[test]
    fn block_count_rounds_up() {
        assert_eq!(source_block_count(10_000, 1000), 10);
        assert_eq!(source_block_count(10_001, 1000), 11);
        assert_eq!(source_block_count(999, 1000), 1);
        assert_eq!(source_block_count(0, 1000), 0);
        assert_eq!(source_block_count(10, 0), 0);
    }

    #[test]
    fn key_round_trips() {
        let source = blake3::hash(b"the source file");
        let block = sample_block();
        let key = block_key(&source, 7, &block.content_hash);
        assert!(key.starts_with("FileHash__"));
        assert!(key.contains("__Block__7__BlockHash_"));
        let parts = parse_block_key(&key).expect("parse");
        assert_eq!(parts.source_hash_hex, source.to_hex().to_string());
        assert_eq!(parts.index, 7);
        assert_eq!(parts.content_hash_hex, block.content_hash_hex());
    }

    #[test]
    fn malformed_keys_rejected() {
        assert!(parse_block_key("").is_none());
        assert!(parse_block_key("FileHash__abc").is_none());
        assert!(parse_block_key("FileHash__abc__Block__x__BlockHash_def").is_none());
        assert!(parse_block_key("somethingelse__Block__1__BlockHash_def").is_none());
    }

    #[test]
    fn prefix_matches_composed_keys() {
        let source = blake3::hash(b"prefix test");
        let block = sample_block();
        let key = block_key(&source, 0, &block.content_hash);
        assert!(key.starts_with(&block_key_prefix(&source)));
    }
}
