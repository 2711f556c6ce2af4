//! Protocol constants for the fountain-code block engine.
//!
//! The degree-distribution tuning values and the LCG parameters are wire
//! protocol: encoder and decoder must use identical values or the seed in a
//! block header no longer reproduces the source-index set and decoding is
//! impossible. `EncodeConfig`/`DecodeConfig` carry them so tests can exercise
//! mismatch handling, but production callers keep the defaults.

/// Failure probability bound `delta` of the Robust Soliton Distribution.
pub const RSD_DELTA: f64 = 0.5;

/// Spike tuning constant `c` of the Robust Soliton Distribution.
pub const RSD_C: f64 = 0.1;

/// Multiplier of the Lehmer/Park-Miller generator used for seed replay.
pub const LCG_MULTIPLIER: u64 = 16_807;

/// Modulus of the seed-replay generator (the Mersenne prime 2^31 - 1).
pub const LCG_MODULUS: u64 = 2_147_483_647;

/// Fixed header length of a persisted block record, in bytes:
/// `file_size: u32 | block_size: u32 | seed: u32 | content_hash: [u8; 32]`.
pub const RECORD_HEADER_LEN: usize = 44;

/// Length of the BLAKE3 content hash embedded in every record.
pub const CONTENT_HASH_LEN: usize = 32;

/// Default source-chunk size used when the caller does not pick one.
pub const DEFAULT_BLOCK_SIZE: u32 = 65_536;

/// Largest accepted source-chunk size (16 MiB).
pub const MAX_BLOCK_SIZE: u32 = 1 << 24;

/// Largest encodable source buffer; bounded by the u32 `file_size` header field.
pub const MAX_SOURCE_SIZE: u64 = u32::MAX as u64;

/// Default ratio of encoded payload bytes to source bytes. Production
/// deployments tune this between 4x and 20x depending on expected churn.
pub const DEFAULT_REDUNDANCY_FACTOR: f64 = 8.0;

/// Rejection-sampling draw budget per requested source index. The expected
/// number of draws for a full-degree block is `K * H(K)`, comfortably below
/// this multiple; exhausting it indicates a configuration error, never bad
/// block data.
pub const SAMPLE_ATTEMPTS_PER_INDEX: u32 = 64;

/// Concurrent store writes allowed while persisting an encoded set.
pub const PERSIST_CONCURRENCY: usize = 32;

/// Leading component of a persisted block key.
pub const BLOCK_KEY_FILE_PREFIX: &str = "FileHash__";

/// Component separating the source-file hash from the block index.
pub const BLOCK_KEY_INDEX_PREFIX: &str = "__Block__";

/// Component separating the block index from the block content hash.
pub const BLOCK_KEY_HASH_PREFIX: &str = "__BlockHash_";
