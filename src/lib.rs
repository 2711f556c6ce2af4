//! Rateless fountain-code block storage engine.
//!
//! Splits a source buffer into K fixed-size chunks and emits a redundant
//! stream of XOR-combined encoded blocks using an LT-style rateless code.
//! Any sufficiently large subset of surviving blocks reconstructs the
//! original bytes; no particular block is required. Key properties:
//!
//! - **Seed protocol**: each block header carries only a 32-bit seed; both
//!   sides replay it through the same deterministic sampler to agree on
//!   which source chunks were XORed, so the index set never travels
//! - **Content-addressed**: blocks persist under keys embedding the source
//!   file hash and the block payload hash, deduplicating by construction
//! - **Peeling decoder**: belief propagation over a check-node graph
//!   resolves chunks in linear time, no matrix inversion
//! - **Loss-tolerant**: blocks may arrive out of order, duplicated, or
//!   corrupted; bad input is counted and skipped, never fatal
//!
//! ## Architecture
//!
//! ```text
//! source bytes
//!      |
//!      v
//! Encoder -- DegreeTable + sampler --> EncodedBlock set
//!      |                                    |
//!      v                                    v
//! persist_blocks ----------------> BlockStore (fs / memory)
//!                                           |
//!                                           v
//! DecodeSession -- PeelingDecoder --> source bytes
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use fountain_store::{DecodeConfig, DecodeSession, EncodeConfig, Encoder, FsBlockStore};
//!
//! let encoder = Encoder::new(EncodeConfig::default())?;
//! let store = std::sync::Arc::new(FsBlockStore::open("./blocks").await?);
//!
//! // Encode and persist a redundant block set.
//! let (source, summary) = fountain_store::encode_to_store(&encoder, store.clone(), &data).await?;
//! println!("stored {} blocks for {}", summary.stored, source);
//!
//! // Later, from whatever blocks survived:
//! let mut session = DecodeSession::new(DecodeConfig::default())?;
//! let recovered = session.decode_from_store(store.as_ref(), &source).await?;
//! assert_eq!(recovered, data);
//! ```

pub mod config;
pub mod constants;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod record;
pub mod sampler;
pub mod session;
pub mod soliton;
pub mod store;

pub use config::DecodeConfig;
pub use config::EncodeConfig;
pub use decoder::DecodeProgress;
pub use decoder::DecodeState;
pub use decoder::DecodeStats;
pub use decoder::PeelingDecoder;
pub use encoder::Encoder;
pub use error::DecodeError;
pub use error::EncodeError;
pub use error::RecordError;
pub use error::SampleError;
pub use error::SessionError;
pub use error::StoreError;
pub use record::block_key;
pub use record::parse_block_key;
pub use record::source_hash;
pub use record::BlockKeyParts;
pub use record::EncodedBlock;
pub use sampler::sample;
pub use sampler::BlockSelection;
pub use session::encode_to_store;
pub use session::persist_blocks;
pub use session::DecodeSession;
pub use session::PersistSummary;
pub use soliton::DegreeTable;
pub use store::BlockStore;
pub use store::FsBlockStore;
pub use store::MemoryBlockStore;
pub use store::PutBlockResult;
