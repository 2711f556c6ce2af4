//! Rateless block encoder.
//!
//! Splits a source buffer into K zero-padded chunks and emits N encoded
//! blocks, each the XOR of a seed-determined subset of chunks. Every block
//! depends only on the immutable chunk set and its own fresh seed, so block
//! generation is embarrassingly parallel and individual blocks can be
//! persisted, lost, or fetched independently.

use rand::Rng;
use tracing::debug;

use crate::config::EncodeConfig;
use crate::constants::LCG_MODULUS;
use crate::constants::MAX_SOURCE_SIZE;
use crate::error::EncodeError;
use crate::record::source_block_count;
use crate::record::xor_in_place;
use crate::record::EncodedBlock;
use crate::sampler;
use crate::soliton::DegreeTable;

/// Fountain-code encoder for one configuration.
#[derive(Debug, Clone)]
pub struct Encoder {
    config: EncodeConfig,
}

impl Encoder {
    /// Create an encoder, rejecting invalid parameters immediately.
    pub fn new(config: EncodeConfig) -> Result<Self, EncodeError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration this encoder was built with.
    pub fn config(&self) -> &EncodeConfig {
        &self.config
    }

    /// Number of encoded blocks an encode of `source_len` bytes will emit:
    /// `ceil(redundancy_factor * source_len / block_size)`.
    pub fn block_budget(&self, source_len: usize) -> u64 {
        if source_len == 0 {
            return 0;
        }
        let blocks = self.config.redundancy_factor * source_len as f64 / f64::from(self.config.block_size);
        blocks.ceil() as u64
    }

    /// Encode `data` into a redundant set of blocks, drawing a fresh random
    /// seed for each one.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<EncodedBlock>, EncodeError> {
        let mut rng = rand::thread_rng();
        self.encode_inner(data, || rng.gen_range(1..LCG_MODULUS as u32))
    }

    /// Encode `data` using the caller's seed sequence instead of the
    /// process RNG. The sequence must supply one seed per emitted block;
    /// running short is a parameter error.
    ///
    /// Reproducible encodes are load-bearing for regression tests and for
    /// re-emitting a lost block set from an audit log.
    pub fn encode_with_seeds<I>(&self, data: &[u8], seeds: I) -> Result<Vec<EncodedBlock>, EncodeError>
    where
        I: IntoIterator<Item = u32>,
    {
        let mut seeds = seeds.into_iter();
        let mut shortfall = false;
        let blocks = self.encode_inner(data, || match seeds.next() {
            Some(seed) => seed,
            None => {
                shortfall = true;
                0
            }
        })?;
        if shortfall {
            return Err(EncodeError::InvalidParameters {
                reason: "seed sequence ended before the block budget was met".to_string(),
            });
        }
        Ok(blocks)
    }

    fn encode_inner<F>(&self, data: &[u8], mut next_seed: F) -> Result<Vec<EncodedBlock>, EncodeError>
    where
        F: FnMut() -> u32,
    {
        if data.len() as u64 > MAX_SOURCE_SIZE {
            return Err(EncodeError::SourceTooLarge {
                size: data.len() as u64,
                max: MAX_SOURCE_SIZE,
            });
        }
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let file_size = data.len() as u32;
        let block_size = self.config.block_size;
        let k = source_block_count(file_size, block_size);
        let chunks = build_chunks(data, block_size);
        let table = DegreeTable::new(k, self.config.delta, self.config.c);
        let budget = self.block_budget(data.len());

        debug!(file_size, block_size, k, budget, "encoding source buffer");

        let mut blocks = Vec::with_capacity(budget as usize);
        for _ in 0..budget {
            let seed = next_seed();
            let selection = sampler::sample(seed, &table)?;
            let mut payload = vec![0u8; block_size as usize];
            for &idx in &selection.indices {
                xor_in_place(&mut payload, &chunks[idx as usize]);
            }
            blocks.push(EncodedBlock::new(file_size, block_size, seed, payload));
        }
        Ok(blocks)
    }
}

/// Split `data` into `ceil(len / block_size)` chunks, zero-padding the
/// final short chunk to full length.
fn build_chunks(data: &[u8], block_size: u32) -> Vec<Vec<u8>> {
    let block_size = block_size as usize;
    let mut chunks = Vec::with_capacity(data.len().div_ceil(block_size));
    for piece in data.chunks(block_size) {
        let mut chunk = vec![0u8; block_size];
        chunk[..piece.len()].copy_from_slice(piece);
        chunks.push(chunk);
    }
    chunks
}
