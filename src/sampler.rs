//! Deterministic seed-to-sample replay.
//!
//! The only thing a block header carries about its composition is a 32-bit
//! seed. Both sides replay that seed through the same Lehmer generator and
//! degree table to recover the identical `(degree, source index set)` pair,
//! so the index set itself never travels. Bit-for-bit agreement here is the
//! entire protocol; nothing in this module may depend on platform RNG,
//! hashing order, or library version behavior.

use std::collections::HashSet;

use crate::constants::LCG_MODULUS;
use crate::constants::LCG_MULTIPLIER;
use crate::constants::SAMPLE_ATTEMPTS_PER_INDEX;
use crate::error::SampleError;
use crate::soliton::DegreeTable;

/// Park-Miller multiplicative congruential generator over the group
/// `[1, 2^31 - 2]`. State never reaches zero once seeded into the group.
#[derive(Debug, Clone)]
struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u32) -> Self {
        // Fold arbitrary u32 input into the multiplicative group. Encoder
        // seeds are already in range; replaying a hostile header value must
        // still be deterministic rather than panic or loop.
        let mut state = u64::from(seed) % LCG_MODULUS;
        if state == 0 {
            state = 1;
        }
        Self { state }
    }

    fn next_u31(&mut self) -> u32 {
        self.state = (self.state * LCG_MULTIPLIER) % LCG_MODULUS;
        self.state as u32
    }

    /// Uniform draw in `(0, 1)`.
    fn next_unit(&mut self) -> f64 {
        f64::from(self.next_u31()) / LCG_MODULUS as f64
    }
}

/// The sampled composition of one encoded block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSelection {
    /// Number of source chunks XORed into the block.
    pub degree: u32,
    /// The distinct source indices, in draw order.
    pub indices: Vec<u32>,
}

/// Replay `seed` against `table`, producing the degree and index set for
/// the block that was (or will be) built from that seed.
///
/// The first draw selects the degree through the cumulative table; each
/// following draw proposes `state mod k`, rejecting duplicates until
/// `degree` distinct indices are collected. Rejection sampling over a
/// finite space always terminates, but a draw budget bounds the tail so a
/// broken table surfaces as [`SampleError::SamplerStall`] instead of a
/// near-infinite loop.
pub fn sample(seed: u32, table: &DegreeTable) -> Result<BlockSelection, SampleError> {
    let k = table.k();
    debug_assert!(k > 0, "sampling requires a nonempty degree table");

    let mut lcg = Lcg::new(seed);
    let degree = table.degree_for(lcg.next_unit()).min(k);

    let max_attempts = k.saturating_mul(SAMPLE_ATTEMPTS_PER_INDEX).max(256);
    let mut indices = Vec::with_capacity(degree as usize);
    let mut seen = HashSet::with_capacity(degree as usize);
    let mut attempts = 0u32;
    while (indices.len() as u32) < degree {
        if attempts >= max_attempts {
            return Err(SampleError::SamplerStall {
                seed,
                degree,
                attempts,
            });
        }
        attempts += 1;
        let candidate = lcg.next_u31() % k;
        if seen.insert(candidate) {
            indices.push(candidate);
        }
    }
    Ok(BlockSelection { degree, indices })
}
