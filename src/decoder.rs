//! Belief-propagation peeling decoder.
//!
//! The decoder consumes encoded blocks in any order, with duplicates and
//! gaps tolerated, and maintains a bipartite graph between unresolved
//! source indices and "check nodes" (blocks whose sampled index set is not
//! yet fully explained). Whenever a check's unresolved set shrinks to one
//! index, that index resolves to the check's residual XOR value and the
//! resolution propagates through every other check referencing it. The
//! cascade runs on an explicit work queue, so recursion depth never grows
//! with K.
//!
//! Peeling works directly on XORed payloads without matrix inversion,
//! which keeps decoding linear in the number of graph edges at the cost of
//! a small stall probability; callers compensate by over-provisioning the
//! encoded set.
//!
//! Failure model: corrupt payloads, malformed headers, and inconsistent
//! geometry are dropped and counted, never fatal. Resolution is strictly
//! additive; no error path leaves the resolved set partially mutated.

use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::config::DecodeConfig;
use crate::error::DecodeError;
use crate::record::xor_in_place;
use crate::record::EncodedBlock;
use crate::sampler;
use crate::soliton::DegreeTable;

/// Lifecycle of a decode session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeState {
    /// Fewer than K source blocks resolved; more input welcome.
    Collecting,
    /// All K source blocks resolved.
    Resolved,
    /// Input or budget ran out short of K. Ingesting more blocks resumes
    /// the session from exactly where it stalled.
    Exhausted,
}

/// Counters describing what a decode session has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeStats {
    /// Blocks handed to `ingest`, including rejected ones.
    pub blocks_examined: u64,
    /// Blocks whose payload hash did not match their header.
    pub corrupt_blocks: u64,
    /// Exact re-ingestions of an already-seen block.
    pub duplicate_blocks: u64,
    /// Blocks with malformed or inconsistent headers, or a nonzero
    /// residual after full subtraction.
    pub protocol_violations: u64,
    /// Consistent blocks that carried no new information.
    pub redundant_blocks: u64,
}

/// Snapshot returned by every `ingest` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeProgress {
    /// Whether this block contributed to the graph.
    pub accepted: bool,
    /// Source blocks resolved so far.
    pub resolved: u32,
    /// Source blocks needed in total; zero until the first accepted block
    /// fixes the geometry.
    pub required: u32,
    /// Check nodes still waiting on more than one index.
    pub pending_checks: usize,
    /// Session state after this block.
    pub state: DecodeState,
}

/// Geometry locked in by the first structurally valid block.
#[derive(Debug)]
struct Geometry {
    file_size: u32,
    block_size: u32,
    k: u32,
    table: DegreeTable,
}

/// One not-yet-peeled block: residual payload plus the indices still
/// believed to contribute to it.
#[derive(Debug)]
struct CheckNode {
    indices: Vec<u32>,
    payload: Vec<u8>,
}

/// Streaming peeling decoder over encoded blocks.
pub struct PeelingDecoder {
    config: DecodeConfig,
    geometry: Option<Geometry>,
    resolved: Vec<Option<Vec<u8>>>,
    resolved_count: u32,
    /// Slab of pending checks; peeled slots become `None` and index lists
    /// in `by_index` may go stale, which lookups tolerate.
    checks: Vec<Option<CheckNode>>,
    pending: usize,
    by_index: HashMap<u32, Vec<usize>>,
    seen: HashSet<(u32, [u8; 32])>,
    stats: DecodeStats,
    state: DecodeState,
}

impl PeelingDecoder {
    /// Create a decoder, rejecting invalid parameters immediately.
    pub fn new(config: DecodeConfig) -> Result<Self, DecodeError> {
        config.validate()?;
        Ok(Self {
            config,
            geometry: None,
            resolved: Vec::new(),
            resolved_count: 0,
            checks: Vec::new(),
            pending: 0,
            by_index: HashMap::new(),
            seen: HashSet::new(),
            stats: DecodeStats::default(),
            state: DecodeState::Collecting,
        })
    }

    /// Session state.
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Source blocks resolved so far.
    pub fn resolved_count(&self) -> u32 {
        self.resolved_count
    }

    /// Source blocks needed in total, once known.
    pub fn required(&self) -> u32 {
        self.geometry.as_ref().map_or(0, |g| g.k)
    }

    /// Check nodes still pending.
    pub fn pending_checks(&self) -> usize {
        self.pending
    }

    /// Whether all source blocks are resolved.
    pub fn is_complete(&self) -> bool {
        self.state == DecodeState::Resolved
    }

    /// Feed one candidate block into the graph.
    ///
    /// Corrupt, malformed, duplicate, and redundant blocks are counted and
    /// skipped. Only two conditions surface as errors: a sampler stall
    /// (broken configuration) and an exceeded block budget. Ingesting into
    /// an `Exhausted` session resumes it.
    pub fn ingest(&mut self, block: EncodedBlock) -> Result<DecodeProgress, DecodeError> {
        if let Some(budget) = self.config.max_blocks {
            if self.stats.blocks_examined >= budget {
                self.state = DecodeState::Exhausted;
                return Err(DecodeError::BudgetExhausted {
                    budget,
                    resolved: self.resolved_count,
                    required: self.required(),
                });
            }
        }
        self.stats.blocks_examined += 1;

        if self.state == DecodeState::Resolved {
            self.stats.redundant_blocks += 1;
            return Ok(self.progress(false));
        }
        if self.state == DecodeState::Exhausted {
            self.state = DecodeState::Collecting;
        }

        if !block.verify_payload() {
            self.stats.corrupt_blocks += 1;
            warn!(seed = block.seed, "discarding block with mismatched content hash");
            return Ok(self.progress(false));
        }

        let k = block.source_block_count();
        if k == 0 || block.payload.len() != block.block_size as usize {
            self.stats.protocol_violations += 1;
            warn!(
                seed = block.seed,
                file_size = block.file_size,
                block_size = block.block_size,
                "discarding block with malformed header"
            );
            return Ok(self.progress(false));
        }

        let (table_k, block_size) = match &self.geometry {
            Some(geometry) => {
                if geometry.file_size != block.file_size || geometry.block_size != block.block_size {
                    self.stats.protocol_violations += 1;
                    warn!(
                        seed = block.seed,
                        expected_file_size = geometry.file_size,
                        got_file_size = block.file_size,
                        expected_block_size = geometry.block_size,
                        got_block_size = block.block_size,
                        "discarding block with inconsistent geometry"
                    );
                    return Ok(self.progress(false));
                }
                (geometry.k, geometry.block_size)
            }
            None => {
                let table = DegreeTable::new(k, self.config.delta, self.config.c);
                self.resolved = vec![None; k as usize];
                self.geometry = Some(Geometry {
                    file_size: block.file_size,
                    block_size: block.block_size,
                    k,
                    table,
                });
                debug!(
                    file_size = block.file_size,
                    block_size = block.block_size,
                    k,
                    "decode geometry locked"
                );
                (k, block.block_size)
            }
        };
        debug_assert_eq!(block.block_size, block_size);

        if !self.seen.insert((block.seed, block.content_hash)) {
            self.stats.duplicate_blocks += 1;
            return Ok(self.progress(false));
        }

        let selection = {
            // Geometry was just ensured above.
            let Some(geometry) = &self.geometry else {
                return Ok(self.progress(false));
            };
            sampler::sample(block.seed, &geometry.table)?
        };

        // Message passing from the resolved set into this check: subtract
        // every already-known chunk from the payload.
        let mut payload = block.payload;
        let mut remaining = Vec::with_capacity(selection.indices.len());
        for idx in selection.indices {
            match &self.resolved[idx as usize] {
                Some(chunk) => xor_in_place(&mut payload, chunk),
                None => remaining.push(idx),
            }
        }

        let accepted = match remaining.len() {
            0 => {
                // Fully explained by the resolved set. A nonzero residual
                // means some input lied despite a valid hash.
                if payload.iter().any(|&b| b != 0) {
                    self.stats.protocol_violations += 1;
                    warn!(seed = block.seed, "discarding block with nonzero residual");
                } else {
                    self.stats.redundant_blocks += 1;
                }
                false
            }
            1 => {
                self.resolve_cascade(remaining[0], payload);
                true
            }
            _ => {
                let id = self.checks.len();
                for &idx in &remaining {
                    self.by_index.entry(idx).or_default().push(id);
                }
                self.checks.push(Some(CheckNode {
                    indices: remaining,
                    payload,
                }));
                self.pending += 1;
                true
            }
        };

        if self.resolved_count == table_k {
            self.state = DecodeState::Resolved;
            self.checks.clear();
            self.pending = 0;
            self.by_index.clear();
            debug!(resolved = self.resolved_count, "all source blocks resolved");
        }
        Ok(self.progress(accepted))
    }

    /// Terminate the stream and reconstruct the source buffer.
    ///
    /// Returns [`DecodeError::Exhausted`] when fewer than K source blocks
    /// resolved; the graph is left intact, so the caller can ingest more
    /// blocks into the same session and finish again.
    pub fn finish(&mut self) -> Result<Vec<u8>, DecodeError> {
        let Some(geometry) = &self.geometry else {
            self.state = DecodeState::Exhausted;
            return Err(DecodeError::Exhausted {
                resolved: 0,
                required: 0,
            });
        };
        if self.resolved_count < geometry.k {
            self.state = DecodeState::Exhausted;
            return Err(DecodeError::Exhausted {
                resolved: self.resolved_count,
                required: geometry.k,
            });
        }

        let mut out = Vec::with_capacity(geometry.file_size as usize);
        for slot in &self.resolved {
            match slot {
                Some(chunk) => out.extend_from_slice(chunk),
                // Unreachable: resolved_count == k implies every slot is
                // filled. Report honestly rather than panic.
                None => {
                    return Err(DecodeError::Exhausted {
                        resolved: self.resolved_count,
                        required: geometry.k,
                    });
                }
            }
        }
        out.truncate(geometry.file_size as usize);
        self.state = DecodeState::Resolved;
        Ok(out)
    }

    /// Resolve `idx` to `value` and propagate through the graph until the
    /// work queue drains.
    fn resolve_cascade(&mut self, idx: u32, value: Vec<u8>) {
        let mut queue = VecDeque::new();
        queue.push_back((idx, value));
        while let Some((idx, value)) = queue.pop_front() {
            if self.resolved[idx as usize].is_some() {
                continue;
            }
            if let Some(check_ids) = self.by_index.remove(&idx) {
                for id in check_ids {
                    let peeled = match self.checks[id].as_mut() {
                        Some(check) => {
                            xor_in_place(&mut check.payload, &value);
                            check.indices.retain(|&i| i != idx);
                            check.indices.len() == 1
                        }
                        // Stale slab reference; the check peeled earlier.
                        None => false,
                    };
                    if peeled {
                        if let Some(node) = self.checks[id].take() {
                            self.pending = self.pending.saturating_sub(1);
                            if let Some(&next) = node.indices.first() {
                                queue.push_back((next, node.payload));
                            }
                        }
                    }
                }
            }
            self.resolved[idx as usize] = Some(value);
            self.resolved_count += 1;
        }
    }

    fn progress(&self, accepted: bool) -> DecodeProgress {
        DecodeProgress {
            accepted,
            resolved: self.resolved_count,
            required: self.required(),
            pending_checks: self.pending_checks(),
            state: self.state,
        }
    }
}

impl std::fmt::Debug for PeelingDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeelingDecoder")
            .field("state", &self.state)
            .field("resolved", &self.resolved_count)
            .field("required", &self.required())
            .field("pending_checks", &self.pending_checks())
            .field("stats", &self.stats)
            .finish()
    }
}
