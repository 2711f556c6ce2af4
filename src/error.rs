//! Error types for the fountain-code block engine.
//!
//! Each subsystem gets its own enum with actionable context. The propagation
//! policy mirrors the failure model of the engine: parameter misuse and
//! budget exhaustion are terminal results surfaced to the caller, while
//! malformed, corrupt, or inconsistent individual records are dropped and
//! counted so processing continues with the remaining input.

use snafu::Snafu;

/// Errors from encoding a source buffer.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EncodeError {
    /// Encoder misconfiguration. Fatal, never retried.
    #[snafu(display("invalid encode parameters: {reason}"))]
    InvalidParameters {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// Source buffer exceeds what the u32 length field can describe.
    #[snafu(display("source of {size} bytes exceeds maximum {max}"))]
    SourceTooLarge {
        /// Actual source length in bytes.
        size: u64,
        /// Maximum encodable length in bytes.
        max: u64,
    },

    /// The index sampler ran out of draws. Configuration error, not data.
    #[snafu(context(false), display("{source}"))]
    Sampler {
        /// The underlying sampler failure.
        source: SampleError,
    },
}

/// Errors from parsing a persisted block record.
#[derive(Debug, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RecordError {
    /// Record shorter than its fixed header plus declared payload.
    #[snafu(display("record truncated: {len} bytes, need {required}"))]
    TruncatedRecord {
        /// Bytes available.
        len: usize,
        /// Bytes the header demands.
        required: usize,
    },

    /// Declared block size exceeds the supported maximum.
    #[snafu(display("record block size {block_size} exceeds maximum {max}"))]
    OversizedBlock {
        /// Block size declared in the header.
        block_size: u32,
        /// Largest supported block size.
        max: u32,
    },
}

/// Errors from the deterministic block sampler.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SampleError {
    /// Rejection sampling failed to collect enough distinct indices within
    /// its draw budget. Only reachable with a broken degree table.
    #[snafu(display("sampler stalled on seed {seed}: {attempts} draws yielded fewer than {degree} distinct indices"))]
    SamplerStall {
        /// Seed being replayed.
        seed: u32,
        /// Degree the table produced.
        degree: u32,
        /// Draws spent before giving up.
        attempts: u32,
    },
}

/// Terminal results from a decode session.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DecodeError {
    /// Decoder misconfiguration. Fatal, never retried.
    #[snafu(display("invalid decode parameters: {reason}"))]
    #[snafu(context(suffix(DecodeInvalidParametersSnafu)))]
    InvalidParameters {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// The index sampler ran out of draws. Configuration error, not data.
    #[snafu(context(false), display("{source}"))]
    Sampler {
        /// The underlying sampler failure.
        source: SampleError,
    },

    /// Input ended before all source blocks were resolved. Retryable: the
    /// resolved set and pending check nodes survive, so the caller can feed
    /// more blocks into the same session and finish again.
    #[snafu(display("decode exhausted: resolved {resolved} of {required} source blocks"))]
    Exhausted {
        /// Source blocks recovered so far.
        resolved: u32,
        /// Source blocks needed for reconstruction.
        required: u32,
    },

    /// The examined-block budget ran out before resolution.
    #[snafu(display("block budget of {budget} exhausted: resolved {resolved} of {required} source blocks"))]
    BudgetExhausted {
        /// Maximum blocks the session was allowed to examine.
        budget: u64,
        /// Source blocks recovered so far.
        resolved: u32,
        /// Source blocks needed for reconstruction.
        required: u32,
    },
}

/// Errors from a store-driven decode session.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    /// The decoder reported a terminal result.
    #[snafu(context(false), display("{source}"))]
    Decode {
        /// The underlying decode failure.
        source: DecodeError,
    },

    /// The store could not even enumerate candidate blocks.
    #[snafu(context(false), display("{source}"))]
    Store {
        /// The underlying store failure.
        source: StoreError,
    },

    /// The session's cancellation token fired before resolution.
    #[snafu(display("decode session cancelled: resolved {resolved} of {required} source blocks"))]
    Cancelled {
        /// Source blocks recovered so far.
        resolved: u32,
        /// Source blocks needed for reconstruction.
        required: u32,
    },
}

/// Errors from block store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// Block not found under the given key.
    #[snafu(display("block not found: {key}"))]
    NotFound {
        /// The key that was looked up.
        key: String,
    },

    /// Filesystem failure underneath the store.
    #[snafu(display("block store io error at {path}: {source}"))]
    Io {
        /// Path the operation touched.
        path: String,
        /// The underlying io error.
        source: std::io::Error,
    },
}
