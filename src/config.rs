//! Configuration for encode and decode sessions.
//!
//! The engine has no process-wide mutable state: everything a session needs
//! travels in one of these structs. Defaults match the protocol constants;
//! `validate` rejects misconfiguration up front so the hot paths never have
//! to re-check.

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_BLOCK_SIZE;
use crate::constants::DEFAULT_REDUNDANCY_FACTOR;
use crate::constants::MAX_BLOCK_SIZE;
use crate::constants::RSD_C;
use crate::constants::RSD_DELTA;
use crate::error::EncodeError;

/// Parameters for an encode session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeConfig {
    /// Source-chunk size in bytes. The final chunk is zero-padded to this.
    #[serde(default = "default_block_size")]
    pub block_size: u32,
    /// Ratio of emitted payload bytes to source bytes; must be >= 1.0.
    #[serde(default = "default_redundancy_factor")]
    pub redundancy_factor: f64,
    /// Robust Soliton failure bound. Protocol constant; leave at default.
    #[serde(default = "default_delta")]
    pub delta: f64,
    /// Robust Soliton spike constant. Protocol constant; leave at default.
    #[serde(default = "default_c")]
    pub c: f64,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            redundancy_factor: default_redundancy_factor(),
            delta: default_delta(),
            c: default_c(),
        }
    }
}

impl EncodeConfig {
    /// Check the configuration, returning the first problem found.
    pub fn validate(&self) -> Result<(), EncodeError> {
        if self.block_size == 0 {
            return Err(EncodeError::InvalidParameters {
                reason: "block_size must be nonzero".to_string(),
            });
        }
        if self.block_size > MAX_BLOCK_SIZE {
            return Err(EncodeError::InvalidParameters {
                reason: format!("block_size {} exceeds maximum {}", self.block_size, MAX_BLOCK_SIZE),
            });
        }
        if !self.redundancy_factor.is_finite() || self.redundancy_factor < 1.0 {
            return Err(EncodeError::InvalidParameters {
                reason: format!("redundancy_factor {} must be finite and >= 1.0", self.redundancy_factor),
            });
        }
        validate_distribution(self.delta, self.c).map_err(|reason| EncodeError::InvalidParameters { reason })
    }
}

/// Parameters for a decode session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Robust Soliton failure bound. Must match the encoder's value.
    #[serde(default = "default_delta")]
    pub delta: f64,
    /// Robust Soliton spike constant. Must match the encoder's value.
    #[serde(default = "default_c")]
    pub c: f64,
    /// Maximum number of blocks the session may examine before it gives up.
    /// Fountain codes have no hard upper bound on blocks needed, so long
    /// decodes against hostile input must be cut off somewhere.
    #[serde(default)]
    pub max_blocks: Option<u64>,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            delta: default_delta(),
            c: default_c(),
            max_blocks: None,
        }
    }
}

impl DecodeConfig {
    /// Check the configuration, returning the first problem found.
    pub fn validate(&self) -> Result<(), crate::error::DecodeError> {
        validate_distribution(self.delta, self.c)
            .map_err(|reason| crate::error::DecodeError::InvalidParameters { reason })
    }
}

fn validate_distribution(delta: f64, c: f64) -> Result<(), String> {
    if !delta.is_finite() || delta <= 0.0 || delta >= 1.0 {
        return Err(format!("delta {delta} must lie in (0, 1)"));
    }
    if !c.is_finite() || c <= 0.0 {
        return Err(format!("c {c} must be positive"));
    }
    Ok(())
}

fn default_block_size() -> u32 {
    DEFAULT_BLOCK_SIZE
}

fn default_redundancy_factor() -> f64 {
    DEFAULT_REDUNDANCY_FACTOR
}

fn default_delta() -> f64 {
    RSD_DELTA
}

fn default_c() -> f64 {
    RSD_C
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_encode_config_is_valid() {
        assert!(EncodeConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_block_size_rejected() {
        let cfg = EncodeConfig {
            block_size: 0,
            ..EncodeConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("block_size must be nonzero"));
    }

    #[test]
    fn oversized_block_rejected() {
        let cfg = EncodeConfig {
            block_size: MAX_BLOCK_SIZE + 1,
            ..EncodeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn sub_unit_redundancy_rejected() {
        let cfg = EncodeConfig {
            redundancy_factor: 0.5,
            ..EncodeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_finite_redundancy_rejected() {
        let cfg = EncodeConfig {
            redundancy_factor: f64::NAN,
            ..EncodeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn distribution_bounds_enforced() {
        let cfg = DecodeConfig {
            delta: 1.5,
            ..DecodeConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = DecodeConfig {
            c: 0.0,
            ..DecodeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn configs_round_trip_through_serde() {
        let cfg = EncodeConfig {
            block_size: 1000,
            redundancy_factor: 12.0,
            ..EncodeConfig::default()
        };
        let json = serde_json::to_string(&cfg).expect("serialize");
        let back: EncodeConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(cfg, back);
    }
}
