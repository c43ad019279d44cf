//! Tape sizing and optimization switches.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Records per segment for the statement, jacobian and operator layers.
pub const DEFAULT_SEGMENT_SIZE: usize = 1 << 16;

/// Records per segment for the external function layer.
pub const DEFAULT_EXTERNAL_SEGMENT_SIZE: usize = 1000;

/// Work-saving filters applied while recording and replaying.
///
/// None of them changes computed derivatives; turning them off only makes
/// the tape store and visit more entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Optimizations {
    /// Drop jacobians that are NaN or infinite.
    pub ignore_invalid_jacobians: bool,
    /// Drop jacobians that are exactly zero.
    pub ignore_zero_jacobians: bool,
    /// Skip distributing a statement whose adjoint is exactly zero.
    pub skip_zero_adjoints: bool,
}

impl Default for Optimizations {
    fn default() -> Self {
        Optimizations {
            ignore_invalid_jacobians: true,
            ignore_zero_jacobians: true,
            skip_zero_adjoints: true,
        }
    }
}

impl Optimizations {
    /// Every filter disabled.
    pub fn none() -> Self {
        Optimizations {
            ignore_invalid_jacobians: false,
            ignore_zero_jacobians: false,
            skip_zero_adjoints: false,
        }
    }
}

/// Construction parameters of a tape.
///
/// ```
/// use segtape::{Tape, TapeConfig};
///
/// let config = TapeConfig {
///     jacobian_segment_size: 4096,
///     ..TapeConfig::default()
/// };
/// let tape = Tape::<f64>::with_config(config).unwrap();
/// assert!(!tape.is_active());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TapeConfig {
    /// Statements per segment (the linear tape uses it for operators).
    pub statement_segment_size: usize,
    /// Jacobian entries per segment.
    pub jacobian_segment_size: usize,
    /// External function records per segment.
    pub external_segment_size: usize,
    pub optimizations: Optimizations,
}

impl Default for TapeConfig {
    fn default() -> Self {
        TapeConfig {
            statement_segment_size: DEFAULT_SEGMENT_SIZE,
            jacobian_segment_size: DEFAULT_SEGMENT_SIZE,
            external_segment_size: DEFAULT_EXTERNAL_SEGMENT_SIZE,
            optimizations: Optimizations::default(),
        }
    }
}

impl TapeConfig {
    /// Same segment size for every layer.
    pub fn with_segment_size(segment_size: usize) -> Self {
        TapeConfig {
            statement_segment_size: segment_size,
            jacobian_segment_size: segment_size,
            external_segment_size: segment_size,
            optimizations: Optimizations::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let layers = [
            ("statement", self.statement_segment_size),
            ("jacobian", self.jacobian_segment_size),
            ("external function", self.external_segment_size),
        ];
        for (layer, size) in layers {
            if size == 0 {
                return Err(ConfigError::ZeroSegmentSize { layer });
            }
        }
        Ok(())
    }
}
