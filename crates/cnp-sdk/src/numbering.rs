//! Segment numbering policies.

use cnp_core::{Error, Result, BASE_SEGMENT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the sequence number of a block follows from the one before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentNumbering {
    /// `next = prev + step`.
    FixedIncrement(u64),
    /// `next = prev + bytes written`, so sequence numbers are byte offsets.
    ByteCount,
    /// `next = prev + bytes written / scale`, never less than one.
    ScaledByteCount(u64),
}

impl SegmentNumbering {
    /// Sequence number of the first block of every object.
    pub fn base_index(&self) -> u64 {
        BASE_SEGMENT
    }

    /// Number of the block after one numbered `prev` holding `bytes` bytes.
    pub fn next(&self, prev: u64, bytes: usize) -> u64 {
        let bytes = bytes as u64;
        let step = match *self {
            SegmentNumbering::FixedIncrement(step) => step,
            SegmentNumbering::ByteCount => bytes,
            SegmentNumbering::ScaledByteCount(scale) => bytes / scale.max(1),
        };
        prev.saturating_add(step.max(1))
    }

    /// Reject parameters that would number two blocks alike.
    pub fn validate(&self) -> Result<()> {
        match *self {
            SegmentNumbering::FixedIncrement(0) => {
                Err(Error::invalid("fixed increment must be at least 1"))
            }
            SegmentNumbering::ScaledByteCount(0) => {
                Err(Error::invalid("byte count scale must be at least 1"))
            }
            _ => Ok(()),
        }
    }
}

impl Default for SegmentNumbering {
    fn default() -> Self {
        SegmentNumbering::FixedIncrement(cnp_core::DEFAULT_INCREMENT)
    }
}

impl fmt::Display for SegmentNumbering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentNumbering::FixedIncrement(step) => write!(f, "fixed-increment({})", step),
            SegmentNumbering::ByteCount => write!(f, "byte-count"),
            SegmentNumbering::ScaledByteCount(scale) => write!(f, "scaled-byte-count({})", scale),
        }
    }
}

/// Parses `byte-count`, `fixed-increment(n)` and `scaled-byte-count(n)`.
/// A bare `fixed-increment` means a step of one.
impl FromStr for SegmentNumbering {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (mode, arg) = match s.split_once('(') {
            Some((mode, rest)) => {
                let arg = rest
                    .strip_suffix(')')
                    .ok_or_else(|| Error::invalid(format!("unterminated numbering mode: {}", s)))?;
                let value = arg
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| Error::invalid(format!("bad numbering argument {:?}: {}", arg, e)))?;
                (mode.trim(), Some(value))
            }
            None => (s, None),
        };

        let policy = match (mode.to_ascii_lowercase().as_str(), arg) {
            ("byte-count", None) => SegmentNumbering::ByteCount,
            ("fixed-increment", step) => {
                SegmentNumbering::FixedIncrement(step.unwrap_or(cnp_core::DEFAULT_INCREMENT))
            }
            ("scaled-byte-count", Some(scale)) => SegmentNumbering::ScaledByteCount(scale),
            _ => return Err(Error::invalid(format!("unknown numbering mode: {}", s))),
        };
        policy.validate()?;
        Ok(policy)
    }
}
