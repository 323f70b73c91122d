//! Error taxonomy shared by the segmenter, signing engine and output buffer.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by publishing operations.
///
/// Callers branch on the variant. An empty result from a pull request is not
/// an error; it is reported as `Ok(None)` by the buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Capacity exceeded: {occupancy} of {capacity} slots in use")]
    CapacityExceeded { capacity: usize, occupancy: usize },

    #[error("Buffer is closed")]
    ClosedBuffer,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Signing failure: {0}")]
    SigningFailure(String),
}

impl Error {
    /// The caller passed something wrong and should fix the call.
    pub fn is_caller_correctable(&self) -> bool {
        matches!(self, Error::InvalidArgument(_) | Error::KeyUnavailable(_))
    }

    /// The producer may retry or back off.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, Error::CapacityExceeded { .. } | Error::ClosedBuffer)
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::invalid("bad offset").is_caller_correctable());
        assert!(Error::KeyUnavailable("alice".into()).is_caller_correctable());
        assert!(Error::ClosedBuffer.is_backpressure());
        assert!(Error::CapacityExceeded {
            capacity: 4,
            occupancy: 4
        }
        .is_backpressure());
        assert!(!Error::SigningFailure("root mismatch".into()).is_backpressure());
    }

    #[test]
    fn test_display() {
        let err = Error::CapacityExceeded {
            capacity: 4,
            occupancy: 5,
        };
        assert_eq!(err.to_string(), "Capacity exceeded: 5 of 4 slots in use");
    }
}
