//! # Relay Errors
//!
//! Nothing in the relay is fatal: every error here is either reported to the
//! caller or logged and counted by the dispatcher.

use vmrelay_hal::RecordError;

/// Relay error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayError {
    /// Event buffer holds its maximum number of records
    Full,
    /// Event buffer holds no records
    Empty,
    /// Destination is shorter than the next record; the record stays queued
    TooLarge {
        /// Length of the pending record
        required: usize,
        /// Length of the destination
        available: usize,
    },
    /// Record exceeds the per-slot maximum and was rejected
    Oversize {
        /// Length of the rejected record
        len: usize,
        /// Per-slot maximum
        max: usize,
    },
    /// Record could not be decoded
    DecodeUnrecognized(RecordError),
    /// No blocked context matched a signal; see [`MatchOutcome::into_result`]
    ///
    /// [`MatchOutcome::into_result`]: crate::matcher::MatchOutcome::into_result
    NoMatch,
}

impl core::fmt::Display for RelayError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Full => write!(f, "Event buffer is full"),
            Self::Empty => write!(f, "Event buffer is empty"),
            Self::TooLarge {
                required,
                available,
            } => write!(
                f,
                "Record of {} bytes does not fit in {} bytes",
                required, available
            ),
            Self::Oversize { len, max } => {
                write!(f, "Record of {} bytes exceeds slot size {}", len, max)
            },
            Self::DecodeUnrecognized(err) => write!(f, "Unrecognized record: {}", err),
            Self::NoMatch => write!(f, "No blocked context matched"),
        }
    }
}

impl From<RecordError> for RelayError {
    fn from(err: RecordError) -> Self {
        Self::DecodeUnrecognized(err)
    }
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_record_error_converts() {
        let err: RelayError = RecordError::UnknownTag(99).into();
        assert_eq!(err, RelayError::DecodeUnrecognized(RecordError::UnknownTag(99)));
        assert_eq!(err.to_string(), "Unrecognized record: unknown event tag 99");
    }

    #[test]
    fn test_too_large_message() {
        let err = RelayError::TooLarge {
            required: 24,
            available: 8,
        };
        assert_eq!(err.to_string(), "Record of 24 bytes does not fit in 8 bytes");
    }
}
