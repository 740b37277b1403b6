//! Error types for delta encoding, decoding and reference sweeps.

use std::fmt;

/// Result type for delta operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or applying delta records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Bitstream error.
    Bitstream(bitstream::BitError),

    /// A record count exceeded its configured bound.
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// A record carried the reserved "unassigned" identity.
    InvalidItemId { raw: u32 },

    /// An item payload could not be encoded or decoded.
    InvalidPayload { reason: &'static str },

    /// The array failed an earlier decode and no longer trusts the stream.
    Desynchronized,

    /// No pending snapshot exists for the acknowledged send.
    SnapshotNotFound { send_id: u32 },

    /// Send identifiers must be strictly increasing per observer.
    SendOutOfOrder { last: u32, new: u32 },
}

/// Specific limit that was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Deleted,
    Changed,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bitstream(e) => write!(f, "bitstream error: {e}"),
            Self::LimitsExceeded {
                kind,
                limit,
                actual,
            } => {
                write!(f, "{kind} limit exceeded: {actual} > {limit}")
            }
            Self::InvalidItemId { raw } => {
                write!(f, "item id {raw} is reserved and cannot appear in a record")
            }
            Self::InvalidPayload { reason } => write!(f, "invalid item payload: {reason}"),
            Self::Desynchronized => {
                write!(f, "array is desynchronized after an earlier decode failure")
            }
            Self::SnapshotNotFound { send_id } => {
                write!(f, "no pending snapshot for send {send_id}")
            }
            Self::SendOutOfOrder { last, new } => {
                write!(f, "send id {new} is not after last send id {last}")
            }
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Deleted => "deleted items",
            Self::Changed => "changed items",
        };
        write!(f, "{name}")
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bitstream(e) => Some(e),
            _ => None,
        }
    }
}

impl From<bitstream::BitError> for CodecError {
    fn from(err: bitstream::BitError) -> Self {
        Self::Bitstream(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_limits_exceeded() {
        let err = CodecError::LimitsExceeded {
            kind: LimitKind::Changed,
            limit: 2048,
            actual: 3000,
        };
        let msg = err.to_string();
        assert!(msg.contains("changed items"));
        assert!(msg.contains("3000 > 2048"));
    }

    #[test]
    fn error_display_invalid_item_id() {
        let err = CodecError::InvalidItemId { raw: u32::MAX };
        assert!(err.to_string().contains(&u32::MAX.to_string()));
    }

    #[test]
    fn error_display_send_out_of_order() {
        let err = CodecError::SendOutOfOrder { last: 9, new: 4 };
        let msg = err.to_string();
        assert!(msg.contains('9'));
        assert!(msg.contains('4'));
    }

    #[test]
    fn error_from_bitstream_error() {
        let bit_err = bitstream::BitError::UnexpectedEof {
            requested: 32,
            available: 0,
        };
        let codec_err: CodecError = bit_err.into();
        assert!(matches!(codec_err, CodecError::Bitstream(_)));
        assert!(std::error::Error::source(&codec_err).is_some());
    }

    #[test]
    fn error_source_none_for_others() {
        let err = CodecError::Desynchronized;
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn error_is_std_error() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<CodecError>();
    }
}
