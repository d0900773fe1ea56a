//! Error types for the wire codec.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Ran out of input bytes mid-value.
    #[error("unexpected end of buffer")]
    UnexpectedEof,

    /// A varint ran past its maximum encoded width.
    #[error("varint overflow")]
    VarintOverflow,

    /// A length-prefixed string contained invalid UTF-8.
    #[error("invalid UTF-8 in string")]
    InvalidUtf8,

    /// A claimed length exceeds the remaining input.
    #[error("length {claimed} exceeds remaining {remaining} bytes")]
    LengthOutOfBounds {
        /// Length read from the prefix.
        claimed: u64,
        /// Bytes actually left in the buffer.
        remaining: usize,
    },
}
