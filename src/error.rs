//! Errors produced while encoding or decoding wire structures

use thiserror::Error;

/// An error while encoding or decoding an NVMe wire structure.
///
/// All errors are local to a single buffer. The caller decides whether to drop
/// the offending record or abort the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("buffer has {actual} bytes, but the structure requires {expected} bytes")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("invalid opcode {0:#04x}")]
    InvalidOpcode(u8),
    #[error("invalid fabrics command type {0:#04x}")]
    InvalidSubtype(u8),
    #[error("reserved bits in the byte at offset {offset:#x} are not zero")]
    MalformedReserved { offset: usize },
    #[error("qualified name of {0} bytes exceeds the maximum of 223 bytes")]
    NameTooLong(usize),
    #[error("unsupported transport type {0:#04x}")]
    UnsupportedTransport(u8),
    #[error("invalid value {value:#x} for field {field}")]
    InvalidField { field: &'static str, value: u64 },
    #[error("string field {field} is malformed")]
    InvalidString { field: &'static str },
    #[error("transfer mode in the command flags does not match the data pointer")]
    TransferModeMismatch,
}

impl WireError {
    /// Check that `actual` is exactly `expected` bytes
    #[inline]
    pub fn check_len(expected: usize, actual: usize) -> Result<(), WireError> {
        if expected != actual {
            return Err(WireError::LengthMismatch { expected, actual });
        }
        Ok(())
    }

    pub(crate) fn invalid_field(field: &'static str, value: impl Into<u64>) -> Self {
        WireError::InvalidField {
            field,
            value: value.into(),
        }
    }
}
