//! utilities for the primitive enum proc-macro

use core::fmt::{Debug, LowerHex};

use thiserror::Error;

/// Error type used to denote that a given value is invalid for the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid value {value:#x}")]
pub struct InvalidValue<T: Debug + LowerHex> {
    /// the invalid value
    pub value: T,
}
