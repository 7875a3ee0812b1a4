//! Byte exact encodings of NVMe and NVMe over Fabrics wire structures
//!
//! This crate contains no driver logic. It turns submission entries, completion
//! entries, identify and log page payloads and the fabrics discovery and connect
//! structures into typed values and back.
//!
//! The specification documents can be found at <https://nvmexpress.org/specifications/>
//! specifically: NVM Express Base Specification, NVM Command Set Specification and
//! NVM Express over Fabrics Specification
#![no_std]

extern crate alloc;

pub mod admin_commands;
mod codec;
pub mod command;
pub mod completion;
mod error;
pub mod fabrics;
pub mod generic_command;
pub mod io_commands;
pub mod properties;

pub use codec::{DecodeOptions, Le128};
pub use command::{is_write_raw, Command, CommandBody, QueueType};
pub use completion::{CommandSet, CompletionEntry, StatusCode, StatusCodeType, StatusField};
pub use error::WireError;
pub use generic_command::{
    CommandHeader, CommandIdentifier, DataPtr, QueueIdentifier, TransferMode,
};
