//! Utilities shared between the crates of this workspace
#![no_std]

#[cfg(feature = "test")]
extern crate std;

pub mod primitive_enum;

#[cfg(feature = "test")]
pub mod test_utils;
