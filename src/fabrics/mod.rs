//! NVMe over Fabrics commands
//!
//! Fabrics commands share the 64 byte submission entry with the admin and io
//! command sets. They all use the opcode [FABRICS_OPCODE] and are told apart by
//! the command type byte at offset 4, where other commands store the namespace id.
//!
//! The specification documents can be found at <https://nvmexpress.org/specifications/>
//! specifically: NVM Express over Fabrics Specification

use bit_field::BitField;
use shared_derive::U8Enum;

use crate::{
    codec::{Reader, Writer},
    generic_command::{CommandPayload, DataPtr, TransferMode},
    properties::Property,
    WireError,
};

mod connect;
mod discovery;

pub use connect::*;
pub use discovery::*;

/// Opcode shared by all fabrics commands
pub const FABRICS_OPCODE: u8 = 0x7f;

/// Offset of the fabrics command type within the submission entry
pub const FABRICS_TYPE_OFFSET: usize = 4;

/// The fabrics command type
///
/// Bit 0 of the type gives the data transfer direction, the same way bit 0 of
/// the opcode does for all other commands.
///
/// See: NVMe over Fabrics Spec: Figure 9: Fabrics Command Type
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum)]
pub enum FabricsCommandType {
    PropertySet = 0x00,
    Connect = 0x01,
    PropertyGet = 0x04,
}

impl FabricsCommandType {
    /// Decode the type byte, reporting unknown types as [WireError::InvalidSubtype]
    pub fn decode(value: u8) -> Result<Self, WireError> {
        Self::try_from(value).map_err(|_| WireError::InvalidSubtype(value))
    }

    /// `true` if the command transfers data from the host to the controller
    pub fn is_write(self) -> bool {
        u8::from(self).get_bit(0)
    }
}

/// The size of a property accessed by property get and set
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum, Default)]
pub enum PropertySize {
    #[default]
    FourBytes = 0,
    EightBytes = 1,
}

impl PropertySize {
    pub fn bytes(self) -> usize {
        match self {
            PropertySize::FourBytes => 4,
            PropertySize::EightBytes => 8,
        }
    }

    fn for_property(property: Property) -> Self {
        match property.size() {
            8 => PropertySize::EightBytes,
            _ => PropertySize::FourBytes,
        }
    }

    fn read(r: &Reader) -> Result<Self, WireError> {
        r.reserved_bits(40, 3..=7)?;
        let size = r.u8(40).get_bits(0..=2);
        PropertySize::try_from(size).map_err(|_| WireError::invalid_field("property size", size))
    }
}

/// Property set command
///
/// See: NVMe over Fabrics Spec: 3.5 Property Set Command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertySet {
    pub size: PropertySize,
    /// offset of the property, see [Property]
    pub offset: u32,
    pub value: u64,
}

impl PropertySet {
    pub fn new(property: Property, value: u64) -> Self {
        Self {
            size: PropertySize::for_property(property),
            offset: property.offset(),
            value,
        }
    }
}

impl CommandPayload for PropertySet {
    fn write(&self, w: &mut Writer) {
        w.u8(40, self.size.into());
        w.u32(44, self.offset);
        w.u64(48, self.value);
    }

    fn read(r: &Reader, _mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(5..40)?;
        r.reserved(41..44)?;
        r.reserved(56..64)?;
        Ok(Self {
            size: PropertySize::read(r)?,
            offset: r.u32(44),
            value: r.u64(48),
        })
    }
}

/// Property get command
///
/// The value is returned in the result of the completion entry.
///
/// See: NVMe over Fabrics Spec: 3.4 Property Get Command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyGet {
    pub size: PropertySize,
    pub offset: u32,
}

impl PropertyGet {
    pub fn new(property: Property) -> Self {
        Self {
            size: PropertySize::for_property(property),
            offset: property.offset(),
        }
    }
}

impl CommandPayload for PropertyGet {
    fn write(&self, w: &mut Writer) {
        w.u8(40, self.size.into());
        w.u32(44, self.offset);
    }

    fn read(r: &Reader, _mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(5..40)?;
        r.reserved(41..44)?;
        r.reserved(48..64)?;
        Ok(Self {
            size: PropertySize::read(r)?,
            offset: r.u32(44),
        })
    }
}

/// A fabrics command, submitted with the opcode [FABRICS_OPCODE]
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FabricsCommand {
    PropertySet(PropertySet),
    Connect(Connect),
    PropertyGet(PropertyGet),
}

impl FabricsCommand {
    pub fn command_type(&self) -> FabricsCommandType {
        match self {
            FabricsCommand::PropertySet(_) => FabricsCommandType::PropertySet,
            FabricsCommand::Connect(_) => FabricsCommandType::Connect,
            FabricsCommand::PropertyGet(_) => FabricsCommandType::PropertyGet,
        }
    }

    /// `true` if the command transfers data from the host to the controller
    pub fn is_write(&self) -> bool {
        self.command_type().is_write()
    }

    /// The data pointer of the command, if it transfers data through one
    pub fn data_ptr(&self) -> Option<&DataPtr> {
        match self {
            FabricsCommand::Connect(connect) => connect.data_ptr(),
            FabricsCommand::PropertySet(_) | FabricsCommand::PropertyGet(_) => None,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), WireError> {
        match self {
            FabricsCommand::Connect(connect) => connect.validate(),
            FabricsCommand::PropertySet(_) | FabricsCommand::PropertyGet(_) => Ok(()),
        }
    }

    pub(crate) fn write(&self, w: &mut Writer) {
        w.u8(FABRICS_TYPE_OFFSET, self.command_type().into());
        match self {
            FabricsCommand::PropertySet(set) => set.write(w),
            FabricsCommand::Connect(connect) => connect.write(w),
            FabricsCommand::PropertyGet(get) => get.write(w),
        }
    }

    pub(crate) fn read(r: &Reader, mode: TransferMode) -> Result<Self, WireError> {
        let command = match FabricsCommandType::decode(r.u8(FABRICS_TYPE_OFFSET))? {
            FabricsCommandType::PropertySet => {
                FabricsCommand::PropertySet(PropertySet::read(r, mode)?)
            }
            FabricsCommandType::Connect => FabricsCommand::Connect(Connect::read(r, mode)?),
            FabricsCommandType::PropertyGet => {
                FabricsCommand::PropertyGet(PropertyGet::read(r, mode)?)
            }
        };
        Ok(command)
    }
}
