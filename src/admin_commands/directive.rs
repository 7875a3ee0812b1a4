use shared_derive::U8Enum;

use crate::{
    codec::{Reader, Writer},
    generic_command::{read_data_ptr, write_data_ptr, CommandPayload, DataPtr, TransferMode},
    WireError,
};

/// See: NVM Express Base Spec: Figure 349: Directive Types
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub enum DirectiveType {
    #[default]
    Identify = 0x00,
    Streams = 0x01,
}

/// The directive send and directive receive commands
///
/// The meaning of the operation and specific fields depends on the [DirectiveType].
///
/// See: NVM Express Base Spec: 5.9 Directive Receive command and 5.10 Directive Send command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Directive {
    pub data_ptr: DataPtr,
    /// 0 based number of dwords to transfer
    pub dword_count: u32,
    pub operation: u8,
    pub directive_type: DirectiveType,
    pub directive_specific: u16,
    /// directive receive only: enable or disable the [Self::target_type]
    pub endir: u8,
    pub target_type: u8,
}

impl CommandPayload for Directive {
    fn write(&self, w: &mut Writer) {
        write_data_ptr(w, &self.data_ptr);
        w.u32(40, self.dword_count);
        w.u8(44, self.operation);
        w.u8(45, self.directive_type.into());
        w.u16(46, self.directive_specific);
        w.u8(48, self.endir);
        w.u8(49, self.target_type);
    }

    fn read(r: &Reader, mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..24)?;
        r.reserved(50..64)?;
        let directive_type = DirectiveType::try_from(r.u8(45))
            .map_err(|e| WireError::invalid_field("dtype", e.value))?;
        Ok(Self {
            data_ptr: read_data_ptr(r, mode)?,
            dword_count: r.u32(40),
            operation: r.u8(44),
            directive_type,
            directive_specific: r.u16(46),
            endir: r.u8(48),
            target_type: r.u8(49),
        })
    }

    fn data_ptr(&self) -> Option<&DataPtr> {
        Some(&self.data_ptr)
    }
}
