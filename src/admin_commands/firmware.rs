use bit_field::BitField;
use shared_derive::U8Enum;

use crate::{
    codec::{Reader, Writer},
    generic_command::{read_data_ptr, write_data_ptr, CommandPayload, DataPtr, TransferMode},
    WireError,
};

/// What a firmware commit does with the downloaded image
///
/// See: NVM Express Base Spec: Figure 191: Firmware Commit: Commit Action
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitAction {
    /// store the image in the slot, do not activate it
    #[default]
    Replace = 0b000,
    /// store the image and activate it on the next reset
    ReplaceAndActivate = 0b001,
    /// activate the image already in the slot on the next reset
    Activate = 0b010,
    /// store and activate immediately without a reset
    ReplaceAndActivateImmediately = 0b011,
}

/// Commit a downloaded firmware image to a slot
///
/// See: NVM Express Base Spec: 5.11 Firmware Commit command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareCommit {
    /// firmware slot 1 to 7, `0` lets the controller choose
    pub slot: u8,
    pub action: CommitAction,
}

impl CommandPayload for FirmwareCommit {
    fn validate(&self) -> Result<(), WireError> {
        if self.slot > 7 {
            return Err(WireError::invalid_field("fs", self.slot));
        }
        Ok(())
    }

    fn write(&self, w: &mut Writer) {
        let mut dword10 = 0u32;
        dword10.set_bits(0..=2, self.slot as u32);
        dword10.set_bits(3..=5, u8::from(self.action) as u32);
        w.u32(40, dword10);
    }

    fn read(r: &Reader, _mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..40)?;
        r.reserved(44..64)?;
        r.reserved_bits(40, 6..=31)?;
        let dword10 = r.u32(40);
        let action = CommitAction::try_from(dword10.get_bits(3..=5) as u8)
            .map_err(|e| WireError::invalid_field("ca", e.value))?;
        Ok(Self {
            slot: dword10.get_bits(0..=2) as u8,
            action,
        })
    }
}

/// Transfer part of a firmware image to the controller
///
/// See: NVM Express Base Spec: 5.12 Firmware Image Download command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareDownload {
    pub data_ptr: DataPtr,
    /// 0 based number of dwords to transfer
    pub dword_count: u32,
    /// offset into the image in dwords
    pub dword_offset: u32,
}

impl CommandPayload for FirmwareDownload {
    fn write(&self, w: &mut Writer) {
        write_data_ptr(w, &self.data_ptr);
        w.u32(40, self.dword_count);
        w.u32(44, self.dword_offset);
    }

    fn read(r: &Reader, mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..24)?;
        r.reserved(48..64)?;
        Ok(Self {
            data_ptr: read_data_ptr(r, mode)?,
            dword_count: r.u32(40),
            dword_offset: r.u32(44),
        })
    }

    fn data_ptr(&self) -> Option<&DataPtr> {
        Some(&self.data_ptr)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::DecodeOptions;

    #[test]
    fn commit_dword() {
        let commit = FirmwareCommit {
            slot: 2,
            action: CommitAction::Activate,
        };
        let mut entry = [0u8; 64];
        commit.write(&mut Writer::new(&mut entry));
        assert_eq!(0b010_010, entry[40]);

        let r = Reader::new(&entry, 64, DecodeOptions::STRICT).unwrap();
        assert_eq!(Ok(commit), FirmwareCommit::read(&r, TransferMode::Prp));
    }

    #[test]
    fn slot_must_fit_three_bits() {
        let commit = FirmwareCommit {
            slot: 8,
            action: CommitAction::Replace,
        };
        assert_eq!(
            Err(WireError::InvalidField {
                field: "fs",
                value: 8
            }),
            commit.validate()
        );
    }

    #[test]
    fn reserved_dword10_bits() {
        let mut entry = [0u8; 64];
        entry[42] = 1 << 4;
        let r = Reader::new(&entry, 64, DecodeOptions::STRICT).unwrap();
        assert_eq!(
            Err(WireError::MalformedReserved { offset: 42 }),
            FirmwareCommit::read(&r, TransferMode::Prp)
        );

        let r = Reader::new(&entry, 64, DecodeOptions::LENIENT).unwrap();
        assert!(FirmwareCommit::read(&r, TransferMode::Prp).is_ok());
    }

    #[test]
    fn reserved_commit_action() {
        let mut entry = [0u8; 64];
        entry[40] = 0b111 << 3;
        let r = Reader::new(&entry, 64, DecodeOptions::STRICT).unwrap();
        assert_eq!(
            Err(WireError::InvalidField {
                field: "ca",
                value: 0b111
            }),
            FirmwareCommit::read(&r, TransferMode::Prp)
        );
    }
}
