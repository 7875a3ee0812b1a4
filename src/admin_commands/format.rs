//! Commands that erase the content of namespaces

use bit_field::BitField;
use shared_derive::U8Enum;

use crate::{
    codec::{Reader, Writer},
    generic_command::{CommandPayload, TransferMode},
    WireError,
};

/// See: NVM Express Base Spec: Figure 264: Format NVM: Protection Information
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub enum ProtectionInformation {
    #[default]
    Disabled = 0b000,
    Type1 = 0b001,
    Type2 = 0b010,
    Type3 = 0b011,
}

/// See: NVM Express Base Spec: Figure 264: Format NVM: Secure Erase Settings
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub enum SecureErase {
    #[default]
    None = 0b000,
    UserData = 0b001,
    Cryptographic = 0b010,
}

/// Low level format of a namespace
///
/// See: NVM Express Base Spec: 5.14 Format NVM command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatNvm {
    /// index into the lba formats of the namespace
    pub lba_format: u8,
    /// transfer metadata as part of an extended block
    pub metadata_settings: bool,
    pub protection_information: ProtectionInformation,
    /// protection information is transferred as the first bytes of the metadata
    pub protection_information_first: bool,
    pub secure_erase: SecureErase,
}

impl CommandPayload for FormatNvm {
    fn validate(&self) -> Result<(), WireError> {
        if self.lba_format > 15 {
            return Err(WireError::invalid_field("lbaf", self.lba_format));
        }
        Ok(())
    }

    fn write(&self, w: &mut Writer) {
        let mut dword10 = 0u32;
        dword10.set_bits(0..=3, self.lba_format as u32);
        dword10.set_bit(4, self.metadata_settings);
        dword10.set_bits(5..=7, u8::from(self.protection_information) as u32);
        dword10.set_bit(8, self.protection_information_first);
        dword10.set_bits(9..=11, u8::from(self.secure_erase) as u32);
        w.u32(40, dword10);
    }

    fn read(r: &Reader, _mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..40)?;
        r.reserved(44..64)?;
        r.reserved_bits(40, 12..=31)?;
        let dword10 = r.u32(40);
        let protection_information = ProtectionInformation::try_from(dword10.get_bits(5..=7) as u8)
            .map_err(|e| WireError::invalid_field("pi", e.value))?;
        let secure_erase = SecureErase::try_from(dword10.get_bits(9..=11) as u8)
            .map_err(|e| WireError::invalid_field("ses", e.value))?;
        Ok(Self {
            lba_format: dword10.get_bits(0..=3) as u8,
            metadata_settings: dword10.get_bit(4),
            protection_information,
            protection_information_first: dword10.get_bit(8),
            secure_erase,
        })
    }
}

/// See: NVM Express Base Spec: Figure 372: Sanitize: Sanitize Action
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SanitizeAction {
    ExitFailureMode = 0b001,
    BlockErase = 0b010,
    Overwrite = 0b011,
    CryptoErase = 0b100,
}

/// Erase all user data of the NVM subsystem
///
/// See: NVM Express Base Spec: 5.24 Sanitize command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sanitize {
    pub action: SanitizeAction,
    /// allow unrestricted sanitize exit after a failure
    pub allow_unrestricted_exit: bool,
    /// 4 bit overwrite pass count, `0` means 16 passes
    pub overwrite_pass_count: u8,
    /// invert the overwrite pattern between passes
    pub overwrite_invert_pattern: bool,
    pub no_deallocate: bool,
    pub overwrite_pattern: u32,
}

impl Sanitize {
    pub fn new(action: SanitizeAction) -> Self {
        Self {
            action,
            allow_unrestricted_exit: false,
            overwrite_pass_count: 0,
            overwrite_invert_pattern: false,
            no_deallocate: false,
            overwrite_pattern: 0,
        }
    }
}

impl CommandPayload for Sanitize {
    fn validate(&self) -> Result<(), WireError> {
        if self.overwrite_pass_count > 15 {
            return Err(WireError::invalid_field("owpass", self.overwrite_pass_count));
        }
        Ok(())
    }

    fn write(&self, w: &mut Writer) {
        let mut dword10 = 0u32;
        dword10.set_bits(0..=2, u8::from(self.action) as u32);
        dword10.set_bit(3, self.allow_unrestricted_exit);
        dword10.set_bits(4..=7, self.overwrite_pass_count as u32);
        dword10.set_bit(8, self.overwrite_invert_pattern);
        dword10.set_bit(9, self.no_deallocate);
        w.u32(40, dword10);
        w.u32(44, self.overwrite_pattern);
    }

    fn read(r: &Reader, _mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..40)?;
        r.reserved(48..64)?;
        r.reserved_bits(40, 10..=31)?;
        let dword10 = r.u32(40);
        let action = SanitizeAction::try_from(dword10.get_bits(0..=2) as u8)
            .map_err(|e| WireError::invalid_field("sanact", e.value))?;
        Ok(Self {
            action,
            allow_unrestricted_exit: dword10.get_bit(3),
            overwrite_pass_count: dword10.get_bits(4..=7) as u8,
            overwrite_invert_pattern: dword10.get_bit(8),
            no_deallocate: dword10.get_bit(9),
            overwrite_pattern: r.u32(44),
        })
    }
}
