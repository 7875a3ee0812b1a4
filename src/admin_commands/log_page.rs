//! Get log page command and the log pages it returns
//!
//! See: NVM Express Base Spec: 5.16 Get Log Page command

use alloc::{string::String, vec::Vec};
use bit_field::BitField;
use bitflags::bitflags;
use log::trace;
use shared_derive::U8Enum;

use crate::{
    codec::{DecodeOptions, Le128, Reader, Writer},
    generic_command::{read_data_ptr, write_data_ptr, CommandPayload, DataPtr, TransferMode},
    WireError,
};

/// See: NVM Express Base Spec: Figure 202: Log Page Identifiers
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, U8Enum)]
#[allow(missing_docs)]
pub enum LogPageIdentifier {
    ErrorInformation = 0x01,
    Smart = 0x02,
    FirmwareSlot = 0x03,
    CommandEffects = 0x05,
    Discovery = 0x70,
    ReservationNotification = 0x80,
    Sanitize = 0x81,
}

/// The get log page command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetLogPage {
    pub data_ptr: DataPtr,
    pub log_id: LogPageIdentifier,
    pub log_specific_field: u8,
    /// 0 based number of dwords to transfer
    pub dword_count: u32,
    pub log_specific_id: u16,
    /// byte offset into the log page
    pub offset: u64,
}

impl GetLogPage {
    /// Read the first `len` bytes of a log page.
    ///
    /// `len` must be a non-zero multiple of 4.
    pub fn new(log_id: LogPageIdentifier, data_ptr: DataPtr, len: u32) -> Result<Self, WireError> {
        if len == 0 || len % 4 != 0 {
            return Err(WireError::invalid_field("log page length", len));
        }
        Ok(Self {
            data_ptr,
            log_id,
            log_specific_field: 0,
            dword_count: len / 4 - 1,
            log_specific_id: 0,
            offset: 0,
        })
    }

    /// The number of bytes transferred by this command
    pub fn transfer_len(&self) -> u64 {
        (self.dword_count as u64 + 1) * 4
    }
}

impl CommandPayload for GetLogPage {
    fn write(&self, w: &mut Writer) {
        write_data_ptr(w, &self.data_ptr);
        w.u8(40, self.log_id.into());
        w.u8(41, self.log_specific_field);
        w.u16(42, self.dword_count.get_bits(0..=15) as u16);
        w.u16(44, self.dword_count.get_bits(16..=31) as u16);
        w.u16(46, self.log_specific_id);
        w.u32(48, self.offset.get_bits(0..=31) as u32);
        w.u32(52, self.offset.get_bits(32..=63) as u32);
    }

    fn read(r: &Reader, mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..24)?;
        r.reserved(56..64)?;
        let log_id = LogPageIdentifier::try_from(r.u8(40))
            .map_err(|e| WireError::invalid_field("lid", e.value))?;
        let mut dword_count = 0u32;
        dword_count.set_bits(0..=15, r.u16(42) as u32);
        dword_count.set_bits(16..=31, r.u16(44) as u32);
        let mut offset = 0u64;
        offset.set_bits(0..=31, r.u32(48) as u64);
        offset.set_bits(32..=63, r.u32(52) as u64);
        Ok(Self {
            data_ptr: read_data_ptr(r, mode)?,
            log_id,
            log_specific_field: r.u8(41),
            dword_count,
            log_specific_id: r.u16(46),
            offset,
        })
    }

    fn data_ptr(&self) -> Option<&DataPtr> {
        Some(&self.data_ptr)
    }
}

/// Size of the [SmartLog] page
pub const SMART_LOG_SIZE: usize = 512;

bitflags! {
    /// See: NVM Express Base Spec: Figure 207: SMART / Health Information: Critical Warning
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[allow(missing_docs)]
    pub struct CriticalWarning: u8 {
        const SPARE = 1 << 0;
        const TEMPERATURE = 1 << 1;
        const RELIABILITY = 1 << 2;
        const MEDIA = 1 << 3;
        const VOLATILE_MEMORY = 1 << 4;

        const _ = !0;
    }
}

/// SMART / health information
///
/// See: NVM Express Base Spec: Figure 207: SMART / Health Information Log Page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmartLog {
    pub critical_warning: CriticalWarning,
    /// composite temperature in kelvin
    pub temperature: u16,
    /// percent
    pub available_spare: u8,
    /// percent
    pub available_spare_threshold: u8,
    pub percentage_used: u8,
    /// thousands of 512 byte units
    pub data_units_read: Le128,
    /// thousands of 512 byte units
    pub data_units_written: Le128,
    pub host_read_commands: Le128,
    pub host_write_commands: Le128,
    /// minutes
    pub controller_busy_time: Le128,
    pub power_cycles: Le128,
    pub power_on_hours: Le128,
    pub unsafe_shutdowns: Le128,
    pub media_errors: Le128,
    pub error_log_entries: Le128,
    /// minutes
    pub warning_temperature_time: u32,
    /// minutes
    pub critical_temperature_time: u32,
    /// kelvin, `0` if the sensor is not present
    pub temperature_sensors: [u16; 8],
    pub thermal_management_transitions: [u32; 2],
    /// seconds
    pub thermal_management_time: [u32; 2],
}

impl SmartLog {
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        Self::parse_with(buf, DecodeOptions::default())
    }

    pub fn parse_with(buf: &[u8], options: DecodeOptions) -> Result<Self, WireError> {
        let r = Reader::new(buf, SMART_LOG_SIZE, options)?;
        r.reserved(6..32)?;
        r.reserved(232..512)?;

        let mut temperature_sensors = [0u16; 8];
        for (i, sensor) in temperature_sensors.iter_mut().enumerate() {
            *sensor = r.u16(200 + 2 * i);
        }

        let log = Self {
            critical_warning: CriticalWarning::from_bits_retain(r.u8(0)),
            temperature: r.u16(1),
            available_spare: r.u8(3),
            available_spare_threshold: r.u8(4),
            percentage_used: r.u8(5),
            data_units_read: r.le128(32),
            data_units_written: r.le128(48),
            host_read_commands: r.le128(64),
            host_write_commands: r.le128(80),
            controller_busy_time: r.le128(96),
            power_cycles: r.le128(112),
            power_on_hours: r.le128(128),
            unsafe_shutdowns: r.le128(144),
            media_errors: r.le128(160),
            error_log_entries: r.le128(176),
            warning_temperature_time: r.u32(192),
            critical_temperature_time: r.u32(196),
            temperature_sensors,
            thermal_management_transitions: [r.u32(216), r.u32(220)],
            thermal_management_time: [r.u32(224), r.u32(228)],
        };
        if !log.critical_warning.is_empty() {
            trace!("smart log critical warning: {:?}", log.critical_warning);
        }
        Ok(log)
    }
}

/// Size of the [FirmwareSlotLog] page
pub const FIRMWARE_SLOT_LOG_SIZE: usize = 512;

/// The number of firmware slots
pub const FIRMWARE_SLOT_COUNT: usize = 7;

/// Firmware slot information
///
/// See: NVM Express Base Spec: Figure 208: Firmware Slot Information Log Page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareSlotLog {
    /// AFI
    pub active_firmware_info: u8,
    /// firmware revision for slots 1 to 7, empty for slots without firmware
    pub revisions: [String; FIRMWARE_SLOT_COUNT],
}

impl FirmwareSlotLog {
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        Self::parse_with(buf, DecodeOptions::default())
    }

    pub fn parse_with(buf: &[u8], options: DecodeOptions) -> Result<Self, WireError> {
        let r = Reader::new(buf, FIRMWARE_SLOT_LOG_SIZE, options)?;
        r.reserved(1..8)?;
        r.reserved(64..512)?;

        let mut revisions: [String; FIRMWARE_SLOT_COUNT] = Default::default();
        for (i, revision) in revisions.iter_mut().enumerate() {
            let start = 8 + 8 * i;
            *revision = r.ascii(start..start + 8, "frs")?;
        }
        Ok(Self {
            active_firmware_info: r.u8(0),
            revisions,
        })
    }

    /// The 1 based slot the running firmware was loaded from
    pub fn active_slot(&self) -> u8 {
        self.active_firmware_info.get_bits(0..=2)
    }

    /// The 1 based slot activated on the next reset, if any
    pub fn next_slot(&self) -> Option<u8> {
        match self.active_firmware_info.get_bits(4..=6) {
            0 => None,
            slot => Some(slot),
        }
    }

    /// The firmware revision in the 1 based `slot`
    pub fn revision(&self, slot: u8) -> Option<&str> {
        let revision = self.revisions.get((slot as usize).checked_sub(1)?)?;
        (!revision.is_empty()).then_some(revision.as_str())
    }
}

/// Size of the [EffectsLog] page
pub const EFFECTS_LOG_SIZE: usize = 4096;

bitflags! {
    /// See: NVM Express Base Spec: Figure 210: Commands Supported and Effects Data Structure
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CommandEffects: u32 {
        /// command supported
        const CSUPP = 1 << 0;
        /// logical block content change
        const LBCC = 1 << 1;
        /// namespace capability change
        const NCC = 1 << 2;
        /// namespace inventory change
        const NIC = 1 << 3;
        /// controller capability change
        const CCC = 1 << 4;

        const _ = !0;
    }
}

/// Command submission and execution restrictions
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, U8Enum)]
#[allow(missing_docs)]
pub enum CommandSubmissionExecution {
    #[default]
    NoRestriction = 0b000,
    SingleNamespace = 0b001,
    SingleCommand = 0b010,
}

impl CommandEffects {
    /// CSE, `None` for reserved encodings
    pub fn submission_execution(self) -> Option<CommandSubmissionExecution> {
        CommandSubmissionExecution::try_from(self.bits().get_bits(16..=18) as u8).ok()
    }
}

/// Commands supported and effects
///
/// See: NVM Express Base Spec: Figure 209: Commands Supported and Effects Log Page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectsLog {
    /// indexed by admin opcode
    pub admin_commands: Vec<CommandEffects>,
    /// indexed by io opcode
    pub io_commands: Vec<CommandEffects>,
}

impl EffectsLog {
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        Self::parse_with(buf, DecodeOptions::default())
    }

    pub fn parse_with(buf: &[u8], options: DecodeOptions) -> Result<Self, WireError> {
        let r = Reader::new(buf, EFFECTS_LOG_SIZE, options)?;
        r.reserved(2048..4096)?;

        let read_table = |start: usize| -> Vec<CommandEffects> {
            (0..256)
                .map(|opcode| CommandEffects::from_bits_retain(r.u32(start + 4 * opcode)))
                .collect()
        };
        Ok(Self {
            admin_commands: read_table(0),
            io_commands: read_table(1024),
        })
    }

    pub fn admin(&self, opcode: u8) -> CommandEffects {
        self.admin_commands[opcode as usize]
    }

    pub fn io(&self, opcode: u8) -> CommandEffects {
        self.io_commands[opcode as usize]
    }
}

/// Size of the [SanitizeLog] page
pub const SANITIZE_LOG_SIZE: usize = 20;

/// See: NVM Express Base Spec: Figure 267: Sanitize Status: SOS
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, U8Enum)]
#[allow(missing_docs)]
pub enum SanitizeOperationStatus {
    NeverSanitized = 0b000,
    Completed = 0b001,
    InProgress = 0b010,
    Failed = 0b011,
    CompletedWithNoDeallocate = 0b100,
}

/// Sanitize status
///
/// See: NVM Express Base Spec: Figure 266: Sanitize Status Log Page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizeLog {
    /// fraction of the sanitize operation completed, in units of 1/65536
    pub progress: u16,
    pub status: u16,
    /// command dword 10 of the sanitize command that started the operation
    pub command_dword10: u32,
    /// seconds, `0xffff_ffff` if unknown
    pub estimated_overwrite_time: u32,
    /// seconds, `0xffff_ffff` if unknown
    pub estimated_block_erase_time: u32,
    /// seconds, `0xffff_ffff` if unknown
    pub estimated_crypto_erase_time: u32,
}

impl SanitizeLog {
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        let r = Reader::new(buf, SANITIZE_LOG_SIZE, DecodeOptions::default())?;
        Ok(Self {
            progress: r.u16(0),
            status: r.u16(2),
            command_dword10: r.u32(4),
            estimated_overwrite_time: r.u32(8),
            estimated_block_erase_time: r.u32(12),
            estimated_crypto_erase_time: r.u32(16),
        })
    }

    pub fn operation_status(&self) -> Result<SanitizeOperationStatus, WireError> {
        SanitizeOperationStatus::try_from(self.status.get_bits(0..=2) as u8)
            .map_err(|e| WireError::invalid_field("sos", e.value))
    }

    /// number of overwrite passes completed by the current operation
    pub fn overwrite_passes(&self) -> u8 {
        self.status.get_bits(3..=7) as u8
    }

    /// user data has not been written since the last sanitize
    pub fn global_data_erased(&self) -> bool {
        self.status.get_bit(8)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use shared::test_utils::{buffer_with, init_test_logger};

    #[test]
    fn log_page_dword_count_split() {
        let mut get_log = GetLogPage::new(LogPageIdentifier::Smart, DataPtr::prp(0x3000), 0x4_0000).unwrap();
        get_log.offset = 0x1_0000_0200;
        assert_eq!(0xffff, get_log.dword_count);

        let mut entry = [0u8; 64];
        get_log.write(&mut Writer::new(&mut entry));
        assert_eq!(0x02, entry[40]);
        assert_eq!([0xff, 0xff], entry[42..44]);
        assert_eq!([0x00, 0x00], entry[44..46]);
        assert_eq!([0x00, 0x02, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00], entry[48..56]);

        let r = Reader::new(&entry, 64, DecodeOptions::STRICT).unwrap();
        let decoded = GetLogPage::read(&r, TransferMode::Prp).unwrap();
        assert_eq!(get_log, decoded);
        assert_eq!(0x4_0000, decoded.transfer_len());

        get_log.dword_count = 0x0001_0000;
        let mut entry = [0u8; 64];
        get_log.write(&mut Writer::new(&mut entry));
        assert_eq!([0x00, 0x00, 0x01, 0x00], entry[42..46]);
    }

    #[test]
    fn log_page_length_must_be_dwords() {
        assert!(GetLogPage::new(LogPageIdentifier::ErrorInformation, DataPtr::default(), 0).is_err());
        assert!(GetLogPage::new(LogPageIdentifier::ErrorInformation, DataPtr::default(), 6).is_err());
    }

    #[test]
    fn parse_smart_log() {
        init_test_logger();
        let page = buffer_with::<SMART_LOG_SIZE>(|page| {
            page[0] = 0b0000_0110;
            page[1..3].copy_from_slice(&310u16.to_le_bytes());
            page[3] = 100;
            page[4] = 10;
            page[5] = 3;
            page[32..48].copy_from_slice(&123_456u128.to_le_bytes());
            page[128..144].copy_from_slice(&(u64::MAX as u128 + 1).to_le_bytes());
            page[200..202].copy_from_slice(&305u16.to_le_bytes());
            page[228..232].copy_from_slice(&60u32.to_le_bytes());
        });

        let log = SmartLog::parse(&page).unwrap();
        assert_eq!(CriticalWarning::TEMPERATURE | CriticalWarning::RELIABILITY, log.critical_warning);
        assert_eq!(310, log.temperature);
        assert_eq!(100, log.available_spare);
        assert_eq!(10, log.available_spare_threshold);
        assert_eq!(3, log.percentage_used);
        assert_eq!(123_456, log.data_units_read.get());
        assert_eq!(1u128 << 64, log.power_on_hours.get());
        assert!(log.media_errors.is_zero());
        assert_eq!(305, log.temperature_sensors[0]);
        assert_eq!([0, 60], log.thermal_management_time);
    }

    #[test]
    fn parse_firmware_slots() {
        let page = buffer_with::<FIRMWARE_SLOT_LOG_SIZE>(|page| {
            page[0] = 0x21;
            page[8..16].copy_from_slice(b"1.0.0   ");
            page[16..24].copy_from_slice(b"1.1.0-rc");
        });

        let log = FirmwareSlotLog::parse(&page).unwrap();
        assert_eq!(1, log.active_slot());
        assert_eq!(Some(2), log.next_slot());
        assert_eq!(Some("1.0.0"), log.revision(1));
        assert_eq!(Some("1.1.0-rc"), log.revision(2));
        assert_eq!(None, log.revision(3));
        assert_eq!(None, log.revision(0));
        assert_eq!(None, log.revision(8));
    }

    #[test]
    fn parse_effects_log() {
        let page = buffer_with::<EFFECTS_LOG_SIZE>(|page| {
            // identify
            page[0x06 * 4] = 0x01;
            // write: supported, block content change, single command
            page[1024 + 0x01 * 4] = 0x03;
            page[1024 + 0x01 * 4 + 2] = 0x02;
        });

        let log = EffectsLog::parse(&page).unwrap();
        assert_eq!(256, log.admin_commands.len());
        assert_eq!(CommandEffects::CSUPP, log.admin(0x06));
        assert!(log.admin(0x07).is_empty());

        let write = log.io(0x01);
        assert!(write.contains(CommandEffects::CSUPP | CommandEffects::LBCC));
        assert_eq!(
            Some(CommandSubmissionExecution::SingleCommand),
            write.submission_execution()
        );
    }

    #[test]
    fn parse_sanitize_log() {
        let page = buffer_with::<SANITIZE_LOG_SIZE>(|page| {
            page[0..2].copy_from_slice(&0x8000u16.to_le_bytes());
            page[2..4].copy_from_slice(&0x0112u16.to_le_bytes());
            page[4..8].copy_from_slice(&0x0000_0203u32.to_le_bytes());
            page[16..20].copy_from_slice(&u32::MAX.to_le_bytes());
        });

        let log = SanitizeLog::parse(&page).unwrap();
        assert_eq!(0x8000, log.progress);
        assert_eq!(Ok(SanitizeOperationStatus::InProgress), log.operation_status());
        assert_eq!(2, log.overwrite_passes());
        assert!(log.global_data_erased());
        assert_eq!(0x203, log.command_dword10);
        assert_eq!(u32::MAX, log.estimated_crypto_erase_time);
    }
}
