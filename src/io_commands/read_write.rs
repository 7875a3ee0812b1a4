use bit_field::BitField;
use bitflags::bitflags;
use shared_derive::U8Enum;

use crate::{
    codec::{Reader, Writer},
    generic_command::{read_data_ptr, write_data_ptr, CommandPayload, DataPtr, TransferMode},
    WireError,
};

use super::LBA;

bitflags! {
    /// Command dword 12 flags of read, write and related commands
    ///
    /// See: NVM Command Set Spec: Figure 35: Read: Command Dword 12
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ControlFlags: u16 {
        /// limited retry
        const LIMITED_RETRY = 1 << 15;
        /// force unit access
        const FUA = 1 << 14;
        /// protection information action
        const PRACT = 1 << 13;
        /// check the guard field of the protection information
        const PRCHK_GUARD = 1 << 12;
        /// check the application tag field of the protection information
        const PRCHK_APP = 1 << 11;
        /// check the reference tag field of the protection information
        const PRCHK_REF = 1 << 10;
        /// write zeroes only: deallocate the blocks
        const DEAC = 1 << 9;

        const _ = !0;
    }
}

impl ControlFlags {
    /// PRINFO
    pub fn protection_information(self) -> u8 {
        self.bits().get_bits(10..=13) as u8
    }
}

/// Expected access frequency of the data, dataset management hint
///
/// See: NVM Command Set Spec: Figure 40: Write: Dataset Management
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub enum AccessFrequency {
    #[default]
    Unspecified = 0,
    Typical = 1,
    Rare = 2,
    FrequentReads = 3,
    FrequentWrites = 4,
    FrequentReadsAndWrites = 5,
    OneTime = 6,
    Prefetch = 7,
    Temporary = 8,
}

/// Expected access latency of the data, dataset management hint
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub enum AccessLatency {
    #[default]
    None = 0,
    Idle = 1,
    Normal = 2,
    Low = 3,
}

/// Dataset management hints in command dword 13
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatasetHints(pub u32);

impl DatasetHints {
    pub fn access_frequency(self) -> Option<AccessFrequency> {
        AccessFrequency::try_from(self.0.get_bits(0..=3) as u8).ok()
    }

    pub fn set_access_frequency(&mut self, value: AccessFrequency) {
        self.0.set_bits(0..=3, u8::from(value) as u32);
    }

    pub fn access_latency(self) -> AccessLatency {
        // 2 bits always map to a variant
        AccessLatency::try_from(self.0.get_bits(4..=5) as u8).unwrap_or_default()
    }

    pub fn set_access_latency(&mut self, value: AccessLatency) {
        self.0.set_bits(4..=5, u8::from(value) as u32);
    }

    /// the command is part of a sequential access
    pub fn sequential_request(self) -> bool {
        self.0.get_bit(6)
    }

    pub fn set_sequential_request(&mut self, value: bool) {
        self.0.set_bit(6, value);
    }

    pub fn incompressible(self) -> bool {
        self.0.get_bit(7)
    }

    pub fn set_incompressible(&mut self, value: bool) {
        self.0.set_bit(7, value);
    }

    /// directive specific value for the directive type of the command
    pub fn directive_specific(self) -> u16 {
        self.0.get_bits(16..=31) as u16
    }
}

/// The layout shared by read, write, compare, write uncorrectable and write zeroes
///
/// See: NVM Command Set Spec: 3.2.4 Read command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadWrite {
    pub metadata_ptr: u64,
    pub data_ptr: DataPtr,
    pub start_lba: LBA,
    /// 0 based number of logical blocks
    pub length: u16,
    pub control: ControlFlags,
    pub dataset_hints: DatasetHints,
    /// expected initial logical block reference tag
    pub reference_tag: u32,
    /// expected logical block application tag
    pub application_tag: u16,
    /// expected logical block application tag mask
    pub application_tag_mask: u16,
}

impl ReadWrite {
    /// Transfer `block_count` blocks starting at `start_lba`.
    ///
    /// `block_count` must be in `1..=65536`.
    pub fn new(data_ptr: DataPtr, start_lba: LBA, block_count: u32) -> Result<Self, WireError> {
        if block_count == 0 || block_count > u16::MAX as u32 + 1 {
            return Err(WireError::invalid_field("block count", block_count));
        }
        Ok(Self {
            data_ptr,
            start_lba,
            length: (block_count - 1) as u16,
            ..Default::default()
        })
    }

    /// The number of logical blocks accessed by the command
    pub fn block_count(&self) -> u32 {
        self.length as u32 + 1
    }
}

impl CommandPayload for ReadWrite {
    fn write(&self, w: &mut Writer) {
        w.u64(16, self.metadata_ptr);
        write_data_ptr(w, &self.data_ptr);
        w.u64(40, self.start_lba.value());
        w.u16(48, self.length);
        w.u16(50, self.control.bits());
        w.u32(52, self.dataset_hints.0);
        w.u32(56, self.reference_tag);
        w.u16(60, self.application_tag);
        w.u16(62, self.application_tag_mask);
    }

    fn read(r: &Reader, mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..16)?;
        Ok(Self {
            metadata_ptr: r.u64(16),
            data_ptr: read_data_ptr(r, mode)?,
            start_lba: LBA::new(r.u64(40)),
            length: r.u16(48),
            control: ControlFlags::from_bits_retain(r.u16(50)),
            dataset_hints: DatasetHints(r.u32(52)),
            reference_tag: r.u32(56),
            application_tag: r.u16(60),
            application_tag_mask: r.u16(62),
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
    fn read_write_layout() {
        let mut write = ReadWrite::new(DataPtr::prp(0x20_0000), LBA::new(0x1_0000_0010), 8).unwrap();
        write.control = ControlFlags::FUA | ControlFlags::LIMITED_RETRY;
        write.dataset_hints.set_access_frequency(AccessFrequency::OneTime);
        write.dataset_hints.set_sequential_request(true);
        write.reference_tag = 0x10;

        let mut entry = [0u8; 64];
        write.write(&mut Writer::new(&mut entry));
        assert_eq!(0x1_0000_0010u64.to_le_bytes(), entry[40..48]);
        assert_eq!([7, 0], entry[48..50]);
        assert_eq!([0x00, 0xc0], entry[50..52]);
        assert_eq!([0x46, 0, 0, 0], entry[52..56]);

        let r = Reader::new(&entry, 64, DecodeOptions::STRICT).unwrap();
        let decoded = ReadWrite::read(&r, TransferMode::Prp).unwrap();
        assert_eq!(write, decoded);
        assert_eq!(8, decoded.block_count());
        assert_eq!(Some(AccessFrequency::OneTime), decoded.dataset_hints.access_frequency());
        assert!(decoded.dataset_hints.sequential_request());
    }

    #[test]
    fn block_count_limits() {
        assert!(ReadWrite::new(DataPtr::default(), LBA::new(0), 0).is_err());
        assert!(ReadWrite::new(DataPtr::default(), LBA::new(0), 0x1_0001).is_err());
        let max = ReadWrite::new(DataPtr::default(), LBA::new(0), 0x1_0000).unwrap();
        assert_eq!(0xffff, max.length);
    }

    #[test]
    fn protection_information_bits() {
        let control = ControlFlags::PRACT | ControlFlags::PRCHK_REF;
        assert_eq!(0b1001, control.protection_information());
    }
}
