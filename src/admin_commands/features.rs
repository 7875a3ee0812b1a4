use bit_field::BitField;
use bitflags::bitflags;
use shared_derive::U8Enum;

use crate::{
    codec::{DecodeOptions, Reader, Writer},
    generic_command::{read_data_ptr, write_data_ptr, CommandPayload, DataPtr, TransferMode},
    WireError,
};

/// See: NVM Express Base Spec: Figure 317: Feature Identifiers
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, U8Enum)]
#[allow(missing_docs)]
pub enum FeatureIdentifier {
    Arbitration = 0x01,
    PowerManagement = 0x02,
    LbaRangeType = 0x03,
    TemperatureThreshold = 0x04,
    ErrorRecovery = 0x05,
    VolatileWriteCache = 0x06,
    NumberOfQueues = 0x07,
    InterruptCoalescing = 0x08,
    InterruptVectorConfiguration = 0x09,
    WriteAtomicityNormal = 0x0a,
    AsyncEventConfiguration = 0x0b,
    AutonomousPowerStateTransition = 0x0c,
    HostMemoryBuffer = 0x0d,
    Timestamp = 0x0e,
    KeepAliveTimer = 0x0f,
    IOCommandSet = 0x19,
    SoftwareProgressMarker = 0x80,
    HostIdentifier = 0x81,
    ReservationNotificationMask = 0x82,
    ReservationPersistence = 0x83,
}

/// Which value of a feature get features returns
///
/// See: NVM Express Base Spec: Figure 315: Get Features: Select
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, U8Enum)]
#[allow(missing_docs)]
pub enum FeatureSelect {
    #[default]
    Current = 0b000,
    DefaultValue = 0b001,
    Saved = 0b010,
    SupportedCapabilities = 0b011,
}

/// The get features and set features commands
///
/// See: NVM Express Base Spec: 5.15 Get Features command and 5.27 Set Features command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub data_ptr: DataPtr,
    pub feature: FeatureIdentifier,
    /// get features only
    pub select: FeatureSelect,
    /// set features only: persist the value across resets
    pub save: bool,
    /// feature specific command dwords 11 to 15
    pub dwords: [u32; 5],
}

impl Features {
    pub fn new(feature: FeatureIdentifier) -> Self {
        Self {
            data_ptr: DataPtr::default(),
            feature,
            select: FeatureSelect::Current,
            save: false,
            dwords: [0; 5],
        }
    }

    /// Request `sub_count` submission and `comp_count` completion queues.
    ///
    /// Both counts are 0 based.
    pub fn number_of_queues(sub_count: u16, comp_count: u16) -> Self {
        let mut dword11 = 0u32;
        dword11.set_bits(0..=15, sub_count as u32);
        dword11.set_bits(16..=31, comp_count as u32);

        let mut features = Self::new(FeatureIdentifier::NumberOfQueues);
        features.dwords[0] = dword11;
        features
    }

    /// Select the IO command set combination at `index`.
    ///
    /// The index is a 9 bit field, so `index` must be below 512.
    pub fn io_command_set(index: u16) -> Result<Self, WireError> {
        if index > 0x1ff {
            return Err(WireError::invalid_field("io command set index", index));
        }
        let mut features = Self::new(FeatureIdentifier::IOCommandSet);
        features.dwords[0].set_bits(0..=8, index as u32);
        Ok(features)
    }
}

impl CommandPayload for Features {
    fn write(&self, w: &mut Writer) {
        write_data_ptr(w, &self.data_ptr);
        let mut dword10 = 0u32;
        dword10.set_bits(0..=7, u8::from(self.feature) as u32);
        dword10.set_bits(8..=10, u8::from(self.select) as u32);
        dword10.set_bit(31, self.save);
        w.u32(40, dword10);
        for (i, dword) in self.dwords.iter().enumerate() {
            w.u32(44 + 4 * i, *dword);
        }
    }

    fn read(r: &Reader, mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..24)?;
        r.reserved_bits(40, 11..=30)?;
        let dword10 = r.u32(40);
        let fid = dword10.get_bits(0..=7) as u8;
        let feature = FeatureIdentifier::try_from(fid)
            .map_err(|e| WireError::invalid_field("fid", e.value))?;
        let select = FeatureSelect::try_from(dword10.get_bits(8..=10) as u8)
            .map_err(|e| WireError::invalid_field("sel", e.value))?;

        let mut dwords = [0u32; 5];
        for (i, dword) in dwords.iter_mut().enumerate() {
            *dword = r.u32(44 + 4 * i);
        }
        Ok(Self {
            data_ptr: read_data_ptr(r, mode)?,
            feature,
            select,
            save: dword10.get_bit(31),
            dwords,
        })
    }

    fn data_ptr(&self) -> Option<&DataPtr> {
        Some(&self.data_ptr)
    }
}

/// Queue counts returned in dword 0 of a [FeatureIdentifier::NumberOfQueues] completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberOfQueues {
    /// 0 based
    pub submission_queues: u16,
    /// 0 based
    pub completion_queues: u16,
}

impl From<u32> for NumberOfQueues {
    fn from(value: u32) -> Self {
        Self {
            submission_queues: value.get_bits(0..=15) as u16,
            completion_queues: value.get_bits(16..=31) as u16,
        }
    }
}

/// Size of a single [LbaRangeType] entry
pub const LBA_RANGE_TYPE_SIZE: usize = 64;

/// See: NVM Express Base Spec: Figure 322: LBA Range Type: Type
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, U8Enum)]
#[allow(missing_docs)]
pub enum LbaRangeKind {
    #[default]
    GeneralPurpose = 0x00,
    Filesystem = 0x01,
    Raid = 0x02,
    Cache = 0x03,
    PageOrSwap = 0x04,
}

bitflags! {
    /// See: NVM Express Base Spec: Figure 322: LBA Range Type: Attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LbaRangeAttributes: u8 {
        /// the range may be overwritten by the host
        const OVERWRITEABLE = 1 << 0;
        /// the range should be hidden from the OS
        const HIDDEN = 1 << 1;
    }
}

/// An entry of the LBA range type feature data
///
/// See: NVM Express Base Spec: Figure 322: LBA Range Type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LbaRangeType {
    pub kind: LbaRangeKind,
    pub attributes: LbaRangeAttributes,
    pub start_lba: u64,
    /// 0 based
    pub block_count: u64,
    pub guid: [u8; 16],
}

impl LbaRangeType {
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        Self::parse_with(buf, DecodeOptions::default())
    }

    pub fn parse_with(buf: &[u8], options: DecodeOptions) -> Result<Self, WireError> {
        let r = Reader::new(buf, LBA_RANGE_TYPE_SIZE, options)?;
        r.reserved(2..16)?;
        r.reserved(48..64)?;

        let kind =
            LbaRangeKind::try_from(r.u8(0)).map_err(|e| WireError::invalid_field("type", e.value))?;
        let attributes = LbaRangeAttributes::from_bits(r.u8(1))
            .ok_or(WireError::invalid_field("attributes", r.u8(1)))?;
        Ok(Self {
            kind,
            attributes,
            start_lba: r.u64(16),
            block_count: r.u64(24),
            guid: r.array(32),
        })
    }

    pub fn encode(&self) -> [u8; LBA_RANGE_TYPE_SIZE] {
        let mut buf = [0u8; LBA_RANGE_TYPE_SIZE];
        let mut w = Writer::new(&mut buf);
        w.u8(0, self.kind.into());
        w.u8(1, self.attributes.bits());
        w.u64(16, self.start_lba);
        w.u64(24, self.block_count);
        w.bytes(32, &self.guid);
        buf
    }
}
