//! Data shared between all Command types
//!
//! See: NVM Express Base Spec: 4.1 Submission Queue Entry

use bit_field::BitField;
use bitflags::bitflags;
use log::trace;
use shared_derive::U8Enum;
use static_assertions::const_assert_eq;

use crate::{
    codec::{Reader, Writer},
    WireError,
};

/// The size of all submission command entries
pub const SUBMISSION_COMMAND_ENTRY_SIZE: usize = 64;

/// The size of a [DataPtr] within a submission command entry
pub const DATA_PTR_SIZE: usize = 16;

/// Offset of the [DataPtr] within a submission command entry
pub const DATA_PTR_OFFSET: usize = 24;
const_assert_eq!(DATA_PTR_OFFSET + DATA_PTR_SIZE + 24, SUBMISSION_COMMAND_ENTRY_SIZE);

/// Identifies a command within a submission queue.
///
/// Assigned by the host, it must be unique among the outstanding commands of a queue.
/// The completion for a command carries the same identifier.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, PartialOrd, Ord, Hash)]
pub struct CommandIdentifier(pub u16);

impl CommandIdentifier {
    pub fn as_u16(self) -> u16 {
        self.0
    }
}

impl core::fmt::LowerHex for CommandIdentifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::LowerHex::fmt(&self.0, f)
    }
}

impl core::fmt::UpperHex for CommandIdentifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::UpperHex::fmt(&self.0, f)
    }
}

/// Identifies a submission or completion queue. The admin queues use `0`.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, PartialOrd, Ord, Hash)]
pub struct QueueIdentifier(pub u16);

impl QueueIdentifier {
    pub const ADMIN: QueueIdentifier = QueueIdentifier(0);

    pub fn as_u16(self) -> u16 {
        self.0
    }

    pub fn checked_add(self, rhs: u16) -> Option<Self> {
        self.0.checked_add(rhs).map(Self)
    }
}

/// Namespace id addressing every namespace of a controller
pub const NSID_ALL: u32 = 0xffff_ffff;

/// The first command dword, shared by all commands
///
/// See: NVM Express Base Spec: Figure 87: Command Dword 0
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CDW0(pub u32);

impl CDW0 {
    pub fn zero() -> Self {
        Self(0)
    }

    pub fn opcode(&self) -> u8 {
        self.0.get_bits(0..=7) as u8
    }

    pub fn set_opcode(&mut self, value: u8) {
        self.0.set_bits(0..=7, value as u32);
    }

    pub fn fuse(&self) -> Fuse {
        Fuse::from_bits_retain(self.0.get_bits(8..=9) as u8)
    }

    pub fn set_fuse(&mut self, value: Fuse) {
        self.0.set_bits(8..=9, value.bits() as u32);
    }

    /// bits 10..=13 of the flags byte are reserved
    pub fn reserved_flags(&self) -> u8 {
        self.0.get_bits(10..=13) as u8
    }

    /// PSDT
    pub fn transfer_mode(&self) -> Result<TransferMode, WireError> {
        let psdt = self.0.get_bits(14..=15) as u8;
        TransferMode::try_from(psdt).map_err(|e| WireError::invalid_field("psdt", e.value))
    }

    pub fn set_transfer_mode(&mut self, value: TransferMode) {
        self.0.set_bits(14..=15, u8::from(value) as u32);
    }

    pub fn command_identifier(&self) -> CommandIdentifier {
        CommandIdentifier(self.0.get_bits(16..=31) as u16)
    }

    pub fn set_command_identifier(&mut self, value: CommandIdentifier) {
        self.0.set_bits(16..=31, value.0 as u32);
    }
}

bitflags! {
    /// Fused operation bits of the command flags
    ///
    /// See: NVM Express Base Spec: Figure 87: Command Dword 0: FUSE
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Fuse: u8 {
        /// first command of a fused operation
        const FIRST = 1 << 0;
        /// second command of a fused operation
        const SECOND = 1 << 1;
    }
}

/// Specifies whether a command uses PRPs or SGLs for data transfer
///
/// See: NVM Express Base Spec: Figure 87: Command Dword 0: PSDT
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    #[default]
    Prp = 0b00,
    /// SGL for data, the metadata pointer addresses a contiguous buffer
    SglMetaBuffer = 0b01,
    /// SGL for data, the metadata pointer addresses an SGL segment with exactly one
    /// descriptor
    SglMetaSegment = 0b10,
}

impl TransferMode {
    pub fn is_sgl(self) -> bool {
        self != TransferMode::Prp
    }

    /// whether `data_ptr` is decoded as itself under this mode
    pub fn is_compatible(self, data_ptr: &DataPtr) -> bool {
        matches!(data_ptr, DataPtr::Prp { .. }) != self.is_sgl()
    }
}

/// The fields shared by every submission entry, apart from the opcode which is
/// implied by the command variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandHeader {
    pub fuse: Fuse,
    pub transfer_mode: TransferMode,
    pub command_id: CommandIdentifier,
}

impl CommandHeader {
    pub fn new(command_id: CommandIdentifier) -> Self {
        Self {
            command_id,
            ..Default::default()
        }
    }

    pub(crate) fn cdw0(&self, opcode: u8) -> CDW0 {
        let mut cdw0 = CDW0::zero();
        cdw0.set_opcode(opcode);
        cdw0.set_fuse(self.fuse);
        cdw0.set_transfer_mode(self.transfer_mode);
        cdw0.set_command_identifier(self.command_id);
        cdw0
    }

    pub(crate) fn from_cdw0(cdw0: CDW0) -> Result<Self, WireError> {
        Ok(Self {
            fuse: cdw0.fuse(),
            transfer_mode: cdw0.transfer_mode()?,
            command_id: cdw0.command_identifier(),
        })
    }
}

/// The type of an SGL descriptor, stored in the upper nibble of the identifier byte.
///
/// Keyed data block descriptors (`0x4`) are represented by [KeyedSglDescriptor].
///
/// See: NVM Express Base Spec: Figure 114: SGL Descriptor Type
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq)]
pub enum SglDescriptorType {
    DataBlock = 0x0,
    Segment = 0x2,
    LastSegment = 0x3,
    TransportDataBlock = 0x5,
}

/// Descriptor type nibble of a [KeyedSglDescriptor]
pub const KEYED_DATA_BLOCK_TYPE: u8 = 0x4;

/// The sub type of an SGL descriptor, stored in the lower nibble of the identifier byte.
///
/// See: NVM Express Base Spec: Figure 115: SGL Descriptor Sub Type
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq, Default)]
pub enum SglSubType {
    /// absolute address of the data block
    #[default]
    Address = 0x0,
    /// relative offset of an in-capsule data block
    Offset = 0x1,
    /// transport defined format
    Transport = 0xa,
    /// RDMA remote invalidation request
    Invalidate = 0xf,
}

impl SglSubType {
    fn decode(identifier: u8) -> Result<Self, WireError> {
        identifier
            .get_bits(0..=3)
            .try_into()
            .map_err(|_| WireError::invalid_field("sgl sub type", identifier))
    }
}

/// SGL descriptor with a 32 bit length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SglDescriptor {
    pub address: u64,
    pub length: u32,
    pub descriptor_type: SglDescriptorType,
    pub sub_type: SglSubType,
}

/// Keyed SGL data block descriptor, used by RDMA transports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyedSglDescriptor {
    pub address: u64,
    /// 24 bit length
    pub length: u32,
    pub key: u32,
    pub sub_type: SglSubType,
}

impl KeyedSglDescriptor {
    /// The largest length a keyed descriptor can hold
    pub const MAX_LENGTH: u32 = 0xff_ffff;

    pub fn new(
        address: u64,
        length: u32,
        key: u32,
        sub_type: SglSubType,
    ) -> Result<Self, WireError> {
        if length > Self::MAX_LENGTH {
            return Err(WireError::invalid_field("keyed sgl length", length));
        }
        Ok(Self {
            address,
            length,
            key,
            sub_type,
        })
    }
}

/// The data pointer of a command
///
/// Which variant is stored is decided by the [TransferMode] in the command flags.
///
/// See: NVM Express Base Spec: Figure 88: Common Command Format: DPTR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPtr {
    Prp { prp1: u64, prp2: u64 },
    Sgl(SglDescriptor),
    KeyedSgl(KeyedSglDescriptor),
}

impl Default for DataPtr {
    fn default() -> Self {
        DataPtr::Prp { prp1: 0, prp2: 0 }
    }
}

impl DataPtr {
    /// A PRP data pointer for a transfer within a single page
    pub fn prp(prp1: u64) -> Self {
        DataPtr::Prp { prp1, prp2: 0 }
    }

    /// The [TransferMode] under which this pointer is decoded as itself
    pub fn transfer_mode(&self) -> TransferMode {
        match self {
            DataPtr::Prp { .. } => TransferMode::Prp,
            DataPtr::Sgl(_) | DataPtr::KeyedSgl(_) => TransferMode::SglMetaBuffer,
        }
    }

    /// Encode the pointer, failing if a field does not fit its wire width.
    pub fn encode(&self) -> Result<[u8; DATA_PTR_SIZE], WireError> {
        self.validate()?;
        let mut buf = [0u8; DATA_PTR_SIZE];
        self.write(&mut Writer::new(&mut buf));
        Ok(buf)
    }

    /// Check that every field fits into its wire representation
    pub fn validate(&self) -> Result<(), WireError> {
        match self {
            DataPtr::KeyedSgl(sgl) if sgl.length > KeyedSglDescriptor::MAX_LENGTH => {
                Err(WireError::invalid_field("keyed sgl length", sgl.length))
            }
            _ => Ok(()),
        }
    }

    /// Resolve the data pointer stored in `bytes`.
    ///
    /// `mode` is authoritative: in PRP mode the bytes are always a PRP pair,
    /// in SGL mode the descriptor type nibble selects between a keyed and a plain
    /// descriptor.
    pub fn decode(mode: TransferMode, bytes: &[u8; DATA_PTR_SIZE]) -> Result<Self, WireError> {
        let reader = Reader::new(bytes, DATA_PTR_SIZE, Default::default())?;
        Self::read(&reader, mode)
    }

    pub(crate) fn write(&self, w: &mut Writer) {
        match self {
            DataPtr::Prp { prp1, prp2 } => {
                w.u64(0, *prp1);
                w.u64(8, *prp2);
            }
            DataPtr::Sgl(sgl) => {
                w.u64(0, sgl.address);
                w.u32(8, sgl.length);
                let mut identifier = 0u8;
                identifier.set_bits(4..=7, u8::from(sgl.descriptor_type));
                identifier.set_bits(0..=3, u8::from(sgl.sub_type));
                w.u8(15, identifier);
            }
            DataPtr::KeyedSgl(sgl) => {
                w.u64(0, sgl.address);
                w.bytes(8, &sgl.length.to_le_bytes()[..3]);
                w.u32(11, sgl.key);
                let mut identifier = 0u8;
                identifier.set_bits(4..=7, KEYED_DATA_BLOCK_TYPE);
                identifier.set_bits(0..=3, u8::from(sgl.sub_type));
                w.u8(15, identifier);
            }
        }
    }

    /// read from a reader positioned at the start of the data pointer
    pub(crate) fn read(r: &Reader, mode: TransferMode) -> Result<Self, WireError> {
        if !mode.is_sgl() {
            return Ok(DataPtr::Prp {
                prp1: r.u64(0),
                prp2: r.u64(8),
            });
        }

        let identifier = r.u8(15);
        let descriptor_type = identifier.get_bits(4..=7);
        let sub_type = SglSubType::decode(identifier)?;
        trace!("sgl descriptor type {descriptor_type:#x}, sub type {sub_type:?}");

        if descriptor_type == KEYED_DATA_BLOCK_TYPE {
            let [l0, l1, l2] = r.array::<3>(8);
            Ok(DataPtr::KeyedSgl(KeyedSglDescriptor {
                address: r.u64(0),
                length: u32::from_le_bytes([l0, l1, l2, 0]),
                key: r.u32(11),
                sub_type,
            }))
        } else {
            let descriptor_type = SglDescriptorType::try_from(descriptor_type)
                .map_err(|e| WireError::invalid_field("sgl descriptor type", e.value))?;
            r.reserved(12..15)?;
            Ok(DataPtr::Sgl(SglDescriptor {
                address: r.u64(0),
                length: r.u32(8),
                descriptor_type,
                sub_type,
            }))
        }
    }
}

/// Encoding of the opcode specific part of a submission entry.
///
/// Offsets used by implementations are relative to the start of the 64 byte entry.
/// Bytes `0..8` (command dword 0 and the namespace id) are handled by the caller.
pub(crate) trait CommandPayload: Sized {
    /// Check that every field fits into its wire representation.
    ///
    /// [Self::write] may assume this succeeded.
    fn validate(&self) -> Result<(), WireError> {
        self.data_ptr().map_or(Ok(()), DataPtr::validate)
    }

    fn write(&self, w: &mut Writer);

    fn read(r: &Reader, mode: TransferMode) -> Result<Self, WireError>;

    /// The data pointer of the command, if it transfers data through one
    fn data_ptr(&self) -> Option<&DataPtr> {
        None
    }
}

pub(crate) fn read_data_ptr(r: &Reader, mode: TransferMode) -> Result<DataPtr, WireError> {
    DataPtr::read(&r.sub(DATA_PTR_OFFSET..DATA_PTR_OFFSET + DATA_PTR_SIZE), mode)
}

pub(crate) fn write_data_ptr(w: &mut Writer, data_ptr: &DataPtr) {
    data_ptr.write(&mut w.sub(DATA_PTR_OFFSET..DATA_PTR_OFFSET + DATA_PTR_SIZE));
}

/// Command layout shared by all commands
///
/// Used for commands whose dwords have no dedicated structure, e.g. security send
/// and receive or namespace management.
///
/// See: NVM Express Base Spec: Figure 88: Common Command Format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenericCommand {
    pub dword2: u32,
    pub dword3: u32,
    pub metadata_ptr: u64,
    pub data_ptr: DataPtr,
    /// command dwords 10 to 15
    pub dwords: [u32; 6],
}

impl CommandPayload for GenericCommand {
    fn write(&self, w: &mut Writer) {
        w.u32(8, self.dword2);
        w.u32(12, self.dword3);
        w.u64(16, self.metadata_ptr);
        write_data_ptr(w, &self.data_ptr);
        for (i, dword) in self.dwords.iter().enumerate() {
            w.u32(40 + 4 * i, *dword);
        }
    }

    fn read(r: &Reader, mode: TransferMode) -> Result<Self, WireError> {
        let mut dwords = [0u32; 6];
        for (i, dword) in dwords.iter_mut().enumerate() {
            *dword = r.u32(40 + 4 * i);
        }
        Ok(Self {
            dword2: r.u32(8),
            dword3: r.u32(12),
            metadata_ptr: r.u64(16),
            data_ptr: read_data_ptr(r, mode)?,
            dwords,
        })
    }

    fn data_ptr(&self) -> Option<&DataPtr> {
        Some(&self.data_ptr)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use shared::test_utils::init_test_logger;

    #[test]
    fn cdw0_fields() {
        let mut cdw0 = CDW0::zero();
        cdw0.set_opcode(0x02);
        cdw0.set_fuse(Fuse::FIRST);
        cdw0.set_transfer_mode(TransferMode::SglMetaSegment);
        cdw0.set_command_identifier(CommandIdentifier(0xbeef));

        assert_eq!(0xbeef_8102, cdw0.0);
        assert_eq!(0x02, cdw0.opcode());
        assert_eq!(Fuse::FIRST, cdw0.fuse());
        assert_eq!(Ok(TransferMode::SglMetaSegment), cdw0.transfer_mode());
        assert_eq!(CommandIdentifier(0xbeef), cdw0.command_identifier());
    }

    #[test]
    fn reserved_transfer_mode_is_invalid() {
        let cdw0 = CDW0(0b11 << 14);
        assert_eq!(
            Err(WireError::InvalidField {
                field: "psdt",
                value: 0b11
            }),
            cdw0.transfer_mode()
        );
    }

    #[test]
    fn data_ptr_round_trip() {
        init_test_logger();
        let pointers = [
            DataPtr::Prp {
                prp1: 0x1000,
                prp2: 0x2000_0000_1000,
            },
            DataPtr::Sgl(SglDescriptor {
                address: 0xdead_0000,
                length: 0x1_0000,
                descriptor_type: SglDescriptorType::LastSegment,
                sub_type: SglSubType::Offset,
            }),
            DataPtr::KeyedSgl(
                KeyedSglDescriptor::new(0xffff_0000_1234, 0xab_cdef, 0x1234_5678, SglSubType::Invalidate)
                    .unwrap(),
            ),
        ];
        for ptr in pointers {
            let bytes = ptr.encode().unwrap();
            assert_eq!(Ok(ptr), DataPtr::decode(ptr.transfer_mode(), &bytes));
        }
    }

    #[test]
    fn keyed_sgl_layout() {
        let ptr = DataPtr::KeyedSgl(
            KeyedSglDescriptor::new(0x0102_0304_0506_0708, 0x0a_0b0c, 0x1122_3344, SglSubType::Address)
                .unwrap(),
        );
        assert_eq!(
            Ok([
                0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01, 0x0c, 0x0b, 0x0a, 0x44, 0x33, 0x22,
                0x11, 0x40
            ]),
            ptr.encode()
        );
    }

    #[test]
    fn mode_bits_are_authoritative() {
        let sgl = DataPtr::Sgl(SglDescriptor {
            address: 0x1000,
            length: 512,
            descriptor_type: SglDescriptorType::DataBlock,
            sub_type: SglSubType::Address,
        });
        let bytes = sgl.encode().unwrap();
        assert_eq!(
            Ok(DataPtr::Prp {
                prp1: 0x1000,
                prp2: 512
            }),
            DataPtr::decode(TransferMode::Prp, &bytes)
        );
        assert!(!TransferMode::Prp.is_compatible(&sgl));
        assert!(TransferMode::SglMetaSegment.is_compatible(&sgl));
    }

    #[test]
    fn keyed_length_is_24_bit() {
        assert!(KeyedSglDescriptor::new(0, 0x100_0000, 0, SglSubType::Address).is_err());

        let ptr = DataPtr::KeyedSgl(KeyedSglDescriptor {
            address: 0x1000,
            length: 0x100_0001,
            key: 1,
            sub_type: SglSubType::Address,
        });
        let err = WireError::InvalidField {
            field: "keyed sgl length",
            value: 0x100_0001,
        };
        assert_eq!(Err(err), ptr.encode());
        assert_eq!(Err(err), ptr.validate());
    }

    #[test]
    fn unknown_sgl_type_is_rejected() {
        let mut bytes = [0u8; DATA_PTR_SIZE];
        bytes[15] = 0x70;
        assert_eq!(
            Err(WireError::InvalidField {
                field: "sgl descriptor type",
                value: 7
            }),
            DataPtr::decode(TransferMode::SglMetaBuffer, &bytes)
        );
    }
}
