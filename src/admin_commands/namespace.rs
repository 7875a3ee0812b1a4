//! Identify namespace data structures
//!
//! See: NVM Command Set Spec: 4.1.5 Identify Namespace data structures

use alloc::vec::Vec;
use bit_field::BitField;
use bitflags::bitflags;
use log::{trace, warn};
use shared_derive::U8Enum;
use uuid::Uuid;

use crate::{
    codec::{DecodeOptions, Le128, Reader, Writer},
    WireError,
};

use super::identify::IDENTIFY_DATA_SIZE;

/// The number of [LbaFormat]s in [IdentifyNamespaceData]
pub const LBA_FORMAT_COUNT: usize = 16;

bitflags! {
    /// See: NVM Command Set Spec: Figure 97: Identify Namespace Data Structure: NSFEAT
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[allow(missing_docs)]
    pub struct NamespaceFeatures: u8 {
        const THIN_PROVISIONING = 1 << 0;
        const NAMESPACE_ATOMICS = 1 << 1;
        const DEALLOCATED_OR_UNWRITTEN_ERROR = 1 << 2;
        const NGUID_EUI64_NOT_REUSED = 1 << 3;
        const OPTIMAL_IO_BOUNDARY = 1 << 4;

        const _ = !0;
    }

    /// See: NVM Command Set Spec: Figure 97: Identify Namespace Data Structure: DPC
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[allow(missing_docs)]
    pub struct DataProtectionCapabilities: u8 {
        const TYPE1 = 1 << 0;
        const TYPE2 = 1 << 1;
        const TYPE3 = 1 << 2;
        const FIRST_EIGHT_BYTES = 1 << 3;
        const LAST_EIGHT_BYTES = 1 << 4;

        const _ = !0;
    }
}

/// Performance of an [LbaFormat] relative to the other formats of the namespace
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub enum RelativePerformance {
    #[default]
    Best = 0b00,
    Better = 0b01,
    Good = 0b10,
    Degraded = 0b11,
}

/// See: NVM Command Set Spec: Figure 98: LBA Format Data Structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LbaFormat {
    /// metadata bytes per block
    pub metadata_size: u16,
    /// log2 of the block size, `0` for an unused format
    pub data_size_shift: u8,
    pub relative_performance: RelativePerformance,
}

impl LbaFormat {
    /// Block size in bytes, `None` if the format is not in use
    pub fn block_size(&self) -> Option<u64> {
        if self.data_size_shift < 9 || self.data_size_shift >= 64 {
            return None;
        }
        Some(1 << self.data_size_shift)
    }

    fn read(r: &Reader, offset: usize) -> Result<Self, WireError> {
        let rp = r.u8(offset + 3);
        Ok(Self {
            metadata_size: r.u16(offset),
            data_size_shift: r.u8(offset + 2),
            // 2 bits always map to a variant
            relative_performance: RelativePerformance::try_from(rp.get_bits(0..=1))
                .unwrap_or_default(),
        })
    }
}

/// Information about a namespace
///
/// See: NVM Command Set Spec: Figure 97: Identify Namespace Data Structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyNamespaceData {
    /// total size in logical blocks
    pub size: u64,
    /// maximum number of logical blocks that can be allocated
    pub capacity: u64,
    /// number of allocated logical blocks
    pub utilization: u64,
    pub features: NamespaceFeatures,
    /// 0 based count of the valid [LbaFormat]s
    pub number_of_lba_formats: u8,
    /// FLBAS
    pub formatted_lba_size: u8,
    pub metadata_capabilities: u8,
    pub data_protection_capabilities: DataProtectionCapabilities,
    pub data_protection_settings: u8,
    pub multipath_sharing: u8,
    pub reservation_capabilities: u8,
    pub format_progress_indicator: u8,
    pub atomic_write_unit_normal: u16,
    pub atomic_write_unit_power_fail: u16,
    pub atomic_compare_write_unit: u16,
    pub atomic_boundary_size_normal: u16,
    pub atomic_boundary_offset: u16,
    pub atomic_boundary_size_power_fail: u16,
    pub optimal_io_boundary: u16,
    /// bytes
    pub nvm_capacity: Le128,
    pub nguid: [u8; 16],
    pub eui64: [u8; 8],
    /// always contains all 16 entries, see [Self::valid_lba_formats]
    pub lba_formats: [LbaFormat; LBA_FORMAT_COUNT],
    pub vendor_specific: Vec<u8>,
}

impl IdentifyNamespaceData {
    /// Parse the data returned by an identify command with
    /// [Cns::Namespace](super::identify::Cns::Namespace)
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        Self::parse_with(buf, DecodeOptions::default())
    }

    pub fn parse_with(buf: &[u8], options: DecodeOptions) -> Result<Self, WireError> {
        let r = Reader::new(buf, IDENTIFY_DATA_SIZE, options)?;

        r.reserved(64..104)?;
        r.reserved(192..384)?;

        let number_of_lba_formats = r.u8(25);
        if number_of_lba_formats as usize >= LBA_FORMAT_COUNT {
            warn!("namespace reports {} lba formats", number_of_lba_formats as usize + 1);
        }

        let mut lba_formats = [LbaFormat::default(); LBA_FORMAT_COUNT];
        for (i, format) in lba_formats.iter_mut().enumerate() {
            *format = LbaFormat::read(&r, 128 + i * 4)?;
        }

        let data = Self {
            size: r.u64(0),
            capacity: r.u64(8),
            utilization: r.u64(16),
            features: NamespaceFeatures::from_bits_retain(r.u8(24)),
            number_of_lba_formats,
            formatted_lba_size: r.u8(26),
            metadata_capabilities: r.u8(27),
            data_protection_capabilities: DataProtectionCapabilities::from_bits_retain(r.u8(28)),
            data_protection_settings: r.u8(29),
            multipath_sharing: r.u8(30),
            reservation_capabilities: r.u8(31),
            format_progress_indicator: r.u8(32),
            atomic_write_unit_normal: r.u16(34),
            atomic_write_unit_power_fail: r.u16(36),
            atomic_compare_write_unit: r.u16(38),
            atomic_boundary_size_normal: r.u16(40),
            atomic_boundary_offset: r.u16(42),
            atomic_boundary_size_power_fail: r.u16(44),
            optimal_io_boundary: r.u16(46),
            nvm_capacity: r.le128(48),
            nguid: r.array(104),
            eui64: r.array(120),
            lba_formats,
            vendor_specific: r.slice(384..4096).to_vec(),
        };
        trace!(
            "identify namespace: size {} blocks, format {}",
            data.size,
            data.active_lba_format_index()
        );
        Ok(data)
    }

    /// The [LbaFormat]s the namespace reports as supported
    pub fn valid_lba_formats(&self) -> &[LbaFormat] {
        let count = (self.number_of_lba_formats as usize + 1).min(LBA_FORMAT_COUNT);
        &self.lba_formats[..count]
    }

    /// Index of the [LbaFormat] the namespace is formatted with
    pub fn active_lba_format_index(&self) -> usize {
        self.formatted_lba_size.get_bits(0..=3) as usize
    }

    pub fn active_lba_format(&self) -> &LbaFormat {
        &self.lba_formats[self.active_lba_format_index()]
    }

    /// metadata is transferred at the end of each block instead of a separate buffer
    pub fn metadata_at_end_of_block(&self) -> bool {
        self.formatted_lba_size.get_bit(4)
    }

    /// The protection information type the namespace is formatted with, `0` if disabled
    pub fn protection_information_type(&self) -> u8 {
        self.data_protection_settings.get_bits(0..=2)
    }
}

/// Namespace identifier types
///
/// See: NVM Express Base Spec: Figure 281: Namespace Identification Descriptor
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum NamespaceIdType {
    Eui64 = 0x1,
    Nguid = 0x2,
    Uuid = 0x3,
}

impl NamespaceIdType {
    /// the only valid NIDL for this type
    pub fn length(self) -> u8 {
        match self {
            NamespaceIdType::Eui64 => 8,
            NamespaceIdType::Nguid | NamespaceIdType::Uuid => 16,
        }
    }
}

/// A single entry of the namespace identification descriptor list
///
/// See: NVM Express Base Spec: Figure 281: Namespace Identification Descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum NamespaceIdDescriptor {
    Eui64([u8; 8]),
    Nguid([u8; 16]),
    Uuid(Uuid),
}

const NAMESPACE_ID_DESCRIPTOR_HEADER_SIZE: usize = 4;

impl NamespaceIdDescriptor {
    pub fn id_type(&self) -> NamespaceIdType {
        match self {
            NamespaceIdDescriptor::Eui64(_) => NamespaceIdType::Eui64,
            NamespaceIdDescriptor::Nguid(_) => NamespaceIdType::Nguid,
            NamespaceIdDescriptor::Uuid(_) => NamespaceIdType::Uuid,
        }
    }

    fn id_bytes(&self) -> &[u8] {
        match self {
            NamespaceIdDescriptor::Eui64(id) => id,
            NamespaceIdDescriptor::Nguid(id) => id,
            NamespaceIdDescriptor::Uuid(id) => id.as_bytes(),
        }
    }

    /// Parse the list returned by an identify command with
    /// [Cns::NamespaceDescriptorList](super::identify::Cns::NamespaceDescriptorList).
    ///
    /// The list ends with the first descriptor of type `0` or the end of the buffer.
    pub fn parse_list(buf: &[u8]) -> Result<Vec<Self>, WireError> {
        let r = Reader::new(buf, IDENTIFY_DATA_SIZE, DecodeOptions::default())?;

        let mut descriptors = Vec::new();
        let mut offset = 0;
        while offset + NAMESPACE_ID_DESCRIPTOR_HEADER_SIZE <= IDENTIFY_DATA_SIZE {
            let nidt = r.u8(offset);
            if nidt == 0 {
                break;
            }
            let id_type = NamespaceIdType::try_from(nidt)
                .map_err(|e| WireError::invalid_field("nidt", e.value))?;
            let nidl = r.u8(offset + 1);
            if nidl != id_type.length() {
                return Err(WireError::invalid_field("nidl", nidl));
            }
            r.reserved(offset + 2..offset + 4)?;

            let start = offset + NAMESPACE_ID_DESCRIPTOR_HEADER_SIZE;
            let end = start + nidl as usize;
            if end > IDENTIFY_DATA_SIZE {
                return Err(WireError::LengthMismatch {
                    expected: end,
                    actual: IDENTIFY_DATA_SIZE,
                });
            }
            let descriptor = match id_type {
                NamespaceIdType::Eui64 => NamespaceIdDescriptor::Eui64(r.array(start)),
                NamespaceIdType::Nguid => NamespaceIdDescriptor::Nguid(r.array(start)),
                NamespaceIdType::Uuid => NamespaceIdDescriptor::Uuid(Uuid::from_bytes(r.array(start))),
            };
            trace!("namespace id descriptor {descriptor:?}");
            descriptors.push(descriptor);
            offset = end;
        }
        Ok(descriptors)
    }

    /// Encode `descriptors` as a 4096 byte descriptor list
    pub fn encode_list(descriptors: &[Self]) -> Result<Vec<u8>, WireError> {
        let mut buf = alloc::vec![0u8; IDENTIFY_DATA_SIZE];
        let mut w = Writer::new(&mut buf);
        let mut offset = 0;
        for descriptor in descriptors {
            let id = descriptor.id_bytes();
            let end = offset + NAMESPACE_ID_DESCRIPTOR_HEADER_SIZE + id.len();
            if end > IDENTIFY_DATA_SIZE {
                return Err(WireError::LengthMismatch {
                    expected: IDENTIFY_DATA_SIZE,
                    actual: end,
                });
            }
            w.u8(offset, descriptor.id_type().into());
            w.u8(offset + 1, id.len() as u8);
            w.bytes(offset + NAMESPACE_ID_DESCRIPTOR_HEADER_SIZE, id);
            offset = end;
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::vec;
    use shared::test_utils::init_test_logger;

    fn namespace_page() -> Vec<u8> {
        let mut page = vec![0u8; IDENTIFY_DATA_SIZE];
        let mut w = Writer::new(&mut page);
        w.u64(0, 0x20_0000);
        w.u64(8, 0x20_0000);
        w.u64(16, 0x1000);
        w.u8(24, 0b1);
        w.u8(25, 3);
        w.u8(26, 0x11);
        w.u8(29, 0b1001);
        w.bytes(104, &[0x11; 16]);
        w.bytes(120, &[0x22; 8]);
        // 512 + 0, 512 + 8, 4096 + 0, 4096 + 64
        w.bytes(128, &[0, 0, 9, 2]);
        w.bytes(132, &[8, 0, 9, 3]);
        w.bytes(136, &[0, 0, 12, 0]);
        w.bytes(140, &[64, 0, 12, 1]);
        page
    }

    #[test]
    fn parse_namespace() {
        init_test_logger();
        let ns = IdentifyNamespaceData::parse(&namespace_page()).unwrap();

        assert_eq!(0x20_0000, ns.size);
        assert_eq!(0x1000, ns.utilization);
        assert!(ns.features.contains(NamespaceFeatures::THIN_PROVISIONING));
        assert_eq!([0x11; 16], ns.nguid);
        assert_eq!([0x22; 8], ns.eui64);

        assert_eq!(LBA_FORMAT_COUNT, ns.lba_formats.len());
        assert_eq!(4, ns.valid_lba_formats().len());
        assert_eq!(Some(512), ns.lba_formats[0].block_size());
        assert_eq!(RelativePerformance::Good, ns.lba_formats[0].relative_performance);
        assert_eq!(8, ns.lba_formats[1].metadata_size);
        assert_eq!(Some(4096), ns.lba_formats[3].block_size());
        assert_eq!(None, ns.lba_formats[4].block_size());

        assert_eq!(1, ns.active_lba_format_index());
        assert_eq!(8, ns.active_lba_format().metadata_size);
        assert!(ns.metadata_at_end_of_block());
        assert_eq!(1, ns.protection_information_type());
    }

    #[test]
    fn namespace_page_must_be_complete() {
        assert_eq!(
            Err(WireError::LengthMismatch {
                expected: IDENTIFY_DATA_SIZE,
                actual: 4095
            }),
            IdentifyNamespaceData::parse(&namespace_page()[..4095])
        );
    }

    #[test]
    fn descriptor_list() {
        let uuid = Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        let descriptors = [
            NamespaceIdDescriptor::Eui64([1, 2, 3, 4, 5, 6, 7, 8]),
            NamespaceIdDescriptor::Uuid(uuid),
        ];
        let buf = NamespaceIdDescriptor::encode_list(&descriptors).unwrap();
        assert_eq!([1, 8, 0, 0, 1, 2], buf[..6]);
        assert_eq!([3, 16, 0, 0], buf[12..16]);
        assert_eq!(uuid.as_bytes(), &buf[16..32]);

        assert_eq!(
            Ok(descriptors.to_vec()),
            NamespaceIdDescriptor::parse_list(&buf)
        );
    }

    #[test]
    fn descriptor_with_wrong_length_is_rejected() {
        let mut buf = vec![0u8; IDENTIFY_DATA_SIZE];
        buf[0] = NamespaceIdType::Nguid.into();
        buf[1] = 8;
        assert_eq!(
            Err(WireError::InvalidField {
                field: "nidl",
                value: 8
            }),
            NamespaceIdDescriptor::parse_list(&buf)
        );
    }
}
