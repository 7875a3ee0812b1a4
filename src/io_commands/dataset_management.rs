use alloc::vec::Vec;
use bitflags::bitflags;
use log::trace;

use crate::{
    codec::{DecodeOptions, Reader, Writer},
    generic_command::{read_data_ptr, write_data_ptr, CommandPayload, DataPtr, TransferMode},
    WireError,
};

use super::LBA;

/// The maximum number of ranges a single dataset management command can carry
pub const DSM_MAX_RANGES: usize = 256;

/// Size of a single [DsmRange]
pub const DSM_RANGE_SIZE: usize = 16;

bitflags! {
    /// See: NVM Command Set Spec: Figure 45: Dataset Management: Command Dword 11
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DsmAttributes: u32 {
        /// integral dataset for read
        const IDR = 1 << 0;
        /// integral dataset for write
        const IDW = 1 << 1;
        /// deallocate
        const AD = 1 << 2;

        const _ = !0;
    }
}

/// Dataset management command
///
/// See: NVM Command Set Spec: 3.2.3 Dataset Management command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatasetManagement {
    /// points to a list of [DsmRange]s
    pub data_ptr: DataPtr,
    /// 0 based number of ranges
    pub range_count: u8,
    pub attributes: DsmAttributes,
}

impl DatasetManagement {
    /// Deallocate (trim) `range_count` ranges stored at `data_ptr`
    pub fn deallocate(data_ptr: DataPtr, range_count: usize) -> Result<Self, WireError> {
        if range_count == 0 || range_count > DSM_MAX_RANGES {
            return Err(WireError::invalid_field("range count", range_count as u64));
        }
        Ok(Self {
            data_ptr,
            range_count: (range_count - 1) as u8,
            attributes: DsmAttributes::AD,
        })
    }
}

impl CommandPayload for DatasetManagement {
    fn write(&self, w: &mut Writer) {
        write_data_ptr(w, &self.data_ptr);
        w.u32(40, self.range_count as u32);
        w.u32(44, self.attributes.bits());
    }

    fn read(r: &Reader, mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..24)?;
        r.reserved(41..44)?;
        r.reserved(48..64)?;
        Ok(Self {
            data_ptr: read_data_ptr(r, mode)?,
            range_count: r.u8(40),
            attributes: DsmAttributes::from_bits_retain(r.u32(44)),
        })
    }

    fn data_ptr(&self) -> Option<&DataPtr> {
        Some(&self.data_ptr)
    }
}

/// A range of logical blocks in a dataset management command
///
/// See: NVM Command Set Spec: Figure 46: Dataset Management: Range Definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DsmRange {
    /// context attributes
    pub attributes: u32,
    /// number of logical blocks, not 0 based
    pub block_count: u32,
    pub start_lba: LBA,
}

impl DsmRange {
    pub fn encode(&self) -> [u8; DSM_RANGE_SIZE] {
        let mut buf = [0u8; DSM_RANGE_SIZE];
        let mut w = Writer::new(&mut buf);
        w.u32(0, self.attributes);
        w.u32(4, self.block_count);
        w.u64(8, self.start_lba.value());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let r = Reader::new(buf, DSM_RANGE_SIZE, DecodeOptions::default())?;
        Ok(Self {
            attributes: r.u32(0),
            block_count: r.u32(4),
            start_lba: LBA::new(r.u64(8)),
        })
    }

    /// Encode the data buffer of a dataset management command
    pub fn encode_list(ranges: &[DsmRange]) -> Result<Vec<u8>, WireError> {
        if ranges.len() > DSM_MAX_RANGES {
            return Err(WireError::invalid_field("range count", ranges.len() as u64));
        }
        Ok(ranges.iter().flat_map(|range| range.encode()).collect())
    }

    /// Decode `count` ranges from the data buffer of a dataset management command.
    ///
    /// Trailing bytes after the last range are ignored.
    pub fn decode_list(buf: &[u8], count: usize) -> Result<Vec<DsmRange>, WireError> {
        if count > DSM_MAX_RANGES {
            return Err(WireError::invalid_field("range count", count as u64));
        }
        let len = count * DSM_RANGE_SIZE;
        if buf.len() < len {
            return Err(WireError::LengthMismatch {
                expected: len,
                actual: buf.len(),
            });
        }
        trace!("decoding {count} dsm ranges");
        buf[..len].chunks_exact(DSM_RANGE_SIZE).map(DsmRange::decode).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deallocate_command() {
        let dsm = DatasetManagement::deallocate(DataPtr::prp(0x4000), 2).unwrap();
        let mut entry = [0u8; 64];
        dsm.write(&mut Writer::new(&mut entry));
        assert_eq!(1, entry[40]);
        assert_eq!([4, 0, 0, 0], entry[44..48]);

        assert!(DatasetManagement::deallocate(DataPtr::default(), 0).is_err());
        assert!(DatasetManagement::deallocate(DataPtr::default(), 257).is_err());
        assert_eq!(255, DatasetManagement::deallocate(DataPtr::default(), 256).unwrap().range_count);
    }

    #[test]
    fn range_layout() {
        let range = DsmRange {
            attributes: 0x0102_0304,
            block_count: 64,
            start_lba: LBA::new(0x8000),
        };
        assert_eq!(
            [4, 3, 2, 1, 64, 0, 0, 0, 0, 0x80, 0, 0, 0, 0, 0, 0],
            range.encode()
        );
    }

    #[test]
    fn range_list() {
        let ranges = [
            DsmRange {
                attributes: 0,
                block_count: 8,
                start_lba: LBA::new(0),
            },
            DsmRange {
                attributes: 0,
                block_count: 16,
                start_lba: LBA::new(1024),
            },
        ];
        let mut buf = DsmRange::encode_list(&ranges).unwrap();
        assert_eq!(32, buf.len());
        buf.extend_from_slice(&[0xff; 8]);
        assert_eq!(Ok(ranges.to_vec()), DsmRange::decode_list(&buf, 2));
        assert_eq!(
            Err(WireError::LengthMismatch {
                expected: 48,
                actual: 40
            }),
            DsmRange::decode_list(&buf, 3)
        );
    }
}
