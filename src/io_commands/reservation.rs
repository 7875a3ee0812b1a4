//! Reservation commands and the reservation status data structure
//!
//! See: NVM Express Base Spec: 8.19 Reservations

use alloc::vec::Vec;
use bit_field::BitField;
use log::trace;
use shared_derive::U8Enum;

use crate::{
    admin_commands::ControllerId,
    codec::{DecodeOptions, Reader, Writer},
    generic_command::{read_data_ptr, write_data_ptr, CommandPayload, DataPtr, TransferMode},
    WireError,
};

/// See: NVM Express Base Spec: Figure 583: Reservation Type Encoding
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ReservationType {
    WriteExclusive = 1,
    ExclusiveAccess = 2,
    WriteExclusiveRegistrantsOnly = 3,
    ExclusiveAccessRegistrantsOnly = 4,
    WriteExclusiveAllRegistrants = 5,
    ExclusiveAccessAllRegistrants = 6,
}

impl ReservationType {
    /// `0` is used on the wire for "no reservation"
    fn decode(value: u8, field: &'static str) -> Result<Option<Self>, WireError> {
        if value == 0 {
            return Ok(None);
        }
        ReservationType::try_from(value)
            .map(Some)
            .map_err(|e| WireError::invalid_field(field, e.value))
    }

    fn encode(value: Option<Self>) -> u8 {
        value.map_or(0, u8::from)
    }
}

/// See: NVM Command Set Spec: Figure 66: Reservation Register: RREGA
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RegisterAction {
    Register = 0b000,
    Unregister = 0b001,
    Replace = 0b010,
}

/// Change to the persist through power loss state
///
/// See: NVM Command Set Spec: Figure 66: Reservation Register: CPTPL
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub enum PersistThroughPowerLoss {
    #[default]
    NoChange = 0b00,
    Clear = 0b10,
    Set = 0b11,
}

/// See: NVM Command Set Spec: Figure 62: Reservation Acquire: RACQA
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AcquireAction {
    Acquire = 0b000,
    Preempt = 0b001,
    PreemptAndAbort = 0b010,
}

/// See: NVM Command Set Spec: Figure 70: Reservation Release: RRELA
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ReleaseAction {
    Release = 0b000,
    Clear = 0b001,
}

/// Reservation register command
///
/// The data buffer holds a [ReservationKeys] structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationRegister {
    pub data_ptr: DataPtr,
    pub action: RegisterAction,
    /// ignore existing key
    pub ignore_key: bool,
    pub persist_through_power_loss: PersistThroughPowerLoss,
}

impl CommandPayload for ReservationRegister {
    fn write(&self, w: &mut Writer) {
        write_data_ptr(w, &self.data_ptr);
        let mut dword10 = 0u32;
        dword10.set_bits(0..=2, u8::from(self.action) as u32);
        dword10.set_bit(3, self.ignore_key);
        dword10.set_bits(30..=31, u8::from(self.persist_through_power_loss) as u32);
        w.u32(40, dword10);
    }

    fn read(r: &Reader, mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..24)?;
        r.reserved(44..64)?;
        r.reserved_bits(40, 4..=29)?;
        let dword10 = r.u32(40);
        let action = RegisterAction::try_from(dword10.get_bits(0..=2) as u8)
            .map_err(|e| WireError::invalid_field("rrega", e.value))?;
        let persist_through_power_loss =
            PersistThroughPowerLoss::try_from(dword10.get_bits(30..=31) as u8)
                .map_err(|e| WireError::invalid_field("cptpl", e.value))?;
        Ok(Self {
            data_ptr: read_data_ptr(r, mode)?,
            action,
            ignore_key: dword10.get_bit(3),
            persist_through_power_loss,
        })
    }

    fn data_ptr(&self) -> Option<&DataPtr> {
        Some(&self.data_ptr)
    }
}

/// Reservation report command
///
/// The controller answers with a [ReservationStatus] or, if
/// [Self::extended_data_structure] is set, a [ReservationStatusExt].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationReport {
    pub data_ptr: DataPtr,
    /// 0 based number of dwords to transfer
    pub dword_count: u32,
    pub extended_data_structure: bool,
}

impl CommandPayload for ReservationReport {
    fn write(&self, w: &mut Writer) {
        write_data_ptr(w, &self.data_ptr);
        w.u32(40, self.dword_count);
        let mut dword11 = 0u32;
        dword11.set_bit(0, self.extended_data_structure);
        w.u32(44, dword11);
    }

    fn read(r: &Reader, mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..24)?;
        r.reserved(48..64)?;
        r.reserved_bits(44, 1..=31)?;
        Ok(Self {
            data_ptr: read_data_ptr(r, mode)?,
            dword_count: r.u32(40),
            extended_data_structure: r.u32(44).get_bit(0),
        })
    }

    fn data_ptr(&self) -> Option<&DataPtr> {
        Some(&self.data_ptr)
    }
}

/// Reservation acquire command
///
/// The data buffer holds a [ReservationKeys] structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationAcquire {
    pub data_ptr: DataPtr,
    pub action: AcquireAction,
    /// ignore existing key
    pub ignore_key: bool,
    pub reservation_type: ReservationType,
}

impl CommandPayload for ReservationAcquire {
    fn write(&self, w: &mut Writer) {
        write_data_ptr(w, &self.data_ptr);
        let mut dword10 = 0u32;
        dword10.set_bits(0..=2, u8::from(self.action) as u32);
        dword10.set_bit(3, self.ignore_key);
        dword10.set_bits(8..=15, u8::from(self.reservation_type) as u32);
        w.u32(40, dword10);
    }

    fn read(r: &Reader, mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..24)?;
        r.reserved(44..64)?;
        r.reserved_bits(40, 4..=7)?;
        r.reserved_bits(40, 16..=31)?;
        let dword10 = r.u32(40);
        let action = AcquireAction::try_from(dword10.get_bits(0..=2) as u8)
            .map_err(|e| WireError::invalid_field("racqa", e.value))?;
        let rtype = dword10.get_bits(8..=15) as u8;
        let reservation_type = ReservationType::decode(rtype, "rtype")?
            .ok_or(WireError::invalid_field("rtype", rtype))?;
        Ok(Self {
            data_ptr: read_data_ptr(r, mode)?,
            action,
            ignore_key: dword10.get_bit(3),
            reservation_type,
        })
    }

    fn data_ptr(&self) -> Option<&DataPtr> {
        Some(&self.data_ptr)
    }
}

/// Reservation release command
///
/// The data buffer holds the current reservation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationRelease {
    pub data_ptr: DataPtr,
    pub action: ReleaseAction,
    /// ignore existing key
    pub ignore_key: bool,
    /// the type of the reservation being released
    pub reservation_type: Option<ReservationType>,
}

impl CommandPayload for ReservationRelease {
    fn write(&self, w: &mut Writer) {
        write_data_ptr(w, &self.data_ptr);
        let mut dword10 = 0u32;
        dword10.set_bits(0..=2, u8::from(self.action) as u32);
        dword10.set_bit(3, self.ignore_key);
        dword10.set_bits(8..=15, ReservationType::encode(self.reservation_type) as u32);
        w.u32(40, dword10);
    }

    fn read(r: &Reader, mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..24)?;
        r.reserved(44..64)?;
        r.reserved_bits(40, 4..=7)?;
        r.reserved_bits(40, 16..=31)?;
        let dword10 = r.u32(40);
        let action = ReleaseAction::try_from(dword10.get_bits(0..=2) as u8)
            .map_err(|e| WireError::invalid_field("rrela", e.value))?;
        Ok(Self {
            data_ptr: read_data_ptr(r, mode)?,
            action,
            ignore_key: dword10.get_bit(3),
            reservation_type: ReservationType::decode(dword10.get_bits(8..=15) as u8, "rtype")?,
        })
    }

    fn data_ptr(&self) -> Option<&DataPtr> {
        Some(&self.data_ptr)
    }
}

/// Size of [ReservationKeys]
pub const RESERVATION_KEYS_SIZE: usize = 16;

/// Data buffer of the reservation register and reservation acquire commands
///
/// See: NVM Command Set Spec: Figure 67: Reservation Register Data Structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReservationKeys {
    pub current_key: u64,
    /// the new key for register, the preempted key for acquire
    pub other_key: u64,
}

impl ReservationKeys {
    pub fn encode(&self) -> [u8; RESERVATION_KEYS_SIZE] {
        let mut buf = [0u8; RESERVATION_KEYS_SIZE];
        let mut w = Writer::new(&mut buf);
        w.u64(0, self.current_key);
        w.u64(8, self.other_key);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let r = Reader::new(buf, RESERVATION_KEYS_SIZE, DecodeOptions::default())?;
        Ok(Self {
            current_key: r.u64(0),
            other_key: r.u64(8),
        })
    }
}

/// A controller registered with a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisteredController {
    pub controller_id: ControllerId,
    /// the controller holds the reservation
    pub holds_reservation: bool,
    /// 8 byte host id, or 16 byte host id for [ReservationStatusExt]
    pub host_id: [u8; 16],
    pub reservation_key: u64,
}

const RESERVATION_STATUS_HEADER_SIZE: usize = 24;
const REGISTERED_CONTROLLER_SIZE: usize = 24;
const RESERVATION_STATUS_EXT_HEADER_SIZE: usize = 64;
const REGISTERED_CONTROLLER_EXT_SIZE: usize = 64;

/// The header fields shared by both reservation status layouts
fn read_status_header(
    r: &Reader,
) -> Result<(u32, Option<ReservationType>, u16, bool), WireError> {
    r.reserved(7..9)?;
    Ok((
        r.u32(0),
        ReservationType::decode(r.u8(4), "rtype")?,
        r.u16(5),
        r.u8(9).get_bit(0),
    ))
}

/// Check that `buf` holds `count` entries after the header, before anything is allocated
fn check_entries(
    buf: &[u8],
    header_size: usize,
    entry_size: usize,
    count: u16,
) -> Result<usize, WireError> {
    let expected = header_size + count as usize * entry_size;
    if buf.len() < expected {
        return Err(WireError::LengthMismatch {
            expected,
            actual: buf.len(),
        });
    }
    Ok(expected)
}

/// Response to a [ReservationReport] command
///
/// See: NVM Command Set Spec: Figure 68: Reservation Status Data Structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationStatus {
    pub generation: u32,
    pub reservation_type: Option<ReservationType>,
    /// persist through power loss state
    pub persist_through_power_loss: bool,
    pub registered_controllers: Vec<RegisteredController>,
}

impl ReservationStatus {
    /// Parse a reservation status data structure.
    ///
    /// Bytes after the last registered controller are ignored.
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        Self::parse_with(buf, DecodeOptions::default())
    }

    pub fn parse_with(buf: &[u8], options: DecodeOptions) -> Result<Self, WireError> {
        let header = buf.get(..RESERVATION_STATUS_HEADER_SIZE).ok_or(WireError::LengthMismatch {
            expected: RESERVATION_STATUS_HEADER_SIZE,
            actual: buf.len(),
        })?;
        let r = Reader::new(header, RESERVATION_STATUS_HEADER_SIZE, options)?;
        r.reserved(10..24)?;
        let (generation, reservation_type, count, persist_through_power_loss) =
            read_status_header(&r)?;

        let len = check_entries(buf, RESERVATION_STATUS_HEADER_SIZE, REGISTERED_CONTROLLER_SIZE, count)?;
        trace!("reservation status with {count} registered controllers");

        let entries = Reader::new(&buf[..len], len, options)?;
        let registered_controllers = (0..count as usize)
            .map(|i| {
                let start = RESERVATION_STATUS_HEADER_SIZE + i * REGISTERED_CONTROLLER_SIZE;
                let e = entries.sub(start..start + REGISTERED_CONTROLLER_SIZE);
                e.reserved(3..8)?;
                let mut host_id = [0u8; 16];
                host_id[..8].copy_from_slice(e.slice(8..16));
                Ok(RegisteredController {
                    controller_id: ControllerId(e.u16(0)),
                    holds_reservation: e.u8(2).get_bit(0),
                    host_id,
                    reservation_key: e.u64(16),
                })
            })
            .collect::<Result<Vec<_>, WireError>>()?;

        Ok(Self {
            generation,
            reservation_type,
            persist_through_power_loss,
            registered_controllers,
        })
    }

    /// Encode the structure, used by targets answering a reservation report
    pub fn encode(&self) -> Vec<u8> {
        let len = RESERVATION_STATUS_HEADER_SIZE
            + self.registered_controllers.len() * REGISTERED_CONTROLLER_SIZE;
        let mut buf = alloc::vec![0u8; len];
        let mut w = Writer::new(&mut buf);
        w.u32(0, self.generation);
        w.u8(4, ReservationType::encode(self.reservation_type));
        w.u16(5, self.registered_controllers.len() as u16);
        w.u8(9, self.persist_through_power_loss as u8);
        for (i, controller) in self.registered_controllers.iter().enumerate() {
            let start = RESERVATION_STATUS_HEADER_SIZE + i * REGISTERED_CONTROLLER_SIZE;
            w.u16(start, controller.controller_id.as_u16());
            w.u8(start + 2, controller.holds_reservation as u8);
            w.bytes(start + 8, &controller.host_id[..8]);
            w.u64(start + 16, controller.reservation_key);
        }
        buf
    }
}

/// Response to a [ReservationReport] command with an extended data structure
///
/// See: NVM Command Set Spec: Figure 69: Reservation Status Extended Data Structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationStatusExt {
    pub generation: u32,
    pub reservation_type: Option<ReservationType>,
    pub persist_through_power_loss: bool,
    pub registered_controllers: Vec<RegisteredController>,
}

impl ReservationStatusExt {
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        Self::parse_with(buf, DecodeOptions::default())
    }

    pub fn parse_with(buf: &[u8], options: DecodeOptions) -> Result<Self, WireError> {
        let header =
            buf.get(..RESERVATION_STATUS_EXT_HEADER_SIZE).ok_or(WireError::LengthMismatch {
                expected: RESERVATION_STATUS_EXT_HEADER_SIZE,
                actual: buf.len(),
            })?;
        let r = Reader::new(header, RESERVATION_STATUS_EXT_HEADER_SIZE, options)?;
        r.reserved(10..64)?;
        let (generation, reservation_type, count, persist_through_power_loss) =
            read_status_header(&r)?;

        let len = check_entries(
            buf,
            RESERVATION_STATUS_EXT_HEADER_SIZE,
            REGISTERED_CONTROLLER_EXT_SIZE,
            count,
        )?;
        trace!("extended reservation status with {count} registered controllers");

        let entries = Reader::new(&buf[..len], len, options)?;
        let registered_controllers = (0..count as usize)
            .map(|i| {
                let start = RESERVATION_STATUS_EXT_HEADER_SIZE + i * REGISTERED_CONTROLLER_EXT_SIZE;
                let e = entries.sub(start..start + REGISTERED_CONTROLLER_EXT_SIZE);
                e.reserved(3..8)?;
                e.reserved(32..64)?;
                Ok(RegisteredController {
                    controller_id: ControllerId(e.u16(0)),
                    holds_reservation: e.u8(2).get_bit(0),
                    host_id: e.array(16),
                    reservation_key: e.u64(8),
                })
            })
            .collect::<Result<Vec<_>, WireError>>()?;

        Ok(Self {
            generation,
            reservation_type,
            persist_through_power_loss,
            registered_controllers,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::vec;
    use shared::test_utils::init_test_logger;

    #[test]
    fn acquire_dword() {
        let acquire = ReservationAcquire {
            data_ptr: DataPtr::prp(0x1000),
            action: AcquireAction::Preempt,
            ignore_key: true,
            reservation_type: ReservationType::ExclusiveAccessRegistrantsOnly,
        };
        let mut entry = [0u8; 64];
        acquire.write(&mut Writer::new(&mut entry));
        assert_eq!([0b1001, 4, 0, 0], entry[40..44]);

        let r = Reader::new(&entry, 64, DecodeOptions::STRICT).unwrap();
        assert_eq!(Ok(acquire), ReservationAcquire::read(&r, TransferMode::Prp));

        entry[41] = 0;
        let r = Reader::new(&entry, 64, DecodeOptions::STRICT).unwrap();
        assert!(ReservationAcquire::read(&r, TransferMode::Prp).is_err());
    }

    #[test]
    fn acquire_reserved_bits() {
        let acquire = ReservationAcquire {
            data_ptr: DataPtr::prp(0x1000),
            action: AcquireAction::Acquire,
            ignore_key: false,
            reservation_type: ReservationType::WriteExclusive,
        };
        let mut entry = [0u8; 64];
        acquire.write(&mut Writer::new(&mut entry));
        entry[42] = 0x02;
        let r = Reader::new(&entry, 64, DecodeOptions::STRICT).unwrap();
        assert_eq!(
            Err(WireError::MalformedReserved { offset: 42 }),
            ReservationAcquire::read(&r, TransferMode::Prp)
        );
        let r = Reader::new(&entry, 64, DecodeOptions::LENIENT).unwrap();
        assert_eq!(Ok(acquire), ReservationAcquire::read(&r, TransferMode::Prp));
    }

    #[test]
    fn register_persist_bits() {
        let register = ReservationRegister {
            data_ptr: DataPtr::prp(0x1000),
            action: RegisterAction::Replace,
            ignore_key: false,
            persist_through_power_loss: PersistThroughPowerLoss::Set,
        };
        let mut entry = [0u8; 64];
        register.write(&mut Writer::new(&mut entry));
        assert_eq!([0b010, 0, 0, 0xc0], entry[40..44]);

        entry[43] = 0x40;
        let r = Reader::new(&entry, 64, DecodeOptions::STRICT).unwrap();
        assert_eq!(
            Err(WireError::InvalidField {
                field: "cptpl",
                value: 1
            }),
            ReservationRegister::read(&r, TransferMode::Prp)
        );
    }

    #[test]
    fn keys_layout() {
        let keys = ReservationKeys {
            current_key: 0x1111,
            other_key: 0x2222,
        };
        let bytes = keys.encode();
        assert_eq!([0x11, 0x11], bytes[0..2]);
        assert_eq!([0x22, 0x22], bytes[8..10]);
        assert_eq!(Ok(keys), ReservationKeys::decode(&bytes));
    }

    #[test]
    fn parse_status() {
        init_test_logger();
        let status = ReservationStatus {
            generation: 7,
            reservation_type: Some(ReservationType::WriteExclusive),
            persist_through_power_loss: true,
            registered_controllers: vec![
                RegisteredController {
                    controller_id: ControllerId(1),
                    holds_reservation: true,
                    host_id: [0xab, 0, 0, 0, 0, 0, 0, 0xcd, 0, 0, 0, 0, 0, 0, 0, 0],
                    reservation_key: 0xfeed,
                },
                RegisteredController {
                    controller_id: ControllerId(2),
                    holds_reservation: false,
                    host_id: [0; 16],
                    reservation_key: 0xbeef,
                },
            ],
        };
        let bytes = status.encode();
        assert_eq!(24 + 2 * 24, bytes.len());
        assert_eq!([2, 0], bytes[5..7]);
        assert_eq!(Ok(status), ReservationStatus::parse_with(&bytes, DecodeOptions::STRICT));
    }

    #[test]
    fn status_count_exceeds_buffer() {
        let mut bytes = vec![0u8; 24 + 24];
        bytes[5] = 2;
        assert_eq!(
            Err(WireError::LengthMismatch {
                expected: 72,
                actual: 48
            }),
            ReservationStatus::parse(&bytes)
        );
        assert!(ReservationStatus::parse(&bytes[..10]).is_err());
    }

    #[test]
    fn parse_extended_status() {
        let mut bytes = vec![0u8; 64 + 64];
        bytes[0] = 3;
        bytes[4] = ReservationType::ExclusiveAccess.into();
        bytes[5] = 1;
        bytes[64] = 5;
        bytes[66] = 1;
        bytes[72..80].copy_from_slice(&0x1234u64.to_le_bytes());
        bytes[80..96].copy_from_slice(&[0x77; 16]);

        let status = ReservationStatusExt::parse(&bytes).unwrap();
        assert_eq!(3, status.generation);
        assert_eq!(Some(ReservationType::ExclusiveAccess), status.reservation_type);
        assert_eq!(1, status.registered_controllers.len());
        let controller = status.registered_controllers[0];
        assert_eq!(ControllerId(5), controller.controller_id);
        assert!(controller.holds_reservation);
        assert_eq!(0x1234, controller.reservation_key);
        assert_eq!([0x77; 16], controller.host_id);
    }
}
