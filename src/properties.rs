//! Structs and accessors for the NVMe Controller Properties
//!
//! Over PCIe the properties are memory mapped registers, over fabrics they are read
//! with property get and written with property set commands.
//!
//! The specification documents can be found at <https://nvmexpress.org/specifications/>
//! specifically: NVM Express Base Specification

use core::ops::RangeInclusive;

use bit_field::BitField;
use shared_derive::U8Enum;

use crate::WireError;

/// Offsets of the controller properties
///
/// See: NVM Express Base Spec: Figure 33: Property Definition
#[allow(missing_docs)]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Capabilities = 0x00,
    Version = 0x08,
    InterruptMaskSet = 0x0c,
    InterruptMaskClear = 0x10,
    ControllerConfiguration = 0x14,
    ControllerStatus = 0x1c,
    SubsystemReset = 0x20,
    AdminQueueAttributes = 0x24,
    AdminSubmissionQueueBase = 0x28,
    AdminCompletionQueueBase = 0x30,
    ControllerMemoryBufferLocation = 0x38,
    ControllerMemoryBufferSize = 0x3c,
    BootPartitionInfo = 0x40,
    BootPartitionReadSelect = 0x44,
    BootPartitionMemoryBufferLocation = 0x48,
}

impl Property {
    pub fn offset(self) -> u32 {
        self as u32
    }

    /// Size of the property in bytes
    pub fn size(self) -> usize {
        match self {
            Property::Capabilities
            | Property::AdminSubmissionQueueBase
            | Property::AdminCompletionQueueBase
            | Property::BootPartitionMemoryBufferLocation => 8,
            _ => 4,
        }
    }
}

/// Offset of the first doorbell register in the PCIe register space
pub const DOORBELL_OFFSET: u64 = 0x1000;

/// Extract the bits in `bits` of a register value
#[inline]
pub fn register_field(value: u64, bits: RangeInclusive<usize>) -> u64 {
    value.get_bits(bits)
}

/// Store `value` in `bits` of `register`.
///
/// Fails if `value` is wider than the field.
fn set_register_field<T: BitField + TryFrom<u64>>(
    register: &mut T,
    bits: RangeInclusive<usize>,
    value: impl Into<u64>,
    field: &'static str,
) -> Result<(), WireError> {
    let value = value.into();
    let width = bits.end() + 1 - bits.start();
    if value.checked_shr(width as u32).unwrap_or(0) != 0 {
        return Err(WireError::invalid_field(field, value));
    }
    let value = T::try_from(value).map_err(|_| WireError::invalid_field(field, value))?;
    register.set_bits(bits, value);
    Ok(())
}

/// CAP.MQES: 0 based maximum queue size
pub fn cap_mqes(cap: u64) -> u16 {
    register_field(cap, 0..=15) as u16
}

/// CAP.TO: worst case time to become ready, in 500ms units
pub fn cap_timeout(cap: u64) -> u8 {
    register_field(cap, 24..=31) as u8
}

/// CAP.DSTRD: doorbell stride as `2 ^ (2 + DSTRD)` bytes
pub fn cap_stride(cap: u64) -> u8 {
    register_field(cap, 32..=35) as u8
}

/// CAP.NSSRS: NVM subsystem reset supported
pub fn cap_nssrs(cap: u64) -> bool {
    cap.get_bit(36)
}

/// CAP.MPSMIN: minimum memory page size as `2 ^ (12 + MPSMIN)`
pub fn cap_mpsmin(cap: u64) -> u8 {
    register_field(cap, 48..=51) as u8
}

/// CAP.MPSMAX: maximum memory page size as `2 ^ (12 + MPSMAX)`
pub fn cap_mpsmax(cap: u64) -> u8 {
    register_field(cap, 52..=55) as u8
}

/// CMBLOC.BIR: base indicator register of the controller memory buffer
pub fn cmb_bir(cmbloc: u32) -> u8 {
    cmbloc.get_bits(0..=2) as u8
}

/// CMBLOC.OFST: offset of the controller memory buffer in CMBSZ.SZU units
pub fn cmb_ofst(cmbloc: u32) -> u32 {
    cmbloc.get_bits(12..=31)
}

/// CMBSZ.SZ: size of the controller memory buffer in CMBSZ.SZU units
pub fn cmb_size(cmbsz: u32) -> u32 {
    cmbsz.get_bits(12..=31)
}

/// CMBSZ.SZU: size units as `2 ^ (12 + 4 * SZU)` bytes
pub fn cmb_size_unit(cmbsz: u32) -> u8 {
    cmbsz.get_bits(8..=11) as u8
}

/// CMBSZ.WDS: write data support
pub fn cmb_wds(cmbsz: u32) -> bool {
    cmbsz.get_bit(4)
}

/// CMBSZ.RDS: read data support
pub fn cmb_rds(cmbsz: u32) -> bool {
    cmbsz.get_bit(3)
}

/// CMBSZ.LISTS: PRP and SGL list support
pub fn cmb_lists(cmbsz: u32) -> bool {
    cmbsz.get_bit(2)
}

/// CMBSZ.CQS: completion queue support
pub fn cmb_cqs(cmbsz: u32) -> bool {
    cmbsz.get_bit(1)
}

/// CMBSZ.SQS: submission queue support
pub fn cmb_sqs(cmbsz: u32) -> bool {
    cmbsz.get_bit(0)
}

/// The size of the controller memory buffer in bytes, `None` for a reserved size unit
pub fn cmb_size_bytes(cmbsz: u32) -> Option<u64> {
    let unit = cmb_size_unit(cmbsz);
    if unit > 6 {
        return None;
    }
    Some((cmb_size(cmbsz) as u64) << (12 + 4 * unit as u32))
}

/// VS: the NVMe version implemented by a controller
///
/// See: NVM Express Base Spec: Figure 37: Offset 8h: VS
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    pub major: u16,
    pub minor: u8,
    pub tertiary: u8,
}

impl Version {
    pub const V1_0: Version = Version::new(1, 0, 0);
    pub const V1_1: Version = Version::new(1, 1, 0);
    pub const V1_2: Version = Version::new(1, 2, 0);
    pub const V1_3: Version = Version::new(1, 3, 0);
    pub const V1_4: Version = Version::new(1, 4, 0);

    pub const fn new(major: u16, minor: u8, tertiary: u8) -> Self {
        Self {
            major,
            minor,
            tertiary,
        }
    }
}

impl From<u32> for Version {
    fn from(value: u32) -> Self {
        Self {
            major: value.get_bits(16..=31) as u16,
            minor: value.get_bits(8..=15) as u8,
            tertiary: value.get_bits(0..=7) as u8,
        }
    }
}

impl From<Version> for u32 {
    fn from(value: Version) -> Self {
        (value.major as u32) << 16 | (value.minor as u32) << 8 | value.tertiary as u32
    }
}

impl core::fmt::Display for Version {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.tertiary)
    }
}

/// The capabilities of the NVMe Controller
///
/// See: NVM Express Base Spec: Figure 36: Offset 0h: CAP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// The maximum size of IO submission and completion queues.
    ///
    /// This is a 0 based value with a minimum of 1, so at least 2 entries
    pub maximum_queue_entries: u16,
    pub contiguous_queues_required: bool,
    pub arbitrations_supported: u8,

    reserved_1: u8,

    /// in 500ms units
    pub timeout: u8,
    /// stride as `2 ^ (2 + doorbell_stride_exponent)` bytes
    pub doorbell_stride_exponent: u8,
    pub subsystem_reset_supported: bool,
    pub command_sets_supported: u8,
    pub boot_partition_support: bool,
    pub power_scope: u8,
    /// page size as `2 ^ (12 + mem_min_page_size_exponent)` bytes
    pub mem_min_page_size_exponent: u8,
    /// page size as `2 ^ (12 + mem_max_page_size_exponent)` bytes
    pub mem_max_page_size_exponent: u8,
    pub persistent_memory_region_support: bool,
    pub memory_buffer_support: bool,
    pub subsystem_shutdown_support: bool,
    pub ready_modes_support: u8,

    reserved_2: u8,
}

impl Capabilities {
    pub fn doorbell_stride(&self) -> u64 {
        1 << (2 + self.doorbell_stride_exponent as u32)
    }

    pub fn mem_min_page_size(&self) -> u64 {
        1 << (12 + self.mem_min_page_size_exponent as u32)
    }

    pub fn mem_max_page_size(&self) -> u64 {
        1 << (12 + self.mem_max_page_size_exponent as u32)
    }
}

impl From<u64> for Capabilities {
    fn from(value: u64) -> Self {
        Self {
            maximum_queue_entries: cap_mqes(value),
            contiguous_queues_required: value.get_bit(16),
            arbitrations_supported: value.get_bits(17..=18) as u8,
            reserved_1: value.get_bits(19..=23) as u8,
            timeout: cap_timeout(value),
            doorbell_stride_exponent: cap_stride(value),
            subsystem_reset_supported: cap_nssrs(value),
            command_sets_supported: value.get_bits(37..=44) as u8,
            boot_partition_support: value.get_bit(45),
            power_scope: value.get_bits(46..=47) as u8,
            mem_min_page_size_exponent: cap_mpsmin(value),
            mem_max_page_size_exponent: cap_mpsmax(value),
            persistent_memory_region_support: value.get_bit(56),
            memory_buffer_support: value.get_bit(57),
            subsystem_shutdown_support: value.get_bit(58),
            ready_modes_support: value.get_bits(59..=60) as u8,
            reserved_2: value.get_bits(61..=63) as u8,
        }
    }
}

impl TryFrom<Capabilities> for u64 {
    type Error = WireError;

    fn try_from(value: Capabilities) -> Result<Self, Self::Error> {
        let mut cap = 0u64;
        cap.set_bits(0..=15, value.maximum_queue_entries as u64);
        cap.set_bit(16, value.contiguous_queues_required);
        set_register_field(&mut cap, 17..=18, value.arbitrations_supported, "cap.ams")?;
        cap.set_bits(19..=23, value.reserved_1 as u64);
        cap.set_bits(24..=31, value.timeout as u64);
        set_register_field(&mut cap, 32..=35, value.doorbell_stride_exponent, "cap.dstrd")?;
        cap.set_bit(36, value.subsystem_reset_supported);
        cap.set_bits(37..=44, value.command_sets_supported as u64);
        cap.set_bit(45, value.boot_partition_support);
        set_register_field(&mut cap, 46..=47, value.power_scope, "cap.cps")?;
        set_register_field(&mut cap, 48..=51, value.mem_min_page_size_exponent, "cap.mpsmin")?;
        set_register_field(&mut cap, 52..=55, value.mem_max_page_size_exponent, "cap.mpsmax")?;
        cap.set_bit(56, value.persistent_memory_region_support);
        cap.set_bit(57, value.memory_buffer_support);
        cap.set_bit(58, value.subsystem_shutdown_support);
        set_register_field(&mut cap, 59..=60, value.ready_modes_support, "cap.crms")?;
        cap.set_bits(61..=63, value.reserved_2 as u64);
        Ok(cap)
    }
}

/// The arbitration mechanism used for command queue prioritization
///
/// See: NVM Express Base Spec: Figure 46: Offset 14h: CC
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArbitrationMechanism {
    #[default]
    RoundRobin = 0b000,
    WeightedRoundRobin = 0b001,
    VendorSpecific = 0b111,
}

/// The configuration of the NVMe Controller
///
/// The arbitration mechanism is kept as raw bits, see
/// [Self::arbitration_mechanism], so that reserved encodings survive a round trip.
///
/// See: NVM Express Base Spec: Figure 46: Offset 14H: CC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerConfiguration {
    pub enable: bool,

    reserved_1: u8,

    /// 3 bit value set during initialization
    pub command_set_selected: u8,
    /// host page size as `2 ^ (12 + memory_page_size_exponent)` bytes
    pub memory_page_size_exponent: u8,
    pub arbitration_mechanism_bits: u8,
    pub shutdown_notification: u8,
    /// io submission queue entry size as `2 ^ value` bytes
    pub io_submission_queue_entry_size_exponent: u8,
    /// io completion queue entry size as `2 ^ value` bytes
    pub io_completion_queue_entry_size_exponent: u8,
    pub controller_ready_independent_of_media_enable: bool,

    reserved_2: u8,
}

impl ControllerConfiguration {
    pub fn arbitration_mechanism(&self) -> Option<ArbitrationMechanism> {
        ArbitrationMechanism::try_from(self.arbitration_mechanism_bits).ok()
    }

    pub fn set_arbitration_mechanism(&mut self, value: ArbitrationMechanism) {
        self.arbitration_mechanism_bits = value.into();
    }

    pub fn memory_page_size(&self) -> u64 {
        1 << (12 + self.memory_page_size_exponent as u32)
    }
}

impl From<u32> for ControllerConfiguration {
    fn from(value: u32) -> Self {
        Self {
            enable: value.get_bit(0),
            reserved_1: value.get_bits(1..=3) as u8,
            command_set_selected: value.get_bits(4..=6) as u8,
            memory_page_size_exponent: value.get_bits(7..=10) as u8,
            arbitration_mechanism_bits: value.get_bits(11..=13) as u8,
            shutdown_notification: value.get_bits(14..=15) as u8,
            io_submission_queue_entry_size_exponent: value.get_bits(16..=19) as u8,
            io_completion_queue_entry_size_exponent: value.get_bits(20..=23) as u8,
            controller_ready_independent_of_media_enable: value.get_bit(24),
            reserved_2: value.get_bits(25..=31) as u8,
        }
    }
}

impl TryFrom<ControllerConfiguration> for u32 {
    type Error = WireError;

    fn try_from(value: ControllerConfiguration) -> Result<Self, Self::Error> {
        let mut cc = 0u32;
        cc.set_bit(0, value.enable);
        cc.set_bits(1..=3, value.reserved_1 as u32);
        set_register_field(&mut cc, 4..=6, value.command_set_selected, "cc.css")?;
        set_register_field(&mut cc, 7..=10, value.memory_page_size_exponent, "cc.mps")?;
        set_register_field(&mut cc, 11..=13, value.arbitration_mechanism_bits, "cc.ams")?;
        set_register_field(&mut cc, 14..=15, value.shutdown_notification, "cc.shn")?;
        set_register_field(
            &mut cc,
            16..=19,
            value.io_submission_queue_entry_size_exponent,
            "cc.iosqes",
        )?;
        set_register_field(
            &mut cc,
            20..=23,
            value.io_completion_queue_entry_size_exponent,
            "cc.iocqes",
        )?;
        cc.set_bit(24, value.controller_ready_independent_of_media_enable);
        cc.set_bits(25..=31, value.reserved_2 as u32);
        Ok(cc)
    }
}

/// The shutdown status of an NVME controller
///
/// See: NVM Express Base Spec: Figure 47: Offset 1Ch: CSTS
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownStatus {
    /// No shutdown requested
    #[default]
    NormalOperation = 0,
    Occurring = 0b01,
    Complete = 0b10,
    Reserved = 0b11,
}

/// Status of the controller
///
/// See: NVM Express Base Spec: Figure 47: Offset 1CH: CSTS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerStatus {
    pub ready: bool,
    pub fatal_error: bool,
    pub shutdown_status: ShutdownStatus,
    pub subsystem_reset_occurred: bool,
    pub processing_paused: bool,
    pub shutdown_type: bool,
    reserved: u32,
}

impl From<u32> for ControllerStatus {
    fn from(value: u32) -> Self {
        Self {
            ready: value.get_bit(0),
            fatal_error: value.get_bit(1),
            // all 4 variants of the 2 bit value exist
            shutdown_status: ShutdownStatus::try_from(value.get_bits(2..=3) as u8)
                .unwrap_or_default(),
            subsystem_reset_occurred: value.get_bit(4),
            processing_paused: value.get_bit(5),
            shutdown_type: value.get_bit(6),
            reserved: value.get_bits(7..=31),
        }
    }
}

impl From<ControllerStatus> for u32 {
    fn from(value: ControllerStatus) -> Self {
        let mut csts = 0u32;
        csts.set_bit(0, value.ready);
        csts.set_bit(1, value.fatal_error);
        csts.set_bits(2..=3, u8::from(value.shutdown_status) as u32);
        csts.set_bit(4, value.subsystem_reset_occurred);
        csts.set_bit(5, value.processing_paused);
        csts.set_bit(6, value.shutdown_type);
        csts.set_bits(7..=31, value.reserved);
        csts
    }
}

/// AQA: Admin Queue Attributes
///
/// See: NVM Express base Spec: Figure 49: Offset 24h: AQA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdminQueueAttributes {
    /// 0 based, at most 4095
    pub submission_queue_size: u16,
    /// 0 based, at most 4095
    pub completion_queue_size: u16,

    reserved_1: u8,
    reserved_2: u8,
}

impl AdminQueueAttributes {
    /// Attributes for admin queues with the given number of entries.
    ///
    /// Returns `None` unless both sizes are in `2..=4096`.
    pub fn new(submission_entries: u16, completion_entries: u16) -> Option<Self> {
        let valid = 2..=4096;
        if !valid.contains(&submission_entries) || !valid.contains(&completion_entries) {
            return None;
        }
        Some(Self {
            submission_queue_size: submission_entries - 1,
            completion_queue_size: completion_entries - 1,
            ..Default::default()
        })
    }
}

impl From<u32> for AdminQueueAttributes {
    fn from(value: u32) -> Self {
        Self {
            submission_queue_size: value.get_bits(0..=11) as u16,
            completion_queue_size: value.get_bits(16..=27) as u16,
            reserved_1: value.get_bits(12..=15) as u8,
            reserved_2: value.get_bits(28..=31) as u8,
        }
    }
}

impl TryFrom<AdminQueueAttributes> for u32 {
    type Error = WireError;

    fn try_from(value: AdminQueueAttributes) -> Result<Self, Self::Error> {
        let mut aqa = 0u32;
        set_register_field(&mut aqa, 0..=11, value.submission_queue_size, "aqa.asqs")?;
        aqa.set_bits(12..=15, value.reserved_1 as u32);
        set_register_field(&mut aqa, 16..=27, value.completion_queue_size, "aqa.acqs")?;
        aqa.set_bits(28..=31, value.reserved_2 as u32);
        Ok(aqa)
    }
}
