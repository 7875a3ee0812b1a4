use alloc::{string::String, vec::Vec};
use bitflags::bitflags;
use log::trace;
use shared_derive::U8Enum;

use crate::{
    codec::{DecodeOptions, Le128, Reader, Writer},
    generic_command::{read_data_ptr, write_data_ptr, CommandPayload, DataPtr, TransferMode},
    properties::Version,
    WireError,
};

/// The size of every identify data structure
pub const IDENTIFY_DATA_SIZE: usize = 4096;

/// CNS Value
///
/// See: NVM Express Base Spec: Figure 274: Identify CNS Value
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum)]
pub enum Cns {
    Namespace = 0x00,
    Controller = 0x01,
    ActiveNamespaceList = 0x02,
    NamespaceDescriptorList = 0x03,
    AllocatedNamespaceList = 0x10,
    AllocatedNamespace = 0x11,
    NamespaceControllerList = 0x12,
    ControllerList = 0x13,
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ControllerId(pub u16);

impl ControllerId {
    /// The smallest controller id a fabrics target hands out
    pub const MIN: ControllerId = ControllerId(1);
    /// The largest static controller id a fabrics target hands out
    pub const MAX: ControllerId = ControllerId(0xffef);
    /// Requests a dynamically allocated controller in a fabrics connect
    pub const DYNAMIC: ControllerId = ControllerId(0xffff);

    #[inline]
    pub fn as_u16(self) -> u16 {
        self.0
    }
}

/// The identify command
///
/// The namespace id is part of the command header.
///
/// See: NVM Express Base Spec: 5.17 Identify command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identify {
    pub data_ptr: DataPtr,
    pub cns: Cns,
    /// only used by the controller list CNS values
    pub controller_id: ControllerId,
}

impl Identify {
    pub fn new(cns: Cns, data_ptr: DataPtr) -> Self {
        Self {
            data_ptr,
            cns,
            controller_id: ControllerId::default(),
        }
    }
}

impl CommandPayload for Identify {
    fn write(&self, w: &mut Writer) {
        write_data_ptr(w, &self.data_ptr);
        w.u8(40, self.cns.into());
        w.u16(42, self.controller_id.as_u16());
    }

    fn read(r: &Reader, mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..24)?;
        r.reserved(41..42)?;
        r.reserved(44..64)?;
        let cns = Cns::try_from(r.u8(40)).map_err(|e| WireError::invalid_field("cns", e.value))?;
        Ok(Self {
            data_ptr: read_data_ptr(r, mode)?,
            cns,
            controller_id: ControllerId(r.u16(42)),
        })
    }

    fn data_ptr(&self) -> Option<&DataPtr> {
        Some(&self.data_ptr)
    }
}

bitflags! {
    /// Bitflag describing the optional admin commands supported by a controller
    ///
    /// See: NVM Express Base Spec: Figure 276: Identify Controller Data Structure: OACS
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[allow(missing_docs)]
    pub struct OptionalAdminCommands: u16 {
        const SECURITY = 1 << 0;
        const FORMAT_NVM = 1 << 1;
        const FIRMWARE = 1 << 2;
        const NAMESPACE_MANAGMENT = 1 << 3;
        const DEVICE_SELF_TEST = 1 << 4;
        const DIRECTIVES = 1 << 5;
        const NVME_MI = 1 << 6;
        const VIRTUALIZATION = 1 << 7;
        const DOORBELL_BUFFER_CONFIG = 1 << 8;

        const _ = !0;
    }

    /// Bitflag describing the optional NVM commands supported by a controller
    ///
    /// See: NVM Express Base Spec: Figure 276: Identify Controller Data Structure: ONCS
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[allow(missing_docs)]
    pub struct OptionalNvmCommands: u16 {
        const COMPARE = 1 << 0;
        const WRITE_UNCORRECTABLE = 1 << 1;
        const DATASET_MANAGEMENT = 1 << 2;
        const WRITE_ZEROES = 1 << 3;
        const SAVE_SELECT = 1 << 4;
        const RESERVATIONS = 1 << 5;
        const TIMESTAMP = 1 << 6;

        const _ = !0;
    }

    /// Bitflag describing the supported Fused NVME commands
    ///
    /// See: NVM Command Set Spec: 2.3.1 Fused Operations
    /// See: NVM Express Base Spec: Figure 276: Identify Controller Data Structure: FUSES
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[allow(missing_docs)]
    pub struct Fuses: u16 {
        const COMPARE_AND_WRITE = 1;

        const _ = !0;
    }

    /// See: NVM Express Base Spec: Figure 276: Identify Controller Data Structure: LPA
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[allow(missing_docs)]
    pub struct LogPageAttributes: u8 {
        const SMART_PER_NAMESPACE = 1 << 0;
        const COMMAND_EFFECTS = 1 << 1;
        const EXTENDED_DATA = 1 << 2;

        const _ = !0;
    }

    /// See: NVM Express Base Spec: Figure 277: Power State Descriptor Data Structure
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[allow(missing_docs)]
    pub struct PowerStateFlags: u8 {
        /// max power is given in 0.0001 W instead of 0.01 W
        const MAX_POWER_SCALE = 1 << 0;
        const NON_OPERATIONAL = 1 << 1;

        const _ = !0;
    }
}

/// Size of a [PowerStateDescriptor]
pub const POWER_STATE_DESCRIPTOR_SIZE: usize = 32;

/// See: NVM Express Base Spec: Figure 277: Power State Descriptor Data Structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerStateDescriptor {
    /// in centiwatts, see [PowerStateFlags::MAX_POWER_SCALE]
    pub max_power: u16,
    pub flags: PowerStateFlags,
    /// microseconds
    pub entry_latency: u32,
    /// microseconds
    pub exit_latency: u32,
    pub relative_read_throughput: u8,
    pub relative_read_latency: u8,
    pub relative_write_throughput: u8,
    pub relative_write_latency: u8,
    pub idle_power: u16,
    pub idle_power_scale: u8,
    pub active_power: u16,
    pub active_power_workload_scale: u8,
}

impl PowerStateDescriptor {
    fn read(r: &Reader) -> Self {
        Self {
            max_power: r.u16(0),
            flags: PowerStateFlags::from_bits_retain(r.u8(3)),
            entry_latency: r.u32(4),
            exit_latency: r.u32(8),
            relative_read_throughput: r.u8(12),
            relative_read_latency: r.u8(13),
            relative_write_throughput: r.u8(14),
            relative_write_latency: r.u8(15),
            idle_power: r.u16(16),
            idle_power_scale: r.u8(18),
            active_power: r.u16(20),
            active_power_workload_scale: r.u8(22),
        }
    }
}

/// Information about a Controller
///
/// See: NVM Express Base Spec: Figure 276: Identify Controller Data Structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyControllerData {
    pub pci_vendor_id: u16,
    pub pci_subsystem_vendor_id: u16,
    pub serial_number: String,
    pub model_number: String,
    pub firmware_revison: String,
    pub recommended_arbitration_burst: u8,
    pub ieee_oui_identifier: [u8; 3],
    pub cmic: u8,
    /// power of two in units of the minimum memory page size, `0` for no limit
    pub maximum_data_transfer_size: u8,
    pub controller_id: ControllerId,
    pub version: Version,
    pub rtd3_resume_latency: u32,
    pub rtd3_entry_latency: u32,
    pub optional_async_events_supported: u32,
    pub controller_attributes: u32,
    pub optional_admin_commands: OptionalAdminCommands,
    pub abort_command_limit: u8,
    pub async_event_request_limit: u8,
    pub firmware_updates: u8,
    pub log_page_attributes: LogPageAttributes,
    pub error_log_page_entries: u8,
    /// 0 based
    pub number_of_power_states: u8,
    pub admin_vendor_specific_config: u8,
    pub autonomous_power_state_attributes: u8,
    /// kelvin
    pub warning_composite_temperature_threshold: u16,
    /// kelvin
    pub critical_composite_temperature_threshold: u16,
    pub maximum_firmware_activation_time: u16,
    pub host_memory_buffer_preferred_size: u32,
    pub host_memory_buffer_minimum_size: u32,
    /// bytes
    pub total_nvm_capacity: Le128,
    /// bytes
    pub unallocated_nvm_capacity: Le128,
    pub replay_protected_memory_block_support: u32,
    pub extended_device_self_test_time: u16,
    pub device_self_test_options: u8,
    pub firmware_update_granularity: u8,
    /// 100ms granularity, `0` if keep alive is not supported
    pub keep_alive_support: u16,
    pub host_controlled_thermal_management_attributes: u16,
    pub minimum_thermal_management_temperature: u16,
    pub maximum_thermal_management_temperature: u16,
    pub sanitize_capabilities: u32,
    pub host_memory_buffer_minimum_descriptor_entry_size: u32,
    pub host_memory_maximum_descriptors_entries: u16,
    /// required (bits 0..=3) and maximum (bits 4..=7) entry size as power of two
    pub submission_queue_entry_size: u8,
    /// required (bits 0..=3) and maximum (bits 4..=7) entry size as power of two
    pub completion_queue_entry_size: u8,
    pub maximum_outstanding_commands: u16,
    pub number_of_namespaces: u32,
    pub optional_nvm_commands: OptionalNvmCommands,
    pub fuses: Fuses,
    pub format_nvm_attributes: u8,
    pub volatile_write_cache: u8,
    pub atomic_write_unit_normal: u16,
    pub atomic_write_unit_power_fail: u16,
    pub nvm_vendor_specific_config: u8,
    pub atomic_compare_write_unit: u16,
    pub sgl_support: u32,
    pub subsystem_nqn: String,
    /// fabrics: 16 byte units
    pub io_queue_command_capsule_size: u32,
    /// fabrics: 16 byte units
    pub io_queue_response_capsule_size: u32,
    /// fabrics: 16 byte units
    pub in_capsule_data_offset: u16,
    pub fabrics_controller_attributes: u8,
    pub maximum_sgl_data_block_descriptors: u8,
    pub power_states: [PowerStateDescriptor; 32],
    pub vendor_specific: Vec<u8>,
}

impl IdentifyControllerData {
    /// Parse the data returned by an identify command with [Cns::Controller]
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        Self::parse_with(buf, DecodeOptions::default())
    }

    pub fn parse_with(buf: &[u8], options: DecodeOptions) -> Result<Self, WireError> {
        let r = Reader::new(buf, IDENTIFY_DATA_SIZE, options)?;

        r.reserved(100..256)?;
        r.reserved(338..512)?;
        r.reserved(531..532)?;
        r.reserved(534..536)?;
        r.reserved(540..768)?;
        r.reserved(1024..1792)?;
        r.reserved(1804..2048)?;

        let mut power_states = [PowerStateDescriptor::default(); 32];
        for (i, state) in power_states.iter_mut().enumerate() {
            let start = 2048 + i * POWER_STATE_DESCRIPTOR_SIZE;
            *state = PowerStateDescriptor::read(&r.sub(start..start + POWER_STATE_DESCRIPTOR_SIZE));
        }

        let data = Self {
            pci_vendor_id: r.u16(0),
            pci_subsystem_vendor_id: r.u16(2),
            serial_number: r.ascii(4..24, "sn")?,
            model_number: r.ascii(24..64, "mn")?,
            firmware_revison: r.ascii(64..72, "fr")?,
            recommended_arbitration_burst: r.u8(72),
            ieee_oui_identifier: r.array(73),
            cmic: r.u8(76),
            maximum_data_transfer_size: r.u8(77),
            controller_id: ControllerId(r.u16(78)),
            version: Version::from(r.u32(80)),
            rtd3_resume_latency: r.u32(84),
            rtd3_entry_latency: r.u32(88),
            optional_async_events_supported: r.u32(92),
            controller_attributes: r.u32(96),
            optional_admin_commands: OptionalAdminCommands::from_bits_retain(r.u16(256)),
            abort_command_limit: r.u8(258),
            async_event_request_limit: r.u8(259),
            firmware_updates: r.u8(260),
            log_page_attributes: LogPageAttributes::from_bits_retain(r.u8(261)),
            error_log_page_entries: r.u8(262),
            number_of_power_states: r.u8(263),
            admin_vendor_specific_config: r.u8(264),
            autonomous_power_state_attributes: r.u8(265),
            warning_composite_temperature_threshold: r.u16(266),
            critical_composite_temperature_threshold: r.u16(268),
            maximum_firmware_activation_time: r.u16(270),
            host_memory_buffer_preferred_size: r.u32(272),
            host_memory_buffer_minimum_size: r.u32(276),
            total_nvm_capacity: r.le128(280),
            unallocated_nvm_capacity: r.le128(296),
            replay_protected_memory_block_support: r.u32(312),
            extended_device_self_test_time: r.u16(316),
            device_self_test_options: r.u8(318),
            firmware_update_granularity: r.u8(319),
            keep_alive_support: r.u16(320),
            host_controlled_thermal_management_attributes: r.u16(322),
            minimum_thermal_management_temperature: r.u16(324),
            maximum_thermal_management_temperature: r.u16(326),
            sanitize_capabilities: r.u32(328),
            host_memory_buffer_minimum_descriptor_entry_size: r.u32(332),
            host_memory_maximum_descriptors_entries: r.u16(336),
            submission_queue_entry_size: r.u8(512),
            completion_queue_entry_size: r.u8(513),
            maximum_outstanding_commands: r.u16(514),
            number_of_namespaces: r.u32(516),
            optional_nvm_commands: OptionalNvmCommands::from_bits_retain(r.u16(520)),
            fuses: Fuses::from_bits_retain(r.u16(522)),
            format_nvm_attributes: r.u8(524),
            volatile_write_cache: r.u8(525),
            atomic_write_unit_normal: r.u16(526),
            atomic_write_unit_power_fail: r.u16(528),
            nvm_vendor_specific_config: r.u8(530),
            atomic_compare_write_unit: r.u16(532),
            sgl_support: r.u32(536),
            subsystem_nqn: r.ascii(768..1024, "subnqn")?,
            io_queue_command_capsule_size: r.u32(1792),
            io_queue_response_capsule_size: r.u32(1796),
            in_capsule_data_offset: r.u16(1800),
            fabrics_controller_attributes: r.u8(1802),
            maximum_sgl_data_block_descriptors: r.u8(1803),
            power_states,
            vendor_specific: r.slice(3072..4096).to_vec(),
        };
        trace!(
            "identify controller: {} {} fw {}",
            data.model_number,
            data.serial_number,
            data.firmware_revison
        );
        Ok(data)
    }

    /// The power states reported by the controller
    pub fn valid_power_states(&self) -> &[PowerStateDescriptor] {
        let count = (self.number_of_power_states as usize + 1).min(self.power_states.len());
        &self.power_states[..count]
    }

    pub fn has_volatile_write_cache(&self) -> bool {
        self.volatile_write_cache & 1 != 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::vec;
    use shared::test_utils::init_test_logger;

    fn controller_page() -> Vec<u8> {
        let mut page = vec![0u8; IDENTIFY_DATA_SIZE];
        let mut w = Writer::new(&mut page);
        w.u16(0, 0x1b36);
        w.u16(2, 0x1af4);
        w.padded(4..24, b"SN 0042", b' ');
        w.padded(24..64, b"QEMU NVMe Ctrl", b' ');
        w.padded(64..72, b"8.0.0", b' ');
        w.u8(77, 7);
        w.u16(78, 0x21);
        w.u32(80, 0x0001_0400);
        w.u16(256, 0x012a);
        w.u8(263, 1);
        w.bytes(280, &0x1_0000_0000_0000_0000u128.to_le_bytes());
        w.u8(512, 0x66);
        w.u8(513, 0x44);
        w.u32(516, 256);
        w.u16(520, 0x005f);
        w.u8(525, 1);
        w.u32(536, 0x0010_0001);
        w.padded(768..1024, b"nqn.2019-08.org.qemu:serial", 0);
        w.u32(1792, 4);
        w.u16(2048, 2500);
        w.u32(2048 + 4, 10);
        w.u16(2048 + 32, 1500);
        w.u8(2048 + 32 + 3, 0b10);
        w.u8(3072, 0xaa);
        page
    }

    #[test]
    fn parse_controller() {
        init_test_logger();
        let data = IdentifyControllerData::parse(&controller_page()).unwrap();

        assert_eq!(0x1b36, data.pci_vendor_id);
        assert_eq!(0x1af4, data.pci_subsystem_vendor_id);
        assert_eq!("SN 0042", data.serial_number);
        assert_eq!("QEMU NVMe Ctrl", data.model_number);
        assert_eq!("8.0.0", data.firmware_revison);
        assert_eq!(7, data.maximum_data_transfer_size);
        assert_eq!(ControllerId(0x21), data.controller_id);
        assert_eq!(Version::new(1, 4, 0), data.version);
        assert!(data
            .optional_admin_commands
            .contains(OptionalAdminCommands::NAMESPACE_MANAGMENT | OptionalAdminCommands::DIRECTIVES));
        assert_eq!(1u128 << 64, data.total_nvm_capacity.get());
        assert_eq!(0x66, data.submission_queue_entry_size);
        assert_eq!(256, data.number_of_namespaces);
        assert!(data
            .optional_nvm_commands
            .contains(OptionalNvmCommands::WRITE_ZEROES | OptionalNvmCommands::TIMESTAMP));
        assert!(data.has_volatile_write_cache());
        assert_eq!("nqn.2019-08.org.qemu:serial", data.subsystem_nqn);
        assert_eq!(4, data.io_queue_command_capsule_size);
        assert_eq!(0xaa, data.vendor_specific[0]);
        assert_eq!(1024, data.vendor_specific.len());

        let states = data.valid_power_states();
        assert_eq!(2, states.len());
        assert_eq!(2500, states[0].max_power);
        assert_eq!(10, states[0].entry_latency);
        assert_eq!(1500, states[1].max_power);
        assert!(states[1].flags.contains(PowerStateFlags::NON_OPERATIONAL));
    }

    #[test]
    fn controller_requires_full_page() {
        let page = vec![0u8; 512];
        assert_eq!(
            Err(WireError::LengthMismatch {
                expected: IDENTIFY_DATA_SIZE,
                actual: 512
            }),
            IdentifyControllerData::parse(&page)
        );
    }

    #[test]
    fn strict_parse_rejects_reserved_bytes() {
        let mut page = controller_page();
        page[1030] = 1;
        assert_eq!(
            Err(WireError::MalformedReserved { offset: 1030 }),
            IdentifyControllerData::parse_with(&page, DecodeOptions::STRICT)
        );
        assert!(IdentifyControllerData::parse_with(&page, DecodeOptions::LENIENT).is_ok());
    }

    #[test]
    fn non_ascii_serial_is_rejected() {
        let mut page = controller_page();
        page[4] = 0xc3;
        assert_eq!(
            Err(WireError::InvalidString { field: "sn" }),
            IdentifyControllerData::parse(&page)
        );
    }

    #[test]
    fn identify_command_layout() {
        let identify = Identify {
            data_ptr: DataPtr::prp(0x8000),
            cns: Cns::ControllerList,
            controller_id: ControllerId(3),
        };
        let mut entry = [0u8; 64];
        identify.write(&mut Writer::new(&mut entry));
        assert_eq!(0x8000u64.to_le_bytes(), entry[24..32]);
        assert_eq!(0x13, entry[40]);
        assert_eq!([3, 0], entry[42..44]);

        let r = Reader::new(&entry, 64, DecodeOptions::STRICT).unwrap();
        assert_eq!(Ok(identify), Identify::read(&r, TransferMode::Prp));
    }
}
