use alloc::{string::String, vec::Vec};

use log::{trace, warn};
use shared_derive::U8Enum;
use static_assertions::const_assert_eq;

use crate::{
    admin_commands::ControllerId,
    codec::{DecodeOptions, Reader, Writer},
    WireError,
};

use super::{Nqn, NQN_FIELD_LEN};

/// Size of the discovery log page header, entries start after it
pub const DISCOVERY_HEADER_SIZE: usize = 1024;

/// Size of a single [DiscoveryLogEntry]
pub const DISCOVERY_ENTRY_SIZE: usize = 1024;

/// The maximum number of entries a discovery controller reports
pub const MAX_DISC_LOGS: usize = 255;

const TRSVCID_SIZE: usize = 32;
const TRADDR_SIZE: usize = 256;
/// Size of the transport specific address subtype of a discovery log entry
pub const TSAS_SIZE: usize = 256;

const_assert_eq!(
    DISCOVERY_ENTRY_SIZE,
    32 + TRSVCID_SIZE + 192 + NQN_FIELD_LEN + TRADDR_SIZE + TSAS_SIZE
);

/// Transport type of a discovery log entry
///
/// See: NVMe over Fabrics Spec: Figure 38: Discovery Log Page Entry: TRTYPE
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum)]
pub enum TransportType {
    Rdma = 1,
    FibreChannel = 2,
    Tcp = 3,
    /// reserved for host usage
    Loop = 254,
}

/// Address family of the transport address
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum)]
pub enum AddressFamily {
    Pci = 0,
    Ip4 = 1,
    Ip6 = 2,
    InfiniBand = 3,
    FibreChannel = 4,
}

#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum)]
pub enum SubsystemType {
    /// a discovery subsystem, referring to further discovery controllers
    Discovery = 1,
    Nvme = 2,
}

/// Whether a secure channel is required for the transport
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum, Default)]
pub enum TransportRequirements {
    #[default]
    NotSpecified = 0,
    Required = 1,
    NotRequired = 2,
}

/// RDMA queue pair service type
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum)]
pub enum RdmaQueuePairType {
    Connected = 1,
    Datagram = 2,
}

/// RDMA provider type
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum)]
pub enum RdmaProviderType {
    NotSpecified = 1,
    InfiniBand = 2,
    RoCE = 3,
    RoCEv2 = 4,
    IWarp = 5,
}

/// RDMA connection management service
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum)]
pub enum RdmaConnectionManagement {
    RdmaCm = 1,
}

/// Transport specific address subtype of a discovery log entry
///
/// Only the RDMA layout is decoded, all other transports keep the raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSpecificAddress {
    Rdma {
        queue_pair_type: RdmaQueuePairType,
        provider_type: RdmaProviderType,
        connection_management: RdmaConnectionManagement,
        partition_key: u16,
    },
    Opaque([u8; TSAS_SIZE]),
}

impl TransportSpecificAddress {
    fn read(r: &Reader, transport: TransportType) -> Result<Self, WireError> {
        if transport != TransportType::Rdma {
            return Ok(TransportSpecificAddress::Opaque(r.array(0)));
        }
        r.reserved(3..8)?;
        r.reserved(10..TSAS_SIZE)?;
        Ok(TransportSpecificAddress::Rdma {
            queue_pair_type: RdmaQueuePairType::try_from(r.u8(0))
                .map_err(|e| WireError::invalid_field("rdma qptype", e.value))?,
            provider_type: RdmaProviderType::try_from(r.u8(1))
                .map_err(|e| WireError::invalid_field("rdma prtype", e.value))?,
            connection_management: RdmaConnectionManagement::try_from(r.u8(2))
                .map_err(|e| WireError::invalid_field("rdma cms", e.value))?,
            partition_key: r.u16(8),
        })
    }

    fn write(&self, w: &mut Writer) {
        match self {
            TransportSpecificAddress::Rdma {
                queue_pair_type,
                provider_type,
                connection_management,
                partition_key,
            } => {
                w.u8(0, (*queue_pair_type).into());
                w.u8(1, (*provider_type).into());
                w.u8(2, (*connection_management).into());
                w.u16(8, *partition_key);
            }
            TransportSpecificAddress::Opaque(bytes) => w.bytes(0, bytes),
        }
    }
}

/// A single subsystem port reported by a discovery controller
///
/// See: NVMe over Fabrics Spec: Figure 38: Discovery Log Page Entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryLogEntry {
    pub transport_type: TransportType,
    pub address_family: AddressFamily,
    pub subsystem_type: SubsystemType,
    pub transport_requirements: TransportRequirements,
    pub port_id: u16,
    /// [ControllerId::DYNAMIC] if the subsystem uses dynamic controllers
    pub controller_id: ControllerId,
    /// maximum admin submission queue size
    pub admin_max_sq_size: u16,
    /// transport service identifier, e.g. the tcp port
    pub transport_service_id: String,
    pub subsystem_nqn: Nqn,
    /// transport address, e.g. an ip address
    pub transport_address: String,
    pub transport_specific_address: TransportSpecificAddress,
}

impl DiscoveryLogEntry {
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        Self::parse_with(buf, DecodeOptions::default())
    }

    pub fn parse_with(buf: &[u8], options: DecodeOptions) -> Result<Self, WireError> {
        let r = Reader::new(buf, DISCOVERY_ENTRY_SIZE, options)?;
        Self::read(&r)
    }

    fn read(r: &Reader) -> Result<Self, WireError> {
        let trtype = r.u8(0);
        let transport_type =
            TransportType::try_from(trtype).map_err(|_| WireError::UnsupportedTransport(trtype))?;
        r.reserved(10..32)?;
        r.reserved(64..256)?;
        Ok(Self {
            transport_type,
            address_family: AddressFamily::try_from(r.u8(1))
                .map_err(|e| WireError::invalid_field("adrfam", e.value))?,
            subsystem_type: SubsystemType::try_from(r.u8(2))
                .map_err(|e| WireError::invalid_field("subtype", e.value))?,
            transport_requirements: TransportRequirements::try_from(r.u8(3))
                .map_err(|e| WireError::invalid_field("treq", e.value))?,
            port_id: r.u16(4),
            controller_id: ControllerId(r.u16(6)),
            admin_max_sq_size: r.u16(8),
            transport_service_id: r.ascii(32..32 + TRSVCID_SIZE, "trsvcid")?,
            subsystem_nqn: Nqn::read(r, 256, "subnqn")?,
            transport_address: r.ascii(512..512 + TRADDR_SIZE, "traddr")?,
            transport_specific_address: TransportSpecificAddress::read(
                &r.sub(768..768 + TSAS_SIZE),
                transport_type,
            )?,
        })
    }

    pub fn encode(&self) -> Result<[u8; DISCOVERY_ENTRY_SIZE], WireError> {
        let mut buf = [0u8; DISCOVERY_ENTRY_SIZE];
        self.write(&mut Writer::new(&mut buf))?;
        Ok(buf)
    }

    fn write(&self, w: &mut Writer) -> Result<(), WireError> {
        check_string(&self.transport_service_id, TRSVCID_SIZE, "trsvcid")?;
        check_string(&self.transport_address, TRADDR_SIZE, "traddr")?;
        let rdma_layout = matches!(
            self.transport_specific_address,
            TransportSpecificAddress::Rdma { .. }
        );
        if rdma_layout != (self.transport_type == TransportType::Rdma) {
            return Err(WireError::invalid_field("tsas", u8::from(self.transport_type)));
        }

        w.u8(0, self.transport_type.into());
        w.u8(1, self.address_family.into());
        w.u8(2, self.subsystem_type.into());
        w.u8(3, self.transport_requirements.into());
        w.u16(4, self.port_id);
        w.u16(6, self.controller_id.as_u16());
        w.u16(8, self.admin_max_sq_size);
        w.padded(32..32 + TRSVCID_SIZE, self.transport_service_id.as_bytes(), b' ');
        self.subsystem_nqn.write(w, 256);
        w.padded(512..512 + TRADDR_SIZE, self.transport_address.as_bytes(), b' ');
        self.transport_specific_address
            .write(&mut w.sub(768..768 + TSAS_SIZE));
        Ok(())
    }
}

fn check_string(value: &str, max: usize, field: &'static str) -> Result<(), WireError> {
    if value.len() > max || !value.is_ascii() {
        return Err(WireError::InvalidString { field });
    }
    Ok(())
}

/// The discovery log page
///
/// The page is a header followed by `numrec` entries of [DISCOVERY_ENTRY_SIZE] bytes.
///
/// See: NVMe over Fabrics Spec: 5.3 Discovery Log Page
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscoveryLogPage {
    /// incremented every time the content of the log page changes
    pub generation_counter: u64,
    /// format of the log page, always 0
    pub record_format: u16,
    pub entries: Vec<DiscoveryLogEntry>,
}

impl DiscoveryLogPage {
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        Self::parse_with(buf, DecodeOptions::default())
    }

    /// Parse a discovery log page.
    ///
    /// `buf` must hold at least the header and every entry the header declares.
    /// Any trailing bytes are ignored.
    pub fn parse_with(buf: &[u8], options: DecodeOptions) -> Result<Self, WireError> {
        if buf.len() < DISCOVERY_HEADER_SIZE {
            return Err(WireError::LengthMismatch {
                expected: DISCOVERY_HEADER_SIZE,
                actual: buf.len(),
            });
        }
        let header = Reader::new(&buf[..DISCOVERY_HEADER_SIZE], DISCOVERY_HEADER_SIZE, options)?;
        header.reserved(18..DISCOVERY_HEADER_SIZE)?;

        let record_count = header.u64(8);
        let expected = usize::try_from(record_count)
            .ok()
            .and_then(|count| count.checked_mul(DISCOVERY_ENTRY_SIZE))
            .and_then(|len| len.checked_add(DISCOVERY_HEADER_SIZE))
            .unwrap_or(usize::MAX);
        if buf.len() < expected {
            return Err(WireError::LengthMismatch {
                expected,
                actual: buf.len(),
            });
        }
        if record_count as usize > MAX_DISC_LOGS {
            warn!("discovery log page reports {record_count} entries");
        }

        trace!("parsing discovery log page with {record_count} entries");
        let body = Reader::new(&buf[..expected], expected, options)?;
        let entries = (0..record_count as usize)
            .map(|index| {
                let start = DISCOVERY_HEADER_SIZE + index * DISCOVERY_ENTRY_SIZE;
                DiscoveryLogEntry::read(&body.sub(start..start + DISCOVERY_ENTRY_SIZE))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            generation_counter: header.u64(0),
            record_format: header.u16(16),
            entries,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let len = DISCOVERY_HEADER_SIZE + self.entries.len() * DISCOVERY_ENTRY_SIZE;
        let mut buf = alloc::vec![0u8; len];
        let mut w = Writer::new(&mut buf);
        w.u64(0, self.generation_counter);
        w.u64(8, self.entries.len() as u64);
        w.u16(16, self.record_format);
        for (index, entry) in self.entries.iter().enumerate() {
            let start = DISCOVERY_HEADER_SIZE + index * DISCOVERY_ENTRY_SIZE;
            entry.write(&mut w.sub(start..start + DISCOVERY_ENTRY_SIZE))?;
        }
        Ok(buf)
    }
}
