use alloc::string::{String, ToString};
use core::fmt::Display;

use log::trace;
use static_assertions::const_assert_eq;
use uuid::Uuid;

use crate::{
    admin_commands::ControllerId,
    codec::{DecodeOptions, Reader, Writer},
    generic_command::{
        read_data_ptr, write_data_ptr, CommandPayload, DataPtr, QueueIdentifier, TransferMode,
    },
    WireError,
};

/// The size of an NQN field in fabrics structures
pub const NQN_FIELD_LEN: usize = 256;

/// The maximum length of a qualified name in bytes.
///
/// This is shorter than [NQN_FIELD_LEN], the rest of the field is padding.
pub const NQN_MAX_LEN: usize = 223;

/// The size of the data transferred by a connect command
pub const CONNECT_DATA_SIZE: usize = 1024;

const_assert_eq!(CONNECT_DATA_SIZE, 16 + 2 + 238 + 3 * NQN_FIELD_LEN);

/// An NVMe qualified name identifying a host or an NVM subsystem
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Nqn(String);

impl Nqn {
    /// The well known NQN of discovery subsystems
    pub const DISCOVERY: &'static str = "nqn.2014-08.org.nvmexpress.discovery";

    /// Validate `name` as a qualified name.
    ///
    /// Fails with [WireError::NameTooLong] if `name` is longer than [NQN_MAX_LEN] bytes.
    pub fn new(name: &str) -> Result<Self, WireError> {
        if name.len() > NQN_MAX_LEN {
            return Err(WireError::NameTooLong(name.len()));
        }
        if name.bytes().any(|b| b == 0) {
            return Err(WireError::InvalidString { field: "nqn" });
        }
        Ok(Self(name.to_string()))
    }

    /// The NQN of discovery subsystems
    pub fn discovery() -> Self {
        Self(Self::DISCOVERY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_discovery(&self) -> bool {
        self.0 == Self::DISCOVERY
    }

    pub(crate) fn read(r: &Reader, offset: usize, field: &'static str) -> Result<Self, WireError> {
        let field_bytes = r.slice(offset..offset + NQN_FIELD_LEN);
        let len = field_bytes.iter().position(|b| *b == 0).unwrap_or(NQN_FIELD_LEN);
        let (bytes, padding) = field_bytes.split_at(len);
        // the name ends at the first NUL, a NUL within the name is invalid
        if padding.iter().any(|b| *b != 0) {
            return Err(WireError::InvalidString { field });
        }
        if bytes.len() > NQN_MAX_LEN {
            return Err(WireError::NameTooLong(bytes.len()));
        }
        let name = core::str::from_utf8(bytes).map_err(|_| WireError::InvalidString { field })?;
        Ok(Self(name.to_string()))
    }

    pub(crate) fn write(&self, w: &mut Writer, offset: usize) {
        w.padded(offset..offset + NQN_FIELD_LEN, self.0.as_bytes(), 0);
    }
}

impl Display for Nqn {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connect command, creating the admin or an io queue on a fabrics controller
///
/// The command transfers [ConnectData] to the controller.
///
/// See: NVMe over Fabrics Spec: 3.3 Connect Command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Connect {
    pub data_ptr: DataPtr,
    /// format of the connect command, always 0
    pub record_format: u16,
    pub queue_id: QueueIdentifier,
    /// 0 based size of the submission queue
    pub sq_size: u16,
    /// connect attributes
    pub attributes: u8,
    /// keep alive timeout in milliseconds, only used when connecting the admin queue
    pub keep_alive_timeout: u32,
}

impl Connect {
    /// Connect to the admin queue with `entries` submission entries
    pub fn admin(data_ptr: DataPtr, entries: u16, keep_alive_timeout: u32) -> Self {
        Self {
            data_ptr,
            queue_id: QueueIdentifier::ADMIN,
            sq_size: entries.saturating_sub(1),
            keep_alive_timeout,
            ..Default::default()
        }
    }

    /// Connect an io queue with `entries` submission entries
    pub fn io(data_ptr: DataPtr, queue_id: QueueIdentifier, entries: u16) -> Self {
        Self {
            data_ptr,
            queue_id,
            sq_size: entries.saturating_sub(1),
            ..Default::default()
        }
    }
}

impl CommandPayload for Connect {
    fn write(&self, w: &mut Writer) {
        write_data_ptr(w, &self.data_ptr);
        w.u16(40, self.record_format);
        w.u16(42, self.queue_id.as_u16());
        w.u16(44, self.sq_size);
        w.u8(46, self.attributes);
        w.u32(48, self.keep_alive_timeout);
    }

    fn read(r: &Reader, mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(5..24)?;
        r.reserved(47..48)?;
        r.reserved(52..64)?;
        Ok(Self {
            data_ptr: read_data_ptr(r, mode)?,
            record_format: r.u16(40),
            queue_id: QueueIdentifier(r.u16(42)),
            sq_size: r.u16(44),
            attributes: r.u8(46),
            keep_alive_timeout: r.u32(48),
        })
    }

    fn data_ptr(&self) -> Option<&DataPtr> {
        Some(&self.data_ptr)
    }
}

/// The data transferred with a [Connect] command
///
/// See: NVMe over Fabrics Spec: Figure 20: Connect Command Data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectData {
    pub host_id: Uuid,
    /// [ControllerId::DYNAMIC] when connecting the admin queue of a dynamic controller
    pub controller_id: ControllerId,
    pub subsystem_nqn: Nqn,
    pub host_nqn: Nqn,
}

impl ConnectData {
    pub fn new(host_id: Uuid, subsystem_nqn: Nqn, host_nqn: Nqn) -> Self {
        Self {
            host_id,
            controller_id: ControllerId::DYNAMIC,
            subsystem_nqn,
            host_nqn,
        }
    }

    pub fn encode(&self) -> [u8; CONNECT_DATA_SIZE] {
        let mut buf = [0u8; CONNECT_DATA_SIZE];
        let mut w = Writer::new(&mut buf);
        w.bytes(0, self.host_id.as_bytes());
        w.u16(16, self.controller_id.as_u16());
        self.subsystem_nqn.write(&mut w, 256);
        self.host_nqn.write(&mut w, 512);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        Self::decode_with(buf, DecodeOptions::default())
    }

    pub fn decode_with(buf: &[u8], options: DecodeOptions) -> Result<Self, WireError> {
        let r = Reader::new(buf, CONNECT_DATA_SIZE, options)?;
        r.reserved(18..256)?;
        r.reserved(768..1024)?;
        let data = Self {
            host_id: Uuid::from_bytes(r.array(0)),
            controller_id: ControllerId(r.u16(16)),
            subsystem_nqn: Nqn::read(&r, 256, "subsystem nqn")?,
            host_nqn: Nqn::read(&r, 512, "host nqn")?,
        };
        trace!("decoded connect data for {} from {}", data.subsystem_nqn, data.host_nqn);
        Ok(data)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use shared::test_utils::init_test_logger;

    const HOST_NQN: &str = "nqn.2014-08.org.nvmexpress:uuid:5d0c4a5e-1b3b-4b8e-9c3b-7d7a3f2a0f11";

    #[test]
    fn nqn_length_limit() {
        let max = "a".repeat(NQN_MAX_LEN);
        assert!(Nqn::new(&max).is_ok());

        let too_long = "a".repeat(NQN_MAX_LEN + 1);
        assert_eq!(Err(WireError::NameTooLong(224)), Nqn::new(&too_long));
    }

    #[test]
    fn embedded_nul_is_rejected() {
        assert_eq!(
            Err(WireError::InvalidString { field: "nqn" }),
            Nqn::new("nqn.2014-08.org\0x")
        );

        let mut buf = ConnectData::new(Uuid::nil(), Nqn::discovery(), Nqn::new(HOST_NQN).unwrap())
            .encode();
        buf[512 + 4] = 0;
        assert_eq!(
            Err(WireError::InvalidString { field: "host nqn" }),
            ConnectData::decode(&buf)
        );
    }

    #[test]
    fn discovery_nqn() {
        assert!(Nqn::discovery().is_discovery());
        assert!(!Nqn::new(HOST_NQN).unwrap().is_discovery());
    }

    #[test]
    fn connect_data_layout() {
        init_test_logger();

        let host_id = Uuid::from_bytes([0x11; 16]);
        let data = ConnectData::new(host_id, Nqn::discovery(), Nqn::new(HOST_NQN).unwrap());
        let buf = data.encode();

        assert_eq!([0x11; 16], buf[0..16]);
        assert_eq!([0xff, 0xff], buf[16..18]);
        assert_eq!(Nqn::DISCOVERY.as_bytes(), &buf[256..256 + Nqn::DISCOVERY.len()]);
        assert_eq!(0, buf[256 + Nqn::DISCOVERY.len()]);
        assert_eq!(HOST_NQN.as_bytes(), &buf[512..512 + HOST_NQN.len()]);
        assert!(buf[768..].iter().all(|b| *b == 0));

        assert_eq!(Ok(data), ConnectData::decode_with(&buf, DecodeOptions::STRICT));
    }

    #[test]
    fn over_long_nqn_field_is_rejected() {
        let mut buf = [0u8; CONNECT_DATA_SIZE];
        buf[256..256 + 240].fill(b'a');
        assert_eq!(Err(WireError::NameTooLong(240)), ConnectData::decode(&buf));
    }

    #[test]
    fn connect_command_layout() {
        let connect = Connect::admin(DataPtr::prp(0x1000), 32, 120_000);
        let mut entry = [0u8; 64];
        connect.write(&mut Writer::new(&mut entry));
        assert_eq!([0, 0], entry[42..44]);
        assert_eq!([31, 0], entry[44..46]);
        assert_eq!(120_000u32.to_le_bytes(), entry[48..52]);

        let r = Reader::new(&entry, 64, DecodeOptions::STRICT).unwrap();
        assert_eq!(connect, Connect::read(&r, TransferMode::Prp).unwrap());

        let io = Connect::io(DataPtr::prp(0x1000), QueueIdentifier(3), 128);
        assert_eq!(127, io.sq_size);
        assert_eq!(0, io.keep_alive_timeout);
    }
}
