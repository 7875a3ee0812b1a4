//! The 64 byte submission queue entry
//!
//! Every command starts with command dword 0 (opcode, flags and command identifier).
//! Admin and io commands store the namespace id in the next dword, fabrics commands
//! store their command type there instead. The rest of the entry depends on the
//! opcode.

use bit_field::BitField;
use log::{trace, warn};
use static_assertions::const_assert_eq;

use crate::{
    admin_commands::{self, AdminCommand},
    codec::{DecodeOptions, Reader, Writer},
    fabrics::{FabricsCommand, FABRICS_OPCODE, FABRICS_TYPE_OFFSET},
    generic_command::{
        CommandHeader, CommandIdentifier, DataPtr, Fuse, CDW0, DATA_PTR_OFFSET, DATA_PTR_SIZE,
        SUBMISSION_COMMAND_ENTRY_SIZE,
    },
    io_commands::{self, IoCommand},
    WireError,
};

const_assert_eq!(SUBMISSION_COMMAND_ENTRY_SIZE, 64);
const_assert_eq!(DATA_PTR_OFFSET + DATA_PTR_SIZE, 40);

/// The queue a command was submitted to.
///
/// Admin and io opcodes overlap, so the queue decides how an opcode is decoded.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueType {
    Admin,
    Io,
}

/// The opcode specific part of a [Command]
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBody {
    Admin {
        namespace_id: u32,
        command: AdminCommand,
    },
    Io {
        namespace_id: u32,
        command: IoCommand,
    },
    Fabrics(FabricsCommand),
}

/// A submission queue entry
///
/// See: NVM Express Base Spec: Figure 88: Common Command Format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub header: CommandHeader,
    pub body: CommandBody,
}

enum Opcode {
    Admin(admin_commands::CommandOpcode),
    Io(io_commands::CommandOpcode),
    Fabrics,
}

impl Opcode {
    fn resolve(opcode: u8, queue: QueueType) -> Result<Self, WireError> {
        if opcode == FABRICS_OPCODE {
            return Ok(Opcode::Fabrics);
        }
        let resolved = match queue {
            QueueType::Admin => admin_commands::CommandOpcode::try_from(opcode).map(Opcode::Admin),
            QueueType::Io => io_commands::CommandOpcode::try_from(opcode).map(Opcode::Io),
        };
        resolved.map_err(|_| WireError::InvalidOpcode(opcode))
    }
}

/// `true` if the command transfers data from the host to the controller.
///
/// This is bit 0 of the opcode, except for fabrics commands which use bit 0 of the
/// fabrics command type.
pub fn is_write_raw(entry: &[u8; SUBMISSION_COMMAND_ENTRY_SIZE]) -> bool {
    if entry[0] == FABRICS_OPCODE {
        entry[FABRICS_TYPE_OFFSET].get_bit(0)
    } else {
        entry[0].get_bit(0)
    }
}

impl Command {
    /// An admin command. The transfer mode is taken from the data pointer.
    pub fn admin(command_id: CommandIdentifier, namespace_id: u32, command: AdminCommand) -> Self {
        Self::with_body(
            command_id,
            CommandBody::Admin {
                namespace_id,
                command,
            },
        )
    }

    /// An io command. The transfer mode is taken from the data pointer.
    pub fn io(command_id: CommandIdentifier, namespace_id: u32, command: IoCommand) -> Self {
        Self::with_body(
            command_id,
            CommandBody::Io {
                namespace_id,
                command,
            },
        )
    }

    /// A fabrics command. The transfer mode is taken from the data pointer.
    pub fn fabrics(command_id: CommandIdentifier, command: FabricsCommand) -> Self {
        Self::with_body(command_id, CommandBody::Fabrics(command))
    }

    fn with_body(command_id: CommandIdentifier, body: CommandBody) -> Self {
        let mut command = Self {
            header: CommandHeader::new(command_id),
            body,
        };
        if let Some(data_ptr) = command.data_ptr() {
            command.header.transfer_mode = data_ptr.transfer_mode();
        }
        command
    }

    pub fn opcode(&self) -> u8 {
        match &self.body {
            CommandBody::Admin { command, .. } => command.opcode().into(),
            CommandBody::Io { command, .. } => command.opcode().into(),
            CommandBody::Fabrics(_) => FABRICS_OPCODE,
        }
    }

    pub fn command_id(&self) -> CommandIdentifier {
        self.header.command_id
    }

    pub fn with_command_id(mut self, command_id: CommandIdentifier) -> Self {
        self.header.command_id = command_id;
        self
    }

    /// The namespace id, `None` for fabrics commands
    pub fn namespace_id(&self) -> Option<u32> {
        match &self.body {
            CommandBody::Admin { namespace_id, .. } | CommandBody::Io { namespace_id, .. } => {
                Some(*namespace_id)
            }
            CommandBody::Fabrics(_) => None,
        }
    }

    /// The data pointer of the command, if it transfers data through one
    pub fn data_ptr(&self) -> Option<&DataPtr> {
        match &self.body {
            CommandBody::Admin { command, .. } => command.data_ptr(),
            CommandBody::Io { command, .. } => command.data_ptr(),
            CommandBody::Fabrics(command) => command.data_ptr(),
        }
    }

    /// `true` if the command transfers data from the host to the controller.
    ///
    /// See [is_write_raw].
    pub fn is_write(&self) -> bool {
        match &self.body {
            CommandBody::Fabrics(command) => command.is_write(),
            _ => self.opcode().get_bit(0),
        }
    }

    /// Encode the command.
    ///
    /// Fails if the transfer mode does not match the data pointer, or if a field
    /// holds a value that does not fit into its wire representation.
    pub fn encode(&self) -> Result<[u8; SUBMISSION_COMMAND_ENTRY_SIZE], WireError> {
        if let Some(data_ptr) = self.data_ptr() {
            if !self.header.transfer_mode.is_compatible(data_ptr) {
                return Err(WireError::TransferModeMismatch);
            }
        }
        if !Fuse::all().contains(self.header.fuse) {
            return Err(WireError::invalid_field("fuse", self.header.fuse.bits()));
        }
        match &self.body {
            CommandBody::Admin { command, .. } => command.validate()?,
            CommandBody::Io { command, .. } => command.validate()?,
            CommandBody::Fabrics(command) => command.validate()?,
        }

        let mut entry = [0u8; SUBMISSION_COMMAND_ENTRY_SIZE];
        let mut w = Writer::new(&mut entry);
        w.u32(0, self.header.cdw0(self.opcode()).0);
        match &self.body {
            CommandBody::Admin {
                namespace_id,
                command,
            } => {
                w.u32(4, *namespace_id);
                command.write(&mut w);
            }
            CommandBody::Io {
                namespace_id,
                command,
            } => {
                w.u32(4, *namespace_id);
                command.write(&mut w);
            }
            CommandBody::Fabrics(command) => command.write(&mut w),
        }
        Ok(entry)
    }

    /// Decode a submission entry from the queue `queue`
    pub fn decode(bytes: &[u8], queue: QueueType, options: DecodeOptions) -> Result<Self, WireError> {
        let r = Reader::new(bytes, SUBMISSION_COMMAND_ENTRY_SIZE, options)?;
        let cdw0 = CDW0(r.u32(0));
        let opcode = Opcode::resolve(cdw0.opcode(), queue)?;

        if cdw0.reserved_flags() != 0 {
            if options.strict_reserved {
                return Err(WireError::MalformedReserved { offset: 1 });
            }
            warn!("ignoring reserved command flags {:#x}", cdw0.reserved_flags());
        }
        let header = CommandHeader::from_cdw0(cdw0)?;
        let mode = header.transfer_mode;

        let body = match opcode {
            Opcode::Admin(opcode) => CommandBody::Admin {
                namespace_id: r.u32(4),
                command: AdminCommand::read(opcode, &r, mode)?,
            },
            Opcode::Io(opcode) => CommandBody::Io {
                namespace_id: r.u32(4),
                command: IoCommand::read(opcode, &r, mode)?,
            },
            Opcode::Fabrics => CommandBody::Fabrics(FabricsCommand::read(&r, mode)?),
        };

        let command = Self { header, body };
        trace!(
            "decoded command {:#04x} with id {:#x}",
            command.opcode(),
            command.command_id()
        );
        Ok(command)
    }
}
