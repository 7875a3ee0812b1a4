//! NVMe io command set
//!
//! The specification documents can be found at <https://nvmexpress.org/specifications/>
//! specifically: NVM Command Set

use core::fmt::{Debug, LowerHex, UpperHex};

use shared_derive::U8Enum;

use crate::{
    codec::{Reader, Writer},
    generic_command::{CommandPayload, DataPtr, TransferMode},
    WireError,
};

mod dataset_management;
mod read_write;
mod reservation;

pub use dataset_management::*;
pub use read_write::*;
pub use reservation::*;

/// Opcode for the different commands
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum)]
pub enum CommandOpcode {
    Flush = 0x0,
    Write = 0x1,
    Read = 0x2,
    WriteUncorrectable = 0x4,
    Compare = 0x5,
    WriteZeroes = 0x8,
    DatasetManagement = 0x9,
    ReservationRegister = 0xd,
    ReservationReport = 0xe,
    ReservationAcquire = 0x11,
    ReservationRelease = 0x15,
}

/// A logical block address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LBA(u64);

impl LBA {
    pub fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for LBA {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<LBA> for u64 {
    fn from(value: LBA) -> Self {
        value.0
    }
}

impl Debug for LBA {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "LBA({:#x})", self.0)
    }
}

impl LowerHex for LBA {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        LowerHex::fmt(&self.0, f)
    }
}

impl UpperHex for LBA {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        UpperHex::fmt(&self.0, f)
    }
}

/// A command submitted to an IO queue
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoCommand {
    Flush,
    Write(ReadWrite),
    Read(ReadWrite),
    WriteUncorrectable(ReadWrite),
    Compare(ReadWrite),
    WriteZeroes(ReadWrite),
    DatasetManagement(DatasetManagement),
    ReservationRegister(ReservationRegister),
    ReservationReport(ReservationReport),
    ReservationAcquire(ReservationAcquire),
    ReservationRelease(ReservationRelease),
}

macro_rules! with_payload {
    ($command:expr, $payload:ident => $body:expr, $none:expr) => {
        match $command {
            IoCommand::Write($payload)
            | IoCommand::Read($payload)
            | IoCommand::WriteUncorrectable($payload)
            | IoCommand::Compare($payload)
            | IoCommand::WriteZeroes($payload) => $body,
            IoCommand::DatasetManagement($payload) => $body,
            IoCommand::ReservationRegister($payload) => $body,
            IoCommand::ReservationReport($payload) => $body,
            IoCommand::ReservationAcquire($payload) => $body,
            IoCommand::ReservationRelease($payload) => $body,
            IoCommand::Flush => $none,
        }
    };
}

impl IoCommand {
    pub fn opcode(&self) -> CommandOpcode {
        match self {
            IoCommand::Flush => CommandOpcode::Flush,
            IoCommand::Write(_) => CommandOpcode::Write,
            IoCommand::Read(_) => CommandOpcode::Read,
            IoCommand::WriteUncorrectable(_) => CommandOpcode::WriteUncorrectable,
            IoCommand::Compare(_) => CommandOpcode::Compare,
            IoCommand::WriteZeroes(_) => CommandOpcode::WriteZeroes,
            IoCommand::DatasetManagement(_) => CommandOpcode::DatasetManagement,
            IoCommand::ReservationRegister(_) => CommandOpcode::ReservationRegister,
            IoCommand::ReservationReport(_) => CommandOpcode::ReservationReport,
            IoCommand::ReservationAcquire(_) => CommandOpcode::ReservationAcquire,
            IoCommand::ReservationRelease(_) => CommandOpcode::ReservationRelease,
        }
    }

    /// The data pointer of the command, if it transfers data through one
    pub fn data_ptr(&self) -> Option<&DataPtr> {
        with_payload!(self, payload => payload.data_ptr(), None)
    }

    pub(crate) fn validate(&self) -> Result<(), WireError> {
        with_payload!(self, payload => payload.validate(), Ok(()))
    }

    pub(crate) fn write(&self, w: &mut Writer) {
        with_payload!(self, payload => payload.write(w), ())
    }

    pub(crate) fn read(
        opcode: CommandOpcode,
        r: &Reader,
        mode: TransferMode,
    ) -> Result<Self, WireError> {
        let command = match opcode {
            CommandOpcode::Flush => {
                r.reserved(8..64)?;
                IoCommand::Flush
            }
            CommandOpcode::Write => IoCommand::Write(ReadWrite::read(r, mode)?),
            CommandOpcode::Read => IoCommand::Read(ReadWrite::read(r, mode)?),
            CommandOpcode::WriteUncorrectable => {
                IoCommand::WriteUncorrectable(ReadWrite::read(r, mode)?)
            }
            CommandOpcode::Compare => IoCommand::Compare(ReadWrite::read(r, mode)?),
            CommandOpcode::WriteZeroes => IoCommand::WriteZeroes(ReadWrite::read(r, mode)?),
            CommandOpcode::DatasetManagement => {
                IoCommand::DatasetManagement(DatasetManagement::read(r, mode)?)
            }
            CommandOpcode::ReservationRegister => {
                IoCommand::ReservationRegister(ReservationRegister::read(r, mode)?)
            }
            CommandOpcode::ReservationReport => {
                IoCommand::ReservationReport(ReservationReport::read(r, mode)?)
            }
            CommandOpcode::ReservationAcquire => {
                IoCommand::ReservationAcquire(ReservationAcquire::read(r, mode)?)
            }
            CommandOpcode::ReservationRelease => {
                IoCommand::ReservationRelease(ReservationRelease::read(r, mode)?)
            }
        };
        Ok(command)
    }
}
