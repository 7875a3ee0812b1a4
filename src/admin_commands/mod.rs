//! NVMe admin command set
//!
//! The specification documents can be found at <https://nvmexpress.org/specifications/>
//! specifically: NVM Express Base Specification

use shared_derive::U8Enum;

use crate::{
    codec::{Reader, Writer},
    generic_command::{CommandPayload, DataPtr, GenericCommand, TransferMode},
    WireError,
};

mod directive;
mod features;
mod firmware;
mod format;
mod identify;
mod io_queue;
mod log_page;
mod namespace;

pub use directive::*;
pub use features::*;
pub use firmware::*;
pub use format::*;
pub use identify::*;
pub use io_queue::*;
pub use log_page::*;
pub use namespace::*;

/// Opcode for the different commands
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum)]
pub enum CommandOpcode {
    DeleteIOSubmissionQueue = 0x0,
    CreateIOSubmissionQueue = 0x1,
    GetLogPage = 0x2,
    DeleteIOCompletionQueue = 0x4,
    CreateIOCompletionQueue = 0x5,
    Identify = 0x6,
    Abort = 0x8,
    SetFeatures = 0x9,
    GetFeatures = 0xa,
    AsynchronousEventRequest = 0xc,
    NamespaceManagement = 0xd,
    FirmwareCommit = 0x10,
    FirmwareImageDownload = 0x11,
    NamespaceAttachment = 0x15,
    KeepAlive = 0x18,
    DirectiveSend = 0x19,
    DirectiveReceive = 0x1a,
    DoorbellBufferConfig = 0x7c,
    FormatNVM = 0x80,
    SecuritySend = 0x81,
    SecurityReceive = 0x82,
    Sanitize = 0x84,
}

/// A command submitted to the admin queue
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    DeleteIOSubmissionQueue(DeleteQueue),
    CreateIOSubmissionQueue(CreateSubmissionQueue),
    GetLogPage(GetLogPage),
    DeleteIOCompletionQueue(DeleteQueue),
    CreateIOCompletionQueue(CreateCompletionQueue),
    Identify(Identify),
    Abort(Abort),
    SetFeatures(Features),
    GetFeatures(Features),
    AsynchronousEventRequest,
    NamespaceManagement(GenericCommand),
    FirmwareCommit(FirmwareCommit),
    FirmwareImageDownload(FirmwareDownload),
    NamespaceAttachment(GenericCommand),
    KeepAlive,
    DirectiveSend(Directive),
    DirectiveReceive(Directive),
    DoorbellBufferConfig(DoorbellBufferConfig),
    FormatNVM(FormatNvm),
    SecuritySend(GenericCommand),
    SecurityReceive(GenericCommand),
    Sanitize(Sanitize),
}

/// Evaluate `$body` with `$payload` bound to the payload of `$command`,
/// or `$none` for commands without one.
macro_rules! with_payload {
    ($command:expr, $payload:ident => $body:expr, $none:expr) => {
        match $command {
            AdminCommand::DeleteIOSubmissionQueue($payload) => $body,
            AdminCommand::CreateIOSubmissionQueue($payload) => $body,
            AdminCommand::GetLogPage($payload) => $body,
            AdminCommand::DeleteIOCompletionQueue($payload) => $body,
            AdminCommand::CreateIOCompletionQueue($payload) => $body,
            AdminCommand::Identify($payload) => $body,
            AdminCommand::Abort($payload) => $body,
            AdminCommand::SetFeatures($payload) => $body,
            AdminCommand::GetFeatures($payload) => $body,
            AdminCommand::NamespaceManagement($payload) => $body,
            AdminCommand::FirmwareCommit($payload) => $body,
            AdminCommand::FirmwareImageDownload($payload) => $body,
            AdminCommand::NamespaceAttachment($payload) => $body,
            AdminCommand::DirectiveSend($payload) => $body,
            AdminCommand::DirectiveReceive($payload) => $body,
            AdminCommand::DoorbellBufferConfig($payload) => $body,
            AdminCommand::FormatNVM($payload) => $body,
            AdminCommand::SecuritySend($payload) => $body,
            AdminCommand::SecurityReceive($payload) => $body,
            AdminCommand::Sanitize($payload) => $body,
            AdminCommand::AsynchronousEventRequest | AdminCommand::KeepAlive => $none,
        }
    };
}

impl AdminCommand {
    pub fn opcode(&self) -> CommandOpcode {
        match self {
            AdminCommand::DeleteIOSubmissionQueue(_) => CommandOpcode::DeleteIOSubmissionQueue,
            AdminCommand::CreateIOSubmissionQueue(_) => CommandOpcode::CreateIOSubmissionQueue,
            AdminCommand::GetLogPage(_) => CommandOpcode::GetLogPage,
            AdminCommand::DeleteIOCompletionQueue(_) => CommandOpcode::DeleteIOCompletionQueue,
            AdminCommand::CreateIOCompletionQueue(_) => CommandOpcode::CreateIOCompletionQueue,
            AdminCommand::Identify(_) => CommandOpcode::Identify,
            AdminCommand::Abort(_) => CommandOpcode::Abort,
            AdminCommand::SetFeatures(_) => CommandOpcode::SetFeatures,
            AdminCommand::GetFeatures(_) => CommandOpcode::GetFeatures,
            AdminCommand::AsynchronousEventRequest => CommandOpcode::AsynchronousEventRequest,
            AdminCommand::NamespaceManagement(_) => CommandOpcode::NamespaceManagement,
            AdminCommand::FirmwareCommit(_) => CommandOpcode::FirmwareCommit,
            AdminCommand::FirmwareImageDownload(_) => CommandOpcode::FirmwareImageDownload,
            AdminCommand::NamespaceAttachment(_) => CommandOpcode::NamespaceAttachment,
            AdminCommand::KeepAlive => CommandOpcode::KeepAlive,
            AdminCommand::DirectiveSend(_) => CommandOpcode::DirectiveSend,
            AdminCommand::DirectiveReceive(_) => CommandOpcode::DirectiveReceive,
            AdminCommand::DoorbellBufferConfig(_) => CommandOpcode::DoorbellBufferConfig,
            AdminCommand::FormatNVM(_) => CommandOpcode::FormatNVM,
            AdminCommand::SecuritySend(_) => CommandOpcode::SecuritySend,
            AdminCommand::SecurityReceive(_) => CommandOpcode::SecurityReceive,
            AdminCommand::Sanitize(_) => CommandOpcode::Sanitize,
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
            CommandOpcode::DeleteIOSubmissionQueue => {
                AdminCommand::DeleteIOSubmissionQueue(CommandPayload::read(r, mode)?)
            }
            CommandOpcode::CreateIOSubmissionQueue => {
                AdminCommand::CreateIOSubmissionQueue(CommandPayload::read(r, mode)?)
            }
            CommandOpcode::GetLogPage => AdminCommand::GetLogPage(CommandPayload::read(r, mode)?),
            CommandOpcode::DeleteIOCompletionQueue => {
                AdminCommand::DeleteIOCompletionQueue(CommandPayload::read(r, mode)?)
            }
            CommandOpcode::CreateIOCompletionQueue => {
                AdminCommand::CreateIOCompletionQueue(CommandPayload::read(r, mode)?)
            }
            CommandOpcode::Identify => AdminCommand::Identify(CommandPayload::read(r, mode)?),
            CommandOpcode::Abort => AdminCommand::Abort(CommandPayload::read(r, mode)?),
            CommandOpcode::SetFeatures => AdminCommand::SetFeatures(CommandPayload::read(r, mode)?),
            CommandOpcode::GetFeatures => AdminCommand::GetFeatures(CommandPayload::read(r, mode)?),
            CommandOpcode::AsynchronousEventRequest => {
                r.reserved(8..64)?;
                AdminCommand::AsynchronousEventRequest
            }
            CommandOpcode::NamespaceManagement => {
                AdminCommand::NamespaceManagement(CommandPayload::read(r, mode)?)
            }
            CommandOpcode::FirmwareCommit => {
                AdminCommand::FirmwareCommit(CommandPayload::read(r, mode)?)
            }
            CommandOpcode::FirmwareImageDownload => {
                AdminCommand::FirmwareImageDownload(CommandPayload::read(r, mode)?)
            }
            CommandOpcode::NamespaceAttachment => {
                AdminCommand::NamespaceAttachment(CommandPayload::read(r, mode)?)
            }
            CommandOpcode::KeepAlive => {
                r.reserved(8..64)?;
                AdminCommand::KeepAlive
            }
            CommandOpcode::DirectiveSend => {
                AdminCommand::DirectiveSend(CommandPayload::read(r, mode)?)
            }
            CommandOpcode::DirectiveReceive => {
                AdminCommand::DirectiveReceive(CommandPayload::read(r, mode)?)
            }
            CommandOpcode::DoorbellBufferConfig => {
                AdminCommand::DoorbellBufferConfig(CommandPayload::read(r, mode)?)
            }
            CommandOpcode::FormatNVM => AdminCommand::FormatNVM(CommandPayload::read(r, mode)?),
            CommandOpcode::SecuritySend => {
                AdminCommand::SecuritySend(CommandPayload::read(r, mode)?)
            }
            CommandOpcode::SecurityReceive => {
                AdminCommand::SecurityReceive(CommandPayload::read(r, mode)?)
            }
            CommandOpcode::Sanitize => AdminCommand::Sanitize(CommandPayload::read(r, mode)?),
        };
        Ok(command)
    }
}
