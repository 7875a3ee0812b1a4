//! Completion queue entries and their status codes

use bit_field::BitField;
use shared_derive::U8Enum;
use thiserror::Error;

use crate::{
    codec::{DecodeOptions, Reader, Writer},
    generic_command::{CommandIdentifier, QueueIdentifier},
    WireError,
};

/// The size of all completion entries
pub const COMPLETION_ENTRY_SIZE: usize = 16;

/// Bit of [StatusField::value] that is set if the command should not be retried
pub const DO_NOT_RETRY: u16 = 0x4000;

/// Common layout shared by all completion entries
///
/// See: NVM Express Base Spec: Figure 90: Common Completion Queue Entry Layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionEntry {
    /// command specific result, used by admin and fabrics commands to return data
    pub result: u64,
    /// how much of the submission queue may be reclaimed
    pub sq_head: u16,
    /// submission queue that generated this entry
    pub sq_id: QueueIdentifier,
    /// identifier of the command that completed
    pub command_id: CommandIdentifier,
    pub status: StatusField,
}

impl CompletionEntry {
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let r = Reader::new(buf, COMPLETION_ENTRY_SIZE, DecodeOptions::LENIENT)?;
        Ok(Self {
            result: r.u64(0),
            sq_head: r.u16(8),
            sq_id: QueueIdentifier(r.u16(10)),
            command_id: CommandIdentifier(r.u16(12)),
            status: StatusField(r.u16(14)),
        })
    }

    pub fn encode(&self) -> [u8; COMPLETION_ENTRY_SIZE] {
        let mut buf = [0u8; COMPLETION_ENTRY_SIZE];
        let mut w = Writer::new(&mut buf);
        w.u64(0, self.result);
        w.u16(8, self.sq_head);
        w.u16(10, self.sq_id.as_u16());
        w.u16(12, self.command_id.as_u16());
        w.u16(14, self.status.0);
        buf
    }

    /// The result as a 16 bit value
    pub fn result_u16(&self) -> u16 {
        self.result as u16
    }

    /// The result as a 32 bit value, as returned by most admin commands
    pub fn result_u32(&self) -> u32 {
        self.result as u32
    }

    pub fn phase(&self) -> bool {
        self.status.phase()
    }

    /// Classify the status, see [StatusField::classify]
    pub fn status(&self, command_set: CommandSet) -> StatusCode {
        self.status.classify(command_set)
    }
}

/// Status and phase of a [CompletionEntry]
///
/// | bits   | field                |
/// |--------|----------------------|
/// | 0      | phase tag            |
/// | 1..=8  | status code          |
/// | 9..=11 | status code type     |
/// | 12..=13| command retry delay  |
/// | 14     | do not retry         |
/// | 15     | more                 |
///
/// See: NVM Express Base Spec: Figure 93: Completion Queue Entry: Status Field
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusField(pub u16);

impl StatusField {
    /// Toggled by the controller every time the completion queue wraps
    pub fn phase(&self) -> bool {
        self.0.get_bit(0)
    }

    pub fn status_code(&self) -> u8 {
        self.0.get_bits(1..=8) as u8
    }

    pub fn status_code_type(&self) -> StatusCodeType {
        StatusCodeType::from(self.0.get_bits(9..=11) as u8)
    }

    pub fn common_retry_delay(&self) -> u8 {
        self.0.get_bits(12..=13) as u8
    }

    pub fn do_not_retry(&self) -> bool {
        self.0.get_bit(14)
    }

    /// more status information is available in the error log page
    pub fn more(&self) -> bool {
        self.0.get_bit(15)
    }

    /// The status without the phase tag.
    ///
    /// This is `(sct << 8) | sc` with [DO_NOT_RETRY] set if the command should not
    /// be retried.
    pub fn value(&self) -> u16 {
        let mut value = (self.0.get_bits(9..=11) << 8) | self.status_code() as u16;
        if self.do_not_retry() {
            value |= DO_NOT_RETRY;
        }
        value
    }

    /// Create a status field from a [Self::value] and a phase tag
    pub fn from_value(value: u16, phase: bool) -> Self {
        let mut status = 0u16;
        status.set_bit(0, phase);
        status.set_bits(1..=8, value.get_bits(0..=7));
        status.set_bits(9..=11, value.get_bits(8..=10));
        status.set_bit(14, value & DO_NOT_RETRY != 0);
        Self(status)
    }

    pub fn is_success(&self) -> bool {
        self.status_code_type() == StatusCodeType::Generic && self.status_code() == 0
    }

    /// Classify the status code.
    ///
    /// Command specific codes from `0x80` on overlap between the command sets and
    /// are resolved with `command_set`, the set of the command that completed.
    pub fn classify(&self, command_set: CommandSet) -> StatusCode {
        let code = self.status_code();
        match self.status_code_type() {
            StatusCodeType::Generic => GenericCommandStatus::try_from(code)
                .map(StatusCode::Generic)
                .unwrap_or(StatusCode::UnknownGeneric(code)),
            StatusCodeType::CommandSpecific => classify_command_specific(code, command_set),
            StatusCodeType::MediaAndDataIntegrity => MediaErrorStatus::try_from(code)
                .map(StatusCode::MediaAndDataIntegrity)
                .unwrap_or(StatusCode::UnknownMediaAndDataIntegrity(code)),
            StatusCodeType::PathRelated => StatusCode::PathRelated(code),
            StatusCodeType::Reserved(typ) => StatusCode::Reserved { typ, status: code },
            StatusCodeType::VendorSpecific => StatusCode::VendorSpecific(code),
        }
    }
}

fn classify_command_specific(code: u8, command_set: CommandSet) -> StatusCode {
    let known = if code < 0x80 {
        AdminCommandStatus::try_from(code)
            .map(StatusCode::AdminSpecific)
            .ok()
    } else {
        match command_set {
            CommandSet::Admin => None,
            CommandSet::Nvm => NvmCommandStatus::try_from(code)
                .map(StatusCode::NvmSpecific)
                .ok(),
            CommandSet::Fabrics => FabricsCommandStatus::try_from(code)
                .map(StatusCode::FabricsSpecific)
                .ok(),
        }
    };
    known.unwrap_or(StatusCode::UnknownCommandSpecific(code))
}

/// Status code type
///
/// See: NVM Express Base Spec: Figure 94: Status Code Type Values
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCodeType {
    Generic,
    CommandSpecific,
    MediaAndDataIntegrity,
    PathRelated,
    Reserved(u8),
    VendorSpecific,
}

impl From<u8> for StatusCodeType {
    fn from(value: u8) -> Self {
        match value & 0b111 {
            0 => StatusCodeType::Generic,
            1 => StatusCodeType::CommandSpecific,
            2 => StatusCodeType::MediaAndDataIntegrity,
            3 => StatusCodeType::PathRelated,
            7 => StatusCodeType::VendorSpecific,
            typ => StatusCodeType::Reserved(typ),
        }
    }
}

impl From<StatusCodeType> for u8 {
    fn from(value: StatusCodeType) -> Self {
        match value {
            StatusCodeType::Generic => 0,
            StatusCodeType::CommandSpecific => 1,
            StatusCodeType::MediaAndDataIntegrity => 2,
            StatusCodeType::PathRelated => 3,
            StatusCodeType::Reserved(typ) => typ,
            StatusCodeType::VendorSpecific => 7,
        }
    }
}

/// The command set of a completed command.
///
/// Command specific status codes are only unique within a command set.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSet {
    Admin,
    Nvm,
    Fabrics,
}

/// Classified status of a [CompletionEntry]
///
/// Codes without a known meaning keep their raw value.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StatusCode {
    #[error("Generic Command Status: {0:?}")]
    Generic(GenericCommandStatus),
    #[error("Unknown Generic Command Status: {0:#x}")]
    UnknownGeneric(u8),
    #[error("Admin command specific status: {0:?}")]
    AdminSpecific(AdminCommandStatus),
    #[error("NVM command specific status: {0:?}")]
    NvmSpecific(NvmCommandStatus),
    #[error("Fabrics command specific status: {0:?}")]
    FabricsSpecific(FabricsCommandStatus),
    #[error("Unknown command specific status: {0:#x}")]
    UnknownCommandSpecific(u8),
    #[error("Media and Data integrity error: {0:?}")]
    MediaAndDataIntegrity(MediaErrorStatus),
    #[error("Unknown media and data integrity error: {0:#x}")]
    UnknownMediaAndDataIntegrity(u8),
    #[error("Path related error: {0:#x}")]
    PathRelated(u8),
    #[error("Reserved error: type {typ:#x}, code {status:#x}")]
    Reserved { typ: u8, status: u8 },
    #[error("Vendor specific error: {0:#x}")]
    VendorSpecific(u8),
}

impl StatusCode {
    /// returns `true` if the status represents any type of error
    #[inline]
    pub fn is_err(self) -> bool {
        !self.is_success()
    }

    /// returns `true` if the status does not represents any type of error
    ///
    /// This is `true` for [GenericCommandStatus::Success]
    #[inline]
    pub fn is_success(self) -> bool {
        self == StatusCode::Generic(GenericCommandStatus::Success)
    }

    pub fn status_code_type(self) -> StatusCodeType {
        match self {
            StatusCode::Generic(_) | StatusCode::UnknownGeneric(_) => StatusCodeType::Generic,
            StatusCode::AdminSpecific(_)
            | StatusCode::NvmSpecific(_)
            | StatusCode::FabricsSpecific(_)
            | StatusCode::UnknownCommandSpecific(_) => StatusCodeType::CommandSpecific,
            StatusCode::MediaAndDataIntegrity(_) | StatusCode::UnknownMediaAndDataIntegrity(_) => {
                StatusCodeType::MediaAndDataIntegrity
            }
            StatusCode::PathRelated(_) => StatusCodeType::PathRelated,
            StatusCode::Reserved { typ, .. } => StatusCodeType::Reserved(typ),
            StatusCode::VendorSpecific(_) => StatusCodeType::VendorSpecific,
        }
    }

    pub fn status_code(self) -> u8 {
        match self {
            StatusCode::Generic(status) => status.into(),
            StatusCode::AdminSpecific(status) => status.into(),
            StatusCode::NvmSpecific(status) => status.into(),
            StatusCode::FabricsSpecific(status) => status.into(),
            StatusCode::MediaAndDataIntegrity(status) => status.into(),
            StatusCode::UnknownGeneric(code)
            | StatusCode::UnknownCommandSpecific(code)
            | StatusCode::UnknownMediaAndDataIntegrity(code)
            | StatusCode::PathRelated(code)
            | StatusCode::VendorSpecific(code)
            | StatusCode::Reserved { status: code, .. } => code,
        }
    }

    /// The code as `(sct << 8) | sc`, without the do not retry bit
    pub fn value(self) -> u16 {
        (u8::from(self.status_code_type()) as u16) << 8 | self.status_code() as u16
    }
}

/// Generic Command Status
///
/// See: NVM Express Base Spec: Figure 95: Generic Command Status Values
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum)]
pub enum GenericCommandStatus {
    Success = 0,
    InvalidCommandOpcode = 1,
    InvalidFieldInCommand = 2,
    CommandIdConflict = 3,
    DataTransferError = 4,
    CommandAbortedPowerLoss = 5,
    InternalError = 6,
    AbortRequested = 7,
    AbortSQDeletion = 8,
    AbortFailedFuse = 9,
    AbortMissingFuse = 0xa,
    InvalidNamespaceFormat = 0xb,
    SequenceError = 0xc,
    InvalidSgl = 0xd,
    InvalidSglCount = 0xe,
    InvalidSglLength = 0xf,
    InvalidMetadataSglLength = 0x10,
    InvalidSglType = 0x11,
    InvalidUseOfControllerMemBuf = 0x12,
    InvalidPrpOffset = 0x13,
    AtomicWriteExceeded = 0x14,
    OperationDenied = 0x15,
    InvalidSglOffset = 0x16,
    InvalidSglSubtype = 0x17,
    HostIdInconsistentFormat = 0x18,
    KeepAliveExpired = 0x19,
    InvalidKeepAliveTimeout = 0x1a,
    AbortDueToPreemptAbort = 0x1b,
    SanitizeFailed = 0x1c,
    SanitizeInProgress = 0x1d,
    InvalidSglBlockGranularity = 0x1e,
    NotSupportedForQueueInCMB = 0x1f,
    NamespaceWriteProtected = 0x20,
    Interrupted = 0x21,
    TransientTransportError = 0x22,
    ProhibitedByLockdown = 0x23,
    AdminCommandMediaNotReady = 0x24,
    // reserved 0x25 .. 0x7f
    LbaOutOfRange = 0x80,
    CapacityExceeded = 0x81,
    NamespaceNotReady = 0x82,
    ReservationConflict = 0x83,
    FormatInProgress = 0x84,
    InvalidValueSize = 0x85,
    InvalidKeySize = 0x86,
    KvKeyDoesNotExist = 0x87,
    UnrecoveredError = 0x88,
    KeyExists = 0x89,
    // Reserved 0x90 .. 0xbf
    // Vendor Specific 0xc0 .. 0xff
}

/// Command specific status of admin commands
///
/// See: NVM Express Base Spec: Figure 96: Command Specific Status Values
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum)]
pub enum AdminCommandStatus {
    CompletionQueueInvalid = 0x00,
    InvalidQueueIdentifier = 0x01,
    InvalidQueueSize = 0x02,
    AbortCommandLimitExceeded = 0x03,
    AbortCommandMissing = 0x04,
    AsyncEventRequestLimitExceeded = 0x05,
    InvalidFirmwareSlot = 0x06,
    InvalidFirmwareImage = 0x07,
    InvalidInterruptVector = 0x08,
    InvalidLogPage = 0x09,
    InvalidFormat = 0x0a,
    FirmwareNeedsConventionalReset = 0x0b,
    InvalidQueueDeletion = 0x0c,
    FeatureNotSaveable = 0x0d,
    FeatureNotChangeable = 0x0e,
    FeatureNotNamespaceSpecific = 0x0f,
    FirmwareNeedsSubsystemReset = 0x10,
    FirmwareNeedsReset = 0x11,
    FirmwareNeedsMaxTime = 0x12,
    FirmwareActivationProhibited = 0x13,
    OverlappingRange = 0x14,
    NamespaceInsufficientCapacity = 0x15,
    NamespaceIdUnavailable = 0x16,
    // reserved 0x17
    NamespaceAlreadyAttached = 0x18,
    NamespaceIsPrivate = 0x19,
    NamespaceNotAttached = 0x1a,
    ThinProvisioningNotSupported = 0x1b,
    ControllerListInvalid = 0x1c,
    // 0x1d device self-test in progress is not reported by this layer
    BootPartitionWriteProhibited = 0x1e,
}

/// Command specific status of NVM io commands
///
/// See: NVM Command Set Spec: Figure 20: Status Code: Command Specific Status Values
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum)]
pub enum NvmCommandStatus {
    ConflictingAttributes = 0x80,
    InvalidProtectionInformation = 0x81,
    WriteToReadOnlyRange = 0x82,
    /// the command is not supported according to ONCS
    OncsNotSupported = 0x83,
}

/// Command specific status of fabrics commands
///
/// See: NVMe over Fabrics Spec: Figure 21: Connect Command Specific Status Values
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum)]
pub enum FabricsCommandStatus {
    IncompatibleFormat = 0x80,
    ControllerBusy = 0x81,
    ConnectInvalidParameters = 0x82,
    ConnectRestartDiscovery = 0x83,
    ConnectInvalidHost = 0x84,
    DiscoveryRestart = 0x90,
    AuthenticationRequired = 0x91,
}

/// Media and data integrity errors
///
/// See: NVM Express Base Spec: Figure 98: Media and Data Integrity Error Values
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, U8Enum)]
pub enum MediaErrorStatus {
    WriteFault = 0x80,
    UnrecoveredReadError = 0x81,
    EndToEndGuardCheckError = 0x82,
    EndToEndApplicationTagCheckError = 0x83,
    EndToEndReferenceTagCheckError = 0x84,
    CompareFailure = 0x85,
    AccessDenied = 0x86,
    DeallocatedOrUnwrittenBlock = 0x87,
}
