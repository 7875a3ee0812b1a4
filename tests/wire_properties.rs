use nvme_wire::{
    admin_commands::{
        Abort, AdminCommand, CommitAction, CreateCompletionQueue, CreateSubmissionQueue, Cns,
        DeleteQueue, Directive, DirectiveType, DoorbellBufferConfig, FeatureIdentifier, Features,
        FirmwareCommit, FirmwareDownload, FormatNvm, GetLogPage, Identify,
        IdentifyControllerData, IdentifyNamespaceData, LogPageIdentifier, ProtectionInformation,
        QueuePriority, Sanitize, SanitizeAction, SecureErase, IDENTIFY_DATA_SIZE, LBA_FORMAT_COUNT,
    },
    command::is_write_raw,
    completion::GenericCommandStatus,
    fabrics::{
        Connect, ConnectData, DiscoveryLogPage, FabricsCommand, Nqn, PropertyGet, PropertySet,
        RdmaConnectionManagement, RdmaProviderType, RdmaQueuePairType, TransportSpecificAddress,
        TransportType, DISCOVERY_ENTRY_SIZE, DISCOVERY_HEADER_SIZE,
    },
    generic_command::{
        GenericCommand, KeyedSglDescriptor, SglDescriptor, SglDescriptorType, SglSubType,
    },
    io_commands::{
        AcquireAction, ControlFlags, DatasetManagement, IoCommand, PersistThroughPowerLoss,
        ReadWrite, RegisterAction, ReleaseAction, ReservationAcquire, ReservationRegister,
        ReservationRelease, ReservationReport, ReservationType, LBA,
    },
    properties::Property,
    Command, CommandIdentifier, CommandSet, CompletionEntry, DataPtr, DecodeOptions,
    QueueIdentifier, QueueType, StatusCode, StatusCodeType, StatusField, TransferMode, WireError,
};
use shared::test_utils::init_test_logger;
use uuid::Uuid;

fn prp() -> DataPtr {
    DataPtr::Prp {
        prp1: 0x10_0000,
        prp2: 0x10_1000,
    }
}

fn sgl() -> DataPtr {
    DataPtr::Sgl(SglDescriptor {
        address: 0x20_0000,
        length: 0x2000,
        descriptor_type: SglDescriptorType::DataBlock,
        sub_type: SglSubType::Address,
    })
}

fn keyed_sgl() -> DataPtr {
    DataPtr::KeyedSgl(KeyedSglDescriptor::new(0x30_0000, 0x1000, 0xabcd_1234, SglSubType::Invalidate).unwrap())
}

fn admin_commands() -> Vec<AdminCommand> {
    let mut get_features = Features::new(FeatureIdentifier::VolatileWriteCache);
    get_features.select = nvme_wire::admin_commands::FeatureSelect::Saved;
    let mut set_features = Features::number_of_queues(7, 7);
    set_features.save = true;
    let mut log_page = GetLogPage::new(LogPageIdentifier::Smart, prp(), 512).unwrap();
    log_page.offset = 0x1_0000_0000;

    vec![
        AdminCommand::DeleteIOSubmissionQueue(DeleteQueue {
            queue_id: QueueIdentifier(3),
        }),
        AdminCommand::CreateIOSubmissionQueue(CreateSubmissionQueue {
            prp1: 0x4000,
            queue_id: QueueIdentifier(3),
            queue_size: 63,
            physically_contiguous: true,
            priority: QueuePriority::High,
            completion_queue_id: QueueIdentifier(3),
        }),
        AdminCommand::GetLogPage(log_page),
        AdminCommand::DeleteIOCompletionQueue(DeleteQueue {
            queue_id: QueueIdentifier(3),
        }),
        AdminCommand::CreateIOCompletionQueue(CreateCompletionQueue {
            prp1: 0x5000,
            queue_id: QueueIdentifier(3),
            queue_size: 63,
            physically_contiguous: true,
            interrupts_enabled: true,
            interrupt_vector: 2,
        }),
        AdminCommand::Identify(Identify::new(Cns::Controller, prp())),
        AdminCommand::Abort(Abort {
            submission_queue_id: QueueIdentifier(1),
            command_id: CommandIdentifier(0x77),
        }),
        AdminCommand::SetFeatures(set_features),
        AdminCommand::GetFeatures(get_features),
        AdminCommand::AsynchronousEventRequest,
        AdminCommand::NamespaceManagement(GenericCommand {
            data_ptr: prp(),
            dwords: [1, 0, 0, 0, 0, 0],
            ..Default::default()
        }),
        AdminCommand::FirmwareCommit(FirmwareCommit {
            slot: 2,
            action: CommitAction::ReplaceAndActivate,
        }),
        AdminCommand::FirmwareImageDownload(FirmwareDownload {
            data_ptr: prp(),
            dword_count: 1023,
            dword_offset: 4096,
        }),
        AdminCommand::NamespaceAttachment(GenericCommand {
            data_ptr: prp(),
            ..Default::default()
        }),
        AdminCommand::KeepAlive,
        AdminCommand::DirectiveSend(Directive {
            data_ptr: prp(),
            dword_count: 3,
            operation: 1,
            directive_type: DirectiveType::Identify,
            directive_specific: 0,
            endir: 1,
            target_type: 1,
        }),
        AdminCommand::DirectiveReceive(Directive {
            data_ptr: prp(),
            dword_count: 1023,
            operation: 1,
            directive_type: DirectiveType::Streams,
            ..Default::default()
        }),
        AdminCommand::DoorbellBufferConfig(DoorbellBufferConfig {
            shadow_doorbell_buffer: 0x6000,
            event_index_buffer: 0x7000,
        }),
        AdminCommand::FormatNVM(FormatNvm {
            lba_format: 1,
            metadata_settings: false,
            protection_information: ProtectionInformation::Type1,
            protection_information_first: true,
            secure_erase: SecureErase::UserData,
        }),
        AdminCommand::SecuritySend(GenericCommand {
            data_ptr: prp(),
            dwords: [0x0100_0000, 512, 0, 0, 0, 0],
            ..Default::default()
        }),
        AdminCommand::SecurityReceive(GenericCommand {
            data_ptr: prp(),
            dwords: [0x0100_0000, 512, 0, 0, 0, 0],
            ..Default::default()
        }),
        AdminCommand::Sanitize(Sanitize {
            overwrite_pass_count: 3,
            overwrite_pattern: 0xdead_beef,
            ..Sanitize::new(SanitizeAction::Overwrite)
        }),
    ]
}

fn io_commands() -> Vec<IoCommand> {
    let mut read = ReadWrite::new(sgl(), LBA::new(0x1234), 8).unwrap();
    read.control = ControlFlags::FUA;
    let write = ReadWrite::new(keyed_sgl(), LBA::new(0x1234), 8).unwrap();
    let mut zeroes = ReadWrite::new(DataPtr::default(), LBA::new(64), 32).unwrap();
    zeroes.control = ControlFlags::DEAC;

    vec![
        IoCommand::Flush,
        IoCommand::Write(write),
        IoCommand::Read(read),
        IoCommand::WriteUncorrectable(ReadWrite::new(DataPtr::default(), LBA::new(7), 1).unwrap()),
        IoCommand::Compare(ReadWrite::new(prp(), LBA::new(7), 2).unwrap()),
        IoCommand::WriteZeroes(zeroes),
        IoCommand::DatasetManagement(DatasetManagement::deallocate(prp(), 4).unwrap()),
        IoCommand::ReservationRegister(ReservationRegister {
            data_ptr: prp(),
            action: RegisterAction::Replace,
            ignore_key: true,
            persist_through_power_loss: PersistThroughPowerLoss::Set,
        }),
        IoCommand::ReservationReport(ReservationReport {
            data_ptr: prp(),
            dword_count: 127,
            extended_data_structure: true,
        }),
        IoCommand::ReservationAcquire(ReservationAcquire {
            data_ptr: prp(),
            action: AcquireAction::Preempt,
            ignore_key: false,
            reservation_type: ReservationType::ExclusiveAccess,
        }),
        IoCommand::ReservationRelease(ReservationRelease {
            data_ptr: prp(),
            action: ReleaseAction::Release,
            ignore_key: false,
            reservation_type: Some(ReservationType::ExclusiveAccess),
        }),
    ]
}

fn fabrics_commands() -> Vec<FabricsCommand> {
    vec![
        FabricsCommand::PropertySet(PropertySet::new(Property::ControllerConfiguration, 0x0046_0001)),
        FabricsCommand::Connect(Connect::admin(keyed_sgl(), 32, 120_000)),
        FabricsCommand::PropertyGet(PropertyGet::new(Property::Capabilities)),
    ]
}

fn round_trip(command: Command, queue: QueueType) {
    let entry = command.encode().unwrap();
    assert_eq!(64, entry.len());
    assert_eq!(command.is_write(), is_write_raw(&entry));
    assert_eq!(
        Ok(command),
        Command::decode(&entry, queue, DecodeOptions::STRICT),
        "round trip of opcode {:#04x}",
        command.opcode()
    );
}

#[test]
fn every_admin_command_round_trips() {
    init_test_logger();
    for (id, command) in admin_commands().into_iter().enumerate() {
        round_trip(
            Command::admin(CommandIdentifier(id as u16), 0, command),
            QueueType::Admin,
        );
    }
}

#[test]
fn every_io_command_round_trips() {
    init_test_logger();
    for (id, command) in io_commands().into_iter().enumerate() {
        round_trip(
            Command::io(CommandIdentifier(id as u16), 1, command),
            QueueType::Io,
        );
    }
}

#[test]
fn every_fabrics_command_round_trips() {
    init_test_logger();
    for (id, command) in fabrics_commands().into_iter().enumerate() {
        let command = Command::fabrics(CommandIdentifier(id as u16), command);
        round_trip(command, QueueType::Admin);
        round_trip(command, QueueType::Io);
    }
}

#[test]
fn data_pointer_resolution() {
    for data_ptr in [prp(), sgl(), keyed_sgl()] {
        let bytes = data_ptr.encode().unwrap();
        assert_eq!(Ok(data_ptr), DataPtr::decode(data_ptr.transfer_mode(), &bytes));
    }
    // the transfer mode is authoritative, sgl bytes read in prp mode stay prp
    let bytes = sgl().encode().unwrap();
    assert!(matches!(
        DataPtr::decode(TransferMode::Prp, &bytes),
        Ok(DataPtr::Prp { .. })
    ));
}

#[test]
fn write_direction() {
    let io = |command| Command::io(CommandIdentifier(1), 1, command);
    let block = ReadWrite::new(prp(), LBA::new(0), 1).unwrap();
    assert!(io(IoCommand::Write(block)).is_write());
    assert!(!io(IoCommand::Read(block)).is_write());
    assert!(!io(IoCommand::Flush).is_write());

    let fabrics = fabrics_commands()
        .into_iter()
        .map(|command| Command::fabrics(CommandIdentifier(1), command).is_write())
        .collect::<Vec<_>>();
    // property set, connect, property get
    assert_eq!(vec![false, true, false], fabrics);

    let mut raw = [0u8; 64];
    raw[0] = 0x7f;
    raw[4] = 0x01;
    assert!(is_write_raw(&raw));
    raw[4] = 0x04;
    assert!(!is_write_raw(&raw));
}

#[test]
fn completion_status_decoding() {
    let mut entry = CompletionEntry {
        command_id: CommandIdentifier(5),
        status: StatusField(0x0002),
        ..Default::default()
    };
    let decoded = CompletionEntry::decode(&entry.encode()).unwrap();
    assert_eq!(16, entry.encode().len());
    assert_eq!(StatusCodeType::Generic, decoded.status.status_code_type());
    assert_eq!(1, decoded.status.status_code());
    assert!(!decoded.status.do_not_retry());
    assert_eq!(
        StatusCode::Generic(GenericCommandStatus::InvalidCommandOpcode),
        decoded.status(CommandSet::Nvm)
    );

    entry.status = StatusField(0x4002);
    let decoded = CompletionEntry::decode(&entry.encode()).unwrap();
    assert_eq!(1, decoded.status.status_code());
    assert!(decoded.status.do_not_retry());
    assert_eq!(
        StatusCode::Generic(GenericCommandStatus::InvalidCommandOpcode),
        decoded.status(CommandSet::Nvm)
    );
}

fn rdma_discovery_page() -> Vec<u8> {
    let mut page = vec![0u8; DISCOVERY_HEADER_SIZE + 2 * DISCOVERY_ENTRY_SIZE];
    page[0..8].copy_from_slice(&3u64.to_le_bytes());
    page[8..16].copy_from_slice(&2u64.to_le_bytes());
    for (i, entry) in page[DISCOVERY_HEADER_SIZE..]
        .chunks_exact_mut(DISCOVERY_ENTRY_SIZE)
        .enumerate()
    {
        entry[0] = 1; // rdma
        entry[1] = 1; // ipv4
        entry[2] = 2; // nvme subsystem
        entry[4..6].copy_from_slice(&(i as u16).to_le_bytes());
        entry[6..8].copy_from_slice(&0xffffu16.to_le_bytes());
        entry[8..10].copy_from_slice(&32u16.to_le_bytes());
        entry[32..36].copy_from_slice(b"4420");
        let nqn = b"nqn.2016-06.io.spdk:cnode1";
        entry[256..256 + nqn.len()].copy_from_slice(nqn);
        let traddr = format!("192.168.0.{}", 10 + i);
        entry[512..512 + traddr.len()].copy_from_slice(traddr.as_bytes());
        entry[768] = 1; // connected
        entry[769] = 4; // roce v2
        entry[770] = 1; // rdma cm
    }
    page
}

#[test]
fn discovery_page_with_two_rdma_entries() {
    init_test_logger();
    let page = DiscoveryLogPage::parse(&rdma_discovery_page()).unwrap();
    assert_eq!(3, page.generation_counter);
    assert_eq!(2, page.entries.len());
    for (i, entry) in page.entries.iter().enumerate() {
        assert_eq!(TransportType::Rdma, entry.transport_type);
        assert_eq!(i as u16, entry.port_id);
        assert_eq!("4420", entry.transport_service_id);
        assert_eq!(format!("192.168.0.{}", 10 + i), entry.transport_address);
        assert_eq!(
            TransportSpecificAddress::Rdma {
                queue_pair_type: RdmaQueuePairType::Connected,
                provider_type: RdmaProviderType::RoCEv2,
                connection_management: RdmaConnectionManagement::RdmaCm,
                partition_key: 0,
            },
            entry.transport_specific_address
        );
    }

    let short = rdma_discovery_page();
    assert!(matches!(
        DiscoveryLogPage::parse(&short[..DISCOVERY_HEADER_SIZE + DISCOVERY_ENTRY_SIZE]),
        Err(WireError::LengthMismatch { .. })
    ));
}

#[test]
fn nqn_length_bound() {
    let accepted = format!("nqn.2014-08.org.example:{}", "x".repeat(223 - 24));
    assert_eq!(223, accepted.len());
    assert!(Nqn::new(&accepted).is_ok());

    let rejected = format!("{accepted}y");
    assert_eq!(Err(WireError::NameTooLong(224)), Nqn::new(&rejected));
}

#[test]
fn connect_data_offsets() {
    let data = ConnectData::new(
        Uuid::from_bytes([0x5a; 16]),
        Nqn::new("nqn.2016-06.io.spdk:cnode1").unwrap(),
        Nqn::new("nqn.2014-08.org.nvmexpress:uuid:host").unwrap(),
    );
    let buf = data.encode();
    assert_eq!(&[0x5a; 16], &buf[0..16]);
    assert_eq!(b"nqn.2016-06.io.spdk:cnode1", &buf[256..282]);
    assert_eq!(b"nqn.2014-08.org.nvmexpress:uuid:host", &buf[512..548]);
    assert_eq!(Ok(data), ConnectData::decode(&buf));
}

#[test]
fn namespace_always_has_16_lba_formats() {
    let mut buf = vec![0u8; IDENTIFY_DATA_SIZE];
    buf[25] = 3; // nlbaf
    for i in 0..4 {
        let offset = 128 + i * 4;
        buf[offset + 2] = 9 + i as u8;
    }
    let namespace = IdentifyNamespaceData::parse(&buf).unwrap();
    assert_eq!(LBA_FORMAT_COUNT, namespace.lba_formats.len());
    assert_eq!(16, namespace.lba_formats.len());
    assert_eq!(4, namespace.valid_lba_formats().len());
    assert_eq!(Some(512), namespace.lba_formats[0].block_size());
}

#[test]
fn identify_payloads_must_be_4096_bytes() {
    let buf = vec![0u8; IDENTIFY_DATA_SIZE - 1];
    assert_eq!(
        Err(WireError::LengthMismatch {
            expected: 4096,
            actual: 4095
        }),
        IdentifyControllerData::parse(&buf)
    );
    assert!(matches!(
        IdentifyNamespaceData::parse(&buf),
        Err(WireError::LengthMismatch { .. })
    ));
}
