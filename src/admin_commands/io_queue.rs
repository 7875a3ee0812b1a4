use bit_field::BitField;
use shared_derive::U8Enum;

use crate::{
    codec::{Reader, Writer},
    generic_command::{CommandIdentifier, CommandPayload, QueueIdentifier, TransferMode},
    WireError,
};

/// Create an IO completion queue
///
/// See: NVM Express Base Spec: 5.4 Create I/O Completion Queue command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateCompletionQueue {
    /// physical address of the queue memory
    pub prp1: u64,
    pub queue_id: QueueIdentifier,
    /// 0 based number of entries
    pub queue_size: u16,
    pub physically_contiguous: bool,
    pub interrupts_enabled: bool,
    pub interrupt_vector: u16,
}

impl CommandPayload for CreateCompletionQueue {
    fn write(&self, w: &mut Writer) {
        w.u64(24, self.prp1);
        w.u16(40, self.queue_id.as_u16());
        w.u16(42, self.queue_size);
        let mut flags = 0u16;
        flags.set_bit(0, self.physically_contiguous);
        flags.set_bit(1, self.interrupts_enabled);
        w.u16(44, flags);
        w.u16(46, self.interrupt_vector);
    }

    fn read(r: &Reader, _mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..24)?;
        r.reserved(32..40)?;
        r.reserved(48..64)?;
        r.reserved_bits(44, 2..=15)?;
        let flags = r.u16(44);
        Ok(Self {
            prp1: r.u64(24),
            queue_id: QueueIdentifier(r.u16(40)),
            queue_size: r.u16(42),
            physically_contiguous: flags.get_bit(0),
            interrupts_enabled: flags.get_bit(1),
            interrupt_vector: r.u16(46),
        })
    }
}

/// Priority of a submission queue when weighted round robin arbitration is used
///
/// See: NVM Express Base Spec: Figure 476: Create I/O Submission Queue: QPRIO
#[repr(u8)]
#[derive(Debug, U8Enum, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePriority {
    #[default]
    Urgent = 0b00,
    High = 0b01,
    Medium = 0b10,
    Low = 0b11,
}

/// Create an IO submission queue
///
/// See: NVM Express Base Spec: 5.5 Create I/O Submission Queue command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateSubmissionQueue {
    /// physical address of the queue memory
    pub prp1: u64,
    pub queue_id: QueueIdentifier,
    /// 0 based number of entries
    pub queue_size: u16,
    pub physically_contiguous: bool,
    pub priority: QueuePriority,
    /// the completion queue used for commands of this queue
    pub completion_queue_id: QueueIdentifier,
}

impl CommandPayload for CreateSubmissionQueue {
    fn write(&self, w: &mut Writer) {
        w.u64(24, self.prp1);
        w.u16(40, self.queue_id.as_u16());
        w.u16(42, self.queue_size);
        let mut flags = 0u16;
        flags.set_bit(0, self.physically_contiguous);
        flags.set_bits(1..=2, u8::from(self.priority) as u16);
        w.u16(44, flags);
        w.u16(46, self.completion_queue_id.as_u16());
    }

    fn read(r: &Reader, _mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..24)?;
        r.reserved(32..40)?;
        r.reserved(48..64)?;
        r.reserved_bits(44, 3..=15)?;
        let flags = r.u16(44);
        let priority = QueuePriority::try_from(flags.get_bits(1..=2) as u8)
            .map_err(|e| WireError::invalid_field("qprio", e.value))?;
        Ok(Self {
            prp1: r.u64(24),
            queue_id: QueueIdentifier(r.u16(40)),
            queue_size: r.u16(42),
            physically_contiguous: flags.get_bit(0),
            priority,
            completion_queue_id: QueueIdentifier(r.u16(46)),
        })
    }
}

/// Delete an IO submission or completion queue
///
/// See: NVM Express Base Spec: 5.6 and 5.7 Delete I/O Queue commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteQueue {
    pub queue_id: QueueIdentifier,
}

impl CommandPayload for DeleteQueue {
    fn write(&self, w: &mut Writer) {
        w.u16(40, self.queue_id.as_u16());
    }

    fn read(r: &Reader, _mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..40)?;
        r.reserved(42..64)?;
        Ok(Self {
            queue_id: QueueIdentifier(r.u16(40)),
        })
    }
}

/// Abort a previously submitted command
///
/// See: NVM Express Base Spec: 5.1 Abort command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abort {
    pub submission_queue_id: QueueIdentifier,
    pub command_id: CommandIdentifier,
}

impl CommandPayload for Abort {
    fn write(&self, w: &mut Writer) {
        w.u16(40, self.submission_queue_id.as_u16());
        w.u16(42, self.command_id.as_u16());
    }

    fn read(r: &Reader, _mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..40)?;
        r.reserved(44..64)?;
        Ok(Self {
            submission_queue_id: QueueIdentifier(r.u16(40)),
            command_id: CommandIdentifier(r.u16(42)),
        })
    }
}

/// Configure shadow doorbell and event index buffers
///
/// See: NVM Express Base Spec: 5.8 Doorbell Buffer Config command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorbellBufferConfig {
    /// page aligned shadow doorbell buffer
    pub shadow_doorbell_buffer: u64,
    /// page aligned event index buffer
    pub event_index_buffer: u64,
}

impl CommandPayload for DoorbellBufferConfig {
    fn write(&self, w: &mut Writer) {
        w.u64(24, self.shadow_doorbell_buffer);
        w.u64(32, self.event_index_buffer);
    }

    fn read(r: &Reader, _mode: TransferMode) -> Result<Self, WireError> {
        r.reserved(8..24)?;
        r.reserved(40..64)?;
        Ok(Self {
            shadow_doorbell_buffer: r.u64(24),
            event_index_buffer: r.u64(32),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::DecodeOptions;

    #[test]
    fn completion_queue_flags() {
        let create = CreateCompletionQueue {
            prp1: 0x20_0000,
            queue_id: QueueIdentifier(1),
            queue_size: 63,
            physically_contiguous: true,
            interrupts_enabled: true,
            interrupt_vector: 2,
        };
        let mut entry = [0u8; 64];
        create.write(&mut Writer::new(&mut entry));
        assert_eq!([0b11, 0, 2, 0], entry[44..48]);

        let r = Reader::new(&entry, 64, DecodeOptions::STRICT).unwrap();
        assert_eq!(Ok(create), CreateCompletionQueue::read(&r, TransferMode::Prp));

        entry[44] |= 1 << 2;
        let r = Reader::new(&entry, 64, DecodeOptions::STRICT).unwrap();
        assert_eq!(
            Err(WireError::MalformedReserved { offset: 44 }),
            CreateCompletionQueue::read(&r, TransferMode::Prp)
        );
        let r = Reader::new(&entry, 64, DecodeOptions::LENIENT).unwrap();
        assert_eq!(Ok(create), CreateCompletionQueue::read(&r, TransferMode::Prp));
    }

    #[test]
    fn submission_queue_flags() {
        let create = CreateSubmissionQueue {
            prp1: 0x30_0000,
            queue_id: QueueIdentifier(1),
            queue_size: 63,
            physically_contiguous: true,
            priority: QueuePriority::Low,
            completion_queue_id: QueueIdentifier(1),
        };
        let mut entry = [0u8; 64];
        create.write(&mut Writer::new(&mut entry));
        assert_eq!([0b111, 0, 1, 0], entry[44..48]);

        entry[45] = 0x80;
        let r = Reader::new(&entry, 64, DecodeOptions::STRICT).unwrap();
        assert_eq!(
            Err(WireError::MalformedReserved { offset: 45 }),
            CreateSubmissionQueue::read(&r, TransferMode::Prp)
        );
    }
}
