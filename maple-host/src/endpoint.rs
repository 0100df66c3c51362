//! Fixed-priority facade over the shared scheduler.

use crate::errors::ScheduleFull;
use crate::packet::MaplePacket;
use crate::scheduler::SharedTxScheduler;
use crate::transmission::TransmitterHandle;

/// Scheduler handle bound to one logical endpoint's priority.
///
/// Adds always queue at the fixed priority. Cancellations and recipient
/// counts operate on the whole schedule: recipient addresses are globally
/// unique on a bus, so scoping them to one priority would hide entries.
pub struct EndpointTxScheduler<'a, const PRIORITIES: usize, const DEPTH: usize> {
    scheduler: &'a SharedTxScheduler<PRIORITIES, DEPTH>,
    priority: u8,
}

impl<'a, const PRIORITIES: usize, const DEPTH: usize> EndpointTxScheduler<'a, PRIORITIES, DEPTH> {
    /// Bind a fixed priority to the shared scheduler.
    pub fn new(scheduler: &'a SharedTxScheduler<PRIORITIES, DEPTH>, priority: u8) -> Self {
        Self {
            scheduler,
            priority,
        }
    }

    /// The priority every add from this endpoint queues at.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Add a one-shot or repeating transmission at this endpoint's priority.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &self,
        tx_time_us: u64,
        transmitter: TransmitterHandle,
        packet: MaplePacket,
        expect_response: bool,
        expected_response_words: u32,
        auto_repeat_us: u64,
        auto_repeat_end_us: u64,
    ) -> Result<u32, ScheduleFull> {
        self.scheduler.add(
            self.priority,
            tx_time_us,
            transmitter,
            packet,
            expect_response,
            expected_response_words,
            auto_repeat_us,
            auto_repeat_end_us,
        )
    }

    /// Cancel by transmission id, schedule-wide.
    pub fn cancel_by_id(&self, id: u32) -> u32 {
        self.scheduler.cancel_by_id(id)
    }

    /// Cancel by recipient address, schedule-wide.
    pub fn cancel_by_recipient(&self, recipient_addr: u8) -> u32 {
        self.scheduler.cancel_by_recipient(recipient_addr)
    }

    /// Count entries addressed to a recipient, schedule-wide.
    pub fn count_recipients(&self, recipient_addr: u8) -> u32 {
        self.scheduler.count_recipients(recipient_addr)
    }

    /// Cancel everything on the schedule.
    pub fn cancel_all(&self) -> u32 {
        self.scheduler.cancel_all()
    }
}
