//! Priority-ordered transmission scheduling.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Vec;

use crate::errors::ScheduleFull;
use crate::packet::MaplePacket;
use crate::transmission::{Transmission, TransmitterHandle};

/// Use for `tx_time_us` when the packet should be sent as soon as possible.
pub const TX_TIME_ASAP: u64 = 0;

/// The smallest time strictly after `now_us` that lies on the cadence
/// `offset_us + k * period_us`.
///
/// `now_us == offset_us` yields `offset_us + period_us`. `period_us` must be
/// non-zero; callers guard.
pub fn compute_next_time_cadence(now_us: u64, period_us: u64, offset_us: u64) -> u64 {
    debug_assert!(period_us > 0);
    if now_us < offset_us {
        let back = (offset_us - now_us - 1) / period_us;
        offset_us - back * period_us
    } else {
        let periods = (now_us - offset_us) / period_us + 1;
        offset_us.saturating_add(periods.saturating_mul(period_us))
    }
}

/// At most one transmission per physical endpoint can be in flight.
const MAX_IN_FLIGHT: usize = 4;

#[derive(Debug, Clone, Copy)]
struct InFlight {
    id: u32,
    recipient_addr: u8,
    canceled: bool,
}

/// Process-wide schedule, partitioned by priority.
///
/// `PRIORITIES` is the number of priority levels (0 is highest), `DEPTH` the
/// capacity of each partition. Within a partition entries are ordered by due
/// time, FIFO among equal times; across partitions priority strictly
/// dominates time.
///
/// The scheduler itself is single-context; see [`SharedTxScheduler`] for the
/// wrapper that makes `add`/`pop_next`/`cancel*` linearizable across producer
/// contexts and the pump.
pub struct PrioritizedTxScheduler<const PRIORITIES: usize, const DEPTH: usize> {
    next_id: u32,
    schedule: [Vec<Transmission, DEPTH>; PRIORITIES],
    in_flight: Vec<InFlight, MAX_IN_FLIGHT>,
}

impl<const PRIORITIES: usize, const DEPTH: usize> Default
    for PrioritizedTxScheduler<PRIORITIES, DEPTH>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const PRIORITIES: usize, const DEPTH: usize> PrioritizedTxScheduler<PRIORITIES, DEPTH> {
    /// Create an empty schedule. Ids start at 1; 0 is never assigned.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            schedule: core::array::from_fn(|_| Vec::new()),
            in_flight: Vec::new(),
        }
    }

    /// Add a transmission to the schedule.
    ///
    /// `tx_time_us` of [`TX_TIME_ASAP`] means "due immediately". `priority`
    /// must be below `PRIORITIES`. Returns the assigned transmission id.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        priority: u8,
        tx_time_us: u64,
        transmitter: TransmitterHandle,
        packet: MaplePacket,
        expect_response: bool,
        expected_response_words: u32,
        auto_repeat_us: u64,
        auto_repeat_end_us: u64,
    ) -> Result<u32, ScheduleFull> {
        let id = self.alloc_id();
        let tx = Transmission {
            id,
            priority,
            next_tx_time_us: tx_time_us,
            packet,
            transmitter,
            expect_response,
            expected_response_words,
            auto_repeat_us,
            auto_repeat_end_us,
            canceled: false,
        };
        self.insert(tx)?;
        Ok(id)
    }

    /// Put a previously popped transmission back on the schedule, keeping its
    /// id. Used by the pump for auto-repeat.
    pub fn reinsert(&mut self, tx: Transmission) -> Result<(), ScheduleFull> {
        self.insert(tx)
    }

    /// Pop the next due transmission, scanning priorities from highest.
    ///
    /// Returns the head of the lowest-numbered non-empty partition whose due
    /// time has passed. A higher-priority partition whose head is still in
    /// the future does not block lower priorities.
    pub fn pop_next(&mut self, now_us: u64) -> Option<Transmission> {
        for partition in self.schedule.iter_mut() {
            let due = partition
                .first()
                .is_some_and(|head| head.next_tx_time_us <= now_us);
            if due {
                let tx = partition.remove(0);
                // Track delivery so a cancel arriving mid-flight can still
                // suppress the auto-repeat re-add.
                let _ = self.in_flight.push(InFlight {
                    id: tx.id,
                    recipient_addr: tx.packet.frame.recipient_addr,
                    canceled: false,
                });
                return Some(tx);
            }
        }
        None
    }

    /// Finish tracking a popped transmission. Returns whether a cancellation
    /// reached it while it was in flight.
    pub fn retire(&mut self, id: u32) -> bool {
        match self.in_flight.iter().position(|f| f.id == id) {
            Some(idx) => self.in_flight.remove(idx).canceled,
            None => false,
        }
    }

    /// Cancel scheduled transmissions by id.
    ///
    /// Returns the number of not-yet-delivered entries removed. An id that is
    /// currently in flight is marked instead: its delivery proceeds, but it
    /// will not be re-added on auto-repeat.
    pub fn cancel_by_id(&mut self, id: u32) -> u32 {
        self.cancel_where(|tx| tx.id == id, |f| f.id == id)
    }

    /// Cancel scheduled transmissions by recipient address.
    pub fn cancel_by_recipient(&mut self, recipient_addr: u8) -> u32 {
        self.cancel_where(
            |tx| tx.packet.frame.recipient_addr == recipient_addr,
            |f| f.recipient_addr == recipient_addr,
        )
    }

    /// Count scheduled transmissions with the given recipient address.
    pub fn count_recipients(&self, recipient_addr: u8) -> u32 {
        self.schedule
            .iter()
            .flat_map(|partition| partition.iter())
            .filter(|tx| tx.packet.frame.recipient_addr == recipient_addr)
            .count() as u32
    }

    /// Cancel every scheduled transmission.
    pub fn cancel_all(&mut self) -> u32 {
        self.cancel_where(|_| true, |_| true)
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        if self.next_id == 0 {
            self.next_id = 1;
        }
        id
    }

    fn insert(&mut self, tx: Transmission) -> Result<(), ScheduleFull> {
        let partition = &mut self.schedule[usize::from(tx.priority)];
        // First position strictly later than the new entry; equal times keep
        // arrival order.
        let at = partition
            .iter()
            .position(|queued| queued.next_tx_time_us > tx.next_tx_time_us)
            .unwrap_or(partition.len());
        partition.insert(at, tx).map_err(|_| ScheduleFull)
    }

    fn cancel_where(
        &mut self,
        queued: impl Fn(&Transmission) -> bool,
        in_flight: impl Fn(&InFlight) -> bool,
    ) -> u32 {
        let mut count = 0u32;
        for partition in self.schedule.iter_mut() {
            let before = partition.len();
            partition.retain(|tx| !queued(tx));
            count += (before - partition.len()) as u32;
        }
        for flight in self.in_flight.iter_mut() {
            if in_flight(flight) {
                flight.canceled = true;
            }
        }
        count
    }
}

/// Interrupt-safe shared handle around a [`PrioritizedTxScheduler`].
///
/// Producers (command parsers, peripheral state machines) and the pump all
/// mutate the schedule; each operation runs inside one critical section, so
/// `add`, `pop_next`, and the cancellations are linearizable with respect to
/// each other. No lock is ever held across a call into the bus driver.
pub struct SharedTxScheduler<const PRIORITIES: usize, const DEPTH: usize> {
    inner: Mutex<RefCell<PrioritizedTxScheduler<PRIORITIES, DEPTH>>>,
}

impl<const PRIORITIES: usize, const DEPTH: usize> Default
    for SharedTxScheduler<PRIORITIES, DEPTH>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const PRIORITIES: usize, const DEPTH: usize> SharedTxScheduler<PRIORITIES, DEPTH> {
    /// Wrap an empty schedule.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(PrioritizedTxScheduler::new())),
        }
    }

    /// Run `f` with exclusive access to the schedule.
    pub fn with<R>(&self, f: impl FnOnce(&mut PrioritizedTxScheduler<PRIORITIES, DEPTH>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    /// See [`PrioritizedTxScheduler::add`].
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &self,
        priority: u8,
        tx_time_us: u64,
        transmitter: TransmitterHandle,
        packet: MaplePacket,
        expect_response: bool,
        expected_response_words: u32,
        auto_repeat_us: u64,
        auto_repeat_end_us: u64,
    ) -> Result<u32, ScheduleFull> {
        self.with(|s| {
            s.add(
                priority,
                tx_time_us,
                transmitter,
                packet,
                expect_response,
                expected_response_words,
                auto_repeat_us,
                auto_repeat_end_us,
            )
        })
    }

    /// See [`PrioritizedTxScheduler::pop_next`].
    pub fn pop_next(&self, now_us: u64) -> Option<Transmission> {
        self.with(|s| s.pop_next(now_us))
    }

    /// See [`PrioritizedTxScheduler::retire`].
    pub fn retire(&self, id: u32) -> bool {
        self.with(|s| s.retire(id))
    }

    /// See [`PrioritizedTxScheduler::reinsert`].
    pub fn reinsert(&self, tx: Transmission) -> Result<(), ScheduleFull> {
        self.with(|s| s.reinsert(tx))
    }

    /// See [`PrioritizedTxScheduler::cancel_by_id`].
    pub fn cancel_by_id(&self, id: u32) -> u32 {
        self.with(|s| s.cancel_by_id(id))
    }

    /// See [`PrioritizedTxScheduler::cancel_by_recipient`].
    pub fn cancel_by_recipient(&self, recipient_addr: u8) -> u32 {
        self.with(|s| s.cancel_by_recipient(recipient_addr))
    }

    /// See [`PrioritizedTxScheduler::count_recipients`].
    pub fn count_recipients(&self, recipient_addr: u8) -> u32 {
        self.with(|s| s.count_recipients(recipient_addr))
    }

    /// See [`PrioritizedTxScheduler::cancel_all`].
    pub fn cancel_all(&self) -> u32 {
        self.with(|s| s.cancel_all())
    }
}
