//! Schedule entry: a packet plus its delivery metadata.

use crate::packet::MaplePacket;

/// Routing tag identifying which transmitter a transmission belongs to.
///
/// The callback set of a host is closed (command echo, peripheral state
/// machines, housekeeping), so transmissions carry a small tag and the
/// application's single [`Transmitter`](crate::Transmitter) implementation
/// routes on it, rather than each entry holding a trait object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransmitterHandle(pub u8);

/// One scheduled transmission.
///
/// Owned by the scheduler while queued and by the pump from pop until the
/// terminal callback returns; auto-repeat hands the same record (same id)
/// back to the scheduler.
#[derive(Debug, Clone)]
pub struct Transmission {
    /// Unique id, monotonically assigned, never 0.
    pub id: u32,
    /// Priority this entry was queued at (0 is highest).
    pub priority: u8,
    /// Microsecond time at or after which this entry is due.
    pub next_tx_time_us: u64,
    /// The packet to deliver.
    pub packet: MaplePacket,
    /// Routing tag for the owning transmitter.
    pub transmitter: TransmitterHandle,
    /// Whether a response should be read back after the write.
    pub expect_response: bool,
    /// Payload words the response is expected to carry (metadata for the
    /// transmitter; the read path accepts whatever arrives).
    pub expected_response_words: u32,
    /// Repeat period in microseconds (0 = one-shot).
    pub auto_repeat_us: u64,
    /// Time after which auto-repeat stops (0 = never).
    pub auto_repeat_end_us: u64,
    /// Set when a cancellation reached this entry while it was in flight;
    /// suppresses the auto-repeat re-add.
    pub canceled: bool,
}
