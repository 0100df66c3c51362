//! Hardware backend interface for Maple Bus transceivers.
//!
//! The crate provides the seam between a physical-layer driver (PIO state
//! machines plus DMA on an RP2040, a logic-analyzer replay, a test double)
//! and the `maple-host` transport stack. Limited scope facilitates
//! compatibility across versions: backend crates should depend on this crate,
//! while stack users should depend on `maple-host` instead.
//!
//! A backend exposes three things:
//! * submission of a fully framed TX word buffer ([`MaplePhy::start_tx`]),
//! * observation of the receive DMA ([`MaplePhy::rx_buffer`],
//!   [`MaplePhy::rx_transfer_remaining`]), and
//! * a latch of interrupt-originated events ([`MaplePhy::poll_event`]).
//!
//! Interrupt handlers in a real backend are expected to do nothing beyond
//! recording a [`PhyEvent`] with a timestamp; every phase decision (flipping
//! the direction pin, arming the receiver, computing kill times) is made by
//! the bus driver when it drains the latch. This keeps interrupt latency
//! bounded and makes the whole transmit/receive state machine observable from
//! a host test.
//!
//! The wire encoding itself (start/end sequences, edge clocking) is the
//! backend's business. The stack hands over 32-bit words exactly as they must
//! appear on the bus, most significant byte first per word, together with the
//! 8-bit XOR checksum and the total bit count the line will carry.

#![no_std]

/// Monotonic microsecond time source.
///
/// The transport stack works exclusively in microseconds since an arbitrary
/// origin. Wall-clock time is unsuitable: kill times and cadence arithmetic
/// assume the value never steps backwards.
pub trait Clock {
    /// Microseconds elapsed since the clock's origin.
    fn now_us(&self) -> u64;
}

impl<C: Clock> Clock for &C {
    fn now_us(&self) -> u64 {
        (*self).now_us()
    }
}

/// Data line direction as seen from the microcontroller.
///
/// Hosts with an external bus buffer route this to the buffer's direction
/// pin; backends without one may ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Lines are inputs; the bus may be driven by a peripheral.
    Input,
    /// Lines are outputs; this endpoint is transmitting.
    Output,
}

/// Mid-packet pacing request for long transfers.
///
/// Some peripherals (storage block writes in particular) need the host to
/// idle between bursts of words inside one packet. When `delay_us` is zero
/// the packet is clocked out in one piece. Otherwise the backend emits
/// `first_word_chunk` words, then repeats `second_word_chunk`-word bursts
/// separated by `delay_us` microseconds of idle line until the packet and its
/// checksum are out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxPacing {
    /// Idle time between chunks, in microseconds (0 = no pacing).
    pub delay_us: u32,
    /// Words in the first chunk, counting the frame word.
    pub first_word_chunk: u32,
    /// Words in every following chunk.
    pub second_word_chunk: u32,
}

impl TxPacing {
    /// No mid-packet pacing.
    pub const NONE: TxPacing = TxPacing {
        delay_us: 0,
        first_word_chunk: 0,
        second_word_chunk: 0,
    };

    /// Whether this pacing definition splits a packet of `words` 32-bit words.
    pub fn applies_to(&self, words: u32) -> bool {
        self.delay_us > 0 && self.first_word_chunk < words
    }
}

impl Default for TxPacing {
    fn default() -> Self {
        TxPacing::NONE
    }
}

/// A fully framed transmission handed to the backend.
///
/// `words` is the frame word followed by the payload words. The backend
/// appends the start sequence, the 8-bit checksum, and the end sequence in
/// whatever form its hardware needs. `total_bits` counts the word bits plus
/// the 8 checksum bits and must equal `words.len() * 32 + 8`.
#[derive(Debug, Clone, Copy)]
pub struct TxFrame<'a> {
    /// Frame word followed by payload words.
    pub words: &'a [u32],
    /// XOR of every byte of `words`.
    pub crc: u8,
    /// Bits the line will carry, checksum included.
    pub total_bits: u32,
    /// Mid-packet pacing request.
    pub pacing: TxPacing,
}

/// Event kinds latched from backend interrupt context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhyEventKind {
    /// The TX unit is about to finish clocking out the end sequence.
    TxEnding,
    /// The RX unit observed a start sequence.
    RxStarted,
    /// The RX unit observed an end sequence.
    RxEnded,
}

/// A timestamped interrupt-originated event.
///
/// `at_us` is the backend clock reading at the moment the interrupt fired,
/// not the moment the stack drained the latch; response kill times are
/// computed from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhyEvent {
    /// What happened.
    pub kind: PhyEventKind,
    /// Backend clock reading when it happened, microseconds.
    pub at_us: u64,
}

/// A Maple Bus physical-layer backend.
///
/// One implementation owns one physical two-wire endpoint: its TX and RX
/// units, both DMA channels, and the optional direction pin. At most one of
/// TX/RX is active at a time; the stack guarantees it never starts an
/// operation while another is in progress.
///
/// The RX buffer must hold one word more than the longest legal reception
/// (frame word + 255 payload words + checksum word), so that a transfer
/// residual of zero always means overflow and never normal completion.
pub trait MaplePhy {
    /// Abort any in-flight DMA and return both units to a known-stopped state.
    fn reset(&mut self);

    /// Whether both data lines currently read high.
    fn lines_idle(&self) -> bool;

    /// Drive the direction pin.
    fn set_direction(&mut self, dir: Direction);

    /// Begin clocking out a framed transmission.
    ///
    /// A [`PhyEventKind::TxEnding`] event must be latched when the end
    /// sequence is reached.
    fn start_tx(&mut self, frame: TxFrame<'_>);

    /// Stop the TX unit.
    fn stop_tx(&mut self);

    /// Prepare the RX DMA over the full receive buffer without yet watching
    /// the line. Called before TX when a response will follow, so the
    /// turnaround costs nothing.
    fn arm_rx(&mut self);

    /// Start watching the line for a start sequence. [`MaplePhy::arm_rx`]
    /// must have been called since the last reset.
    fn start_rx(&mut self);

    /// Stop the RX unit.
    fn stop_rx(&mut self);

    /// The full receive buffer, including words not (yet) written.
    fn rx_buffer(&self) -> &[u32];

    /// Words the RX DMA would still accept. Counts down from
    /// `rx_buffer().len()`; zero means the buffer overflowed.
    fn rx_transfer_remaining(&self) -> u32;

    /// Whether the RX FIFO has been fully drained into the buffer.
    fn rx_fifo_drained(&self) -> bool;

    /// Drain one latched interrupt event, oldest first.
    fn poll_event(&mut self) -> Option<PhyEvent>;
}
