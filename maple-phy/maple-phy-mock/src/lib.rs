//! In-memory Maple Bus backend double for host-side testing.
//!
//! [`MockPhy`] implements `maple_phy_interface::MaplePhy` against a scripted
//! peer instead of hardware. A test keeps a [`WireHandle`] to the shared
//! wire: it queues [`Reply`]s the peer will give to successive reads, flips
//! line occupancy, and inspects every transmission the stack submitted,
//! including the exact byte sequence it would have produced on the wire.
//!
//! Time is driven by [`ManualClock`], a shared counter the test advances
//! explicitly (or configures to creep forward on every read, for code that
//! busy-waits on the clock).

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use maple_phy_interface::{
    Clock, Direction, MaplePhy, PhyEvent, PhyEventKind, TxFrame, TxPacing,
};

/// Receive buffer length: one word beyond the longest legal reception
/// (frame word + 255 payload words + checksum word), as the interface
/// contract requires.
pub const RX_BUFFER_WORDS: usize = 258;

/// Shared, manually advanced microsecond clock.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
    auto_increment: Rc<Cell<u64>>,
}

impl ManualClock {
    /// A clock starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward.
    pub fn advance(&self, us: u64) {
        self.now.set(self.now.get() + us);
    }

    /// Jump to an absolute time.
    pub fn set(&self, us: u64) {
        self.now.set(us);
    }

    /// Make every `now_us` read advance time by `us` first. Useful for code
    /// that busy-waits on the clock (line checks, FIFO drains).
    pub fn set_auto_increment(&self, us: u64) {
        self.auto_increment.set(us);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        let step = self.auto_increment.get();
        if step > 0 {
            self.now.set(self.now.get() + step);
        }
        self.now.get()
    }
}

/// One transmission as submitted by the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxCapture {
    /// Frame word followed by payload words.
    pub words: Vec<u32>,
    /// Checksum the stack computed.
    pub crc: u8,
    /// Bit count the stack announced.
    pub total_bits: u32,
    /// Pacing request.
    pub pacing: TxPacing,
}

impl TxCapture {
    /// The byte sequence this transmission puts on the wire: each word most
    /// significant byte first, then the checksum byte.
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut bytes: Vec<u8> = self
            .words
            .iter()
            .flat_map(|w| w.to_be_bytes())
            .collect();
        bytes.push(self.crc);
        bytes
    }
}

/// Scripted peer behavior for one read.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Raw words to place in the receive buffer. With `end` set the peer
    /// finishes with an end sequence; without it the line goes quiet
    /// mid-packet.
    Words { words: Vec<u32>, end: bool },
    /// The peer never starts a response.
    Silence,
    /// The peer floods the receive buffer past its capacity.
    Overflow,
}

impl Reply {
    /// A well-formed response packet: frame word, payload, correct checksum.
    pub fn packet(frame_word: u32, payload: &[u32]) -> Self {
        let mut words = Vec::with_capacity(payload.len() + 2);
        words.push(frame_word);
        words.extend_from_slice(payload);
        let crc = xor_bytes(&words);
        words.push(u32::from(crc));
        Reply::Words { words, end: true }
    }

    /// Like [`Reply::packet`] but with the checksum byte flipped.
    pub fn corrupt_crc(frame_word: u32, payload: &[u32]) -> Self {
        let Reply::Words { mut words, end } = Reply::packet(frame_word, payload) else {
            unreachable!()
        };
        let last = words.last_mut().unwrap();
        *last ^= 0xFF;
        Reply::Words { words, end }
    }

    /// An arbitrary word sequence followed by an end sequence.
    pub fn raw(words: Vec<u32>) -> Self {
        Reply::Words { words, end: true }
    }

    /// A response that starts and then stalls after the given words.
    pub fn stall(words: Vec<u32>) -> Self {
        Reply::Words { words, end: false }
    }
}

fn xor_bytes(words: &[u32]) -> u8 {
    words
        .iter()
        .flat_map(|w| w.to_be_bytes())
        .fold(0, |acc, b| acc ^ b)
}

#[derive(Default)]
struct Shared {
    tx_log: Vec<TxCapture>,
    replies: VecDeque<Reply>,
    line_busy: bool,
    hold_tx_end: bool,
    direction: Option<Direction>,
}

/// Test-side handle to the shared wire state.
#[derive(Clone, Default)]
pub struct WireHandle {
    shared: Rc<RefCell<Shared>>,
}

impl WireHandle {
    /// A fresh, idle wire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the peer's behavior for the next read.
    pub fn push_reply(&self, reply: Reply) {
        self.shared.borrow_mut().replies.push_back(reply);
    }

    /// Simulate another endpoint holding a line low.
    pub fn set_line_busy(&self, busy: bool) {
        self.shared.borrow_mut().line_busy = busy;
    }

    /// Swallow the TX end event, as if the write never finished.
    pub fn set_hold_tx_end(&self, hold: bool) {
        self.shared.borrow_mut().hold_tx_end = hold;
    }

    /// Number of transmissions submitted so far.
    pub fn tx_count(&self) -> usize {
        self.shared.borrow().tx_log.len()
    }

    /// The most recent transmission, if any.
    pub fn last_tx(&self) -> Option<TxCapture> {
        self.shared.borrow().tx_log.last().cloned()
    }

    /// Drain the transmission log.
    pub fn take_tx_log(&self) -> Vec<TxCapture> {
        std::mem::take(&mut self.shared.borrow_mut().tx_log)
    }

    /// The last direction the stack drove, if any.
    pub fn direction(&self) -> Option<Direction> {
        self.shared.borrow().direction
    }
}

/// Scripted [`MaplePhy`] implementation.
///
/// Completion interrupts are modeled by latching [`PhyEvent`]s at the moment
/// the corresponding operation is started, stamped with the shared clock;
/// the stack drains them on its next poll exactly as it would after real
/// interrupts.
pub struct MockPhy {
    shared: Rc<RefCell<Shared>>,
    clock: ManualClock,
    rx: [u32; RX_BUFFER_WORDS],
    rx_remaining: u32,
    events: VecDeque<PhyEvent>,
    rx_armed: bool,
}

impl MockPhy {
    /// Attach a new backend to a wire.
    pub fn new_with_wire(wire: &WireHandle, clock: ManualClock) -> Self {
        Self {
            shared: Rc::clone(&wire.shared),
            clock,
            rx: [0; RX_BUFFER_WORDS],
            rx_remaining: RX_BUFFER_WORDS as u32,
            events: VecDeque::new(),
            rx_armed: false,
        }
    }

    fn latch(&mut self, kind: PhyEventKind) {
        self.events.push_back(PhyEvent {
            kind,
            at_us: self.clock.now_us(),
        });
    }
}

impl MaplePhy for MockPhy {
    fn reset(&mut self) {
        self.events.clear();
        self.rx = [0; RX_BUFFER_WORDS];
        self.rx_remaining = RX_BUFFER_WORDS as u32;
        self.rx_armed = false;
    }

    fn lines_idle(&self) -> bool {
        !self.shared.borrow().line_busy
    }

    fn set_direction(&mut self, dir: Direction) {
        self.shared.borrow_mut().direction = Some(dir);
    }

    fn start_tx(&mut self, frame: TxFrame<'_>) {
        let hold = {
            let mut shared = self.shared.borrow_mut();
            shared.tx_log.push(TxCapture {
                words: frame.words.to_vec(),
                crc: frame.crc,
                total_bits: frame.total_bits,
                pacing: frame.pacing,
            });
            shared.hold_tx_end
        };
        if !hold {
            self.latch(PhyEventKind::TxEnding);
        }
    }

    fn stop_tx(&mut self) {}

    fn arm_rx(&mut self) {
        self.rx = [0; RX_BUFFER_WORDS];
        self.rx_remaining = RX_BUFFER_WORDS as u32;
        self.rx_armed = true;
    }

    fn start_rx(&mut self) {
        if !self.rx_armed {
            return;
        }
        let reply = self.shared.borrow_mut().replies.pop_front();
        match reply {
            Some(Reply::Words { words, end }) => {
                let n = words.len().min(RX_BUFFER_WORDS);
                self.rx[..n].copy_from_slice(&words[..n]);
                self.rx_remaining = (RX_BUFFER_WORDS - n) as u32;
                self.latch(PhyEventKind::RxStarted);
                if end {
                    self.latch(PhyEventKind::RxEnded);
                }
            }
            Some(Reply::Overflow) => {
                self.rx = [0x5A5A_5A5A; RX_BUFFER_WORDS];
                self.rx_remaining = 0;
                self.latch(PhyEventKind::RxStarted);
            }
            Some(Reply::Silence) | None => {}
        }
    }

    fn stop_rx(&mut self) {
        self.rx_armed = false;
    }

    fn rx_buffer(&self) -> &[u32] {
        &self.rx
    }

    fn rx_transfer_remaining(&self) -> u32 {
        self.rx_remaining
    }

    fn rx_fifo_drained(&self) -> bool {
        true
    }

    fn poll_event(&mut self) -> Option<PhyEvent> {
        self.events.pop_front()
    }
}
