//! Bus driver: framing, transmission, reception, failure detection.
//!
//! [`MapleBus`] owns one physical endpoint through a [`MaplePhy`] backend and
//! runs the dual transmit/receive state machine over it. Interrupt work
//! arrives as timestamped [`PhyEvent`]s; everything heavier (receive
//! validation, checksum comparison, timeout bookkeeping) happens inside
//! [`MapleBus::process_events`], which the owner polls.

use heapless::Vec;
use maple_phy_interface::{Clock, Direction, MaplePhy, PhyEvent, PhyEventKind, TxFrame, TxPacing};

use crate::config::MapleTiming;
use crate::consts::NO_TIMEOUT;
use crate::errors::{FailureReason, StartError};
use crate::packet::{self, MAX_PAYLOAD_WORDS, MaplePacket};

/// Words a legal reception may carry: frame word, payload, checksum word.
pub const MAX_RX_WORDS: usize = MAX_PAYLOAD_WORDS + 2;

/// Microseconds allowed for the RX FIFO to drain after an end sequence.
const RX_DRAIN_TIMEOUT_US: u64 = 1_000;

/// State of the transmit/receive cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Nothing in progress; the only phase from which an operation may start.
    Idle,
    /// Words are being clocked onto the line.
    WriteInProgress,
    /// Write finished; watching for a response start sequence.
    WaitingForReadStart,
    /// A start sequence was seen; words are arriving.
    ReadInProgress,
    /// An end sequence was seen; reception awaits validation.
    ReadComplete,
    /// Write finished and no response was expected.
    WriteComplete,
    /// Reception failed; see the status failure reason.
    ReadFailed,
    /// Transmission failed; see the status failure reason.
    WriteFailed,
}

/// Snapshot returned by [`MapleBus::process_events`].
///
/// `phase` is the phase the poll observed and fully processed; once a
/// terminal phase has been reported the driver itself is back at
/// [`Phase::Idle`]. A successful read carries the received words (frame word
/// plus payload, checksum stripped), valid until the next bus operation.
#[derive(Debug, Clone, Copy)]
pub struct Status<'a> {
    /// Observed phase.
    pub phase: Phase,
    /// Failure reason when `phase` is `ReadFailed` or `WriteFailed`.
    pub failure: Option<FailureReason>,
    /// Validated received words when `phase` is `ReadComplete`.
    pub read: Option<&'a [u32]>,
}

impl<'a> Status<'a> {
    fn pending(phase: Phase) -> Self {
        Status {
            phase,
            failure: None,
            read: None,
        }
    }

    fn failed(phase: Phase, reason: FailureReason) -> Self {
        Status {
            phase,
            failure: Some(reason),
            read: None,
        }
    }
}

/// Driver for one physical Maple Bus endpoint.
pub struct MapleBus<P, C> {
    phy: P,
    clock: C,
    timing: MapleTiming,
    phase: Phase,
    expecting_response: bool,
    response_timeout_us: u64,
    proc_kill_time_us: u64,
    last_word_time_us: u64,
    last_read_remaining: u32,
    tx_words: Vec<u32, { MAX_PAYLOAD_WORDS + 1 }>,
    last_read: Vec<u32, MAX_RX_WORDS>,
}

impl<P: MaplePhy, C: Clock> MapleBus<P, C> {
    /// Take ownership of a backend and clock.
    pub fn new(phy: P, timing: MapleTiming, clock: C) -> Self {
        Self {
            phy,
            clock,
            timing,
            phase: Phase::Idle,
            expecting_response: false,
            response_timeout_us: NO_TIMEOUT,
            proc_kill_time_us: NO_TIMEOUT,
            last_word_time_us: 0,
            last_read_remaining: 0,
            tx_words: Vec::new(),
            last_read: Vec::new(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether an operation is in progress.
    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Begin writing a packet, optionally pre-arming reception of the
    /// response.
    ///
    /// `read_timeout_us` bounds the wait for the response start sequence
    /// ([`NO_TIMEOUT`] waits forever) and only matters with `autostart_read`.
    /// The line must be observed high for the configured check window before
    /// anything is driven.
    pub fn write(
        &mut self,
        packet: &MaplePacket,
        autostart_read: bool,
        read_timeout_us: u64,
        pacing: TxPacing,
    ) -> Result<(), StartError> {
        if self.phase != Phase::Idle {
            return Err(StartError::Busy);
        }
        self.phy.reset();

        self.tx_words.clear();
        // Capacity covers the frame word plus any valid payload.
        let _ = self.tx_words.push(packet.frame_word());
        let _ = self.tx_words.extend_from_slice(&packet.payload);
        let crc = packet.crc();
        let total_bits = packet.total_bits();
        let extra_time_us = self.pacing_extra_us(pacing);

        self.line_check()?;

        self.expecting_response = autostart_read;
        self.response_timeout_us = read_timeout_us;
        self.phase = Phase::WriteInProgress;

        if autostart_read {
            // Arm reception now so the turnaround after the end sequence
            // costs nothing.
            self.last_read_remaining = self.phy.rx_buffer().len() as u32;
            self.phy.arm_rx();
        }

        self.phy.set_direction(Direction::Output);
        self.phy.start_tx(TxFrame {
            words: &self.tx_words,
            crc,
            total_bits,
            pacing,
        });

        let write_ns = self.timing.write_duration_ns(total_bits);
        self.proc_kill_time_us = self.clock.now_us() + write_ns.div_ceil(1_000) + extra_time_us;
        Ok(())
    }

    /// Begin waiting for an unsolicited packet.
    ///
    /// `read_timeout_us` bounds the wait for the start sequence;
    /// [`NO_TIMEOUT`] waits forever.
    pub fn start_read(&mut self, read_timeout_us: u64) -> Result<(), StartError> {
        if self.phase != Phase::Idle {
            return Err(StartError::Busy);
        }
        self.phy.reset();

        self.last_read_remaining = self.phy.rx_buffer().len() as u32;
        self.phy.arm_rx();

        self.proc_kill_time_us = if read_timeout_us == NO_TIMEOUT {
            NO_TIMEOUT
        } else {
            self.clock.now_us() + read_timeout_us
        };
        self.phase = Phase::WaitingForReadStart;

        self.phy.set_direction(Direction::Input);
        self.phy.start_rx();
        Ok(())
    }

    /// Advance the state machine and report what it observed.
    ///
    /// Drains the backend's interrupt event latch, then acts on the current
    /// phase: validates completed receptions, detects buffer overflow and
    /// inter-word silence, and enforces kill times. Terminal phases are
    /// reported once; the driver is idle again afterwards.
    pub fn process_events(&mut self, now_us: u64) -> Status<'_> {
        while let Some(event) = self.phy.poll_event() {
            self.on_event(event);
        }

        match self.phase {
            Phase::ReadComplete => {
                self.phase = Phase::Idle;
                self.finish_read()
            }
            Phase::WriteComplete => {
                self.phase = Phase::Idle;
                Status::pending(Phase::WriteComplete)
            }
            Phase::ReadInProgress => {
                // Kill time is ignored while actively reading; only silence
                // between words or an exhausted buffer ends a read early.
                let remaining = self.phy.rx_transfer_remaining();
                if remaining == 0 {
                    // The buffer has one word more than any legal reception,
                    // so a zero residual is never normal completion.
                    self.phase = Phase::Idle;
                    Status::failed(Phase::ReadFailed, FailureReason::BufferOverflow)
                } else if remaining == self.last_read_remaining {
                    if now_us > self.last_word_time_us
                        && now_us - self.last_word_time_us >= self.timing.inter_word_timeout_us
                    {
                        self.phy.stop_rx();
                        self.phase = Phase::Idle;
                        Status::failed(Phase::ReadFailed, FailureReason::Timeout)
                    } else {
                        Status::pending(Phase::ReadInProgress)
                    }
                } else {
                    self.last_read_remaining = remaining;
                    self.last_word_time_us = now_us;
                    Status::pending(Phase::ReadInProgress)
                }
            }
            Phase::WaitingForReadStart if now_us >= self.proc_kill_time_us => {
                self.phy.stop_rx();
                self.phase = Phase::Idle;
                Status::failed(Phase::ReadFailed, FailureReason::Timeout)
            }
            Phase::WriteInProgress if now_us >= self.proc_kill_time_us => {
                // Stop both units: the write could have transitioned to read
                // just as the timeout was observed.
                self.phy.stop_tx();
                self.phy.stop_rx();
                self.phy.set_direction(Direction::Input);
                self.phase = Phase::Idle;
                Status::failed(Phase::WriteFailed, FailureReason::Timeout)
            }
            phase => Status::pending(phase),
        }
    }

    /// Apply one interrupt-originated event. Mirrors what the hardware ISRs
    /// of a monolithic driver would do, using the latched timestamps.
    fn on_event(&mut self, event: PhyEvent) {
        match event.kind {
            PhyEventKind::TxEnding => {
                if self.phase != Phase::WriteInProgress {
                    return;
                }
                self.phy.stop_tx();
                if self.expecting_response {
                    self.phy.start_rx();
                    self.phy.set_direction(Direction::Input);
                    self.proc_kill_time_us = if self.response_timeout_us == NO_TIMEOUT {
                        NO_TIMEOUT
                    } else {
                        event.at_us + self.response_timeout_us
                    };
                    self.phase = Phase::WaitingForReadStart;
                } else {
                    self.phy.set_direction(Direction::Input);
                    self.phase = Phase::WriteComplete;
                }
            }
            PhyEventKind::RxStarted => {
                if self.phase == Phase::WaitingForReadStart {
                    self.phase = Phase::ReadInProgress;
                    self.last_word_time_us = event.at_us;
                }
            }
            PhyEventKind::RxEnded => {
                if self.phase == Phase::ReadInProgress {
                    self.phy.stop_rx();
                    self.phase = Phase::ReadComplete;
                }
            }
        }
    }

    /// Validate a completed reception.
    fn finish_read(&mut self) -> Status<'_> {
        // Give the backend a moment to drain the tail of the RX FIFO.
        let drain_deadline = self.clock.now_us() + RX_DRAIN_TIMEOUT_US;
        while !self.phy.rx_fifo_drained() && self.clock.now_us() < drain_deadline {}

        let capacity = self.phy.rx_buffer().len() as u32;
        let words_read = (capacity - self.phy.rx_transfer_remaining()) as usize;

        // A reception is at least a frame word and a checksum word.
        if words_read < 2 {
            return Status::failed(Phase::ReadFailed, FailureReason::MissingData);
        }

        let buffer = self.phy.rx_buffer();
        // The frame word's low byte says how many payload words follow. Some
        // peripherals send more words than declared (extended device info);
        // extras are tolerated as long as the checksum holds.
        let declared = (buffer[0] & 0xFF) as usize;
        if declared > words_read - 2 {
            return Status::failed(Phase::ReadFailed, FailureReason::MissingData);
        }

        let crc = packet::crc8(&buffer[..words_read - 1]);
        if u32::from(crc) != buffer[words_read - 1] {
            return Status::failed(Phase::ReadFailed, FailureReason::CrcInvalid);
        }

        self.last_read.clear();
        let _ = self.last_read.extend_from_slice(&buffer[..words_read - 1]);
        Status {
            phase: Phase::ReadComplete,
            failure: None,
            read: Some(&self.last_read),
        }
    }

    /// Extra write time introduced by mid-packet pacing.
    fn pacing_extra_us(&self, pacing: TxPacing) -> u64 {
        let words = self.tx_words.len() as u32;
        if !pacing.applies_to(words) {
            return 0;
        }
        let payload_words = words - 1;
        // The frame word occupies one slot of the first chunk.
        let mut copied = pacing.first_word_chunk.saturating_sub(1);
        let mut extra = 0u64;
        while copied < payload_words {
            let chunk = (payload_words - copied).min(pacing.second_word_chunk.max(1));
            copied += chunk;
            extra += u64::from(pacing.delay_us) + 1;
        }
        extra
    }

    /// Require both lines high for the configured window before driving them.
    fn line_check(&self) -> Result<(), StartError> {
        if self.timing.open_line_check_us == 0 {
            return Ok(());
        }
        let target = self.clock.now_us() + self.timing.open_line_check_us + 1;
        loop {
            if !self.phy.lines_idle() {
                return Err(StartError::LineOccupied);
            }
            if self.clock.now_us() >= target {
                return Ok(());
            }
        }
    }
}
