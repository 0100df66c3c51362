//! `maple-host`: a host-side Maple Bus transport stack.
//!
//! The Maple Bus is the half-duplex two-wire serial bus a Dreamcast uses to
//! talk to controllers, memory units, and similar peripherals. This crate
//! implements the host side of that transport:
//!
//! - A packet model ([`MaplePacket`]) with the frame-word codec and the
//!   8-bit XOR checksum.
//! - A bus driver ([`MapleBus`]) running the transmit/receive state machine
//!   over a pluggable physical backend (`maple-phy-interface`), with CRC and
//!   framing validation, buffer-overflow detection, inter-word silence
//!   timeouts, and operation kill times.
//! - A process-wide prioritized schedule ([`PrioritizedTxScheduler`] behind
//!   [`SharedTxScheduler`]) ordered by priority then due time, with
//!   cancellation by id or recipient and a cadence helper for repeating
//!   polls.
//! - Per-endpoint facades ([`EndpointTxScheduler`]) binding a fixed priority.
//! - A per-endpoint pump ([`MapleHostNode`]) that pops due transmissions,
//!   drives the bus, dispatches [`Transmitter`] callbacks, honors peripheral
//!   resend requests, and re-queues auto-repeat entries.
//!
//! # Execution model
//!
//! Everything is polled; there are no suspension points. Each bus endpoint
//! runs two cooperating contexts: the pump's polling loop and the backend's
//! completion interrupts, which communicate only through the backend's event
//! latch. Producers on other contexts schedule work through
//! [`SharedTxScheduler`], whose operations are linearizable under
//! `critical-section`.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use maple_host::{
//!     HostConfig, MapleHostNode, MapleTiming, SharedTxScheduler, TX_TIME_ASAP,
//!     MaplePacket, TransmitterHandle,
//! };
//!
//! let scheduler: SharedTxScheduler<4, 16> = SharedTxScheduler::new();
//! let mut node = MapleHostNode::new(phy, MapleTiming::default(), clock, &scheduler, HostConfig {
//!     sender_addr: 0x00,
//!     rewrite_sender: true,
//!     ..HostConfig::default()
//! });
//!
//! let packet = MaplePacket::from_payload(0x09, 0x20, 0x00, &[0x0100_0000]).unwrap();
//! node.endpoint(1)
//!     .add(TX_TIME_ASAP, TransmitterHandle(0), packet, true, 3, 0, 0)?;
//!
//! loop {
//!     node.poll(&mut transmitters);
//! }
//! ```
//!
//! # Feature flags
//! - `std`: enables [`StdClock`] and the `critical-section` std
//!   implementation for host-side testing.
//! - `defmt`: derives `defmt::Format` on the public wire and state types.

#![cfg_attr(not(feature = "std"), no_std)]

/// Re-export of the physical backend interface crate.
pub use maple_phy_interface as phy;

pub mod bus;
pub mod config;
pub mod consts;
pub mod endpoint;
pub mod errors;
pub mod packet;
pub mod scheduler;
pub mod timer;
pub mod transmission;
pub mod transmitter;

pub use bus::{MapleBus, Phase, Status};
pub use config::{HostConfig, MapleTiming};
pub use consts::NO_TIMEOUT;
pub use endpoint::EndpointTxScheduler;
pub use errors::{FailureReason, ScheduleFull, StartError};
pub use packet::{Frame, MaplePacket};
pub use scheduler::{
    PrioritizedTxScheduler, SharedTxScheduler, TX_TIME_ASAP, compute_next_time_cadence,
};
pub use timer::Clock;
#[cfg(feature = "std")]
pub use timer::StdClock;
pub use transmission::{Transmission, TransmitterHandle};
pub use transmitter::Transmitter;

use maple_phy_interface::MaplePhy;

use crate::consts::{ADDR_PORT_MASK, ADDR_UNIT_MASK, COMMAND_RESPONSE_REQUEST_RESEND};

/// Outcome of one [`MapleHostNode::poll`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PumpProgress {
    /// Nothing due and nothing in flight.
    Idle,
    /// A transmission is on the wire.
    InFlight,
    /// A transmission finished; its `tx_complete` ran this step.
    Delivered,
    /// A transmission failed; its `tx_failed` ran this step.
    Failed,
    /// A terminal callback ran, but the auto-repeat re-add was dropped
    /// because the schedule partition was full.
    RepeatDropped,
}

/// Per-endpoint pump: pops due transmissions and drives them over the bus.
///
/// One node serves one physical endpoint and one scheduler. Each
/// [`MapleHostNode::poll`] advances at most one step: starting the next due
/// transmission, or progressing the in-flight one and dispatching its
/// callbacks. Every popped transmission receives `tx_started` exactly once,
/// followed by exactly one of `tx_complete` or `tx_failed`.
///
/// When [`HostConfig::rewrite_sender`] is set (the single-sender shortcut),
/// outgoing packets get their sender address replaced by the endpoint's and
/// the port bits of their recipient address aligned to it, so clients may
/// schedule packets without knowing their port assignment.
pub struct MapleHostNode<'a, P, C, const PRIORITIES: usize, const DEPTH: usize> {
    bus: MapleBus<P, C>,
    scheduler: &'a SharedTxScheduler<PRIORITIES, DEPTH>,
    config: HostConfig,
    clock: C,
    in_flight: Option<Transmission>,
    last_sent: Option<MaplePacket>,
}

impl<'a, P, C, const PRIORITIES: usize, const DEPTH: usize>
    MapleHostNode<'a, P, C, PRIORITIES, DEPTH>
where
    P: MaplePhy,
    C: Clock + Clone,
{
    /// Build a node over a backend, sharing the clock with its bus driver.
    pub fn new(
        phy: P,
        timing: MapleTiming,
        clock: C,
        scheduler: &'a SharedTxScheduler<PRIORITIES, DEPTH>,
        config: HostConfig,
    ) -> Self {
        Self {
            bus: MapleBus::new(phy, timing, clock.clone()),
            scheduler,
            config,
            clock,
            in_flight: None,
            last_sent: None,
        }
    }

    /// A scheduler facade queueing at `priority` on this node's scheduler.
    pub fn endpoint(&self, priority: u8) -> EndpointTxScheduler<'a, PRIORITIES, DEPTH> {
        EndpointTxScheduler::new(self.scheduler, priority)
    }

    /// Access the bus driver, e.g. to start an unsolicited read.
    pub fn bus(&mut self) -> &mut MapleBus<P, C> {
        &mut self.bus
    }

    /// Advance the pump by one step.
    pub fn poll<T: Transmitter + ?Sized>(&mut self, transmitters: &mut T) -> PumpProgress {
        let now_us = self.clock.now_us();
        if self.in_flight.is_some() {
            return self.service_in_flight(now_us, transmitters);
        }
        if self.bus.is_busy() {
            // Something else drives the bus (an unsolicited read); leave the
            // schedule untouched until it finishes.
            return PumpProgress::Idle;
        }

        let Some(mut tx) = self.scheduler.pop_next(now_us) else {
            return PumpProgress::Idle;
        };

        if self.config.rewrite_sender {
            tx.packet.frame.sender_addr = self.config.sender_addr;
            tx.packet.frame.recipient_addr = (tx.packet.frame.recipient_addr & ADDR_UNIT_MASK)
                | (self.config.sender_addr & ADDR_PORT_MASK);
        }

        transmitters.tx_started(&tx);
        match self.bus.write(
            &tx.packet,
            tx.expect_response,
            self.config.response_timeout_us,
            self.config.pacing,
        ) {
            Ok(()) => {
                self.last_sent = Some(tx.packet.clone());
                self.in_flight = Some(tx);
                PumpProgress::InFlight
            }
            Err(_) => {
                transmitters.tx_failed(true, false, &tx);
                self.finish(now_us, tx, true)
            }
        }
    }

    fn service_in_flight<T: Transmitter + ?Sized>(
        &mut self,
        now_us: u64,
        transmitters: &mut T,
    ) -> PumpProgress {
        let (phase, response) = {
            let status = self.bus.process_events(now_us);
            (status.phase, status.read.map(MaplePacket::from_words))
        };

        match phase {
            Phase::WriteComplete => {
                let Some(tx) = self.in_flight.take() else {
                    return PumpProgress::Idle;
                };
                // No response was expected; report a zero-length one.
                transmitters.tx_complete(&MaplePacket::default(), &tx);
                self.finish(now_us, tx, false)
            }
            Phase::ReadComplete => {
                let response = response.unwrap_or_default();
                if response.frame.command == COMMAND_RESPONSE_REQUEST_RESEND {
                    return self.resend_last(transmitters, now_us);
                }
                let Some(tx) = self.in_flight.take() else {
                    return PumpProgress::Idle;
                };
                transmitters.tx_complete(&response, &tx);
                self.finish(now_us, tx, false)
            }
            Phase::WriteFailed => {
                let Some(tx) = self.in_flight.take() else {
                    return PumpProgress::Idle;
                };
                transmitters.tx_failed(true, false, &tx);
                self.finish(now_us, tx, true)
            }
            Phase::ReadFailed => {
                let Some(tx) = self.in_flight.take() else {
                    return PumpProgress::Idle;
                };
                transmitters.tx_failed(false, true, &tx);
                self.finish(now_us, tx, true)
            }
            _ => PumpProgress::InFlight,
        }
    }

    /// The peripheral asked for the last packet again: put it back on the
    /// wire verbatim, bypassing the scheduler. The in-flight transmission
    /// stays in flight; its callbacks wait for the retransmission's outcome.
    fn resend_last<T: Transmitter + ?Sized>(
        &mut self,
        transmitters: &mut T,
        now_us: u64,
    ) -> PumpProgress {
        let expect_response = self
            .in_flight
            .as_ref()
            .is_some_and(|tx| tx.expect_response);
        let started = match &self.last_sent {
            Some(last) => self
                .bus
                .write(
                    last,
                    expect_response,
                    self.config.response_timeout_us,
                    self.config.pacing,
                )
                .is_ok(),
            None => false,
        };
        if started {
            return PumpProgress::InFlight;
        }
        let Some(tx) = self.in_flight.take() else {
            return PumpProgress::Idle;
        };
        transmitters.tx_failed(true, false, &tx);
        self.finish(now_us, tx, true)
    }

    /// Close out a delivered transmission: consume any mid-flight cancel and
    /// re-queue it when it repeats.
    fn finish(&mut self, now_us: u64, mut tx: Transmission, failed: bool) -> PumpProgress {
        if self.scheduler.retire(tx.id) {
            tx.canceled = true;
        }
        let repeats = !tx.canceled
            && tx.auto_repeat_us != 0
            && (tx.auto_repeat_end_us == 0 || now_us < tx.auto_repeat_end_us);
        if repeats {
            tx.next_tx_time_us =
                compute_next_time_cadence(now_us, tx.auto_repeat_us, tx.next_tx_time_us);
            if self.scheduler.reinsert(tx).is_err() {
                return PumpProgress::RepeatDropped;
            }
        }
        if failed {
            PumpProgress::Failed
        } else {
            PumpProgress::Delivered
        }
    }
}
