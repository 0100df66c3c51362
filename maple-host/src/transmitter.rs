//! Callback surface informing transmission originators of outcomes.

use crate::packet::MaplePacket;
use crate::transmission::Transmission;

/// Receiver of transmission outcome callbacks.
///
/// All three callbacks run on the pump's polling context, never from an
/// interrupt. For every transmission that leaves the schedule, `tx_started`
/// fires exactly once, followed by exactly one of `tx_complete` or
/// `tx_failed`. Implementations route on
/// [`Transmission::transmitter`](crate::Transmission) when they serve more
/// than one originator.
pub trait Transmitter {
    /// The transmission is about to be written to the bus.
    fn tx_started(&mut self, tx: &Transmission);

    /// The transmission finished. `response` is the received packet, or a
    /// default (zero-length) packet when no response was expected.
    fn tx_complete(&mut self, response: &MaplePacket, tx: &Transmission);

    /// The transmission failed on the wire. Exactly one of the two flags is
    /// set: `write_failed` when the write phase failed, `read_failed` when
    /// the response phase did.
    fn tx_failed(&mut self, write_failed: bool, read_failed: bool, tx: &Transmission);
}
