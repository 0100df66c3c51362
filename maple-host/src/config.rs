//! Bus timing configuration container.

use maple_phy_interface::TxPacing;

/// Wire timing parameters for one bus endpoint.
///
/// Defaults match a 300 ns minimum edge period, which yields roughly
/// 1.7 Mbps average throughput. The Dreamcast itself clocks closer to 2 Mbps
/// by tightening edges mid-word; peripherals accept both.
#[derive(Debug, Clone)]
pub struct MapleTiming {
    /// Nanoseconds per data bit (two line edges).
    pub ns_per_bit: u32,
    /// Window during which both lines must read high before a write may
    /// start (0 disables the check).
    pub open_line_check_us: u64,
    /// Percentage added to the computed write duration before declaring a
    /// write timeout.
    pub write_timeout_extra_percent: u32,
    /// Longest tolerated silence between received words.
    pub inter_word_timeout_us: u64,
}

impl Default for MapleTiming {
    fn default() -> Self {
        Self {
            ns_per_bit: 600,
            open_line_check_us: 10,
            write_timeout_extra_percent: 20,
            inter_word_timeout_us: 100,
        }
    }
}

impl MapleTiming {
    /// Nanoseconds needed to clock `bits` onto the line, slack included.
    pub fn write_duration_ns(&self, bits: u32) -> u64 {
        let base = u64::from(bits) * u64::from(self.ns_per_bit);
        base + base * u64::from(self.write_timeout_extra_percent) / 100
    }
}

/// Per-endpoint pump configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Sender address of this endpoint (port bits included).
    pub sender_addr: u8,
    /// Rewrite outgoing sender/recipient addresses to this endpoint when the
    /// host has a single configured sender (see `MapleHostNode`).
    pub rewrite_sender: bool,
    /// How long to wait for a response to start after a write completes.
    pub response_timeout_us: u64,
    /// Mid-packet pacing applied to every write on this endpoint.
    pub pacing: TxPacing,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sender_addr: 0x00,
            rewrite_sender: false,
            response_timeout_us: 1_000,
            pacing: TxPacing::NONE,
        }
    }
}
