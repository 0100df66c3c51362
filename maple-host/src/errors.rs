//! Transport-layer error types.

/// Why a completed bus operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FailureReason {
    /// Received checksum does not match the computed one.
    CrcInvalid,
    /// Fewer words arrived than the frame's length field requires.
    MissingData,
    /// The receive buffer filled completely; the sentinel word was consumed.
    BufferOverflow,
    /// A deadline elapsed: response never started, inter-word silence, or the
    /// write did not finish in time.
    Timeout,
}

/// Why a bus operation could not be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartError {
    /// A previous operation has not yet reached a terminal phase.
    Busy,
    /// Another endpoint held a data line low during the pre-write check.
    LineOccupied,
}

/// The targeted schedule partition has no free slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScheduleFull;
