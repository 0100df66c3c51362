//! Maple protocol constants.

/// Request device information.
pub const COMMAND_DEVICE_INFO_REQUEST: u8 = 0x01;
/// Request extended device information.
pub const COMMAND_EXT_DEVICE_INFO_REQUEST: u8 = 0x02;
/// Reset the peripheral to defaults.
pub const COMMAND_RESET: u8 = 0x03;
/// Put the peripheral into shutdown.
pub const COMMAND_SHUTDOWN: u8 = 0x04;
/// Response: device information block.
pub const COMMAND_RESPONSE_DEVICE_INFO: u8 = 0x05;
/// Response: extended device information block.
pub const COMMAND_RESPONSE_EXT_DEVICE_INFO: u8 = 0x06;
/// Response: command acknowledged, no data.
pub const COMMAND_RESPONSE_ACK: u8 = 0x07;
/// Response: data transfer follows.
pub const COMMAND_RESPONSE_DATA_XFER: u8 = 0x08;
/// Poll a function's current condition.
pub const COMMAND_GET_CONDITION: u8 = 0x09;
/// Query storage geometry.
pub const COMMAND_GET_MEMORY_INFO: u8 = 0x0A;
/// Read a storage block.
pub const COMMAND_BLOCK_READ: u8 = 0x0B;
/// Write a storage block.
pub const COMMAND_BLOCK_WRITE: u8 = 0x0C;
/// Query the last storage error.
pub const COMMAND_GET_LAST_ERROR: u8 = 0x0D;
/// Set a function's condition.
pub const COMMAND_SET_CONDITION: u8 = 0x0E;
/// Response: request that the last packet be sent again.
pub const COMMAND_RESPONSE_REQUEST_RESEND: u8 = 0xFB;
/// Response: file error during a storage operation.
pub const COMMAND_RESPONSE_FILE_ERROR: u8 = 0xFC;
/// Response: addressed function is not supported.
pub const COMMAND_RESPONSE_NOT_AN_FUNCTION: u8 = 0xFD;
/// Response: command not recognized.
pub const COMMAND_RESPONSE_UNKNOWN_COMMAND: u8 = 0xFE;
/// Response: no data, negative acknowledge.
pub const COMMAND_RESPONSE_NONE: u8 = 0xFF;

/// Upper two bits of an address select the physical port.
pub const ADDR_PORT_MASK: u8 = 0xC0;
/// Lower six bits of an address select the unit on that port.
pub const ADDR_UNIT_MASK: u8 = 0x3F;
/// Unit bit of a port's main peripheral.
pub const ADDR_MAIN_PERIPHERAL: u8 = 0x20;

/// Sentinel read timeout meaning "wait forever for a response".
pub const NO_TIMEOUT: u64 = u64::MAX;
