// COMMAND_CLASS is the first byte of every command frame and of every response frame.
pub const COMMAND_CLASS: u8 = 0x62;

// COMPACT_COMM_CLASS replaces COMMAND_CLASS for the communication mode command
// when the sensor speaks the compact dialect.
pub const COMPACT_COMM_CLASS: u8 = 0x61;

// FRAME_LENGTH is the value of the length byte and the size of a padded frame.
pub const FRAME_LENGTH: u8 = 0x09;

// FRAME_SIZE is the size in bytes of a response frame and of a padded command frame.
pub const FRAME_SIZE: usize = FRAME_LENGTH as usize;

// BROADCAST_ADDRESS is the factory default address accepted by every sensor.
pub const BROADCAST_ADDRESS: u16 = 0xFFFF;

// MAX_ADDRESS is the highest address a sensor can be given.
pub const MAX_ADDRESS: u16 = 0xFFFE;

// Command identifiers, echoed back in byte 1 of the response.
pub const CMD_BAUD_RATE: u8 = 0x30;
pub const CMD_COMMUNICATION_MODE: u8 = 0x31;
pub const CMD_ADDRESS: u8 = 0x32;
pub const CMD_READ_DISTANCE: u8 = 0x33;
pub const CMD_UPLOAD_MODE: u8 = 0x34;
pub const CMD_UPLOAD_INTERVAL: u8 = 0x35;
pub const CMD_LED_MODE: u8 = 0x37;
pub const CMD_RELAY_MODE: u8 = 0x38;
pub const CMD_FACTORY_RESET: u8 = 0x39;

// Reset codes carried in the reserved byte of the factory reset command.
pub const HARD_RESET_CODE: u8 = 0xFE;
pub const SOFT_RESET_CODE: u8 = 0xFD;

// BAUD_RATES maps the index sent with the baud rate command to bits per second.
pub const BAUD_RATES: [u32; 10] = [
    2400, 4800, 9600, 14400, 19200, 38400, 56000, 57600, 115200, 128000,
];

/// Returns the baud rate selected by `index`, or `None` if the index is out of range.
pub fn baud_rate(index: u8) -> Option<u32> {
    BAUD_RATES.get(usize::from(index)).copied()
}
