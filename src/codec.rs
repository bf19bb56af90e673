//! Frame encoding and decoding for the KL200 UART protocol.
//!
//! Padded command frame (9 bytes):
//! `[class, id, 0x09, addr_hi, addr_lo, param_hi, param_lo, reserved, checksum]`
//!
//! Response frame (9 bytes):
//! `[0x62, id, length, addr_hi, addr_lo, dist_hi, dist_lo, reserved, checksum]`
//!
//! The checksum is the XOR of every byte that precedes it.

use heapless::Vec;

use crate::{
    Dialect, FrameError, CMD_ADDRESS, CMD_BAUD_RATE, CMD_COMMUNICATION_MODE, CMD_FACTORY_RESET,
    CMD_LED_MODE, CMD_READ_DISTANCE, CMD_RELAY_MODE, CMD_UPLOAD_INTERVAL, CMD_UPLOAD_MODE,
    COMMAND_CLASS, COMPACT_COMM_CLASS, FRAME_LENGTH, FRAME_SIZE, HARD_RESET_CODE, MAX_ADDRESS,
    SOFT_RESET_CODE,
};

/// An encoded command, 7 to 9 bytes depending on the dialect.
pub type CommandFrame = Vec<u8, FRAME_SIZE>;

/// XOR-folds `bytes` into a single checksum byte.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Builds a padded 9-byte command frame with a zero reserved byte.
pub fn encode_command(class: u8, id: u8, address: u16, param_hi: u8, param_lo: u8) -> [u8; 9] {
    encode_padded(class, id, address, param_hi, param_lo, 0x00)
}

fn encode_padded(
    class: u8,
    id: u8,
    address: u16,
    param_hi: u8,
    param_lo: u8,
    reserved: u8,
) -> [u8; 9] {
    let [addr_hi, addr_lo] = address.to_be_bytes();
    let mut frame = [
        class,
        id,
        FRAME_LENGTH,
        addr_hi,
        addr_lo,
        param_hi,
        param_lo,
        reserved,
        0x00, // Placeholder for checksum
    ];
    frame[8] = checksum(&frame[..8]);
    frame
}

/// A validated response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// Command id echoed by the sensor.
    pub command_id: u8,
    /// Length byte as sent by the sensor.
    pub length: u8,
    /// Address of the answering sensor.
    pub address: u16,
    /// Measured distance in millimeters.
    pub distance: u16,
}

/// Validates a response frame against the command it answers.
///
/// A frame not starting with `0x62` is `BadSync` whatever its other bytes.
/// The checksum is verified before the echoed id, so a corrupted id byte
/// reports `ChecksumMismatch`; `IdMismatch` means an intact frame answering
/// a different command.
pub fn decode_response(frame: &[u8; 9], expected_id: u8) -> Result<Reading, FrameError> {
    if frame[0] != COMMAND_CLASS {
        return Err(FrameError::BadSync);
    }
    if checksum(&frame[..8]) != frame[8] {
        return Err(FrameError::ChecksumMismatch);
    }
    if frame[1] != expected_id {
        return Err(FrameError::IdMismatch);
    }
    Ok(Reading {
        command_id: frame[1],
        length: frame[2],
        address: u16::from_be_bytes([frame[3], frame[4]]),
        distance: u16::from_be_bytes([frame[5], frame[6]]),
    })
}

/// Every command understood by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ReadDistance,
    ChangeAddress(u16),
    /// Index into [`BAUD_RATES`](crate::BAUD_RATES).
    ChangeBaudRate(u8),
    SetUploadMode(bool),
    /// Upload period in units of 100 ms.
    SetUploadInterval(u8),
    SetLedMode(u8),
    SetRelayMode(u8),
    SetCommunicationMode(u8),
    FactoryReset { hard: bool },
}

impl Command {
    /// The command id, echoed in byte 1 of the sensor's response.
    pub fn id(&self) -> u8 {
        match self {
            Command::ReadDistance => CMD_READ_DISTANCE,
            Command::ChangeAddress(_) => CMD_ADDRESS,
            Command::ChangeBaudRate(_) => CMD_BAUD_RATE,
            Command::SetUploadMode(_) => CMD_UPLOAD_MODE,
            Command::SetUploadInterval(_) => CMD_UPLOAD_INTERVAL,
            Command::SetLedMode(_) => CMD_LED_MODE,
            Command::SetRelayMode(_) => CMD_RELAY_MODE,
            Command::SetCommunicationMode(_) => CMD_COMMUNICATION_MODE,
            Command::FactoryReset { .. } => CMD_FACTORY_RESET,
        }
    }

    /// Checks the parameter against the range the sensor accepts.
    pub fn validate(&self) -> Result<(), crate::Error> {
        let valid = match *self {
            Command::ChangeAddress(address) => address <= MAX_ADDRESS,
            Command::ChangeBaudRate(index) => index <= 9,
            Command::SetUploadInterval(interval) => (1..=100).contains(&interval),
            Command::SetLedMode(mode) => mode <= 3,
            Command::SetRelayMode(mode) | Command::SetCommunicationMode(mode) => mode <= 1,
            Command::ReadDistance | Command::SetUploadMode(_) | Command::FactoryReset { .. } => {
                true
            }
        };
        if valid {
            Ok(())
        } else {
            Err(crate::Error::InvalidParameter)
        }
    }

    /// Encodes the command for the sensor at `address` in the given dialect.
    pub fn encode(&self, address: u16, dialect: Dialect) -> CommandFrame {
        let mut frame = CommandFrame::new();
        match dialect {
            Dialect::Padded => {
                let (param_hi, param_lo, reserved) = self.padded_fields();
                let padded =
                    encode_padded(COMMAND_CLASS, self.id(), address, param_hi, param_lo, reserved);
                // A padded frame always fits the capacity.
                let _ = frame.extend_from_slice(&padded);
            }
            Dialect::Compact => {
                let class = match self {
                    Command::SetCommunicationMode(_) => COMPACT_COMM_CLASS,
                    _ => COMMAND_CLASS,
                };
                let [addr_hi, addr_lo] = address.to_be_bytes();
                let (payload, len) = self.compact_payload();
                // Header plus at most three payload bytes and the checksum fits nine bytes.
                let _ = frame.extend_from_slice(&[class, self.id(), FRAME_LENGTH, addr_hi, addr_lo]);
                let _ = frame.extend_from_slice(&payload[..len]);
                let cs = checksum(&frame);
                let _ = frame.push(cs);
            }
        }
        frame
    }

    // (param_hi, param_lo, reserved) of the padded layout.
    fn padded_fields(&self) -> (u8, u8, u8) {
        match *self {
            Command::ReadDistance => (0x00, 0x00, 0x00),
            Command::ChangeAddress(address) => {
                let [hi, lo] = address.to_be_bytes();
                (hi, lo, 0x00)
            }
            Command::SetUploadMode(auto) => (0x00, u8::from(auto), 0x00),
            Command::ChangeBaudRate(value)
            | Command::SetUploadInterval(value)
            | Command::SetLedMode(value)
            | Command::SetRelayMode(value)
            | Command::SetCommunicationMode(value) => (0x00, value, 0x00),
            Command::FactoryReset { hard } => (0xFF, 0xFF, reset_code(hard)),
        }
    }

    // Significant bytes of the compact layout.
    fn compact_payload(&self) -> ([u8; 3], usize) {
        match *self {
            Command::ReadDistance => ([0x00, 0x00, 0x00], 3),
            Command::ChangeAddress(address) => {
                let [hi, lo] = address.to_be_bytes();
                ([hi, lo, 0x00], 2)
            }
            Command::SetUploadMode(auto) => ([u8::from(auto), 0x00, 0x00], 1),
            Command::ChangeBaudRate(value)
            | Command::SetUploadInterval(value)
            | Command::SetLedMode(value)
            | Command::SetRelayMode(value)
            | Command::SetCommunicationMode(value) => ([value, 0x00, 0x00], 1),
            Command::FactoryReset { hard } => ([0xFF, 0xFF, reset_code(hard)], 3),
        }
    }
}

fn reset_code(hard: bool) -> u8 {
    if hard {
        HARD_RESET_CODE
    } else {
        SOFT_RESET_CODE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn response(id: u8, address: u16, distance: u16) -> [u8; 9] {
        let [addr_hi, addr_lo] = address.to_be_bytes();
        let [dist_hi, dist_lo] = distance.to_be_bytes();
        let mut frame = [
            COMMAND_CLASS,
            id,
            FRAME_LENGTH,
            addr_hi,
            addr_lo,
            dist_hi,
            dist_lo,
            0x00,
            0x00,
        ];
        frame[8] = checksum(&frame[..8]);
        frame
    }

    #[test]
    fn test_change_baud_rate_frame() {
        let frame = Command::ChangeBaudRate(9).encode(0xFFFF, Dialect::Padded);
        let expected_cs = 0x62 ^ 0x30 ^ 0x09 ^ 0xFF ^ 0xFF ^ 0x00 ^ 0x09 ^ 0x00;
        assert_eq!(
            frame.as_slice(),
            &[0x62, 0x30, 0x09, 0xFF, 0xFF, 0x00, 0x09, 0x00, expected_cs]
        );
    }

    #[test]
    fn test_decode_hundred_millimeters() {
        let mut frame = [0x62, 0x33, 0x09, 0x00, 0x00, 0x00, 0x64, 0x00, 0x00];
        frame[8] = checksum(&frame[..8]);
        let reading = decode_response(&frame, CMD_READ_DISTANCE).unwrap();
        assert_eq!(reading.distance, 100);
        assert_eq!(reading.address, 0x0000);
        assert_eq!(reading.length, 0x09);
    }

    #[test]
    fn test_encode_command_layout() {
        let frame = encode_command(0x62, 0x32, 0x1234, 0xAB, 0xCD);
        assert_eq!(&frame[..8], &[0x62, 0x32, 0x09, 0x12, 0x34, 0xAB, 0xCD, 0x00]);
        assert_eq!(checksum(&frame), 0);
    }

    #[test]
    fn test_factory_reset_codes() {
        let hard = Command::FactoryReset { hard: true }.encode(0xFFFF, Dialect::Padded);
        let soft = Command::FactoryReset { hard: false }.encode(0xFFFF, Dialect::Padded);
        assert_eq!(&hard[..8], &[0x62, 0x39, 0x09, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]);
        assert_eq!(soft[7], 0xFD);
        assert_ne!(hard[8], soft[8]);
    }

    #[test]
    fn test_compact_frames() {
        let baud = Command::ChangeBaudRate(2).encode(0xFFFF, Dialect::Compact);
        assert_eq!(baud.len(), 7);
        assert_eq!(&baud[..6], &[0x62, 0x30, 0x09, 0xFF, 0xFF, 0x02]);

        let addr = Command::ChangeAddress(0x0102).encode(0xFFFF, Dialect::Compact);
        assert_eq!(&addr[..7], &[0x62, 0x32, 0x09, 0xFF, 0xFF, 0x01, 0x02]);

        let read = Command::ReadDistance.encode(0xFFFF, Dialect::Compact);
        assert_eq!(read.len(), 9);

        let comm = Command::SetCommunicationMode(1).encode(0xFFFF, Dialect::Compact);
        assert_eq!(comm[0], COMPACT_COMM_CLASS);

        for frame in [baud, addr, read, comm] {
            assert_eq!(checksum(&frame), 0);
        }
    }

    #[test]
    fn test_padded_communication_mode_keeps_class() {
        let frame = Command::SetCommunicationMode(1).encode(0xFFFF, Dialect::Padded);
        assert_eq!(frame[0], COMMAND_CLASS);
    }

    #[test]
    fn test_validate_ranges() {
        use crate::Error::InvalidParameter;

        assert_eq!(Command::ChangeAddress(0xFFFE).validate(), Ok(()));
        assert_eq!(Command::ChangeAddress(0xFFFF).validate(), Err(InvalidParameter));
        assert_eq!(Command::ChangeBaudRate(9).validate(), Ok(()));
        assert_eq!(Command::ChangeBaudRate(10).validate(), Err(InvalidParameter));
        assert_eq!(Command::SetUploadInterval(0).validate(), Err(InvalidParameter));
        assert_eq!(Command::SetUploadInterval(1).validate(), Ok(()));
        assert_eq!(Command::SetUploadInterval(100).validate(), Ok(()));
        assert_eq!(Command::SetUploadInterval(101).validate(), Err(InvalidParameter));
        assert_eq!(Command::SetLedMode(3).validate(), Ok(()));
        assert_eq!(Command::SetLedMode(4).validate(), Err(InvalidParameter));
        assert_eq!(Command::SetRelayMode(2).validate(), Err(InvalidParameter));
        assert_eq!(Command::SetCommunicationMode(2).validate(), Err(InvalidParameter));
        assert_eq!(Command::SetUploadMode(true).validate(), Ok(()));
        assert_eq!(Command::FactoryReset { hard: false }.validate(), Ok(()));
    }

    #[test]
    fn test_id_mismatch_on_intact_frame() {
        let frame = response(CMD_LED_MODE, 0xFFFF, 0);
        assert_eq!(
            decode_response(&frame, CMD_READ_DISTANCE),
            Err(FrameError::IdMismatch)
        );
    }

    proptest! {
        #[test]
        fn test_checksum_ignores_byte_order(bytes in proptest::collection::vec(any::<u8>(), 0..32), shift in 0usize..32) {
            let mut rotated = bytes.clone();
            if !rotated.is_empty() {
                let n = shift % rotated.len();
                rotated.rotate_left(n);
            }
            let mut reversed = bytes.clone();
            reversed.reverse();
            prop_assert_eq!(checksum(&bytes), checksum(&rotated));
            prop_assert_eq!(checksum(&bytes), checksum(&reversed));
        }

        #[test]
        fn test_encoded_commands_carry_trailing_checksum(address in 0u16..=0xFFFE, interval in 1u8..=100, led in 0u8..=3) {
            for command in [
                Command::ChangeAddress(address),
                Command::SetUploadInterval(interval),
                Command::SetLedMode(led),
            ] {
                prop_assert!(command.validate().is_ok());
                let frame = command.encode(address, Dialect::Padded);
                prop_assert_eq!(frame.len(), 9);
                prop_assert_eq!(checksum(&frame[..8]), frame[8]);
            }
        }

        #[test]
        fn test_distance_round_trips(address in any::<u16>(), distance in any::<u16>()) {
            let request = Command::ReadDistance.encode(address, Dialect::Padded);
            let reading = decode_response(&response(request[1], address, distance), request[1]).unwrap();
            prop_assert_eq!(reading.distance, distance);
            prop_assert_eq!(reading.address, address);
        }

        #[test]
        fn test_bad_sync_wins(frame in any::<[u8; 9]>()) {
            let mut frame = frame;
            if frame[0] == COMMAND_CLASS {
                frame[0] = !COMMAND_CLASS;
            }
            prop_assert_eq!(decode_response(&frame, CMD_READ_DISTANCE), Err(FrameError::BadSync));
        }

        #[test]
        fn test_single_bit_flip_is_detected(distance in any::<u16>(), byte in 1usize..8, bit in 0u8..8) {
            let mut frame = response(CMD_READ_DISTANCE, 0x0000, distance);
            frame[byte] ^= 1 << bit;
            prop_assert_eq!(
                decode_response(&frame, CMD_READ_DISTANCE),
                Err(FrameError::ChecksumMismatch)
            );
        }
    }
}
