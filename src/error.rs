/// Reasons a 9-byte response frame is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Byte 0 is not the `0x62` sync byte.
    BadSync,
    /// Byte 1 does not echo the command that was issued.
    IdMismatch,
    /// The trailing XOR checksum does not match bytes 0..8.
    ChecksumMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A parameter was out of range; nothing was sent.
    InvalidParameter,
    /// No complete response arrived within the allotted time.
    Timeout,
    /// A response arrived but was corrupt or answered another command.
    Frame(FrameError),
    /// The serial port rejected a write or flush.
    WriteFailure,
    /// The serial port failed while reading or reporting readiness.
    ReadFailure,
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Error::Frame(e)
    }
}
