use crate::BROADCAST_ADDRESS;

/// How the sensor delivers distance readings.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum UploadMode {
    /// The sensor only answers explicit read requests.
    Manual,
    /// The sensor pushes a reading at the configured upload interval.
    Auto,
}

/// Command frame layout spoken by the sensor firmware.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Dialect {
    /// Every command is 9 bytes: parameters are zero padded and the sensor
    /// acknowledges each configuration command with a response frame.
    Padded,
    /// Commands carry only their significant parameter bytes followed by the
    /// checksum. The sensor does not acknowledge configuration commands and
    /// the communication mode command uses class byte `0x61`.
    Compact,
}

/// Configuration settings for the KL200 driver.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Config {
    /// Address written into every command frame.
    pub address: u16,
    /// Frame layout used for commands.
    pub dialect: Dialect,
    /// Upload mode applied by `init`.
    pub mode: UploadMode,
    /// How long a configuration command waits for its acknowledgement.
    pub response_timeout_ms: u32,
    /// Sleep between checks for incoming bytes while waiting on a response.
    pub poll_interval_ms: u32,
}

impl Config {
    /// Creates a new `Config` instance.
    ///
    /// # Arguments
    ///
    /// * `address` - The address written into every command frame.
    /// * `dialect` - The `Dialect` the sensor firmware speaks.
    ///
    /// # Returns
    ///
    /// A new `Config` in manual mode with the default timings.
    pub fn new(address: u16, dialect: Dialect) -> Config {
        Config {
            address,
            dialect,
            ..Config::default()
        }
    }

    /// Sets the sensor address for the configuration.
    ///
    /// # Arguments
    ///
    /// * `address` - The address to put in command frames, `0xFFFF` for broadcast.
    ///
    /// # Returns
    ///
    /// The updated `Config` instance.
    pub fn address(mut self, address: u16) -> Self {
        self.address = address;
        self
    }

    /// Sets the command dialect for the configuration.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Sets the upload mode for the configuration.
    ///
    /// # Arguments
    ///
    /// * `mode` - The `UploadMode` that `init` switches the sensor to.
    ///
    /// # Returns
    ///
    /// The updated `Config` instance.
    pub fn mode(mut self, mode: UploadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the acknowledgement timeout in milliseconds.
    pub fn response_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.response_timeout_ms = timeout_ms;
        self
    }

    /// Sets the polling interval in milliseconds. Zero is raised to one.
    pub fn poll_interval_ms(mut self, interval_ms: u32) -> Self {
        self.poll_interval_ms = interval_ms.max(1);
        self
    }
}

/// Provides default configuration values for the KL200 sensor.
impl Default for Config {
    /// The default configuration addresses the broadcast address `0xFFFF`,
    /// uses the padded dialect in manual mode, waits 500 ms for
    /// acknowledgements and polls every 10 ms.
    fn default() -> Config {
        Config {
            address: BROADCAST_ADDRESS,
            dialect: Dialect::Padded,
            mode: UploadMode::Manual,
            response_timeout_ms: 500,
            poll_interval_ms: 10,
        }
    }
}
