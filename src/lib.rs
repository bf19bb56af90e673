#![cfg_attr(not(test), no_std)]

use core::fmt::Debug;

use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{Read, ReadReady, Write};
use heapless::Deque;
use log::debug;

mod constants;
pub use constants::*;

mod error;
pub use error::*;

mod config;
pub use config::*;

pub mod codec;
pub use codec::{checksum, decode_response, encode_command, Command, Reading};

// Bytes staged from the serial port before they are framed.
const RX_BUFFER_SIZE: usize = 64;

/// Represents an XKC-KL200 laser distance sensor.
///
/// This struct owns the serial port and the delay source and provides
/// methods to configure the sensor and read distances from it, either on
/// request (manual mode) or from the stream the sensor pushes (auto mode).
///
/// # Type Parameters
///
/// * `Serial`: The serial interface connected to the sensor. It must implement
///   `embedded_io_async::Read`, `embedded_io_async::Write` and
///   `embedded_io_async::ReadReady`.
/// * `Delay`: Sleeps between polls while waiting for a response.
pub struct Kl200<Serial, Delay> {
    serial: Serial,
    delay: Delay,
    config: Config,
    mode: UploadMode,
    rx: Deque<u8, RX_BUFFER_SIZE>,
    current_distance: u16,
    last_received_distance: u16,
    data_available: bool,
}

impl<S, D> Kl200<S, D>
where
    S: Read + Write + ReadReady,
    D: DelayNs,
{
    /// Creates a new `Kl200` driver instance.
    ///
    /// The driver starts in manual mode with no reading; call [`init`](Self::init)
    /// to apply the upload mode from `config` to the sensor.
    ///
    /// # Arguments
    ///
    /// * `serial`: The serial interface for communication with the sensor.
    /// * `delay`: The delay source used while polling for responses.
    /// * `config`: The address, dialect and timings to use.
    pub fn new(serial: S, delay: D, config: Config) -> Self {
        Self {
            serial,
            delay,
            config,
            mode: UploadMode::Manual,
            rx: Deque::new(),
            current_distance: 0,
            last_received_distance: 0,
            data_available: false,
        }
    }

    /// Initializes the sensor according to the provided configuration.
    ///
    /// This flushes the serial port and sets the upload mode (manual or auto).
    pub async fn init(&mut self) -> Result<(), Error> {
        self.serial.flush().await.map_err(write_error)?;

        let auto = self.config.mode == UploadMode::Auto;
        self.set_upload_mode(auto).await.map_err(|e| {
            log::error!(
                "Failed to set upload mode to {:?} during init: {:?}",
                self.config.mode,
                e
            );
            e
        })?;

        debug!("KL200 init sequence complete.");
        Ok(())
    }

    /// Returns the active configuration. The address follows `change_address`.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the upload mode the sensor was last successfully switched to.
    pub fn mode(&self) -> UploadMode {
        self.mode
    }

    /// Consumes the driver and hands back the serial port and delay.
    pub fn release(self) -> (S, D) {
        (self.serial, self.delay)
    }

    /// Changes the sensor's address.
    ///
    /// On success the new address is used for every following command.
    ///
    /// # Arguments
    ///
    /// * `address`: The new address, `0x0000..=0xFFFE`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the sensor acknowledged the change.
    /// * `Err(Error::InvalidParameter)` if `address` is `0xFFFF`. Nothing is sent.
    /// * `Err(Error::Timeout)` or `Err(Error::Frame(_))` if no valid acknowledgement arrived.
    pub async fn change_address(&mut self, address: u16) -> Result<(), Error> {
        self.configure(Command::ChangeAddress(address)).await?;
        self.config.address = address;
        debug!("Sensor address updated locally to {:04X}", address);
        Ok(())
    }

    /// Changes the sensor's baud rate.
    ///
    /// The serial port must be reconfigured by the caller once this returns
    /// `Ok`; see [`baud_rate`] for the rate selected by `index`.
    ///
    /// # Arguments
    ///
    /// * `index`: Index into [`BAUD_RATES`], `0..=9`.
    pub async fn change_baud_rate(&mut self, index: u8) -> Result<(), Error> {
        self.configure(Command::ChangeBaudRate(index)).await?;
        debug!("Sensor baud rate set to {:?}", baud_rate(index));
        Ok(())
    }

    /// Switches between manual (`false`) and auto (`true`) upload.
    ///
    /// The driver only changes how it reads distances once the sensor has
    /// accepted the new mode.
    pub async fn set_upload_mode(&mut self, auto: bool) -> Result<(), Error> {
        self.configure(Command::SetUploadMode(auto)).await?;
        self.mode = if auto {
            UploadMode::Auto
        } else {
            UploadMode::Manual
        };
        debug!("Upload mode set to {:?}", self.mode);
        Ok(())
    }

    /// Sets the auto upload period in units of 100 ms (`1..=100`).
    pub async fn set_upload_interval(&mut self, interval: u8) -> Result<(), Error> {
        self.configure(Command::SetUploadInterval(interval)).await
    }

    /// Sets the LED behaviour, `0..=3`.
    pub async fn set_led_mode(&mut self, mode: u8) -> Result<(), Error> {
        self.configure(Command::SetLedMode(mode)).await
    }

    /// Sets the relay behaviour, `0..=1`.
    pub async fn set_relay_mode(&mut self, mode: u8) -> Result<(), Error> {
        self.configure(Command::SetRelayMode(mode)).await
    }

    /// Sets the communication mode, `0..=1`.
    pub async fn set_communication_mode(&mut self, mode: u8) -> Result<(), Error> {
        self.configure(Command::SetCommunicationMode(mode)).await
    }

    /// Restores the factory settings. `hard` selects the hard reset code.
    pub async fn factory_reset(&mut self, hard: bool) -> Result<(), Error> {
        self.configure(Command::FactoryReset { hard }).await
    }

    /// Reads the distance in millimeters.
    ///
    /// In manual mode a read request is sent and the reply awaited for up to
    /// `timeout_ms`. In auto mode nothing is sent; the frames already pushed
    /// by the sensor are parsed instead.
    ///
    /// A timeout or a corrupt frame is not an error: the last good distance
    /// is returned and the session state is left as it was. Callers that need
    /// to tell fresh from stale values check [`available`](Self::available).
    ///
    /// # Returns
    ///
    /// * `Ok(distance)`, fresh or stale.
    /// * `Err(Error::WriteFailure)` or `Err(Error::ReadFailure)` if the serial port failed.
    pub async fn read_distance(&mut self, timeout_ms: u32) -> Result<u16, Error> {
        match self.mode {
            UploadMode::Manual => self.read_requested(timeout_ms).await,
            UploadMode::Auto => self.read_streamed().await,
        }
    }

    /// Returns true when a reading is waiting to be consumed by `get_distance`.
    ///
    /// In auto mode this is also true when a full frame is buffered but not
    /// yet parsed by `process_auto_data`.
    pub async fn available(&mut self) -> Result<bool, Error> {
        match self.mode {
            UploadMode::Manual => Ok(self.data_available),
            UploadMode::Auto => {
                self.fill().await?;
                Ok(self.data_available || self.rx.len() >= FRAME_SIZE)
            }
        }
    }

    /// Parses one frame pushed by the sensor in auto mode.
    ///
    /// Returns `Ok(false)` when less than a frame is buffered. A rejected
    /// frame costs exactly one byte, so calling this repeatedly realigns on a
    /// shifted or corrupted stream. Always `Ok(false)` in manual mode.
    pub async fn process_auto_data(&mut self) -> Result<bool, Error> {
        if self.mode == UploadMode::Manual {
            return Ok(false);
        }
        self.fill().await?;
        if self.rx.len() < FRAME_SIZE {
            return Ok(false);
        }
        Ok(self.pump_frame())
    }

    /// Returns the latest distance and marks it consumed.
    pub fn get_distance(&mut self) -> u16 {
        self.data_available = false;
        self.current_distance
    }

    /// Returns the most recent valid distance without consuming it.
    pub fn get_last_received_distance(&self) -> u16 {
        self.last_received_distance
    }

    async fn read_requested(&mut self, timeout_ms: u32) -> Result<u16, Error> {
        self.discard_input().await?;
        self.send(Command::ReadDistance).await?;

        match self.await_response(CMD_READ_DISTANCE, timeout_ms).await {
            Ok(reading) => {
                self.store(reading.distance);
                Ok(reading.distance)
            }
            Err(Error::Timeout) => {
                log::warn!(
                    "No distance reply within {} ms, keeping {} mm",
                    timeout_ms,
                    self.last_received_distance
                );
                Ok(self.last_received_distance)
            }
            Err(Error::Frame(e)) => {
                log::warn!(
                    "Distance reply rejected ({:?}), keeping {} mm",
                    e,
                    self.last_received_distance
                );
                Ok(self.last_received_distance)
            }
            Err(e) => Err(e),
        }
    }

    async fn read_streamed(&mut self) -> Result<u16, Error> {
        self.fill().await?;
        while self.rx.len() >= FRAME_SIZE {
            self.pump_frame();
        }
        Ok(self.last_received_distance)
    }

    // Validates, sends and, in the padded dialect, waits for the acknowledgement.
    async fn configure(&mut self, command: Command) -> Result<(), Error> {
        command.validate().map_err(|e| {
            log::error!("{:?} rejected, parameter out of range", command);
            e
        })?;

        if self.mode == UploadMode::Manual {
            self.discard_input().await?;
        }
        self.send(command).await?;

        if self.config.dialect == Dialect::Compact {
            debug!("{:?} sent, compact dialect sends no acknowledgement", command);
            return Ok(());
        }

        let timeout_ms = self.config.response_timeout_ms;
        let reply = self
            .await_response(command.id(), timeout_ms)
            .await
            .map_err(|e| {
                log::error!("{:?} not acknowledged: {:?}", command, e);
                e
            })?;
        debug!("{:?} acknowledged: {:?}", command, reply);
        Ok(())
    }

    async fn send(&mut self, command: Command) -> Result<(), Error> {
        let frame = command.encode(self.config.address, self.config.dialect);
        debug!("Executing command: {:02X?}", frame.as_slice());
        self.serial.write_all(&frame).await.map_err(write_error)?;
        self.serial.flush().await.map_err(write_error)?;
        Ok(())
    }

    // Waits for a frame echoing `expected_id`, polling every `poll_interval_ms`.
    //
    // Distance reports that arrive ahead of an acknowledgement are stored. A
    // rejected frame is slid past one byte at a time, so a partial frame left
    // on the line does not hide the reply behind it; if nothing valid follows,
    // the last rejection is reported instead of `Timeout`.
    async fn await_response(&mut self, expected_id: u8, timeout_ms: u32) -> Result<Reading, Error> {
        let poll_ms = self.config.poll_interval_ms.max(1);
        let mut waited_ms: u32 = 0;
        let mut rejected: Option<FrameError> = None;

        loop {
            self.fill().await?;

            while self.rx.len() >= FRAME_SIZE {
                let frame = self.peek_frame();
                match decode_response(&frame, expected_id) {
                    Ok(reading) => {
                        self.consume(FRAME_SIZE);
                        return Ok(reading);
                    }
                    Err(FrameError::IdMismatch) if frame[1] == CMD_READ_DISTANCE => {
                        self.consume(FRAME_SIZE);
                        if let Ok(report) = decode_response(&frame, CMD_READ_DISTANCE) {
                            debug!("Distance report ahead of reply: {} mm", report.distance);
                            self.store(report.distance);
                        }
                    }
                    Err(FrameError::IdMismatch) => {
                        log::warn!(
                            "Expected reply to {:02X}, got reply to {:02X}: {:02X?}",
                            expected_id,
                            frame[1],
                            frame
                        );
                        self.consume(FRAME_SIZE);
                        return Err(FrameError::IdMismatch.into());
                    }
                    Err(e) => {
                        log::warn!("Frame rejected ({:?}), dropping one byte: {:02X?}", e, frame);
                        self.consume(1);
                        rejected = Some(e);
                    }
                }
            }

            if waited_ms >= timeout_ms {
                return Err(rejected.map_or(Error::Timeout, Error::from));
            }
            self.delay.delay_ms(poll_ms).await;
            waited_ms = waited_ms.saturating_add(poll_ms);
        }
    }

    // Parses the frame at the head of the receive buffer.
    fn pump_frame(&mut self) -> bool {
        let frame = self.peek_frame();
        match decode_response(&frame, CMD_READ_DISTANCE) {
            Ok(reading) => {
                self.consume(FRAME_SIZE);
                debug!("Auto upload: {} mm", reading.distance);
                self.store(reading.distance);
                true
            }
            Err(e) => {
                log::warn!("Frame rejected ({:?}), dropping one byte: {:02X?}", e, frame);
                self.consume(1);
                false
            }
        }
    }

    fn store(&mut self, distance: u16) {
        self.current_distance = distance;
        self.last_received_distance = distance;
        self.data_available = true;
    }

    // Moves whatever the serial port has ready into the receive buffer.
    async fn fill(&mut self) -> Result<(), Error> {
        let mut chunk = [0u8; 16];
        while !self.rx.is_full() && self.serial.read_ready().map_err(read_error)? {
            let room = (RX_BUFFER_SIZE - self.rx.len()).min(chunk.len());
            let n = self
                .serial
                .read(&mut chunk[..room])
                .await
                .map_err(read_error)?;
            if n == 0 {
                break;
            }
            for &b in &chunk[..n] {
                // Bounded by `room`.
                let _ = self.rx.push_back(b);
            }
        }
        Ok(())
    }

    async fn discard_input(&mut self) -> Result<(), Error> {
        loop {
            self.fill().await?;
            if self.rx.is_empty() {
                return Ok(());
            }
            debug!("Discarding {} stale bytes", self.rx.len());
            self.rx.clear();
        }
    }

    // Caller guarantees at least FRAME_SIZE bytes are buffered.
    fn peek_frame(&self) -> [u8; FRAME_SIZE] {
        let mut frame = [0u8; FRAME_SIZE];
        for (slot, &b) in frame.iter_mut().zip(self.rx.iter()) {
            *slot = b;
        }
        frame
    }

    fn consume(&mut self, n: usize) {
        for _ in 0..n {
            self.rx.pop_front();
        }
    }
}

fn write_error<E: Debug>(e: E) -> Error {
    log::error!("Serial write failed: {:?}", e);
    Error::WriteFailure
}

fn read_error<E: Debug>(e: E) -> Error {
    log::error!("Serial read failed: {:?}", e);
    Error::ReadFailure
}
