//! EastRising ER-EPM042A1-1R 4.2" black/white/red e-paper driver.
//!
//! Resolution: 400 x 300 pixels
//! Two 1-bit RAM planes (black and red), written row by row.
//!
//! Based on the vendor's bcm2835 C demo (ER-EPD042A1-1.c). The controller is
//! configured to invert red RAM content, so the red plane is sent with
//! 0 = red and 1 = not red.

use super::transport::{Level, Pin, Transport, TransportError};
use super::{CancelFlag, PanelGeometry};
use crate::image_proc::BitPlane;
use std::sync::atomic::Ordering;
use std::time::Duration;
use thiserror::Error;

/// Display dimensions
pub const WIDTH: u32 = 400;
pub const HEIGHT: u32 = 300;

pub const GEOMETRY: PanelGeometry = PanelGeometry::new(WIDTH, HEIGHT);

/// EPD commands (from the vendor register map)
mod cmd {
    pub const DRIVER_OUTPUT_CONTROL: u8 = 0x01;
    pub const BOOSTER_SOFT_START: u8 = 0x0C;
    pub const DEEP_SLEEP_MODE: u8 = 0x10;
    pub const DATA_ENTRY_MODE: u8 = 0x11;
    pub const TEMPERATURE_SENSOR: u8 = 0x18;
    pub const MASTER_ACTIVATION: u8 = 0x20;
    pub const DISPLAY_UPDATE_CONTROL_1: u8 = 0x21;
    pub const DISPLAY_UPDATE_CONTROL_2: u8 = 0x22;
    pub const WRITE_RAM: u8 = 0x24;
    pub const WRITE_RAM_RED: u8 = 0x26;
    pub const ACVCOM_SETTING: u8 = 0x2B;
    pub const BORDER_WAVEFORM: u8 = 0x3C;
    pub const SET_RAM_X_WINDOW: u8 = 0x44;
    pub const SET_RAM_Y_WINDOW: u8 = 0x45;
    pub const SET_RAM_X_COUNTER: u8 = 0x4E;
    pub const SET_RAM_Y_COUNTER: u8 = 0x4F;
    pub const ANALOG_BLOCK_CONTROL: u8 = 0x74;
    pub const DIGITAL_BLOCK_CONTROL: u8 = 0x7E;
}

/// Command payloads
mod data {
    /// Y increment, X increment: left to right, then top to bottom
    pub const DATA_ENTRY_XY_INC: u8 = 0x03;
    pub const BORDER_HIZ: u8 = 0x01;
    pub const INVERT_RED_RAM: u8 = 0x80;
    pub const INTERNAL_TEMP_SENSOR: u8 = 0x80;
    /// Load temperature and waveform setting
    pub const UPDATE_LOAD_WAVEFORM: u8 = 0xB1;
    /// Full update including both RAM planes
    pub const UPDATE_FULL: u8 = 0xC7;
    pub const DEEP_SLEEP_MODE_1: u8 = 0x01;
}

/// Display driver errors
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Busy timeout: display did not respond within {0:?}")]
    DeviceTimeout(Duration),

    #[error("Cannot {operation} while display is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: PanelState,
    },

    #[error("Invalid buffer size: expected {expected}, got {actual}")]
    InvalidBufferSize { expected: usize, actual: usize },

    #[error("Display operation cancelled")]
    Cancelled,
}

/// Controller lifecycle as tracked by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    PoweredOff,
    Reset,
    Initialized,
    Idle,
    Busy,
    Sleeping,
    /// A transfer failed or the busy line timed out; only reset or sleep are accepted
    Faulted,
}

/// Controller RAM bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamPlane {
    Black,
    Red,
}

impl RamPlane {
    fn write_command(self) -> u8 {
        match self {
            RamPlane::Black => cmd::WRITE_RAM,
            RamPlane::Red => cmd::WRITE_RAM_RED,
        }
    }
}

/// Delays used by reset and busy polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Settle time after each reset line transition
    pub reset_delay_ms: u64,
    /// Interval between BUSY samples
    pub busy_poll_ms: u64,
    /// Give up waiting on BUSY after this long
    pub busy_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            reset_delay_ms: 200,
            busy_poll_ms: 100,
            busy_timeout: Duration::from_secs(60),
        }
    }
}

/// ER-EPM042A1-1R display driver
pub struct Epd4in2r<T: Transport> {
    transport: T,
    timing: Timing,
    state: PanelState,
    cancel: Option<CancelFlag>,
}

impl<T: Transport> Epd4in2r<T> {
    /// Create a driver over an open transport; no bytes are sent yet
    pub fn new(transport: T, timing: Timing) -> Self {
        Self {
            transport,
            timing,
            state: PanelState::PoweredOff,
            cancel: None,
        }
    }

    /// Abort row writes and refreshes once `flag` is raised
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    /// Hand back the transport
    pub fn release(self) -> T {
        self.transport
    }

    /// Perform hardware reset sequence (HIGH, LOW, HIGH)
    pub fn reset(&mut self) -> Result<(), DisplayError> {
        tracing::debug!("Performing hardware reset");

        for level in [Level::High, Level::Low, Level::High] {
            self.write_pin(Pin::Reset, level)?;
            self.transport.delay_ms(self.timing.reset_delay_ms);
        }

        self.state = PanelState::Reset;
        Ok(())
    }

    /// Initialize the display controller
    /// Based on the vendor EPD_Init() sequence; must follow `reset`
    pub fn init(&mut self) -> Result<(), DisplayError> {
        self.expect_state("init", &[PanelState::Reset])?;

        tracing::info!("Initializing ER-EPM042A1-1R display ({}x{})", WIDTH, HEIGHT);

        let mux = (HEIGHT - 1) as u16;
        let x_end = (GEOMETRY.stride() - 1) as u8;

        self.send_command_data(cmd::ANALOG_BLOCK_CONTROL, &[0x54])?;
        self.send_command_data(cmd::DIGITAL_BLOCK_CONTROL, &[0x3B])?;

        // Reduce glitch under ACVCOM
        self.send_command_data(cmd::ACVCOM_SETTING, &[0x04, 0x63])?;

        self.send_command_data(cmd::BOOSTER_SOFT_START, &[0x8E, 0x8C, 0x85, 0x3F])?;

        // Gate MUX = HEIGHT - 1
        let [mux_lo, mux_hi] = mux.to_le_bytes();
        self.send_command_data(cmd::DRIVER_OUTPUT_CONTROL, &[mux_lo, mux_hi, 0x00])?;

        self.send_command_data(cmd::DATA_ENTRY_MODE, &[data::DATA_ENTRY_XY_INC])?;

        // RAM X 0..=0x31 (8-pixel columns), RAM Y 0x12B..=0
        self.send_command_data(cmd::SET_RAM_X_WINDOW, &[0x00, x_end])?;
        self.send_command_data(cmd::SET_RAM_Y_WINDOW, &[mux_lo, mux_hi, 0x00, 0x00])?;

        self.send_command_data(cmd::BORDER_WAVEFORM, &[data::BORDER_HIZ])?;

        // Red RAM is inverted; the red plane is encoded to match
        self.send_command_data(cmd::DISPLAY_UPDATE_CONTROL_1, &[data::INVERT_RED_RAM])?;

        self.send_command_data(cmd::TEMPERATURE_SENSOR, &[data::INTERNAL_TEMP_SENSOR])?;
        self.send_command_data(cmd::DISPLAY_UPDATE_CONTROL_2, &[data::UPDATE_LOAD_WAVEFORM])?;
        self.send_command(cmd::MASTER_ACTIVATION)?;
        self.busy_wait()?;

        self.state = PanelState::Initialized;
        tracing::info!("Display initialized successfully");
        Ok(())
    }

    /// Set the RAM address window (inclusive pixel coordinates)
    pub fn set_window(
        &mut self,
        x_start: u16,
        y_start: u16,
        x_end: u16,
        y_end: u16,
    ) -> Result<(), DisplayError> {
        self.expect_ready("set window")?;

        self.send_command_data(
            cmd::SET_RAM_X_WINDOW,
            &[(x_start >> 3) as u8, (x_end >> 3) as u8],
        )?;

        let [ys_lo, ys_hi] = y_start.to_le_bytes();
        let [ye_lo, ye_hi] = y_end.to_le_bytes();
        self.send_command_data(cmd::SET_RAM_Y_WINDOW, &[ys_lo, ys_hi, ye_lo, ye_hi])
    }

    /// Set the RAM write cursor
    pub fn set_cursor(&mut self, x: u16, y: u16) -> Result<(), DisplayError> {
        self.expect_ready("set cursor")?;

        self.send_command_data(cmd::SET_RAM_X_COUNTER, &[(x >> 3) as u8])?;
        self.send_command_data(cmd::SET_RAM_Y_COUNTER, &y.to_le_bytes())
    }

    /// Stream one plane into its RAM bank
    ///
    /// The cursor is re-set before every row; the controller corrupts
    /// addressing if rows are streamed back to back.
    pub fn write_plane(&mut self, bank: RamPlane, plane: &BitPlane) -> Result<(), DisplayError> {
        self.expect_ready("write plane")?;

        if plane.geometry() != GEOMETRY {
            return Err(DisplayError::InvalidBufferSize {
                expected: GEOMETRY.plane_len(),
                actual: plane.as_bytes().len(),
            });
        }

        tracing::debug!("Writing {:?} plane ({} bytes)", bank, plane.as_bytes().len());

        for row in 0..HEIGHT {
            self.check_cancelled()?;
            self.set_cursor(0, row as u16)?;
            self.send_command(bank.write_command())?;
            self.send_data(plane.row(row))?;
        }

        Ok(())
    }

    /// Write both planes over the full window, then refresh
    pub fn display(&mut self, black: &BitPlane, red: &BitPlane) -> Result<(), DisplayError> {
        self.expect_ready("display")?;

        tracing::info!("Sending frame to display");

        self.set_window(0, 0, (WIDTH - 1) as u16, (HEIGHT - 1) as u16)?;
        self.write_plane(RamPlane::Black, black)?;
        self.write_plane(RamPlane::Red, red)?;
        self.refresh()?;

        tracing::info!("Display refresh complete");
        Ok(())
    }

    /// Full update from both RAM planes
    pub fn refresh(&mut self) -> Result<(), DisplayError> {
        self.expect_ready("refresh")?;
        self.check_cancelled()?;

        self.send_command_data(cmd::DISPLAY_UPDATE_CONTROL_2, &[data::UPDATE_FULL])?;
        self.send_command(cmd::MASTER_ACTIVATION)?;
        tracing::info!("Waiting for display refresh to complete...");
        self.busy_wait()?;

        self.state = PanelState::Idle;
        Ok(())
    }

    /// Clear display to white (both planes all ones)
    pub fn clear(&mut self) -> Result<(), DisplayError> {
        let blank = BitPlane::filled(GEOMETRY, 0xFF);

        tracing::info!("Clearing display");
        self.display(&blank, &blank)
    }

    /// Put display into deep sleep mode
    ///
    /// Accepted from any state; `reset` + `init` are required afterwards.
    pub fn sleep(&mut self) -> Result<(), DisplayError> {
        tracing::info!("Putting display to sleep");

        self.send_command_data(cmd::DEEP_SLEEP_MODE, &[data::DEEP_SLEEP_MODE_1])?;

        self.state = PanelState::Sleeping;
        Ok(())
    }

    /// Wait for display to become ready (BUSY pin goes low)
    ///
    /// The controller holds BUSY HIGH while it works. Elapsed time is counted
    /// in poll intervals against `Timing::busy_timeout`.
    pub fn busy_wait(&mut self) -> Result<(), DisplayError> {
        let previous = self.state;
        self.state = PanelState::Busy;

        let poll = self.timing.busy_poll_ms;
        let timeout = self.timing.busy_timeout;
        let mut waited = Duration::ZERO;

        loop {
            let level = match self.transport.read_pin(Pin::Busy) {
                Ok(level) => level,
                Err(e) => return Err(self.fault(e)),
            };
            if level == Level::Low {
                break;
            }
            if waited >= timeout {
                self.state = PanelState::Faulted;
                return Err(DisplayError::DeviceTimeout(timeout));
            }
            self.transport.delay_ms(poll);
            waited += Duration::from_millis(poll);
        }

        if waited.as_millis() > 100 {
            tracing::debug!("BUSY wait completed after {:?}", waited);
        }

        self.state = previous;
        Ok(())
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[PanelState],
    ) -> Result<(), DisplayError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(DisplayError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn expect_ready(&self, operation: &'static str) -> Result<(), DisplayError> {
        self.expect_state(operation, &[PanelState::Initialized, PanelState::Idle])
    }

    fn check_cancelled(&self) -> Result<(), DisplayError> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(DisplayError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Transport failures leave the controller in an unknown state
    fn fault(&mut self, error: TransportError) -> DisplayError {
        self.state = PanelState::Faulted;
        DisplayError::Transport(error)
    }

    fn write_pin(&mut self, pin: Pin, level: Level) -> Result<(), DisplayError> {
        if let Err(e) = self.transport.write_pin(pin, level) {
            return Err(self.fault(e));
        }
        Ok(())
    }

    fn send_command(&mut self, command: u8) -> Result<(), DisplayError> {
        if let Err(e) = self.transport.send_command(command) {
            return Err(self.fault(e));
        }
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        if let Err(e) = self.transport.send_data(data) {
            return Err(self.fault(e));
        }
        Ok(())
    }

    /// Send command with data to display
    fn send_command_data(&mut self, command: u8, data: &[u8]) -> Result<(), DisplayError> {
        self.send_command(command)?;
        if !data.is_empty() {
            self.send_data(data)?;
        }
        Ok(())
    }
}
