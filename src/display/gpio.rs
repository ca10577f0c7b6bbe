//! GPIO controller for e-paper display.
//!
//! Manages the GPIO pins used for display control:
//! - RST (Reset): GPIO 17 by default
//! - DC (Data/Command): GPIO 25 by default
//! - BUSY: GPIO 24 by default (HIGH while the controller is busy)
//!
//! Chip select is driven by the SPI peripheral (CE0/CE1), not from here.

use super::transport::{Level, TransportError};
use rppal::gpio::{Gpio, InputPin, OutputPin};

/// GPIO pin assignments (BCM numbering)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinAssignment {
    pub rst: u8,
    pub dc: u8,
    pub busy: u8,
}

impl Default for PinAssignment {
    fn default() -> Self {
        Self {
            rst: 17,
            dc: 25,
            busy: 24,
        }
    }
}

/// GPIO controller for e-paper display
pub struct GpioController {
    rst: OutputPin,
    dc: OutputPin,
    busy: InputPin,
}

impl GpioController {
    /// Initialize GPIO pins for display control
    pub fn new(pins: &PinAssignment) -> Result<Self, TransportError> {
        let gpio = Gpio::new()?;

        let mut rst = gpio.get(pins.rst)?.into_output();
        let mut dc = gpio.get(pins.dc)?.into_output();
        let busy = gpio.get(pins.busy)?.into_input_pulldown();

        // Initialize pins to known state
        rst.set_high();
        dc.set_low();

        tracing::debug!(
            "GPIO initialized: RST={}, DC={}, BUSY={}",
            pins.rst,
            pins.dc,
            pins.busy
        );

        Ok(Self { rst, dc, busy })
    }

    /// Drive the reset line
    pub fn set_rst(&mut self, level: Level) {
        match level {
            Level::High => self.rst.set_high(),
            Level::Low => self.rst.set_low(),
        }
    }

    /// Sample the BUSY input
    pub fn busy_level(&self) -> Level {
        self.busy.read().into()
    }

    /// Set DC pin low (command mode)
    #[inline]
    pub fn dc_low(&mut self) {
        self.dc.set_low();
    }

    /// Set DC pin high (data mode)
    #[inline]
    pub fn dc_high(&mut self) {
        self.dc.set_high();
    }

    /// Set DC pin to an explicit level
    pub fn set_dc(&mut self, level: Level) {
        match level {
            Level::High => self.dc_high(),
            Level::Low => self.dc_low(),
        }
    }
}

impl Drop for GpioController {
    fn drop(&mut self) {
        // Leave the panel out of reset so it keeps its deep-sleep state
        self.rst.set_high();
        tracing::debug!("GPIO controller dropped");
    }
}
