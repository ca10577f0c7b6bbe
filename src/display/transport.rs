//! Transport port used by the panel driver.
//!
//! The driver only ever talks to a [`Transport`]: command bytes, data bytes,
//! the reset and busy lines, and a millisecond delay. [`RpiTransport`] is the
//! rppal-backed implementation for a Raspberry Pi.

use super::gpio::{GpioController, PinAssignment};
use super::spi::{SpiDisplay, SpiSettings};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Logic level on a control line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl From<rppal::gpio::Level> for Level {
    fn from(level: rppal::gpio::Level) -> Self {
        match level {
            rppal::gpio::Level::Low => Level::Low,
            rppal::gpio::Level::High => Level::High,
        }
    }
}

/// Control lines the driver can address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pin {
    Reset,
    DataCommand,
    Busy,
}

/// Bus and GPIO errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[error("SPI initialization failed: {0}")]
    Spi(#[from] rppal::spi::Error),

    #[error("SPI write failed: {0}")]
    WriteError(String),

    #[error("Unsupported SPI bus {0}")]
    UnsupportedBus(u8),

    #[error("Unsupported SPI chip select {0}")]
    UnsupportedChipSelect(u8),

    #[error("{0:?} pin is an input")]
    NotAnOutput(Pin),

    #[error("{0:?} pin is an output")]
    NotAnInput(Pin),

    #[error("Display hardware is already claimed by another session")]
    HardwareClaimed,

    #[error("Transport is closed")]
    Closed,
}

/// Narrow byte/pin interface the panel driver is written against
pub trait Transport {
    /// Send one command byte (DC low)
    fn send_command(&mut self, command: u8) -> Result<(), TransportError>;

    /// Send data bytes (DC high)
    fn send_data(&mut self, data: &[u8]) -> Result<(), TransportError>;

    fn write_pin(&mut self, pin: Pin, level: Level) -> Result<(), TransportError>;

    /// Sample an input line. BUSY is the only input on the panel.
    fn read_pin(&mut self, pin: Pin) -> Result<Level, TransportError>;

    /// Block the calling thread
    fn delay_ms(&mut self, ms: u64);

    /// Release the underlying bus and pins. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Set while an `RpiTransport` owns the SPI bus and pins
static HARDWARE_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Process-wide ownership token for the display hardware
struct HardwareClaim(());

impl HardwareClaim {
    fn acquire() -> Result<Self, TransportError> {
        HARDWARE_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| HardwareClaim(()))
            .map_err(|_| TransportError::HardwareClaimed)
    }
}

impl Drop for HardwareClaim {
    fn drop(&mut self) {
        HARDWARE_CLAIMED.store(false, Ordering::Release);
    }
}

/// Hardware settings needed to open the transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HardwareSettings {
    pub spi: SpiSettings,
    pub pins: PinAssignment,
}

struct Hardware {
    gpio: GpioController,
    spi: SpiDisplay,
    // Dropped last so the claim outlives the pins
    _claim: HardwareClaim,
}

/// Raspberry Pi transport (rppal SPI + GPIO)
pub struct RpiTransport {
    hw: Option<Hardware>,
}

impl RpiTransport {
    /// Claim the hardware and open SPI and GPIO
    pub fn open(settings: &HardwareSettings) -> Result<Self, TransportError> {
        let claim = HardwareClaim::acquire()?;
        let gpio = GpioController::new(&settings.pins)?;
        let spi = SpiDisplay::new(&settings.spi)?;

        tracing::info!("Display transport opened");

        Ok(Self {
            hw: Some(Hardware {
                gpio,
                spi,
                _claim: claim,
            }),
        })
    }

    fn hw(&mut self) -> Result<&mut Hardware, TransportError> {
        self.hw.as_mut().ok_or(TransportError::Closed)
    }
}

impl Transport for RpiTransport {
    fn send_command(&mut self, command: u8) -> Result<(), TransportError> {
        let hw = self.hw()?;
        hw.spi.write_command(&mut hw.gpio, command)
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let hw = self.hw()?;
        hw.spi.write_data_bulk(&mut hw.gpio, data)
    }

    fn write_pin(&mut self, pin: Pin, level: Level) -> Result<(), TransportError> {
        let hw = self.hw()?;
        match pin {
            Pin::Reset => hw.gpio.set_rst(level),
            Pin::DataCommand => hw.gpio.set_dc(level),
            Pin::Busy => return Err(TransportError::NotAnOutput(pin)),
        }
        Ok(())
    }

    fn read_pin(&mut self, pin: Pin) -> Result<Level, TransportError> {
        let hw = self.hw()?;
        match pin {
            Pin::Busy => Ok(hw.gpio.busy_level()),
            Pin::Reset | Pin::DataCommand => Err(TransportError::NotAnInput(pin)),
        }
    }

    fn delay_ms(&mut self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.hw.take().is_some() {
            tracing::info!("Display transport closed");
        }
        Ok(())
    }
}

impl Drop for RpiTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_claim_is_exclusive() {
        let first = HardwareClaim::acquire().expect("first claim");
        assert!(matches!(
            HardwareClaim::acquire(),
            Err(TransportError::HardwareClaimed)
        ));
        drop(first);
        assert!(HardwareClaim::acquire().is_ok());
    }
}
