//! SPI communication wrapper for e-paper display.
//!
//! Provides SPI interface for sending commands and data to the display.
//! Defaults to SPI0 with CE0 (Chip Enable 0) at 4 MHz, Mode 0.

use super::gpio::GpioController;
use super::transport::TransportError;
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

/// SPI configuration
pub mod config {
    /// Default SPI clock speed in Hz (4 MHz)
    pub const CLOCK_SPEED: u32 = 4_000_000;

    /// Bulk writes are split into chunks no larger than the spidev buffer
    pub const CHUNK_SIZE: usize = 4096;
}

/// SPI bus selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiSettings {
    pub bus: u8,
    pub chip_select: u8,
    pub clock_hz: u32,
}

impl Default for SpiSettings {
    fn default() -> Self {
        Self {
            bus: 0,
            chip_select: 0,
            clock_hz: config::CLOCK_SPEED,
        }
    }
}

fn bus_from_index(index: u8) -> Result<Bus, TransportError> {
    Ok(match index {
        0 => Bus::Spi0,
        1 => Bus::Spi1,
        2 => Bus::Spi2,
        3 => Bus::Spi3,
        4 => Bus::Spi4,
        5 => Bus::Spi5,
        6 => Bus::Spi6,
        other => return Err(TransportError::UnsupportedBus(other)),
    })
}

fn slave_select_from_index(index: u8) -> Result<SlaveSelect, TransportError> {
    Ok(match index {
        0 => SlaveSelect::Ss0,
        1 => SlaveSelect::Ss1,
        2 => SlaveSelect::Ss2,
        other => return Err(TransportError::UnsupportedChipSelect(other)),
    })
}

/// SPI display interface
pub struct SpiDisplay {
    spi: Spi,
}

impl SpiDisplay {
    /// Initialize SPI for display communication
    ///
    /// Mode 0 (CPOL=0, CPHA=0); chip select is handled by the SPI peripheral.
    pub fn new(settings: &SpiSettings) -> Result<Self, TransportError> {
        let spi = Spi::new(
            bus_from_index(settings.bus)?,
            slave_select_from_index(settings.chip_select)?,
            settings.clock_hz,
            Mode::Mode0,
        )?;

        tracing::debug!(
            "SPI initialized: Bus=SPI{}, SS=CE{}, Speed={}Hz, Mode=0",
            settings.bus,
            settings.chip_select,
            settings.clock_hz
        );

        Ok(Self { spi })
    }

    /// Send a command byte to the display
    ///
    /// Sets DC pin LOW before sending (command mode)
    pub fn write_command(&mut self, gpio: &mut GpioController, cmd: u8) -> Result<(), TransportError> {
        gpio.dc_low();
        self.spi
            .write(&[cmd])
            .map_err(|e| TransportError::WriteError(e.to_string()))?;
        Ok(())
    }

    /// Send data bytes to the display
    ///
    /// Sets DC pin HIGH before sending (data mode)
    pub fn write_data_bulk(
        &mut self,
        gpio: &mut GpioController,
        data: &[u8],
    ) -> Result<(), TransportError> {
        gpio.dc_high();

        for chunk in data.chunks(config::CHUNK_SIZE) {
            let written = self
                .spi
                .write(chunk)
                .map_err(|e| TransportError::WriteError(e.to_string()))?;
            if written != chunk.len() {
                return Err(TransportError::WriteError(format!(
                    "short write: {} of {} bytes",
                    written,
                    chunk.len()
                )));
            }
        }

        Ok(())
    }
}
