//! Configuration management for the e-paper renderer.
//!
//! Handles loading and validating configuration from JSON files.

use crate::display::Timing;
use crate::display::gpio::PinAssignment;
use crate::display::spi::{SpiSettings, config::CLOCK_SPEED};
use crate::display::transport::HardwareSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/opt/epd4in2r-display/config.json";

/// Highest BCM GPIO number on the 40-pin header
const MAX_BCM_PIN: u8 = 27;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// SPI bus number (/dev/spidev<bus>.<cs>)
    #[serde(default)]
    pub spi_bus: u8,

    /// SPI chip select line (CE0/CE1/CE2)
    #[serde(default)]
    pub chip_select: u8,

    /// SPI clock in Hz
    #[serde(default = "default_spi_clock")]
    pub spi_clock_hz: u32,

    /// Reset pin (BCM)
    #[serde(default = "default_rst_pin")]
    pub rst_pin: u8,

    /// Data/command pin (BCM)
    #[serde(default = "default_dc_pin")]
    pub dc_pin: u8,

    /// Busy pin (BCM)
    #[serde(default = "default_busy_pin")]
    pub busy_pin: u8,

    /// Settle time after each reset line transition
    #[serde(default = "default_reset_delay")]
    pub reset_delay_ms: u64,

    /// Interval between busy line samples
    #[serde(default = "default_busy_poll")]
    pub busy_poll_ms: u64,

    /// Give up on a busy panel after this many seconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,

    /// Blank the panel before drawing each image
    #[serde(default = "default_true")]
    pub clear_before_render: bool,

    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

fn default_spi_clock() -> u32 {
    CLOCK_SPEED
}

fn default_rst_pin() -> u8 {
    PinAssignment::default().rst
}

fn default_dc_pin() -> u8 {
    PinAssignment::default().dc
}

fn default_busy_pin() -> u8 {
    PinAssignment::default().busy
}

fn default_reset_delay() -> u64 {
    Timing::default().reset_delay_ms
}

fn default_busy_poll() -> u64 {
    Timing::default().busy_poll_ms
}

fn default_busy_timeout() -> u64 {
    Timing::default().busy_timeout.as_secs()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spi_bus: 0,
            chip_select: 0,
            spi_clock_hz: default_spi_clock(),
            rst_pin: default_rst_pin(),
            dc_pin: default_dc_pin(),
            busy_pin: default_busy_pin(),
            reset_delay_ms: default_reset_delay(),
            busy_poll_ms: default_busy_poll(),
            busy_timeout_secs: default_busy_timeout(),
            clear_before_render: true,
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration JSON
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spi_bus > 6 {
            return Err(ConfigError::ValidationError(format!(
                "spi_bus {} must be between 0 and 6",
                self.spi_bus
            )));
        }

        if self.chip_select > 2 {
            return Err(ConfigError::ValidationError(format!(
                "chip_select {} must be between 0 and 2",
                self.chip_select
            )));
        }

        if self.spi_clock_hz == 0 {
            return Err(ConfigError::ValidationError(
                "spi_clock_hz must be greater than 0".to_string(),
            ));
        }

        let pins = [
            ("rst_pin", self.rst_pin),
            ("dc_pin", self.dc_pin),
            ("busy_pin", self.busy_pin),
        ];
        for (name, pin) in pins {
            if pin > MAX_BCM_PIN {
                return Err(ConfigError::ValidationError(format!(
                    "{} {} must be between 0 and {}",
                    name, pin, MAX_BCM_PIN
                )));
            }
        }
        for (i, (name, pin)) in pins.iter().enumerate() {
            if let Some((other, _)) = pins[i + 1..].iter().find(|(_, p)| p == pin) {
                return Err(ConfigError::ValidationError(format!(
                    "{} and {} both use GPIO {}",
                    name, other, pin
                )));
            }
        }

        if self.busy_poll_ms == 0 {
            return Err(ConfigError::ValidationError(
                "busy_poll_ms must be greater than 0".to_string(),
            ));
        }

        if self.busy_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "busy_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Protocol timing derived from this configuration
    pub fn timing(&self) -> Timing {
        Timing {
            reset_delay_ms: self.reset_delay_ms,
            busy_poll_ms: self.busy_poll_ms,
            busy_timeout: Duration::from_secs(self.busy_timeout_secs),
        }
    }

    /// Bus and pin settings for opening the transport
    pub fn hardware(&self) -> HardwareSettings {
        HardwareSettings {
            spi: SpiSettings {
                bus: self.spi_bus,
                chip_select: self.chip_select,
                clock_hz: self.spi_clock_hz,
            },
            pins: PinAssignment {
                rst: self.rst_pin,
                dc: self.dc_pin,
                busy: self.busy_pin,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.timing(), Timing::default());
        assert_eq!(config.hardware(), HardwareSettings::default());
    }

    #[test]
    fn empty_json_uses_defaults() {
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn partial_json_overrides() {
        let config =
            Config::from_json(r#"{"busy_timeout_secs": 5, "clear_before_render": false}"#).unwrap();

        assert_eq!(config.timing().busy_timeout, Duration::from_secs(5));
        assert!(!config.clear_before_render);
        assert_eq!(config.rst_pin, 17);
    }

    #[test]
    fn rejects_out_of_range_pin() {
        let err = Config::from_json(r#"{"busy_pin": 40}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn rejects_shared_pins() {
        let err = Config::from_json(r#"{"dc_pin": 17}"#).unwrap_err();
        match err {
            ConfigError::ValidationError(msg) => assert!(msg.contains("rst_pin")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_zero_timings() {
        assert!(Config::from_json(r#"{"busy_poll_ms": 0}"#).is_err());
        assert!(Config::from_json(r#"{"busy_timeout_secs": 0}"#).is_err());
        assert!(Config::from_json(r#"{"spi_clock_hz": 0}"#).is_err());
    }

    #[test]
    fn rejects_bad_json() {
        assert!(matches!(
            Config::from_json("{"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!("epd4in2r-config-{}.json", std::process::id()));
        let config = Config {
            busy_pin: 5,
            verbose: true,
            ..Config::default()
        };
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::load(&path);
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded.unwrap(), config);
    }
}
