//! Display module for e-paper display control.
//!
//! This module provides the interface to the EastRising ER-EPM042A1-1R
//! 4.2" black/white/red e-paper panel connected via SPI.

pub mod epd4in2r;
pub mod gpio;
pub mod session;
pub mod spi;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

// Re-export main types
pub use epd4in2r::{GEOMETRY, Timing};
pub use session::with_session;
pub use transport::RpiTransport;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Shared flag raised by the signal handler to abort an in-flight display operation
pub type CancelFlag = Arc<AtomicBool>;

/// Fixed pixel dimensions of a panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelGeometry {
    pub width: u32,
    pub height: u32,
}

impl PanelGeometry {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes per packed 1-bit row, rounded up to a whole byte
    pub const fn stride(&self) -> usize {
        (self.width as usize).div_ceil(8)
    }

    /// Total bytes in one bit plane
    pub const fn plane_len(&self) -> usize {
        self.stride() * self.height as usize
    }
}
