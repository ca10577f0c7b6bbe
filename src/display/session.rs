//! Display session lifecycle.
//!
//! A [`PanelSession`] owns the transport for its whole life: it resets and
//! initializes the panel on open, and on close always puts the panel to
//! sleep and releases the transport, exactly once, whatever happened before.

use super::epd4in2r::{DisplayError, Epd4in2r, GEOMETRY, Timing};
use super::transport::Transport;
use super::CancelFlag;
use crate::image_proc::{self, Frame, ImageError};
use image::DynamicImage;
use thiserror::Error;

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Display error: {0}")]
    Display(#[from] DisplayError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Session is closed")]
    Closed,
}

impl From<super::transport::TransportError> for SessionError {
    fn from(e: super::transport::TransportError) -> Self {
        SessionError::Display(DisplayError::Transport(e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Connected,
    Initialized,
}

/// Open connection to the panel
pub struct PanelSession<T: Transport> {
    epd: Option<Epd4in2r<T>>,
    state: SessionState,
}

impl<T: Transport> PanelSession<T> {
    /// Reset and initialize the panel over `transport`
    ///
    /// Row writes and refreshes are abandoned once `cancel` is raised.
    pub fn open(
        transport: T,
        timing: Timing,
        cancel: Option<CancelFlag>,
    ) -> Result<Self, SessionError> {
        let mut epd = Epd4in2r::new(transport, timing);
        if let Some(flag) = cancel {
            epd = epd.with_cancel(flag);
        }

        let mut session = Self {
            epd: Some(epd),
            state: SessionState::Connected,
        };

        if let Err(e) = session.start() {
            tracing::error!("Display initialization failed: {}", e);
            if let Err(teardown) = session.close() {
                tracing::warn!("Teardown after failed init also failed: {}", teardown);
            }
            return Err(e);
        }

        Ok(session)
    }

    fn start(&mut self) -> Result<(), SessionError> {
        let epd = self.epd()?;
        epd.reset()?;
        epd.init()?;
        self.state = SessionState::Initialized;
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Blank the panel
    pub fn clear(&mut self) -> Result<(), SessionError> {
        self.epd()?.clear()?;
        Ok(())
    }

    /// Fit, dither and show an image
    pub fn render(&mut self, image: DynamicImage) -> Result<(), SessionError> {
        // Fail before touching the bus if the image is unusable
        self.epd()?;
        let frame = image_proc::prepare(image, GEOMETRY)?;
        self.show(&frame)
    }

    /// Write a prepared frame and refresh
    pub fn show(&mut self, frame: &Frame) -> Result<(), SessionError> {
        self.epd()?.display(&frame.black, &frame.red)?;
        Ok(())
    }

    /// Sleep the panel and release the transport
    ///
    /// Safe to call repeatedly; only the first call does anything. Both steps
    /// are attempted even if the first fails; the first failure is returned.
    pub fn close(&mut self) -> Result<(), SessionError> {
        let Some(mut epd) = self.epd.take() else {
            return Ok(());
        };
        self.state = SessionState::Closed;
        tracing::debug!("Closing display session (panel {:?})", epd.state());

        let slept = epd.sleep();
        if let Err(e) = &slept {
            tracing::warn!("Failed to put display to sleep: {}", e);
        }

        let mut transport = epd.release();
        let closed = transport.close();
        if let Err(e) = &closed {
            tracing::warn!("Failed to close display transport: {}", e);
        }

        slept?;
        closed?;
        Ok(())
    }

    fn epd(&mut self) -> Result<&mut Epd4in2r<T>, SessionError> {
        self.epd.as_mut().ok_or(SessionError::Closed)
    }
}

impl<T: Transport> Drop for PanelSession<T> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Display session teardown failed: {}", e);
        }
    }
}

/// Open a session, run `f`, then close it on every path
///
/// Teardown failures are logged; they only surface when `f` succeeded.
pub fn with_session<T, F, R>(
    transport: T,
    timing: Timing,
    cancel: Option<CancelFlag>,
    f: F,
) -> Result<R, SessionError>
where
    T: Transport,
    F: FnOnce(&mut PanelSession<T>) -> Result<R, SessionError>,
{
    let mut session = PanelSession::open(transport, timing, cancel)?;
    tracing::debug!("Display session {:?}", session.state());
    let result = f(&mut session);
    let teardown = session.close();

    match (result, teardown) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(teardown)) => {
            tracing::warn!("Ignoring teardown failure after error: {}", teardown);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::mock::{Event, MockTransport};
    use crate::display::transport::{Level, Pin};
    use image::{Rgb, RgbImage};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn ends_with_sleep(mock: &MockTransport) -> bool {
        mock.log
            .borrow()
            .bus_events()
            .ends_with(&[Event::Command(0x10), Event::Data(vec![0x01])])
    }

    #[test]
    fn open_initializes_panel() {
        let mock = MockTransport::new();
        let session = PanelSession::open(mock.clone(), Timing::default(), None).unwrap();

        assert_eq!(session.state(), SessionState::Initialized);
        let log = mock.log.borrow();
        assert_eq!(log.events[0], Event::Pin(Pin::Reset, Level::High));
        assert_eq!(log.commands().last(), Some(&0x20));
        assert_eq!(log.close_count, 0);
    }

    #[test]
    fn render_writes_both_planes_and_refreshes() {
        let mock = MockTransport::new();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 50, Rgb([255, 0, 0])));

        with_session(mock.clone(), Timing::default(), None, |session| {
            session.render(img)
        })
        .unwrap();

        let log = mock.log.borrow();
        assert_eq!(log.count_command(0x24), 300);
        assert_eq!(log.count_command(0x26), 300);
        // Init and refresh
        assert_eq!(log.count_command(0x20), 2);
        assert_eq!(log.close_count, 1);
        drop(log);
        assert!(ends_with_sleep(&mock));
    }

    #[test]
    fn clear_then_show_frame() {
        let mock = MockTransport::new();
        let frame = image_proc::prepare(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 300, Rgb([0, 0, 0]))),
            GEOMETRY,
        )
        .unwrap();

        with_session(mock.clone(), Timing::default(), None, |session| {
            session.clear()?;
            session.show(&frame)
        })
        .unwrap();

        let log = mock.log.borrow();
        assert_eq!(log.count_command(0x24), 600);
        assert!(log.events.contains(&Event::Data(vec![0x00; 50])));
    }

    #[test]
    fn transport_failure_still_sleeps_and_closes_once() {
        let mock = MockTransport::new();
        mock.log.borrow_mut().fail_command = Some(0x26);

        let err = with_session(mock.clone(), Timing::default(), None, |session| {
            session.clear()
        })
        .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Display(DisplayError::Transport(_))
        ));
        assert_eq!(mock.log.borrow().close_count, 1);
        assert!(ends_with_sleep(&mock));
    }

    #[test]
    fn teardown_error_does_not_mask_original() {
        let mock = MockTransport::new();

        let err = with_session(mock.clone(), Timing::default(), None, |session| {
            mock.log.borrow_mut().fail_command = Some(0x10);
            session.render(DynamicImage::new_rgb8(0, 3))
        })
        .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Image(ImageError::InvalidImage { .. })
        ));
        assert_eq!(mock.log.borrow().close_count, 1);
    }

    #[test]
    fn teardown_error_surfaces_after_success() {
        let mock = MockTransport::new();

        let err = with_session(mock.clone(), Timing::default(), None, |_| {
            mock.log.borrow_mut().fail_command = Some(0x10);
            Ok(())
        })
        .unwrap_err();

        assert!(matches!(err, SessionError::Display(DisplayError::Transport(_))));
        assert_eq!(mock.log.borrow().close_count, 1);
    }

    #[test]
    fn init_timeout_tears_down() {
        let mock = MockTransport::new();
        mock.log.borrow_mut().stuck_busy = true;
        let timing = Timing {
            busy_timeout: Duration::from_millis(300),
            ..Timing::default()
        };

        let err = match PanelSession::open(mock.clone(), timing, None) {
            Ok(_) => panic!("open should time out"),
            Err(e) => e,
        };

        assert!(matches!(
            err,
            SessionError::Display(DisplayError::DeviceTimeout(_))
        ));
        assert_eq!(mock.log.borrow().close_count, 1);
        assert!(ends_with_sleep(&mock));
    }

    #[test]
    fn close_is_idempotent() {
        let mock = MockTransport::new();
        let mut session = PanelSession::open(mock.clone(), Timing::default(), None).unwrap();

        session.close().unwrap();
        session.close().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(session.clear(), Err(SessionError::Closed)));
        drop(session);

        let log = mock.log.borrow();
        assert_eq!(log.close_count, 1);
        assert_eq!(log.count_command(0x10), 1);
    }

    #[test]
    fn drop_closes_session() {
        let mock = MockTransport::new();
        {
            let _session = PanelSession::open(mock.clone(), Timing::default(), None).unwrap();
        }
        assert_eq!(mock.log.borrow().close_count, 1);
        assert!(ends_with_sleep(&mock));
    }

    #[test]
    fn cancelled_render_still_tears_down() {
        let mock = MockTransport::new();
        let flag = Arc::new(AtomicBool::new(false));
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 300, Rgb([255, 255, 255])));

        let err = with_session(mock.clone(), Timing::default(), Some(flag.clone()), |session| {
            flag.store(true, Ordering::Relaxed);
            session.render(img)
        })
        .unwrap_err();

        assert!(matches!(err, SessionError::Display(DisplayError::Cancelled)));
        assert_eq!(mock.log.borrow().count_command(0x24), 0);
        assert_eq!(mock.log.borrow().close_count, 1);
        assert!(ends_with_sleep(&mock));
    }
}
