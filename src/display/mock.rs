//! Recording transport used by the driver and session tests.

use super::transport::{Level, Pin, Transport, TransportError};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Command(u8),
    Data(Vec<u8>),
    Pin(Pin, Level),
    Delay(u64),
}

#[derive(Debug, Default)]
pub struct MockLog {
    pub events: Vec<Event>,
    /// Busy reads that return HIGH before the line drops
    pub busy_polls: usize,
    /// Busy line never drops
    pub stuck_busy: bool,
    /// Command byte whose transmission fails
    pub fail_command: Option<u8>,
    pub close_count: usize,
}

impl MockLog {
    pub fn commands(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Command(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    pub fn count_command(&self, command: u8) -> usize {
        self.commands().iter().filter(|c| **c == command).count()
    }

    /// Events without pin writes and delays
    pub fn bus_events(&self) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Command(_) | Event::Data(_)))
            .cloned()
            .collect()
    }
}

/// Transport double; clones share one log
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    pub log: Rc<RefCell<MockLog>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for MockTransport {
    fn send_command(&mut self, command: u8) -> Result<(), TransportError> {
        let mut log = self.log.borrow_mut();
        if log.fail_command == Some(command) {
            return Err(TransportError::WriteError(format!(
                "injected failure on 0x{:02X}",
                command
            )));
        }
        log.events.push(Event::Command(command));
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.log.borrow_mut().events.push(Event::Data(data.to_vec()));
        Ok(())
    }

    fn write_pin(&mut self, pin: Pin, level: Level) -> Result<(), TransportError> {
        self.log.borrow_mut().events.push(Event::Pin(pin, level));
        Ok(())
    }

    fn read_pin(&mut self, pin: Pin) -> Result<Level, TransportError> {
        let mut log = self.log.borrow_mut();
        if pin != Pin::Busy {
            return Err(TransportError::NotAnInput(pin));
        }
        if log.stuck_busy {
            return Ok(Level::High);
        }
        if log.busy_polls > 0 {
            log.busy_polls -= 1;
            return Ok(Level::High);
        }
        Ok(Level::Low)
    }

    fn delay_ms(&mut self, ms: u64) {
        self.log.borrow_mut().events.push(Event::Delay(ms));
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.log.borrow_mut().close_count += 1;
        Ok(())
    }
}
