//! In-memory device and clock for exercising the link without sockets or
//! real time

use crate::clock::Clock;
use crate::transport::{Connector, Transport};
use chrono::{DateTime, Local, TimeZone};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Clone)]
pub struct ManualClock {
    start: DateTime<Local>,
    offset: Rc<Cell<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            start: Local.with_ymd_and_hms(2025, 1, 30, 10, 7, 0).unwrap(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        self.start + chrono::Duration::from_std(self.offset.get()).unwrap()
    }

    fn elapsed(&self) -> Duration {
        self.offset.get()
    }

    fn sleep(&self, duration: Duration) {
        self.offset.set(self.offset.get() + duration);
    }
}

pub enum Event {
    Datagram(Vec<u8>),
    Error(io::ErrorKind),
}

#[derive(Default)]
struct Device {
    opened: usize,
    fail_open: bool,
    fail_send: bool,
    sent: Vec<(usize, Vec<u8>)>,
    inbox: VecDeque<Event>,
    stop_when_drained: Option<Arc<AtomicBool>>,
}

/// Hands out transports that all talk to one scripted device. Each recv
/// takes the next scripted event; an empty script reads as "would block".
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    device: Rc<RefCell<Device>>,
}

impl ScriptedConnector {
    pub fn push(&self, event: Event) {
        self.device.borrow_mut().inbox.push_back(event);
    }

    pub fn fail_open(&self, fail: bool) {
        self.device.borrow_mut().fail_open = fail;
    }

    /// Make every send fail with a broken pipe. Failed sends are not
    /// recorded.
    pub fn fail_send(&self, fail: bool) {
        self.device.borrow_mut().fail_send = fail;
    }

    /// Raise `flag` once every scripted event has been read
    pub fn stop_when_drained(&self, flag: Arc<AtomicBool>) {
        self.device.borrow_mut().stop_when_drained = Some(flag);
    }

    pub fn opened(&self) -> usize {
        self.device.borrow().opened
    }

    /// Datagrams sent so far, tagged with the session (1-based) they used
    pub fn sent(&self) -> Vec<(usize, Vec<u8>)> {
        self.device.borrow().sent.clone()
    }
}

impl Connector for ScriptedConnector {
    type Transport = ScriptedTransport;

    fn open(&mut self) -> io::Result<ScriptedTransport> {
        let mut device = self.device.borrow_mut();
        if device.fail_open {
            return Err(io::Error::from(io::ErrorKind::AddrInUse));
        }
        device.opened += 1;
        Ok(ScriptedTransport {
            device: Rc::clone(&self.device),
            session: device.opened,
        })
    }

    fn peer(&self) -> String {
        "scripted device".to_string()
    }
}

pub struct ScriptedTransport {
    device: Rc<RefCell<Device>>,
    session: usize,
}

impl Transport for ScriptedTransport {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        let mut device = self.device.borrow_mut();
        if device.fail_send {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        device.sent.push((self.session, datagram.to_vec()));
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut device = self.device.borrow_mut();
        match device.inbox.pop_front() {
            Some(Event::Datagram(data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            Some(Event::Error(kind)) => Err(io::Error::from(kind)),
            None => {
                if let Some(flag) = device.stop_when_drained.as_ref() {
                    flag.store(true, Ordering::SeqCst);
                }
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            }
        }
    }
}
