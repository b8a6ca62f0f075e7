//! Session with the panda device.
//!
//! The link opens a socket and sends the handshake, keeps the session alive
//! by repeating it, answers device challenges with the subscription and hands
//! decoded frames to the caller. Any decoded datagram, frames or just a
//! challenge, counts as a sign of life. Silence and transport errors lead to
//! a reconnect; too many reconnects in a row without an answer lead to a long
//! cooldown, giving the device time to drop its side of the session.

use crate::clock::Clock;
use crate::transport::{Connector, HANDSHAKE, Transport};
use derive_setters::Setters;
use log::{debug, error, info, warn};
use pandump::Frame;
use pandump::codec::{self, Record};
use pandump::stats::Stats;
use pandump::subscription::{SUBSCRIBE_COMMAND, SubscriptionSet};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

const RECV_BUFFER_LEN: usize = 65536;

#[derive(Debug, Clone, PartialEq, Eq, Setters)]
pub struct LinkConfig {
    /// Minimum spacing of handshake resends
    pub keepalive: Duration,
    /// Sleep between polls while nothing is pending
    pub poll_interval: Duration,
    /// Silence tolerated before reconnecting
    pub timeout: Duration,
    /// Consecutive failures before cooling down
    pub max_failures: u32,
    pub cooldown: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(1),
            poll_interval: Duration::from_millis(110),
            timeout: Duration::from_secs(5),
            max_failures: 5,
            cooldown: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("cannot open socket to {peer}: {source}")]
    Open { peer: String, source: io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// no socket
    Disconnected,
    /// handshake sent, no frame yet
    Connecting,
    /// frames flowing
    Active,
}

/// Mutable session state. Times are monotonic, taken from the link's clock.
#[derive(Debug)]
pub struct LinkState<T> {
    transport: Option<T>,
    connected_at: Duration,
    last_send: Option<Duration>,
    last_recv: Option<Duration>,
    last_alive: Option<Duration>,
    failures: u32,
}

impl<T> LinkState<T> {
    fn disconnected(now: Duration, failures: u32) -> Self {
        Self {
            transport: None,
            connected_at: now,
            last_send: None,
            last_recv: None,
            last_alive: None,
            failures,
        }
    }

    fn session(transport: T, now: Duration, failures: u32) -> Self {
        Self {
            transport: Some(transport),
            ..Self::disconnected(now, failures)
        }
    }

    pub fn phase(&self) -> Phase {
        match (&self.transport, self.last_recv) {
            (None, _) => Phase::Disconnected,
            (Some(_), None) => Phase::Connecting,
            (Some(_), Some(_)) => Phase::Active,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn connected_at(&self) -> Duration {
        self.connected_at
    }

    pub fn last_send(&self) -> Option<Duration> {
        self.last_send
    }

    /// Time of the last frame
    pub fn last_recv(&self) -> Option<Duration> {
        self.last_recv
    }

    /// Time of the last decoded datagram, with or without frames
    pub fn last_alive(&self) -> Option<Duration> {
        self.last_alive
    }
}

enum Received {
    Idle,
    Dropped,
    Frames(Vec<Frame>),
    Failed(io::Error),
}

pub struct DeviceLink<C: Connector, K: Clock> {
    connector: C,
    clock: K,
    config: LinkConfig,
    subscription: SubscriptionSet,
    state: LinkState<C::Transport>,
    stats: Stats,
    shutdown: Arc<AtomicBool>,
    reconnects: u64,
    open_errors: u64,
    buf: Vec<u8>,
}

impl<C: Connector, K: Clock> DeviceLink<C, K> {
    /// Open the first session. Failing to open a socket at all is fatal.
    pub fn connect(
        mut connector: C,
        clock: K,
        config: LinkConfig,
        subscription: SubscriptionSet,
    ) -> Result<Self, LinkError> {
        let transport = connector.open().map_err(|e| LinkError::Open {
            peer: connector.peer(),
            source: e,
        })?;

        let now = clock.elapsed();
        let mut link = Self {
            connector,
            clock,
            config,
            subscription,
            state: LinkState::disconnected(now, 0),
            stats: Stats::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            reconnects: 0,
            open_errors: 0,
            buf: vec![0u8; RECV_BUFFER_LEN],
        };
        link.start_session(transport);
        Ok(link)
    }

    /// Share a flag that, once raised, makes waiting return `None`
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn state(&self) -> &LinkState<C::Transport> {
        &self.state
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn subscription(&self) -> &SubscriptionSet {
        &self.subscription
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    fn stopped(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Block until a datagram is decoded and return its frames in wire
    /// order. The batch may be empty when the datagram held only padding or
    /// challenges. Returns `None` once shutdown is requested.
    pub fn wait_for_message(&mut self) -> Option<Vec<Frame>> {
        while !self.stopped() {
            if let Some(frames) = self.poll() {
                return Some(frames);
            }
        }
        None
    }

    /// Run one cycle: receive, then service keepalive and timeouts
    pub fn poll(&mut self) -> Option<Vec<Frame>> {
        if self.state.transport.is_none() {
            self.reconnect();
        }

        match self.receive() {
            Received::Frames(frames) => return Some(frames),
            Received::Idle => self.clock.sleep(self.config.poll_interval),
            Received::Dropped => {}
            Received::Failed(e) => {
                warn!("Error receiving data: {e}");
                self.fail();
            }
        }

        self.keepalive();
        self.check_timeouts();
        None
    }

    pub fn close(&mut self) {
        if self.state.transport.take().is_some() {
            info!("Closed connection to {}", self.connector.peer());
        }
    }

    fn start_session(&mut self, transport: C::Transport) {
        let now = self.clock.elapsed();
        self.state = LinkState::session(transport, now, self.state.failures);
        info!("Connecting to {}", self.connector.peer());
        // a failed handshake is retried by the next keepalive
        if let Err(e) = self.send(HANDSHAKE) {
            warn!("Error sending handshake: {e}");
        }
    }

    fn reconnect(&mut self) {
        // the old socket goes before the new one opens
        self.state.transport = None;
        self.reconnects += 1;
        match self.connector.open() {
            Ok(transport) => {
                self.open_errors = 0;
                self.start_session(transport);
            }
            Err(e) => {
                let peer = self.connector.peer();
                if self.open_errors == 0 {
                    error!("Cannot open socket to {peer}: {e}");
                } else {
                    debug!("Still cannot open socket to {peer}: {e}");
                }
                self.open_errors += 1;
            }
        }
    }

    /// Count a failed attempt and either reconnect or, when too many failed
    /// in a row, cool down
    fn fail(&mut self) {
        self.state.failures += 1;
        debug!(
            "Connection failure {} of {}",
            self.state.failures, self.config.max_failures
        );
        if self.state.failures >= self.config.max_failures {
            self.cool_down();
        } else {
            self.reconnect();
        }
    }

    fn cool_down(&mut self) {
        error!(
            "Tried connecting {} times but did not get any response. \
             The device may still hold the previous session; sleeping for {}s",
            self.state.failures,
            self.config.cooldown.as_secs()
        );
        self.close();

        let until = self.clock.elapsed() + self.config.cooldown;
        while !self.stopped() {
            let now = self.clock.elapsed();
            if now >= until {
                break;
            }
            self.clock.sleep((until - now).min(self.config.poll_interval));
        }
        self.state = LinkState::disconnected(self.clock.elapsed(), 0);
    }

    fn keepalive(&mut self) {
        if self.state.transport.is_none() {
            return;
        }
        let now = self.clock.elapsed();
        let due = self
            .state
            .last_send
            .is_none_or(|t| now.saturating_sub(t) >= self.config.keepalive);
        if due {
            if let Err(e) = self.send(HANDSHAKE) {
                warn!("Error sending keepalive: {e}");
                self.fail();
            }
        }
    }

    fn check_timeouts(&mut self) {
        let now = self.clock.elapsed();
        let timeout = self.config.timeout;
        match self.state.last_alive {
            None if now.saturating_sub(self.state.connected_at) > timeout => {
                warn!(
                    "Connection timed out. No data received within {}s of \
                     sending handshake. Trying again...",
                    timeout.as_secs()
                );
                self.fail();
            }
            Some(last) if now.saturating_sub(last) > timeout => {
                warn!(
                    "Connection broke. No data received within last {}s. \
                     Reconnecting...",
                    timeout.as_secs()
                );
                self.fail();
            }
            _ => {}
        }
    }

    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        let transport = self.state.transport.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "no socket")
        })?;
        transport.send(datagram)?;
        self.state.last_send = Some(self.clock.elapsed());
        Ok(())
    }

    fn subscribe(&mut self) -> io::Result<()> {
        let mut packets = self.subscription.packets();
        if packets.is_empty() {
            warn!("No CAN ids to subscribe to, sending default subscription");
            packets.push(vec![SUBSCRIBE_COMMAND]);
        }
        for packet in packets.iter() {
            self.send(packet)?;
        }
        info!(
            "Subscribed to {} CAN IDs in {} packets",
            self.subscription.len(),
            packets.len()
        );
        Ok(())
    }

    fn receive(&mut self) -> Received {
        let Some(transport) = self.state.transport.as_mut() else {
            return Received::Idle;
        };
        let len = match transport.recv(&mut self.buf) {
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Received::Idle;
            }
            Err(e) => return Received::Failed(e),
        };

        let time = self.clock.now();
        let records = match codec::decode_datagram(&self.buf[..len], time) {
            Ok(records) => records,
            Err(e) => {
                error!("Dropping datagram: {e}");
                return Received::Dropped;
            }
        };

        let mut frames = Vec::with_capacity(records.len());
        let mut challenged = false;
        for record in records {
            match record {
                Record::Frame(frame) => frames.push(frame),
                Record::Padding => {}
                Record::Ack => challenged = true,
                Record::BadLength { bus, id, len } => warn!(
                    "Invalid frame length {len}: bus {bus:#x}, id {id:#05x}"
                ),
            }
        }

        let now = self.clock.elapsed();
        self.state.last_alive = Some(now);
        self.state.failures = 0;

        if let Some(first) = frames.first() {
            if self.state.last_recv.is_none() {
                info!(
                    "Received first CAN frame at unix time {}: bus {:#x}, \
                     id {:#05x}, {} bytes, data {}",
                    first.unix_string(),
                    first.bus,
                    first.id,
                    first.bytes.len(),
                    first.data_string()
                );
            }
            self.state.last_recv = Some(now);
        }

        for frame in frames.iter() {
            self.stats.process_frame(frame);
        }
        if let Some(report) = self.stats.periodic(time) {
            info!("{report}");
        }

        if challenged {
            info!("Received device ACK, responding with subscription");
            if let Err(e) = self.subscribe() {
                warn!("Error sending subscription: {e}");
                self.fail();
            }
        }

        Received::Frames(frames)
    }
}
