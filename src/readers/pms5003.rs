//! PMS5003 particulate sensor over a serial stream.
//!
//! A background thread appends incoming bytes to a bounded ring; reads pick
//! the newest complete 32-byte frame out of it.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::hal::{Connector, SerialLink};
use crate::helpers::retry::{retry_with_recovery, Fault, RetryPolicy};

pub const FRAME_HEADER: [u8; 2] = [0x42, 0x4D];
pub const FRAME_LEN: usize = 32;
const PM25_OFFSET: usize = 10;
const PM10_OFFSET: usize = 12;

const RING_CAPACITY: usize = 256;
const IDLE_PAUSE: Duration = Duration::from_millis(10);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame not yet available")]
    NotAvailable,
    #[error("serial port not open")]
    NotOpen,
    #[error("could not open serial port: {0}")]
    Open(#[from] io::Error),
    #[error("serial link fault: {0}")]
    LinkFault(String),
}

fn classify(err: &FrameError) -> Fault {
    match err {
        FrameError::NotAvailable => Fault::Integrity,
        FrameError::NotOpen | FrameError::LinkFault(_) => Fault::Transient,
        FrameError::Open(_) => Fault::Fatal,
    }
}

/// PM2.5 and PM10 concentrations (atmospheric environment, µg/m³)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PmReading {
    pub pm25: u16,
    pub pm10: u16,
}

/// Byte ring keeping only the most recent `capacity` bytes
#[derive(Debug)]
pub struct FrameRing {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl FrameRing {
    pub fn new(capacity: usize) -> Self {
        FrameRing {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.bytes.extend(data);
        let excess = self.bytes.len().saturating_sub(self.capacity);
        self.bytes.drain(..excess);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn latest_frame(&mut self) -> Option<PmReading> {
        parse_latest_frame(self.bytes.make_contiguous())
    }
}

/// Extract the newest complete frame from `buf`
pub fn parse_latest_frame(buf: &[u8]) -> Option<PmReading> {
    if buf.len() < FRAME_LEN {
        return None;
    }
    let start = (0..=buf.len() - FRAME_LEN)
        .rev()
        .find(|&i| buf[i..i + 2] == FRAME_HEADER)?;
    let frame = &buf[start..start + FRAME_LEN];
    Some(PmReading {
        pm25: u16::from_be_bytes([frame[PM25_OFFSET], frame[PM25_OFFSET + 1]]),
        pm10: u16::from_be_bytes([frame[PM10_OFFSET], frame[PM10_OFFSET + 1]]),
    })
}

struct Shared {
    ring: Mutex<FrameRing>,
    fault: Mutex<Option<String>>,
}

impl Shared {
    fn push(&self, data: &[u8]) {
        self.ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(data);
    }

    /// Forget everything received on a previous link
    fn reset(&self) {
        self.ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.set_fault(None);
    }

    fn set_fault(&self, fault: Option<String>) {
        *self.fault.lock().unwrap_or_else(PoisonError::into_inner) = fault;
    }

    fn fault(&self) -> Option<String> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct Reader {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl Reader {
    fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.thread.join().is_err() {
            log::error!("PMS5003 reader thread panicked");
        }
    }
}

pub struct Pms5003<C: Connector> {
    connector: C,
    shared: Arc<Shared>,
    reader: Option<Reader>,
    poll_interval: Duration,
}

impl<C> Pms5003<C>
where
    C: Connector,
    C::Handle: SerialLink + 'static,
{
    pub fn new(connector: C) -> Self {
        Pms5003 {
            connector,
            shared: Arc::new(Shared {
                ring: Mutex::new(FrameRing::new(RING_CAPACITY)),
                fault: Mutex::new(None),
            }),
            reader: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Open the port and start accumulating bytes. Reopens if already running.
    pub fn initialize(&mut self) -> Result<(), FrameError> {
        if let Some(reader) = self.reader.take() {
            reader.shutdown();
        }
        self.shared.reset();
        let mut link = self.connector.open()?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = stop.clone();
            let shared = self.shared.clone();
            let label = self.connector.describe();
            thread::Builder::new()
                .name("pms5003-rx".into())
                .spawn(move || {
                    let mut chunk = Vec::with_capacity(FRAME_LEN * 2);
                    while !stop.load(Ordering::Relaxed) {
                        chunk.clear();
                        match link.read_pending(&mut chunk) {
                            Ok(0) => thread::sleep(IDLE_PAUSE),
                            Ok(_) => shared.push(&chunk),
                            Err(e) => {
                                log::error!("PMS5003 serial error on {label}: {e}");
                                shared.set_fault(Some(e.to_string()));
                                break;
                            }
                        }
                    }
                })?
        };
        self.reader = Some(Reader { stop, thread });
        log::info!("PMS5003 initialised on {}", self.connector.describe());
        Ok(())
    }

    /// Newest complete frame, or [`FrameError::NotAvailable`] if none has
    /// been assembled yet. Expected right after start-up.
    pub fn read(&self) -> Result<PmReading, FrameError> {
        if self.reader.is_none() {
            return Err(FrameError::NotOpen);
        }
        if let Some(fault) = self.shared.fault() {
            return Err(FrameError::LinkFault(fault));
        }
        self.shared
            .ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latest_frame()
            .ok_or(FrameError::NotAvailable)
    }

    /// Poll [`Self::read`] until a frame shows up or `budget` is spent.
    ///
    /// A dead reader thread gets the port reopened once.
    pub fn read_within(&mut self, budget: Duration) -> Result<PmReading, FrameError> {
        let polls = budget.as_millis() / self.poll_interval.as_millis().max(1);
        let policy = RetryPolicy::new(1, u32::try_from(polls).unwrap_or(u32::MAX))
            .with_pause(self.poll_interval);
        retry_with_recovery(self, policy, |d| d.read(), classify, |d| d.initialize())
    }

    #[cfg(test)]
    fn feed(&self, data: &[u8]) {
        self.shared.push(data);
    }
}

impl<C: Connector> Drop for Pms5003<C> {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.shutdown();
        }
    }
}
