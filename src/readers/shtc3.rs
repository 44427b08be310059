//! SHTC3 temperature/humidity sensor on the register bus.
//!
//! Every operation runs under one mutex: the wake/command/read sequence is
//! not interleavable, and the driver owns at most one open bus handle.

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::sleep;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::hal::{is_io_fault, Connector, RegisterBus};
use crate::helpers::checksum::{crc8_word_ok, round2};
use crate::helpers::retry::{retry_with_recovery, Fault, RetryPolicy};

const SHTC3_ADDR: u16 = 0x70;
const CMD_WAKE: u16 = 0x3517;
const CMD_SOFT_RESET: u16 = 0x805D;
// Normal mode, clock stretching disabled
const CMD_READ_T: u16 = 0x7866;
const CMD_READ_RH: u16 = 0x58E0;

/// One reopen on a bus fault, two extra reads on a checksum mismatch
const READ_POLICY: RetryPolicy = RetryPolicy::new(1, 2);

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("bus not open")]
    NotOpen,
    #[error("bus fault: {0}")]
    Bus(#[from] io::Error),
    #[error("checksum mismatch in {what} word {word:02x?}")]
    Checksum { what: &'static str, word: [u8; 3] },
}

fn classify(err: &SensorError) -> Fault {
    match err {
        SensorError::NotOpen => Fault::Transient,
        SensorError::Bus(e) if is_io_fault(e) => Fault::Transient,
        SensorError::Bus(_) => Fault::Fatal,
        SensorError::Checksum { .. } => Fault::Integrity,
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Shtc3Timings {
    pub after_reset: Duration,
    pub after_wake: Duration,
    pub measurement: Duration,
    pub between_reads: Duration,
    /// Minimum spacing between non-forced reopen attempts
    pub min_reinit: Duration,
}

impl Default for Shtc3Timings {
    fn default() -> Self {
        Shtc3Timings {
            after_reset: Duration::from_millis(10),
            after_wake: Duration::from_millis(10),
            measurement: Duration::from_millis(40),
            between_reads: Duration::from_millis(30),
            min_reinit: Duration::from_secs(4),
        }
    }
}

struct BusState<B> {
    bus: Option<B>,
    last_init: Option<Instant>,
}

pub struct Shtc3<C: Connector> {
    connector: C,
    state: Mutex<BusState<C::Handle>>,
    timings: Shtc3Timings,
}

impl<C> Shtc3<C>
where
    C: Connector,
    C::Handle: RegisterBus,
{
    pub fn new(connector: C) -> Self {
        Self::with_timings(connector, Shtc3Timings::default())
    }

    pub fn with_timings(connector: C, timings: Shtc3Timings) -> Self {
        Shtc3 {
            connector,
            state: Mutex::new(BusState {
                bus: None,
                last_init: None,
            }),
            timings,
        }
    }

    /// Open the bus and soft-reset the sensor.
    ///
    /// No-op while the bus is already open, or when the previous attempt was
    /// less than `min_reinit` ago.
    pub fn initialize(&self) -> Result<(), SensorError> {
        let mut state = self.lock();
        self.open_locked(&mut state, false)
    }

    pub fn close(&self) {
        let mut state = self.lock();
        if state.bus.take().is_some() {
            log::debug!("Closed SHTC3 bus {}", self.connector.describe());
        }
    }

    /// Temperature (°C) and relative humidity (%) from a single wake cycle
    pub fn read_pair(&self) -> Result<(f64, f64), SensorError> {
        let mut state = self.lock();
        self.open_locked(&mut state, false)?;
        self.wake(&mut state)?;
        let temperature = self.read_word(&mut state, CMD_READ_T, "temperature")?;
        sleep(self.timings.between_reads);
        let humidity = self.read_word(&mut state, CMD_READ_RH, "humidity")?;
        Ok((temperature_from_raw(temperature), humidity_from_raw(humidity)))
    }

    pub fn read_temperature(&self) -> Result<f64, SensorError> {
        let mut state = self.lock();
        self.open_locked(&mut state, false)?;
        self.wake(&mut state)?;
        self.read_word(&mut state, CMD_READ_T, "temperature")
            .map(temperature_from_raw)
    }

    pub fn read_humidity(&self) -> Result<f64, SensorError> {
        let mut state = self.lock();
        self.open_locked(&mut state, false)?;
        self.wake(&mut state)?;
        self.read_word(&mut state, CMD_READ_RH, "humidity")
            .map(humidity_from_raw)
    }

    fn lock(&self) -> MutexGuard<'_, BusState<C::Handle>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_locked(
        &self,
        state: &mut BusState<C::Handle>,
        force: bool,
    ) -> Result<(), SensorError> {
        if !force {
            if state.bus.is_some() {
                return Ok(());
            }
            if let Some(last) = state.last_init {
                if last.elapsed() < self.timings.min_reinit {
                    return Ok(());
                }
            }
        }

        state.last_init = Some(Instant::now());
        // Drop the old handle before opening a new one
        state.bus = None;

        let mut bus = self.connector.open()?;
        write_cmd(&mut bus, CMD_SOFT_RESET)?;
        sleep(self.timings.after_reset);
        state.bus = Some(bus);
        log::info!("SHTC3 initialised on {}", self.connector.describe());
        Ok(())
    }

    fn wake(&self, state: &mut BusState<C::Handle>) -> Result<(), SensorError> {
        retry_with_recovery(
            state,
            READ_POLICY,
            |st| {
                let bus = st.bus.as_mut().ok_or(SensorError::NotOpen)?;
                write_cmd(bus, CMD_WAKE)?;
                sleep(self.timings.after_wake);
                Ok(())
            },
            classify,
            |st| self.open_locked(st, true),
        )
    }

    fn read_word(
        &self,
        state: &mut BusState<C::Handle>,
        cmd: u16,
        what: &'static str,
    ) -> Result<u16, SensorError> {
        retry_with_recovery(
            state,
            READ_POLICY,
            |st| self.measure_once(st, cmd, what),
            classify,
            |st| {
                self.open_locked(st, true)?;
                let bus = st.bus.as_mut().ok_or(SensorError::NotOpen)?;
                write_cmd(bus, CMD_WAKE)?;
                sleep(self.timings.after_wake);
                Ok(())
            },
        )
    }

    fn measure_once(
        &self,
        state: &mut BusState<C::Handle>,
        cmd: u16,
        what: &'static str,
    ) -> Result<u16, SensorError> {
        let bus = state.bus.as_mut().ok_or(SensorError::NotOpen)?;
        write_cmd(bus, cmd)?;
        sleep(self.timings.measurement);
        let mut word = [0u8; 3];
        bus.read(SHTC3_ADDR, &mut word)?;
        if !crc8_word_ok(&word) {
            return Err(SensorError::Checksum { what, word });
        }
        Ok(u16::from_be_bytes([word[0], word[1]]))
    }
}

fn write_cmd<B: RegisterBus>(bus: &mut B, cmd: u16) -> io::Result<()> {
    bus.write(SHTC3_ADDR, &cmd.to_be_bytes())
}

pub fn temperature_from_raw(raw: u16) -> f64 {
    round2(f64::from(raw) * 175.0 / 65536.0 - 45.0)
}

pub fn humidity_from_raw(raw: u16) -> f64 {
    round2(f64::from(raw) * 100.0 / 65536.0)
}
