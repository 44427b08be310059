//! SIM7000 cellular/GNSS modem spoken to with AT commands over a serial port.
//!
//! Each command is written with a CRLF terminator, then the session waits a
//! fixed response window and collects whatever the modem sent back.

use std::io;
use std::thread::sleep;
use std::time::Duration;

use thiserror::Error;

use crate::data_mgmt::models::Fix;
use crate::hal::{is_io_fault, Connector, SerialLink};
use crate::helpers::retry::{retry_with_recovery, Fault, RetryPolicy};

pub mod parse;

const LINE_END: &str = "\r\n";
const RX_CAP: usize = 8192;
const RX_KEEP: usize = 4096;
const MAX_DRAIN_READS: usize = 64;

/// Reopen once after an I/O fault, no plain retries
const FIX_POLICY: RetryPolicy = RetryPolicy::new(1, 0);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GnssProfile {
    /// `AT+CGNSINF` with decimal coordinates
    Cgns,
    /// `AT+CGPSINFO?` with NMEA style coordinates
    Cgps,
}

impl GnssProfile {
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("CGNS") {
            GnssProfile::Cgns
        } else {
            GnssProfile::Cgps
        }
    }

    fn fix_query(&self) -> &'static str {
        match self {
            GnssProfile::Cgns => "AT+CGNSINF",
            GnssProfile::Cgps => "AT+CGPSINFO?",
        }
    }

    fn parse_fix(&self, response: &str) -> Option<Fix> {
        match self {
            GnssProfile::Cgns => parse::parse_cgnsinf(response),
            GnssProfile::Cgps => parse::parse_cgpsinfo(response),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Ready,
}

#[derive(Error, Debug)]
pub enum ModemError {
    #[error("modem session is not open")]
    NotOpen,
    #[error("could not open modem port: {0}")]
    Open(#[source] io::Error),
    #[error("modem I/O fault: {0}")]
    Io(#[from] io::Error),
}

fn classify(err: &ModemError) -> Fault {
    match err {
        ModemError::Io(e) if is_io_fault(e) => Fault::Transient,
        _ => Fault::Fatal,
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ModemTimings {
    /// Line settle time after opening the port
    pub settle: Duration,
    pub command: Duration,
    pub power: Duration,
    pub query: Duration,
}

impl Default for ModemTimings {
    fn default() -> Self {
        ModemTimings {
            settle: Duration::from_millis(300),
            command: Duration::from_millis(600),
            power: Duration::from_millis(1200),
            query: Duration::from_millis(900),
        }
    }
}

pub struct ModemSession<C: Connector> {
    connector: C,
    profile: GnssProfile,
    gnss_power_on: bool,
    timings: ModemTimings,
    link: Option<C::Handle>,
    state: SessionState,
    rx: Vec<u8>,
}

impl<C> ModemSession<C>
where
    C: Connector,
    C::Handle: SerialLink,
{
    pub fn new(connector: C, profile: GnssProfile, gnss_power_on: bool) -> Self {
        ModemSession {
            connector,
            profile,
            gnss_power_on,
            timings: ModemTimings::default(),
            link: None,
            state: SessionState::Closed,
            rx: Vec::new(),
        }
    }

    pub fn with_timings(mut self, timings: ModemTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Open the port and run the command preamble and GNSS power sequence
    pub fn initialize(&mut self) -> Result<(), ModemError> {
        self.close();
        self.state = SessionState::Opening;
        let link = match self.connector.open() {
            Ok(link) => link,
            Err(e) => {
                self.state = SessionState::Closed;
                return Err(ModemError::Open(e));
            }
        };
        self.link = Some(link);

        if let Err(e) = self.run_preamble() {
            self.close();
            return Err(e);
        }
        self.state = SessionState::Ready;
        log::info!(
            "SIM7000 ready on {} (profile {:?})",
            self.connector.describe(),
            self.profile
        );
        Ok(())
    }

    pub fn close(&mut self) {
        if self.link.take().is_some() {
            log::debug!("Closed modem port {}", self.connector.describe());
        }
        self.rx.clear();
        self.state = SessionState::Closed;
    }

    /// Query the GNSS engine. `Ok(None)` means the modem has no fix yet.
    ///
    /// An I/O fault closes and reopens the session and retries exactly once.
    pub fn acquire_fix(&mut self) -> Result<Option<Fix>, ModemError> {
        retry_with_recovery(
            self,
            FIX_POLICY,
            |s| s.query_fix(),
            classify,
            |s| {
                log::warn!("Reopening modem session after I/O fault");
                s.initialize()
            },
        )
    }

    fn query_fix(&mut self) -> Result<Option<Fix>, ModemError> {
        if !self.is_open() {
            return Err(ModemError::NotOpen);
        }
        let response = self.command(self.profile.fix_query(), self.timings.query)?;
        let fix = self.profile.parse_fix(&response);
        if fix.is_none() {
            log::debug!("No GNSS fix yet");
        }
        Ok(fix)
    }

    fn run_preamble(&mut self) -> Result<(), ModemError> {
        sleep(self.timings.settle);
        // Discard boot chatter (RDY, +CPIN: READY, ...)
        self.collect_pending()?;
        self.rx.clear();

        self.command("AT", self.timings.command)?;
        self.command("ATE0", self.timings.command)?;

        if !self.gnss_power_on {
            return Ok(());
        }
        match self.profile {
            GnssProfile::Cgns => {
                let power = self.command("AT+CGNSPWR?", self.timings.command)?;
                if !parse::power_reported_on(&power) {
                    self.command("AT+CGNSPWR=1", self.timings.power)?;
                }
                self.command("AT+CGNSSEQ=\"RMC\"", self.timings.command)?;
            }
            GnssProfile::Cgps => {
                self.command("AT+CGPSPWR=1", self.timings.power)?;
            }
        }
        Ok(())
    }

    fn command(&mut self, cmd: &str, wait: Duration) -> Result<String, ModemError> {
        let link = self.link.as_mut().ok_or(ModemError::NotOpen)?;
        log::debug!("> {cmd}");
        link.write_all(format!("{cmd}{LINE_END}").as_bytes())?;
        sleep(wait);
        self.collect_pending()?;
        let response = String::from_utf8_lossy(&self.rx).into_owned();
        self.rx.clear();
        log::debug!("< {}", response.trim());
        Ok(response)
    }

    fn collect_pending(&mut self) -> Result<(), ModemError> {
        let link = self.link.as_mut().ok_or(ModemError::NotOpen)?;
        for _ in 0..MAX_DRAIN_READS {
            if link.read_pending(&mut self.rx)? == 0 {
                break;
            }
            if self.rx.len() > RX_CAP {
                let excess = self.rx.len() - RX_KEEP;
                self.rx.drain(..excess);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    const EIO: i32 = 5;
    pub const CGNSINF_FIX: &str =
        "\r\n+CGNSINF: 1,1,20240101120000.000,-33.447500,-70.673600,540.2,0.00,0.0,1,,0.9,1.2,0.8,,10,7,,,38,,\r\n\r\nOK\r\n";

    #[derive(Default)]
    pub struct ModemLog {
        pub opens: usize,
        pub open_attempts: usize,
        pub fail_open: bool,
        pub commands: Vec<String>,
        pub power_on: bool,
        pub fix_response: String,
        pub failing_queries: usize,
        pub boot_noise: String,
        pending: VecDeque<u8>,
    }

    impl ModemLog {
        pub fn queries(&self) -> usize {
            self.commands
                .iter()
                .filter(|c| c.starts_with("AT+CGNSINF") || c.starts_with("AT+CGPSINFO"))
                .count()
        }
    }

    #[derive(Clone, Default)]
    pub struct FakeModem(pub Arc<Mutex<ModemLog>>);

    pub struct FakeModemLink(Arc<Mutex<ModemLog>>);

    impl FakeModem {
        pub fn with_fix(response: &str) -> Self {
            let fake = FakeModem::default();
            fake.0.lock().unwrap().fix_response = response.to_string();
            fake
        }
    }

    impl Connector for FakeModem {
        type Handle = FakeModemLink;

        fn open(&self) -> io::Result<FakeModemLink> {
            let mut log = self.0.lock().unwrap();
            log.open_attempts += 1;
            if log.fail_open {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such port"));
            }
            log.opens += 1;
            let noise = log.boot_noise.clone();
            log.pending.extend(noise.bytes());
            Ok(FakeModemLink(self.0.clone()))
        }

        fn describe(&self) -> String {
            "fake-modem".into()
        }
    }

    impl SerialLink for FakeModemLink {
        fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
            let mut log = self.0.lock().unwrap();
            let cmd = String::from_utf8_lossy(data).trim_end().to_string();
            log.commands.push(cmd.clone());
            let reply = match cmd.as_str() {
                "AT+CGNSINF" | "AT+CGPSINFO?" => {
                    if log.failing_queries > 0 {
                        log.failing_queries -= 1;
                        return Err(io::Error::from_raw_os_error(EIO));
                    }
                    log.fix_response.clone()
                }
                "AT+CGNSPWR?" if log.power_on => "\r\n+CGNSPWR: 1\r\n\r\nOK\r\n".into(),
                "AT+CGNSPWR?" => "\r\n+CGNSPWR: 0\r\n\r\nOK\r\n".into(),
                "AT+CGNSPWR=1" => {
                    log.power_on = true;
                    "\r\nOK\r\n".into()
                }
                _ => "\r\nOK\r\n".into(),
            };
            log.pending.extend(reply.bytes());
            Ok(())
        }

        fn read_pending(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
            let mut log = self.0.lock().unwrap();
            let n = log.pending.len();
            buf.extend(log.pending.drain(..));
            Ok(n)
        }
    }

    pub fn instant_timings() -> ModemTimings {
        ModemTimings {
            settle: Duration::ZERO,
            command: Duration::ZERO,
            power: Duration::ZERO,
            query: Duration::ZERO,
        }
    }

    fn session(fake: &FakeModem, profile: GnssProfile) -> ModemSession<FakeModem> {
        ModemSession::new(fake.clone(), profile, true).with_timings(instant_timings())
    }

    #[test]
    fn cgns_preamble_powers_gnss_when_off() {
        let fake = FakeModem::default();
        let mut modem = session(&fake, GnssProfile::Cgns);
        modem.initialize().unwrap();

        assert!(modem.is_open());
        assert_eq!(
            fake.0.lock().unwrap().commands,
            vec!["AT", "ATE0", "AT+CGNSPWR?", "AT+CGNSPWR=1", "AT+CGNSSEQ=\"RMC\""]
        );
    }

    #[test]
    fn cgns_preamble_skips_power_when_already_on() {
        let fake = FakeModem::default();
        fake.0.lock().unwrap().power_on = true;
        let mut modem = session(&fake, GnssProfile::Cgns);
        modem.initialize().unwrap();

        assert_eq!(
            fake.0.lock().unwrap().commands,
            vec!["AT", "ATE0", "AT+CGNSPWR?", "AT+CGNSSEQ=\"RMC\""]
        );
    }

    #[test]
    fn cgps_profile() {
        let fake = FakeModem::with_fix(
            "\r\n+CGPSINFO: 3326.85,S,07040.42,W,010124,120000.0,540.2,0.0,0.0\r\nOK\r\n",
        );
        let mut modem = session(&fake, GnssProfile::Cgps);
        modem.initialize().unwrap();
        let fix = modem.acquire_fix().unwrap().unwrap();

        assert!((fix.lat + 33.4475).abs() < 1e-4);
        assert!((fix.lng + 70.6737).abs() < 1e-4);
        assert_eq!(
            fake.0.lock().unwrap().commands,
            vec!["AT", "ATE0", "AT+CGPSPWR=1", "AT+CGPSINFO?"]
        );
    }

    #[test]
    fn power_sequence_can_be_disabled() {
        let fake = FakeModem::default();
        let mut modem = ModemSession::new(fake.clone(), GnssProfile::Cgns, false)
            .with_timings(instant_timings());
        modem.initialize().unwrap();
        assert_eq!(fake.0.lock().unwrap().commands, vec!["AT", "ATE0"]);
    }

    #[test]
    fn boot_noise_does_not_leak_into_responses() {
        let fake = FakeModem::default();
        fake.0.lock().unwrap().boot_noise = "\r\nRDY\r\n+CGNSPWR: 1\r\n".into();
        let mut modem = session(&fake, GnssProfile::Cgns);
        modem.initialize().unwrap();
        // Had the noise leaked into the CGNSPWR? reply, power-on would have been skipped
        assert!(fake
            .0
            .lock()
            .unwrap()
            .commands
            .contains(&"AT+CGNSPWR=1".to_string()));
    }

    #[test]
    fn acquire_fix_parses_profile_a() {
        let fake = FakeModem::with_fix(CGNSINF_FIX);
        let mut modem = session(&fake, GnssProfile::Cgns);
        modem.initialize().unwrap();

        let fix = modem.acquire_fix().unwrap().unwrap();
        assert_eq!(fix.lat, -33.4475);
        assert_eq!(fix.lng, -70.6736);
        assert!((fix.accuracy - 4.5).abs() < 1e-9);
    }

    #[test]
    fn no_fix_is_not_an_error() {
        let fake = FakeModem::with_fix("\r\n+CGNSINF: 1,0,,,,,,,,,,,,,,,,,,,\r\n\r\nOK\r\n");
        let mut modem = session(&fake, GnssProfile::Cgns);
        modem.initialize().unwrap();
        assert_eq!(modem.acquire_fix().unwrap(), None);
    }

    #[test]
    fn io_fault_reopens_once_and_retries() {
        let fake = FakeModem::with_fix(CGNSINF_FIX);
        let mut modem = session(&fake, GnssProfile::Cgns);
        modem.initialize().unwrap();
        fake.0.lock().unwrap().failing_queries = 1;

        assert!(modem.acquire_fix().unwrap().is_some());
        let log = fake.0.lock().unwrap();
        assert_eq!(log.opens, 2);
        assert_eq!(log.queries(), 2);
    }

    #[test]
    fn second_consecutive_fault_surfaces() {
        let fake = FakeModem::with_fix(CGNSINF_FIX);
        let mut modem = session(&fake, GnssProfile::Cgns);
        modem.initialize().unwrap();
        fake.0.lock().unwrap().failing_queries = 2;

        assert!(matches!(modem.acquire_fix(), Err(ModemError::Io(_))));
        let log = fake.0.lock().unwrap();
        assert_eq!(log.opens, 2);
        assert_eq!(log.queries(), 2);
    }

    #[test]
    fn failed_reopen_leaves_session_closed() {
        let fake = FakeModem::with_fix(CGNSINF_FIX);
        let mut modem = session(&fake, GnssProfile::Cgns);
        modem.initialize().unwrap();
        {
            let mut log = fake.0.lock().unwrap();
            log.failing_queries = 1;
            log.fail_open = true;
        }

        assert!(matches!(modem.acquire_fix(), Err(ModemError::Open(_))));
        assert_eq!(modem.state(), SessionState::Closed);
    }

    #[test]
    fn closed_session_reports_not_open() {
        let mut modem = session(&FakeModem::default(), GnssProfile::Cgns);
        assert!(matches!(modem.acquire_fix(), Err(ModemError::NotOpen)));
    }

    #[test]
    fn profile_names() {
        assert_eq!(GnssProfile::from_name("cgns"), GnssProfile::Cgns);
        assert_eq!(GnssProfile::from_name("CGPS"), GnssProfile::Cgps);
        assert_eq!(GnssProfile::from_name("anything"), GnssProfile::Cgps);
    }
}
