use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::{Connector, SerialLink};

const READ_CHUNK: usize = 256;
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct SerialSettings {
    pub path: String,
    pub baud: u32,
    pub read_timeout: Duration,
}

impl SerialSettings {
    pub fn new(path: impl Into<String>, baud: u32) -> Self {
        SerialSettings {
            path: path.into(),
            baud,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Opens a serial port at 8N1 without flow control.
#[derive(Clone, Debug)]
pub struct SerialConnector {
    settings: SerialSettings,
}

impl SerialConnector {
    pub fn new(settings: SerialSettings) -> Self {
        SerialConnector { settings }
    }
}

pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
}

impl Connector for SerialConnector {
    type Handle = SerialPortLink;

    fn open(&self) -> io::Result<SerialPortLink> {
        let port = serialport::new(&self.settings.path, self.settings.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.settings.read_timeout)
            .open()?;
        log::debug!(
            "Opened serial port {} at {} baud",
            self.settings.path,
            self.settings.baud
        );
        Ok(SerialPortLink { port })
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.settings.path, self.settings.baud)
    }
}

impl SerialLink for SerialPortLink {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn read_pending(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        match self.port.read(&mut chunk) {
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
}
