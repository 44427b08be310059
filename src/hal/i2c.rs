use std::io;

use super::Connector;

/// Linux I2C bus, e.g. `/dev/i2c-1`.
#[derive(Clone, Debug)]
pub struct I2cConnector {
    bus: u8,
}

impl I2cConnector {
    pub fn new(bus: u8) -> Self {
        I2cConnector { bus }
    }
}

#[cfg(feature = "hardware")]
mod backend {
    use std::io;

    use rppal::i2c::{Error, I2c};

    use crate::hal::RegisterBus;

    pub struct RppalBus {
        i2c: I2c,
        addr: Option<u16>,
    }

    fn to_io(err: Error) -> io::Error {
        match err {
            Error::Io(e) => e,
            other => io::Error::other(other.to_string()),
        }
    }

    pub fn open(bus: u8) -> io::Result<RppalBus> {
        let i2c = I2c::with_bus(bus).map_err(to_io)?;
        Ok(RppalBus { i2c, addr: None })
    }

    impl RppalBus {
        fn select(&mut self, addr: u16) -> io::Result<()> {
            if self.addr != Some(addr) {
                self.i2c.set_slave_address(addr).map_err(to_io)?;
                self.addr = Some(addr);
            }
            Ok(())
        }
    }

    impl RegisterBus for RppalBus {
        fn write(&mut self, addr: u16, data: &[u8]) -> io::Result<()> {
            self.select(addr)?;
            let written = self.i2c.write(data).map_err(to_io)?;
            if written != data.len() {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short i2c write: {written} of {} bytes", data.len()),
                ));
            }
            Ok(())
        }

        fn read(&mut self, addr: u16, buf: &mut [u8]) -> io::Result<()> {
            self.select(addr)?;
            let read = self.i2c.read(buf).map_err(to_io)?;
            if read != buf.len() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("short i2c read: {read} of {} bytes", buf.len()),
                ));
            }
            Ok(())
        }
    }
}

#[cfg(not(feature = "hardware"))]
mod backend {
    use std::io;

    use crate::hal::RegisterBus;

    /// Never constructed: without the `hardware` feature the bus cannot be opened.
    pub enum RppalBus {}

    pub fn open(bus: u8) -> io::Result<RppalBus> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("i2c bus {bus} unavailable: built without the `hardware` feature"),
        ))
    }

    impl RegisterBus for RppalBus {
        fn write(&mut self, _addr: u16, _data: &[u8]) -> io::Result<()> {
            match *self {}
        }

        fn read(&mut self, _addr: u16, _buf: &mut [u8]) -> io::Result<()> {
            match *self {}
        }
    }
}

pub use backend::RppalBus;

impl Connector for I2cConnector {
    type Handle = RppalBus;

    fn open(&self) -> io::Result<RppalBus> {
        backend::open(self.bus)
    }

    fn describe(&self) -> String {
        format!("i2c-{}", self.bus)
    }
}
