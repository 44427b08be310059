//! Hardware abstraction for the register bus and serial links.
//!
//! Drivers are written against these traits and own a [`Connector`] that can
//! (re)open their handle. The real backends live in [`i2c`] and [`serial`];
//! tests substitute in-memory fakes.

use std::io;

pub mod i2c;
pub mod serial;

pub use i2c::I2cConnector;
pub use serial::{SerialConnector, SerialSettings};

/// Opens a fresh handle to one physical resource.
pub trait Connector: Send + Sync {
    type Handle: Send;

    fn open(&self) -> io::Result<Self::Handle>;

    /// Human readable label for log messages (bus number, device path)
    fn describe(&self) -> String;
}

/// Addressed register bus (I2C/SMBus style).
pub trait RegisterBus: Send {
    fn write(&mut self, addr: u16, data: &[u8]) -> io::Result<()>;
    fn read(&mut self, addr: u16, buf: &mut [u8]) -> io::Result<()>;
}

/// Byte-oriented serial link.
pub trait SerialLink: Send {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Append whatever arrives within the port timeout to `buf`.
    ///
    /// Returns `Ok(0)` when nothing arrived.
    fn read_pending(&mut self, buf: &mut Vec<u8>) -> io::Result<usize>;
}

const EIO: i32 = 5;
const ENXIO: i32 = 6;
const EREMOTEIO: i32 = 121;

/// Whether an I/O error is a hardware link fault worth a reopen.
///
/// Covers EIO/ENXIO/EREMOTEIO (bus NACK), broken pipes and failed writes, and
/// messages mentioning an "i/o error" from backends that only keep the text.
pub fn is_io_fault(err: &io::Error) -> bool {
    if let Some(code) = err.raw_os_error() {
        if matches!(code, EIO | ENXIO | EREMOTEIO) {
            return true;
        }
    }
    match err.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::WriteZero
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::NotConnected
        | io::ErrorKind::ConnectionReset => true,
        _ => {
            let msg = err.to_string().to_ascii_lowercase();
            msg.contains("eio")
                || msg.contains("i/o error")
                || msg.contains("input/output error")
                || msg.contains("write failed")
        }
    }
}
