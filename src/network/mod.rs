//! A byte-stream abstraction for talking to a broker.
//!
//! The MQTT session never touches sockets directly. It is generic over the
//! traits in this module, so the same code runs over a TCP socket (the
//! [`tcp`] module, `std` feature), a TLS stream provided by the platform, or
//! the in-memory [`loopback`] broker used for simulation and tests. Which one
//! is used is decided once, when the session is constructed.

#![deny(unsafe_code)]

/// Common error types for network operations
pub mod error;

/// Application protocols built on the transport traits.
pub mod application;

/// In-memory broker and transport for simulation and tests.
pub mod loopback;

/// TCP transport backed by `std::net`.
#[cfg(feature = "std")]
pub mod tcp;

use self::error::Error;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connect, Connection, Read, ReadTimeout, Transport, Write};
}

/// Reading side of a byte stream.
pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read data from the connection.
    ///
    /// May return fewer bytes than requested. `Ok(0)` means the peer closed
    /// the stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Writing side of a byte stream.
pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection, possibly only a prefix of `buf`.
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Releasing a byte stream.
pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// Bounding how long a read may block.
pub trait ReadTimeout {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Set the read timeout in milliseconds, `None` blocks indefinitely.
    ///
    /// A read that times out must fail with [`Error::Timeout`].
    fn set_read_timeout(&mut self, timeout_ms: Option<u32>) -> Result<(), Self::Error>;
}

/// A synchronous connection
pub trait Connection: Read + Write + Close {}

/// A synchronous connector (client)
pub trait Connect {
    /// Associated connection type
    type Connection: Connection;
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Open a connection to `remote`, given as `host:port`.
    fn connect(&mut self, remote: &str) -> Result<Self::Connection, Self::Error>;
}

/// A connection the MQTT session can drive: every operation reports
/// [`Error`] and reads can be bounded in time.
pub trait Transport:
    Connection
    + Read<Error = Error>
    + Write<Error = Error>
    + Close<Error = Error>
    + ReadTimeout<Error = Error>
{
}

impl<T> Transport for T where
    T: Connection
        + Read<Error = Error>
        + Write<Error = Error>
        + Close<Error = Error>
        + ReadTimeout<Error = Error>
{
}

/// Write all of `buf`, retrying short writes, then flush.
pub fn write_all<W>(writer: &mut W, mut buf: &[u8]) -> Result<(), Error>
where
    W: Write<Error = Error> + ?Sized,
{
    while !buf.is_empty() {
        match writer.write(buf)? {
            0 => return Err(Error::WriteError),
            n => buf = &buf[n..],
        }
    }
    writer.flush()
}
