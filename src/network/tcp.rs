//! Plain TCP transport over `std::net`.

use std::io::{self, Read as _, Write as _};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;

use super::error::Error;
use super::{Close, Connect, Connection, Read, ReadTimeout, Write};

/// Opens [`TcpConnection`]s.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    /// Bound on establishing the TCP connection.
    pub connect_timeout: Duration,
}

impl TcpConnector {
    /// A connector with a 10 second connect timeout.
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connect for TcpConnector {
    type Connection = TcpConnection;
    type Error = Error;

    fn connect(&mut self, remote: &str) -> Result<TcpConnection, Error> {
        let addr = remote
            .to_socket_addrs()
            .map_err(|_| Error::InvalidAddress)?
            .next()
            .ok_or(Error::InvalidAddress)?;
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|e| {
            debug!("connect to {} failed: {}", addr, e);
            match e.kind() {
                io::ErrorKind::TimedOut => Error::Timeout,
                _ => Error::ConnectionRefused,
            }
        })?;
        stream.set_nodelay(true).map_err(|_| Error::NotOpen)?;
        Ok(TcpConnection { stream })
    }
}

/// A connected TCP stream.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
}

impl Connection for TcpConnection {}

impl Read for TcpConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        self.stream.read(buf).map_err(|e| match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Error::Timeout,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                Error::ConnectionClosed
            }
            _ => Error::ReadError,
        })
    }
}

impl Write for TcpConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        self.stream.write(buf).map_err(|_| Error::WriteError)
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.stream.flush().map_err(|_| Error::WriteError)
    }
}

impl Close for TcpConnection {
    type Error = Error;

    fn close(self) -> Result<(), Error> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(_) => Err(Error::ConnectionClosed),
        }
    }
}

impl ReadTimeout for TcpConnection {
    type Error = Error;

    fn set_read_timeout(&mut self, timeout_ms: Option<u32>) -> Result<(), Error> {
        // A zero duration is rejected by std.
        let timeout = timeout_ms.map(|ms| Duration::from_millis(u64::from(ms.max(1))));
        self.stream
            .set_read_timeout(timeout)
            .map_err(|_| Error::NotOpen)
    }
}
