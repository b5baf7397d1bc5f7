use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::Result;

/// Read timeout used for native ports when "no timeout" is requested.
/// `serialport` has no notion of an infinite timeout.
const NATIVE_BLOCKING_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// A connected duplex byte stream to the coprocessor. Implements `Read + Write`.
///
/// This is the fundamental I/O type returned by transport operations.
/// It wraps a native serial port, a TCP serial bridge, or (on Unix) a
/// socket pair used for loopback testing.
pub struct SerialStream {
    inner: SerialStreamInner,
}

enum SerialStreamInner {
    Native(Box<dyn serialport::SerialPort>),
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SerialStreamInner::Native(port) => port.read(buf),
            SerialStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SerialStreamInner::Native(port) => port.write(buf),
            SerialStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            SerialStreamInner::Native(port) => port.flush(),
            SerialStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl SerialStream {
    pub(crate) fn from_native(port: Box<dyn serialport::SerialPort>) -> Self {
        Self {
            inner: SerialStreamInner::Native(port),
        }
    }

    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: SerialStreamInner::Tcp(stream),
        }
    }

    /// Wrap one end of a Unix socket pair.
    ///
    /// Used to run the link layer against a simulated coprocessor.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: SerialStreamInner::Unix(stream),
        }
    }

    /// Set read timeout on the underlying stream.
    ///
    /// A timed-out read surfaces as `ErrorKind::TimedOut` or
    /// `ErrorKind::WouldBlock` depending on the backend.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            SerialStreamInner::Native(port) => port
                .set_timeout(timeout.unwrap_or(NATIVE_BLOCKING_TIMEOUT))
                .map_err(|err| std::io::Error::from(err).into()),
            SerialStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    ///
    /// Native ports keep one timeout per handle, so give the writing handle
    /// its own clone before calling this.
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            SerialStreamInner::Native(port) => port
                .set_timeout(timeout.unwrap_or(NATIVE_BLOCKING_TIMEOUT))
                .map_err(|err| std::io::Error::from(err).into()),
            SerialStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new handle to the same device).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            SerialStreamInner::Native(port) => {
                let cloned = port.try_clone().map_err(std::io::Error::from)?;
                Ok(Self::from_native(cloned))
            }
            SerialStreamInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }

    /// Drop any bytes already buffered on the receive side.
    ///
    /// Called before a link reset so stale frames from a previous session are
    /// not parsed as replies.
    pub fn discard_input(&mut self) -> Result<()> {
        match &mut self.inner {
            SerialStreamInner::Native(port) => port
                .clear(serialport::ClearBuffer::Input)
                .map_err(|err| std::io::Error::from(err).into()),
            SerialStreamInner::Tcp(stream) => {
                stream.set_nonblocking(true)?;
                let drained = drain_nonblocking(stream);
                stream.set_nonblocking(false)?;
                drained
            }
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => {
                stream.set_nonblocking(true)?;
                let drained = drain_nonblocking(stream);
                stream.set_nonblocking(false)?;
                drained
            }
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            SerialStreamInner::Native(_) => "serial",
            SerialStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            SerialStreamInner::Unix(_) => "unix",
        }
    }
}

fn drain_nonblocking<R: Read>(reader: &mut R) -> Result<()> {
    let mut scratch = [0u8; 256];
    loop {
        match reader.read(&mut scratch) {
            Ok(0) => return Ok(()),
            Ok(_) => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("SerialStream");
        dbg.field("type", &self.transport_name());
        if let SerialStreamInner::Native(port) = &self.inner {
            dbg.field("name", &port.name());
        }
        dbg.finish()
    }
}
