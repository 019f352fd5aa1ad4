use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::settings::HttpSettings;

/// A connected, bidirectional byte stream to one host.
///
/// The transport drops a connection once its response is closed. Providers
/// that keep connections alive hand out a type whose `Drop` returns it to
/// their pool.
pub trait Connection: Read + Write + Send {
    /// Apply a read/write timeout; `None` blocks indefinitely.
    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Stop reading from the connection.
    fn shutdown_input(&mut self) -> io::Result<()>;

    /// Shut the connection down in both directions.
    fn close(&mut self) -> io::Result<()>;
}

impl Connection for TcpStream {
    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }

    fn shutdown_input(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Read)
    }

    fn close(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// Socket acquisition capability consumed by the transport.
pub trait SocketProvider: Send + Sync {
    /// Acquire a connection to `addr`.
    fn get_socket(&self, addr: &SocketAddr) -> io::Result<Box<dyn Connection>>;

    /// Whether connections handed out by this provider are kept alive after
    /// use. Drives the `Connection` request header.
    fn reusable_socket(&self) -> bool;
}

/// Provider opening a fresh TCP connection per request.
pub struct TcpSocketProvider {
    settings: HttpSettings,
}

impl TcpSocketProvider {
    pub fn new(settings: HttpSettings) -> Self {
        Self { settings }
    }

    fn connect(&self, addr: &SocketAddr) -> io::Result<TcpStream> {
        let socket = Socket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_send_buffer_size(self.settings.send_buffer_size)?;
        socket.set_recv_buffer_size(self.settings.receive_buffer_size)?;
        let target = SockAddr::from(*addr);
        match self.settings.connect_timeout_ms {
            0 => socket.connect(&target)?,
            ms => socket.connect_timeout(&target, Duration::from_millis(ms))?,
        }
        let stream: TcpStream = socket.into();
        stream.set_nodelay(true)?;
        let timeout = match self.settings.read_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        Ok(stream)
    }
}

impl Default for TcpSocketProvider {
    fn default() -> Self {
        Self::new(HttpSettings::default())
    }
}

impl SocketProvider for TcpSocketProvider {
    fn get_socket(&self, addr: &SocketAddr) -> io::Result<Box<dyn Connection>> {
        let stream = self.connect(addr)?;
        tracing::debug!(%addr, "connected");
        Ok(Box::new(stream))
    }

    fn reusable_socket(&self) -> bool {
        false
    }
}
