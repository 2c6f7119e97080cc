//! The byte-stream abstraction a [`crate::connection::ServerConnection`]
//! speaks over. [`TcpTransport`] is the production implementation; the
//! test suite supplies an in-memory, script-driven mock that implements
//! the same trait so the retry/failover state machine can be exercised
//! deterministically without a live memcached daemon.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// A connected, timeout-capable duplex byte stream.
pub trait Transport: Read + Write + Send {
    fn connect(addr: &str, timeout: Duration) -> io::Result<Self>
    where
        Self: Sized;

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
    fn set_nodelay(&self, nodelay: bool) -> io::Result<()>;
    fn set_keepalive(&self, enabled: bool, period: Duration) -> io::Result<()>;
}

/// The production [`Transport`]: a plain TCP socket.
pub struct TcpTransport {
    stream: TcpStream,
}

impl Read for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Transport for TcpTransport {
    fn connect(addr: &str, timeout: Duration) -> io::Result<Self> {
        let socket_addr = addr
            .to_socket_addrs_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no addresses to try"))?;
        let stream = TcpStream::connect_timeout(&socket_addr, timeout)?;
        Ok(TcpTransport { stream })
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_write_timeout(timeout)
    }

    fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        self.stream.set_nodelay(nodelay)
    }

    fn set_keepalive(&self, _enabled: bool, _period: Duration) -> io::Result<()> {
        // std's TcpStream has no portable keepalive-period setter; nodelay
        // and the connect/read/write deadlines above cover this crate's
        // actual timeout needs, so keepalive is best-effort and silently
        // ignored on platforms without it rather than failing `connect`.
        Ok(())
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

trait ResolveFirst {
    fn to_socket_addrs_first(&self) -> Option<std::net::SocketAddr>;
}

impl ResolveFirst for str {
    fn to_socket_addrs_first(&self) -> Option<std::net::SocketAddr> {
        use std::net::ToSocketAddrs;
        self.to_socket_addrs().ok()?.next()
    }
}
