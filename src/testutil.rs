//! An in-memory, script-driven [`Transport`] used only by this crate's own
//! test suite. There is no Docker dependency or live memcached daemon
//! available to exercise retry and failover against, so each test queues
//! the exact response bytes (or an early EOF) it expects its exchange to
//! read and asserts on the resulting [`crate::protocol::Message`] or
//! [`crate::error::Error`].

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::protocol::{Header, MAGIC_RESPONSE, OP_GET};
use crate::transport::Transport;

#[derive(Debug)]
pub struct MockTransport {
    read_buf: VecDeque<u8>,
    eof: bool,
    pub written: Vec<u8>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            read_buf: VecDeque::new(),
            eof: false,
            written: Vec::new(),
        }
    }

    /// Queue a complete response frame for a Get/GAT-shaped request: a
    /// four-byte flags extra followed by the value.
    pub fn queue_get_response(&mut self, status: u16, value: Vec<u8>, flags: u32) {
        let extras = flags.to_be_bytes().to_vec();
        let header = Header {
            magic: MAGIC_RESPONSE,
            op: OP_GET,
            key_len: 0,
            extra_len: extras.len() as u8,
            data_type: 0,
            resv_or_status: status,
            body_len: (extras.len() + value.len()) as u32,
            opaque: 0,
            cas: 0,
        };
        self.read_buf.extend(header.to_bytes());
        self.read_buf.extend(extras);
        self.read_buf.extend(value);
    }

    /// Queue a status-only response with no extras, key, or value (Set,
    /// Delete, Incr/Decr-as-failure, Quit, NoOp, ...).
    pub fn queue_status_response(&mut self, status: u16) {
        let header = Header {
            magic: MAGIC_RESPONSE,
            op: 0,
            key_len: 0,
            extra_len: 0,
            data_type: 0,
            resv_or_status: status,
            body_len: 0,
            opaque: 0,
            cas: 0,
        };
        self.read_buf.extend(header.to_bytes());
    }

    pub fn queue_raw(&mut self, bytes: &[u8]) {
        self.read_buf.extend(bytes.iter().copied());
    }

    /// Simulate the peer closing the connection: the next read returns
    /// EOF instead of blocking or erroring outright.
    pub fn queue_eof(&mut self) {
        self.eof = true;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        MockTransport::new()
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.read_buf.is_empty() {
            if self.eof {
                return Ok(0);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "mock transport: no data queued",
            ));
        }
        let n = buf.len().min(self.read_buf.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.read_buf.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockTransport {
    fn connect(_addr: &str, _timeout: Duration) -> io::Result<Self> {
        Ok(MockTransport::new())
    }

    fn set_read_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    fn set_write_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    fn set_nodelay(&self, _nodelay: bool) -> io::Result<()> {
        Ok(())
    }

    fn set_keepalive(&self, _enabled: bool, _period: Duration) -> io::Result<()> {
        Ok(())
    }
}
