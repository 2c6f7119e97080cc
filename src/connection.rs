//! A single TCP session to one memcached server: lazy connect, SASL PLAIN
//! auth, and the send/recv halves of one request/response exchange.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::config::Config;
use crate::error::{Error, Status};
use crate::protocol::{Header, Message};
use crate::transport::{TcpTransport, Transport};

/// A lazily-connected session to one memcached server. `perform` opens the
/// socket (and authenticates) on first use; any transport failure resets
/// the socket to "not yet connected" so the next call reconnects from
/// scratch.
#[derive(Debug)]
pub struct ServerConnection<T: Transport = TcpTransport> {
    address: String,
    username: String,
    password: String,
    config: Arc<Config>,
    pub(crate) socket: Option<T>,
    opaque: u32,
}

impl<T: Transport> ServerConnection<T> {
    pub fn new(address: String, username: String, password: String, config: Arc<Config>) -> Self {
        ServerConnection {
            address,
            username,
            password,
            config,
            socket: None,
            opaque: 0,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Run one request/response exchange, connecting first if needed.
    pub fn perform(&mut self, msg: &mut Message) -> Result<(), Error> {
        self.ensure_connected()?;
        self.send_recv(msg)
    }

    /// Run the special multi-response exchange `OpStat` uses: send once,
    /// then keep reading responses until one with an empty key arrives.
    pub fn perform_stats(&mut self, msg: &mut Message) -> Result<HashMap<String, String>, Error> {
        self.ensure_connected()?;
        let result = self.send_recv_stats(msg);
        if result.is_err() {
            self.reset();
        }
        result
    }

    /// Best-effort quit: send `OpQuit`, then close regardless of outcome.
    pub fn quit(&mut self) {
        if self.socket.is_some() {
            let mut msg = Message::quit();
            let _ = self.send_recv(&mut msg);
            self.reset();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn ensure_connected(&mut self) -> Result<(), Error> {
        if self.socket.is_none() {
            self.connect()?;
        }
        Ok(())
    }

    fn connect(&mut self) -> Result<(), Error> {
        debug!("mc: connecting to {}", self.address);
        let timeout = self.config.connection_timeout;
        let socket = T::connect(&self.address, timeout)?;
        socket.set_nodelay(self.config.tcp_nodelay)?;
        if self.config.tcp_keepalive {
            socket.set_keepalive(true, self.config.tcp_keepalive_period)?;
        }
        self.socket = Some(socket);
        self.opaque = 0;

        if let Err(err) = self.auth() {
            warn!("mc: auth failed against {}: {}", self.address, err);
            self.reset();
            return Err(err);
        }
        Ok(())
    }

    /// SASL PLAIN authentication. Skipped entirely when no credentials are
    /// configured; when credentials are configured but the server has no
    /// SASL handler (`UnknownCommand`), auth is treated as disabled rather
    /// than an error.
    fn auth(&mut self) -> Result<(), Error> {
        if self.username.is_empty() && self.password.is_empty() {
            return Ok(());
        }

        let mut list_msg = Message::auth_list();
        match self.send_recv(&mut list_msg) {
            Ok(()) => (),
            Err(err) if err.status == Status::UnknownCommand => {
                debug!("mc: server {} has SASL disabled", self.address);
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        let mechanisms = String::from_utf8_lossy(&list_msg.value).into_owned();
        if !mechanisms.contains("PLAIN") {
            return Err(Error::auth_unknown(mechanisms));
        }

        let mut start_msg = Message::auth_start(&self.username, &self.password);
        match self.send_recv(&mut start_msg) {
            Ok(()) => Ok(()),
            Err(err) if err.status == Status::UnknownCommand => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn send_recv(&mut self, msg: &mut Message) -> Result<(), Error> {
        if let Err(err) = self.send(msg) {
            self.reset();
            return Err(err);
        }
        if let Err(err) = self.recv(msg) {
            if err.is_network() {
                self.reset();
            }
            return Err(err);
        }
        Ok(())
    }

    fn send_recv_stats(&mut self, msg: &mut Message) -> Result<HashMap<String, String>, Error> {
        self.send(msg)?;
        let mut stats = HashMap::new();
        loop {
            self.recv_raw(msg)?;
            if msg.key.is_empty() {
                return Ok(stats);
            }
            let key = String::from_utf8_lossy(&msg.key).into_owned();
            let value = String::from_utf8_lossy(&msg.value).into_owned();
            stats.insert(key, value);
        }
    }

    fn send(&mut self, msg: &Message) -> Result<(), Error> {
        let socket = self.socket.as_mut().ok_or_else(Error::closed)?;

        let extras = msg.extras_bytes();
        let header = Header {
            magic: crate::protocol::MAGIC_REQUEST,
            op: msg.op,
            key_len: msg.key.len() as u16,
            extra_len: msg.extras_len(),
            data_type: 0,
            resv_or_status: 0,
            body_len: (extras.len() + msg.key.len() + msg.value.len()) as u32,
            opaque: self.opaque,
            cas: msg.cas,
        };
        self.opaque = self.opaque.wrapping_add(1);

        let mut buf = Vec::with_capacity(Header::SIZE + extras.len() + msg.key.len() + msg.value.len());
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(&extras);
        buf.extend_from_slice(&msg.key);
        buf.extend_from_slice(&msg.value);

        socket.set_write_timeout(Some(self.config.connection_timeout))?;
        trace!("mc: -> op={:#x} opaque={}", header.op, header.opaque);
        socket.write_all(&buf)?;
        Ok(())
    }

    /// Read one response frame and populate `msg`'s response-side fields,
    /// then map a non-zero status to an error.
    fn recv(&mut self, msg: &mut Message) -> Result<(), Error> {
        self.recv_raw(msg)?;
        match msg.status {
            Status::NoError => Ok(()),
            status => Err(Error::from_status(status)),
        }
    }

    /// Read one response frame without translating a non-zero status into
    /// an error. Used directly by `send_recv_stats`, which must keep
    /// reading until the terminating empty-key response regardless of any
    /// per-entry status.
    fn recv_raw(&mut self, msg: &mut Message) -> Result<(), Error> {
        let socket = self.socket.as_mut().ok_or_else(Error::closed)?;
        socket.set_read_timeout(Some(self.config.connection_timeout))?;

        let mut header_buf = [0u8; Header::SIZE];
        socket.read_exact(&mut header_buf)?;
        let header = Header::from_response_bytes(&header_buf)?;

        let mut body = vec![0u8; header.body_len as usize];
        if !body.is_empty() {
            socket.read_exact(&mut body)?;
        }

        if body.len() != header.body_len as usize {
            return Err(Error::protocol("short body read"));
        }

        let extras_len = header.extra_len as usize;
        let key_len = header.key_len as usize;
        if extras_len + key_len > body.len() {
            return Err(Error::protocol("extras/key longer than body"));
        }
        let (extras, rest) = body.split_at(extras_len);
        let (key, value) = rest.split_at(key_len);

        msg.status = header.status();
        msg.cas = header.cas;
        msg.key = key.to_vec();
        msg.value = value.to_vec();
        msg.out_flags = if extras_len >= 4 {
            Some(u32::from_be_bytes([extras[0], extras[1], extras[2], extras[3]]))
        } else {
            None
        };

        trace!(
            "mc: <- op={:#x} opaque={} status={:#x}",
            header.op,
            header.opaque,
            header.resv_or_status
        );
        Ok(())
    }

    fn reset(&mut self) {
        if self.socket.take().is_some() {
            debug!("mc: resetting connection to {}", self.address);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockTransport;

    fn test_config() -> Arc<Config> {
        Arc::new(Config::default().with_connection_timeout(Duration::from_millis(200)))
    }

    #[test]
    fn test_get_round_trip_over_mock_transport() {
        let mut conn: ServerConnection<MockTransport> =
            ServerConnection::new("mock:0".into(), "".into(), "".into(), test_config());
        conn.socket = Some(MockTransport::new());
        conn.socket
            .as_mut()
            .unwrap()
            .queue_get_response(0, b"bar".to_vec(), 0);

        let mut msg = Message::get(b"foo".to_vec());
        conn.perform(&mut msg).unwrap();
        assert_eq!(b"bar".to_vec(), msg.value);
        assert_eq!(Some(0), msg.out_flags);
    }

    #[test]
    fn test_network_failure_resets_connection() {
        let mut conn: ServerConnection<MockTransport> =
            ServerConnection::new("mock:0".into(), "".into(), "".into(), test_config());
        conn.socket = Some(MockTransport::new());
        conn.socket.as_mut().unwrap().queue_eof();

        let mut msg = Message::get(b"foo".to_vec());
        assert!(conn.send_recv(&mut msg).is_err());
        assert!(!conn.is_connected());
    }
}
