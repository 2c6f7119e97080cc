//! The dispatcher: shards keyed commands across a list of server nodes by
//! hash, fails over to the next eligible node on a network error, and
//! broadcasts cluster-wide commands (Flush, NoOp, Version, Stats, Quit)
//! to every node.

use std::collections::HashMap;
use std::convert::TryInto;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Error;
use crate::protocol::Message;
use crate::server::ServerNode;
use crate::transport::{TcpTransport, Transport};

const DEFAULT_PORT: &str = "11211";

fn parse_addresses(servers: &str) -> Vec<String> {
    servers
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|addr| {
            if addr.rsplit(':').next().map_or(true, |p| p.parse::<u16>().is_err()) {
                format!("{}:{}", addr, DEFAULT_PORT)
            } else {
                addr.to_string()
            }
        })
        .collect()
}

fn read_counter_value(value: &[u8]) -> Result<u64, Error> {
    let bytes: [u8; 8] = value
        .try_into()
        .map_err(|_| Error::protocol("incr/decr response value was not 8 bytes"))?;
    Ok(u64::from_be_bytes(bytes))
}

/// A memcached client sharding keys across one or more servers. Cloning is
/// cheap: internally every server node is reference-counted state shared
/// across threads, so a `Client` is typically constructed once and handed
/// out (by value or by reference) to every caller.
pub struct Client<T: Transport = TcpTransport> {
    servers: Vec<ServerNode<T>>,
    config: Arc<Config>,
}

impl<T: Transport> Client<T> {
    /// Build a client from a comma/whitespace-delimited server list. An
    /// address without an explicit port defaults to `:11211`.
    pub fn new(servers: &str, user: &str, pass: &str, config: Config) -> Result<Self, Error> {
        let config = Arc::new(config);
        let addresses = parse_addresses(servers);
        if addresses.is_empty() {
            return Err(Error::protocol("no server addresses configured"));
        }
        let servers = addresses
            .into_iter()
            .map(|addr| ServerNode::new(addr, user, pass, config.clone()))
            .collect();
        Ok(Client { servers, config })
    }

    /// Run `msg` against the server that owns `key`, failing over to the
    /// next eligible node (per `config.failover`) on a network error.
    fn perform_keyed(&self, key: &[u8], msg: &mut Message) -> Result<(), Error> {
        let total = self.servers.len();
        let alive_idxs: Vec<usize> = (0..total).filter(|&i| self.servers[i].is_alive()).collect();
        let alive_count = alive_idxs.len().max(1);
        let hashed = (self.config.hasher.hash(key) % alive_count as u64) as usize;
        let start = if alive_idxs.is_empty() {
            hashed % total
        } else {
            alive_idxs[hashed]
        };

        let original = msg.backup();
        let mut last_err = None;
        for offset in 0..total {
            let idx = (start + offset) % total;
            let node = &self.servers[idx];
            if offset > 0 {
                if !node.eligible_for_retry() {
                    continue;
                }
                msg.restore(&original);
            }
            match node.perform(msg) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_network() && self.config.failover => {
                    last_err = Some(err);
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(Error::closed))
    }

    pub fn get<K: AsRef<[u8]>>(&self, key: K) -> Result<(Vec<u8>, u32, u64), Error> {
        let key = key.as_ref();
        let mut msg = Message::get(key);
        self.perform_keyed(key, &mut msg)?;
        let value = self.config.compressor.decompress(msg.value)?;
        Ok((value, msg.out_flags.unwrap_or(0), msg.cas))
    }

    pub fn gat<K: AsRef<[u8]>>(&self, key: K, exp: u32) -> Result<(Vec<u8>, u32, u64), Error> {
        let key = key.as_ref();
        let mut msg = Message::gat(key, exp);
        self.perform_keyed(key, &mut msg)?;
        let value = self.config.compressor.decompress(msg.value)?;
        Ok((value, msg.out_flags.unwrap_or(0), msg.cas))
    }

    pub fn set<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        &self,
        key: K,
        value: V,
        flags: u32,
        exp: u32,
        cas: u64,
    ) -> Result<u64, Error> {
        let key = key.as_ref();
        let value = self.config.compressor.compress(value.as_ref().to_vec())?;
        let mut msg = Message::set(key, value, flags, exp, cas);
        self.perform_keyed(key, &mut msg)?;
        Ok(msg.cas)
    }

    pub fn add<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        &self,
        key: K,
        value: V,
        flags: u32,
        exp: u32,
    ) -> Result<u64, Error> {
        let key = key.as_ref();
        let value = self.config.compressor.compress(value.as_ref().to_vec())?;
        let mut msg = Message::add(key, value, flags, exp);
        self.perform_keyed(key, &mut msg)?;
        Ok(msg.cas)
    }

    pub fn replace<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        &self,
        key: K,
        value: V,
        flags: u32,
        exp: u32,
        cas: u64,
    ) -> Result<u64, Error> {
        let key = key.as_ref();
        let value = self.config.compressor.compress(value.as_ref().to_vec())?;
        let mut msg = Message::replace(key, value, flags, exp, cas);
        self.perform_keyed(key, &mut msg)?;
        Ok(msg.cas)
    }

    pub fn delete<K: AsRef<[u8]>>(&self, key: K) -> Result<(), Error> {
        self.delete_cas(key, 0)
    }

    pub fn delete_cas<K: AsRef<[u8]>>(&self, key: K, cas: u64) -> Result<(), Error> {
        let key = key.as_ref();
        let mut msg = Message::delete(key, cas);
        self.perform_keyed(key, &mut msg)
    }

    pub fn incr<K: AsRef<[u8]>>(
        &self,
        key: K,
        delta: u64,
        init: u64,
        exp: u32,
        cas: u64,
    ) -> Result<(u64, u64), Error> {
        let key = key.as_ref();
        let mut msg = Message::incr(key, delta, init, exp, cas);
        self.perform_keyed(key, &mut msg)?;
        Ok((read_counter_value(&msg.value)?, msg.cas))
    }

    pub fn decr<K: AsRef<[u8]>>(
        &self,
        key: K,
        delta: u64,
        init: u64,
        exp: u32,
        cas: u64,
    ) -> Result<(u64, u64), Error> {
        let key = key.as_ref();
        let mut msg = Message::decr(key, delta, init, exp, cas);
        self.perform_keyed(key, &mut msg)?;
        Ok((read_counter_value(&msg.value)?, msg.cas))
    }

    pub fn append<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        &self,
        key: K,
        value: V,
        cas: u64,
    ) -> Result<u64, Error> {
        let key = key.as_ref();
        let value = self.config.compressor.compress(value.as_ref().to_vec())?;
        let mut msg = Message::append(key, value, cas);
        self.perform_keyed(key, &mut msg)?;
        Ok(msg.cas)
    }

    pub fn prepend<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        &self,
        key: K,
        value: V,
        cas: u64,
    ) -> Result<u64, Error> {
        let key = key.as_ref();
        let value = self.config.compressor.compress(value.as_ref().to_vec())?;
        let mut msg = Message::prepend(key, value, cas);
        self.perform_keyed(key, &mut msg)?;
        Ok(msg.cas)
    }

    pub fn touch<K: AsRef<[u8]>>(&self, key: K, exp: u32) -> Result<u64, Error> {
        let key = key.as_ref();
        let mut msg = Message::touch(key, exp);
        self.perform_keyed(key, &mut msg)?;
        Ok(msg.cas)
    }

    /// Invalidate every key cluster-wide. `when` of 0 means immediately;
    /// otherwise memcached defers the flush by that many seconds.
    pub fn flush(&self, when: u32) -> HashMap<String, Result<(), Error>> {
        self.broadcast(|node| {
            let mut msg = Message::flush(when);
            node.perform(&mut msg)
        })
    }

    pub fn noop(&self) -> HashMap<String, Result<(), Error>> {
        self.broadcast(|node| {
            let mut msg = Message::noop();
            node.perform(&mut msg)
        })
    }

    pub fn version(&self) -> HashMap<String, Result<String, Error>> {
        self.broadcast(|node| {
            let mut msg = Message::version();
            node.perform(&mut msg)?;
            Ok(String::from_utf8_lossy(&msg.value).into_owned())
        })
    }

    pub fn stats(&self) -> HashMap<String, Result<HashMap<String, String>, Error>> {
        self.broadcast(|node| {
            let mut msg = Message::stat();
            node.perform_stats(&mut msg)
        })
    }

    /// Best-effort Quit against every server, then make all pools observe
    /// "client closed" for any caller still holding this client.
    pub fn quit(&self) {
        for node in &self.servers {
            node.quit();
        }
    }

    fn broadcast<R, F: Fn(&ServerNode<T>) -> Result<R, Error>>(
        &self,
        f: F,
    ) -> HashMap<String, Result<R, Error>> {
        self.servers
            .iter()
            .map(|node| (node.address().to_string(), f(node)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockTransport;
    use std::time::Duration;

    fn seed(node: &ServerNode<MockTransport>, f: impl FnOnce(&mut MockTransport)) {
        let mut conn = node.pool.acquire().unwrap();
        let mut socket = MockTransport::new();
        f(&mut socket);
        conn.socket = Some(socket);
        node.pool.release(conn);
    }

    /// Mirrors scenario S4: server A is down, the dispatcher fails over to
    /// B, and the key routes to whichever of the two is alive.
    #[test]
    fn test_dispatcher_fails_over_to_next_alive_server() {
        let config = Config::default()
            .with_retries(1)
            .with_connection_timeout(Duration::from_millis(50));
        let client: Client<MockTransport> = Client {
            servers: vec![
                ServerNode::new("a:0".into(), "", "", Arc::new(config.clone())),
                ServerNode::new("b:0".into(), "", "", Arc::new(config.clone())),
            ],
            config: Arc::new(config),
        };

        // "a" has nothing queued, so its single attempt hits an immediate
        // EOF and is treated as a network failure; "b" has a response
        // ready and should end up serving the request.
        seed(&client.servers[0], |s| s.queue_eof());
        seed(&client.servers[1], |s| s.queue_get_response(0, b"bar".to_vec(), 0));

        let (value, _flags, _cas) = client.get("foo").unwrap();
        assert_eq!(b"bar".to_vec(), value);
        assert!(!client.servers[0].is_alive());
        assert!(client.servers[1].is_alive());
    }

    #[test]
    fn test_dispatcher_returns_last_error_when_all_servers_down() {
        let config = Config::default()
            .with_retries(1)
            .with_failover(true)
            .with_connection_timeout(Duration::from_millis(50));
        let client: Client<MockTransport> = Client {
            servers: vec![ServerNode::new("a:0".into(), "", "", Arc::new(config.clone()))],
            config: Arc::new(config),
        };
        seed(&client.servers[0], |s| s.queue_eof());

        let err = client.get("foo").unwrap_err();
        assert!(err.is_network());
    }

    #[test]
    fn test_parse_addresses_defaults_port() {
        assert_eq!(
            vec!["10.0.0.1:11211".to_string(), "10.0.0.2:9000".to_string()],
            parse_addresses("10.0.0.1, 10.0.0.2:9000")
        );
    }

    #[test]
    fn test_parse_addresses_splits_on_whitespace() {
        assert_eq!(
            vec!["a:11211".to_string(), "b:11211".to_string()],
            parse_addresses("a  b")
        );
    }

    #[test]
    fn test_read_counter_value_round_trips_be_bytes() {
        assert_eq!(42u64, read_counter_value(&42u64.to_be_bytes()).unwrap());
    }

    #[test]
    fn test_read_counter_value_rejects_short_buffer() {
        assert!(read_counter_value(&[0, 1, 2]).is_err());
    }
}
