//! One memcached server: a connection pool plus the retry/failover state
//! machine that decides, attempt by attempt, whether a failure is worth
//! retrying and when the server itself should be marked down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::Error;
use crate::pool::ConnectionPool;
use crate::protocol::Message;
use crate::transport::{TcpTransport, Transport};

/// A single memcached endpoint: its connection pool and liveness state.
/// `perform`/`perform_stats` implement the attempt-counted retry loop;
/// [`ServerNode::is_alive`] and [`ServerNode::eligible_for_retry`] are what
/// the dispatcher (`Client`) consults to route around a down server.
pub struct ServerNode<T: Transport = TcpTransport> {
    address: String,
    pub(crate) pool: ConnectionPool<T>,
    config: Arc<Config>,
    is_alive: AtomicBool,
    last_down_at: Mutex<Option<Instant>>,
}

impl<T: Transport> ServerNode<T> {
    pub fn new(address: String, username: &str, password: &str, config: Arc<Config>) -> Self {
        let pool = ConnectionPool::new(&address, username, password, config.clone());
        ServerNode {
            address,
            pool,
            config,
            is_alive: AtomicBool::new(true),
            last_down_at: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_alive(&self) -> bool {
        self.is_alive.load(Ordering::Acquire)
    }

    /// True when this server may be selected as a failover target: either
    /// it's currently alive, or its down window has elapsed and it is due
    /// for a probe.
    pub fn eligible_for_retry(&self) -> bool {
        if self.is_alive() {
            return true;
        }
        match *self.last_down_at.lock() {
            Some(since) => since.elapsed() >= self.config.down_retry_delay,
            None => true,
        }
    }

    fn mark_down(&self) {
        if self.is_alive.swap(false, Ordering::AcqRel) {
            warn!("mc: server {} marked down", self.address);
        }
        *self.last_down_at.lock() = Some(Instant::now());
    }

    fn mark_alive(&self) {
        if !self.is_alive.swap(true, Ordering::AcqRel) {
            debug!("mc: server {} back up", self.address);
        }
    }

    /// Run one request to completion, retrying network failures up to
    /// `config.retries` times before marking the server down.
    pub fn perform(&self, msg: &mut Message) -> Result<(), Error> {
        let retries = self.config.retries;
        let mut attempt = 0;
        loop {
            let mut conn = self.pool.acquire()?;
            let backup = if attempt + 1 < retries {
                Some(msg.backup())
            } else {
                None
            };

            let result = conn.perform(msg);
            self.pool.release(conn);

            match result {
                Ok(()) => {
                    self.mark_alive();
                    return Ok(());
                }
                Err(err) if !err.is_network() => return Err(err),
                Err(err) => {
                    attempt += 1;
                    if attempt < retries {
                        if let Some(backup) = &backup {
                            msg.restore(backup);
                        }
                        thread::sleep(self.config.retry_delay);
                        continue;
                    }
                    self.mark_down();
                    return Err(err);
                }
            }
        }
    }

    /// The `OpStat` form of [`ServerNode::perform`]: same retry policy, but
    /// collects the multi-response stats map on success.
    pub fn perform_stats(&self, msg: &mut Message) -> Result<HashMap<String, String>, Error> {
        let retries = self.config.retries;
        let mut attempt = 0;
        loop {
            let mut conn = self.pool.acquire()?;
            let backup = if attempt + 1 < retries {
                Some(msg.backup())
            } else {
                None
            };

            let result = conn.perform_stats(msg);
            self.pool.release(conn);

            match result {
                Ok(stats) => {
                    self.mark_alive();
                    return Ok(stats);
                }
                Err(err) if !err.is_network() => return Err(err),
                Err(err) => {
                    attempt += 1;
                    if attempt < retries {
                        if let Some(backup) = &backup {
                            msg.restore(backup);
                        }
                        thread::sleep(self.config.retry_delay);
                        continue;
                    }
                    self.mark_down();
                    return Err(err);
                }
            }
        }
    }

    pub fn quit(&self) {
        self.pool.close();
    }
}
