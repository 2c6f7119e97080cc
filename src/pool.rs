//! A fixed-capacity, thread-safe queue of lazy [`ServerConnection`] handles.
//! Acquiring blocks up to `connection_timeout`; releasing is unconditional,
//! even after a failed attempt, so a broken handle simply reconnects lazily
//! the next time it is dequeued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::config::Config;
use crate::connection::ServerConnection;
use crate::error::Error;
use crate::transport::Transport;

pub struct ConnectionPool<T: Transport> {
    sender: Sender<ServerConnection<T>>,
    receiver: Receiver<ServerConnection<T>>,
    acquire_timeout: Duration,
    closed: AtomicBool,
}

impl<T: Transport> ConnectionPool<T> {
    pub fn new(address: &str, username: &str, password: &str, config: Arc<Config>) -> Self {
        let (sender, receiver) = bounded(config.pool_size);
        for _ in 0..config.pool_size {
            let conn = ServerConnection::new(
                address.to_string(),
                username.to_string(),
                password.to_string(),
                config.clone(),
            );
            sender
                .send(conn)
                .expect("pool channel just created, cannot be disconnected");
        }
        ConnectionPool {
            sender,
            receiver,
            acquire_timeout: config.connection_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Dequeue a handle, waiting up to `connection_timeout`.
    pub fn acquire(&self) -> Result<ServerConnection<T>, Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::closed());
        }
        match self.receiver.recv_timeout(self.acquire_timeout) {
            Ok(conn) => Ok(conn),
            Err(RecvTimeoutError::Timeout) => Err(Error::pool_exhausted()),
            Err(RecvTimeoutError::Disconnected) => Err(Error::closed()),
        }
    }

    /// Return a handle to the pool regardless of whether the last attempt
    /// on it succeeded or failed.
    pub fn release(&self, conn: ServerConnection<T>) {
        let _ = self.sender.send(conn);
    }

    /// Drain the pool, sending a best-effort Quit over every handle
    /// currently available, then mark the pool closed so subsequent
    /// acquisitions observe "client closed".
    pub fn close(&self) {
        while let Ok(mut conn) = self.receiver.try_recv() {
            conn.quit();
        }
        self.closed.store(true, Ordering::Release);
    }
}
