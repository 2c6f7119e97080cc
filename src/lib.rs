//! A client for the memcached binary protocol with connection pooling,
//! retries, and failover across multiple servers.
//!
//! The client is synchronous: each call blocks the calling thread for the
//! duration of its network round trip (bounded by
//! [`Config::connection_timeout`]). Pooling and per-server liveness
//! tracking make it safe to share one [`Client`] across many threads.
//!
//! ```no_run
//! use rsmc::{Client, Config};
//!
//! let client: Client = Client::new("127.0.0.1:11211", "", "", Config::default())?;
//! client.set("hello", "world", 0, 0, 0)?;
//! let (value, _flags, _cas) = client.get("hello")?;
//! assert_eq!(b"world".to_vec(), value);
//! # Ok::<(), rsmc::Error>(())
//! ```
//!
//! Values are stored uncompressed by default. With the `zlib` feature
//! enabled (on by default), pass [`Config::with_compressor`] a
//! `ZlibCompressor` to compress values at or above a size threshold.

mod client;
mod compressor;
mod config;
mod connection;
mod error;
mod hasher;
mod pool;
mod protocol;
mod server;
mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use client::Client;
pub use compressor::{Compressor, NoopCompressor};
pub use config::Config;
pub use error::{Error, Status};
pub use hasher::{Hasher, ModuloHasher};
pub use transport::{TcpTransport, Transport};

#[cfg(feature = "zlib")]
pub use compressor::{Compression, ZlibCompressor, DEFAULT_MIN_BYTES};
