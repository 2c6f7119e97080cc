//! The error taxonomy for the client: a closed set of wire status codes
//! plus the client-side statuses used for transport failures and local
//! bookkeeping, wrapped in a single [`Error`] type that carries an
//! optional source error.

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::io;

/// A memcached response status, or one of the three client-side statuses
/// (`AuthUnknown`, `NetworkError`, `UnknownError`) this crate invents to
/// describe conditions the wire protocol itself has no code for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    NoError,
    NotFound,
    KeyExists,
    ValueTooLarge,
    InvalidArgs,
    ValueNotStored,
    NonNumeric,
    AuthRequired,
    AuthContinue,
    UnknownCommand,
    OutOfMemory,
    AuthUnknown,
    NetworkError,
    UnknownError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::NoError => 0x0000,
            Status::NotFound => 0x0001,
            Status::KeyExists => 0x0002,
            Status::ValueTooLarge => 0x0003,
            Status::InvalidArgs => 0x0004,
            Status::ValueNotStored => 0x0005,
            Status::NonNumeric => 0x0006,
            Status::AuthRequired => 0x0020,
            Status::AuthContinue => 0x0021,
            Status::UnknownCommand => 0x0081,
            Status::OutOfMemory => 0x0082,
            Status::AuthUnknown => 0xfff0,
            Status::NetworkError => 0xfff1,
            Status::UnknownError => 0xffff,
        }
    }

    fn description(self) -> &'static str {
        match self {
            Status::NoError => "no error",
            Status::NotFound => "not found",
            Status::KeyExists => "key exists",
            Status::ValueTooLarge => "value too large",
            Status::InvalidArgs => "invalid arguments",
            Status::ValueNotStored => "value not stored",
            Status::NonNumeric => "incr/decr called on non-numeric value",
            Status::AuthRequired => "authentication required",
            Status::AuthContinue => "authentication continue (unsupported)",
            Status::UnknownCommand => "unknown command",
            Status::OutOfMemory => "out of memory",
            Status::AuthUnknown => "no supported authentication mechanism",
            Status::NetworkError => "network error",
            Status::UnknownError => "unknown error",
        }
    }
}

impl From<u16> for Status {
    fn from(val: u16) -> Self {
        match val {
            0x0000 => Status::NoError,
            0x0001 => Status::NotFound,
            0x0002 => Status::KeyExists,
            0x0003 => Status::ValueTooLarge,
            0x0004 => Status::InvalidArgs,
            0x0005 => Status::ValueNotStored,
            0x0006 => Status::NonNumeric,
            0x0020 => Status::AuthRequired,
            0x0021 => Status::AuthContinue,
            0x0081 => Status::UnknownCommand,
            0x0082 => Status::OutOfMemory,
            0xfff0 => Status::AuthUnknown,
            0xfff1 => Status::NetworkError,
            _ => Status::UnknownError,
        }
    }
}

/// An error produced by the client: either an authoritative server
/// response (a non-zero wire status), or a client-side condition
/// (transport failure, pool exhaustion, closed client, bad auth).
#[derive(Debug)]
pub struct Error {
    pub status: Status,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl Error {
    pub fn from_status(status: Status) -> Self {
        Error {
            status,
            message: format!("mc: {}", status.description()),
            source: None,
        }
    }

    pub fn network(source: io::Error) -> Self {
        Error {
            status: Status::NetworkError,
            message: format!("mc: network error: {}", source),
            source: Some(Box::new(source)),
        }
    }

    /// A framing violation (bad magic byte, truncated header, ...). These
    /// indicate the connection is desynchronized from the server and are
    /// treated exactly like a transport failure: the connection is reset
    /// and the operation is retried per the usual retry/failover policy.
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Error {
            status: Status::NetworkError,
            message: format!("mc: protocol error: {}", message.into()),
            source: None,
        }
    }

    pub fn pool_exhausted() -> Self {
        Error {
            status: Status::UnknownError,
            message: "mc: timed out waiting for a pooled connection, increase pool size"
                .to_string(),
            source: None,
        }
    }

    pub fn closed() -> Self {
        Error {
            status: Status::UnknownError,
            message: "mc: client is closed".to_string(),
            source: None,
        }
    }

    pub fn auth_unknown<S: Into<String>>(advertised: S) -> Self {
        Error {
            status: Status::AuthUnknown,
            message: format!("mc: unknown auth types {:?}", advertised.into()),
            source: None,
        }
    }

    pub fn is_network(&self) -> bool {
        self.status == Status::NetworkError
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Error::from_status(status)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::network(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            Status::NoError,
            Status::NotFound,
            Status::KeyExists,
            Status::ValueTooLarge,
            Status::InvalidArgs,
            Status::ValueNotStored,
            Status::NonNumeric,
            Status::AuthRequired,
            Status::AuthContinue,
            Status::UnknownCommand,
            Status::OutOfMemory,
        ] {
            assert_eq!(status, Status::from(status.code()));
        }
    }

    #[test]
    fn test_unknown_status_code() {
        assert_eq!(Status::UnknownError, Status::from(0x1234));
    }

    #[test]
    fn test_network_error_is_retryable() {
        let err = Error::network(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
        assert!(err.is_network());
        assert!(err.to_string().contains("network error"));
    }

    #[test]
    fn test_application_error_not_network() {
        let err = Error::from_status(Status::KeyExists);
        assert!(!err.is_network());
    }
}
