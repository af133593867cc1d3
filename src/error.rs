use std::io;

use thiserror::Error;

/// Everything that can go wrong in a socket, pipe, message or completion
/// handle.
///
/// Errors are `Clone` because the outcome of an asynchronous operation is
/// stored inside its [`Aio`](crate::aio::Aio) and may be read more than once.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The socket has no connection that could carry the operation.
    #[error("not connected")]
    NotConnected,
    /// The socket (or the object the operation was bound to) is closed.
    #[error("object closed")]
    Closed,
    #[error("timed out")]
    TimedOut,
    /// The operation was aborted by [`Aio::cancel`](crate::aio::Aio::cancel).
    #[error("operation canceled")]
    Canceled,
    #[error("message of {size} bytes exceeds the limit of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },
    /// A peer or a correlation layer broke the protocol contract.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// More bytes were consumed from a message region than it holds.
    #[error("underflow: wanted {wanted} bytes, {available} available")]
    Underflow { wanted: usize, available: usize },
    /// An operation was started on a completion handle that already has one
    /// outstanding.
    #[error("completion handle already has an operation outstanding")]
    AlreadyArmed,
    /// The pattern does not allow this operation right now, e.g. a cooked
    /// reply socket sending before it received a request.
    #[error("incorrect state: {0}")]
    InvalidState(&'static str),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("address in use: {0}")]
    AddressInUse(String),
    #[error("connection refused: {0}")]
    ConnectionRefused(String),
    /// The socket's pattern has no such operation, e.g. receiving on push.
    #[error("not supported by the {0} protocol")]
    NotSupported(&'static str),
    /// A send was submitted through a completion handle with no message set.
    #[error("no message attached to send operation")]
    MissingMessage,
    #[error("i/o error: {0}")]
    Io(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => {
                Self::ConnectionRefused(e.to_string())
            }
            io::ErrorKind::AddrInUse => Self::AddressInUse(e.to_string()),
            io::ErrorKind::TimedOut => Self::TimedOut,
            io::ErrorKind::NotConnected => Self::NotConnected,
            _ => Self::Io(e.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::TimedOut
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_to_specific_variants() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "nope");
        assert!(matches!(Error::from(refused), Error::ConnectionRefused(_)));

        let in_use = io::Error::new(io::ErrorKind::AddrInUse, "taken");
        assert!(matches!(Error::from(in_use), Error::AddressInUse(_)));

        let other = io::Error::new(io::ErrorKind::BrokenPipe, "gone");
        assert!(matches!(Error::from(other), Error::Io(_)));
    }

    #[test]
    fn display_mentions_sizes() {
        let e = Error::Underflow {
            wanted: 4,
            available: 1,
        };
        assert_eq!(e.to_string(), "underflow: wanted 4 bytes, 1 available");
    }
}
