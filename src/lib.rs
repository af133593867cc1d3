//! Scalability-protocol style messaging: request/reply, bus, pair and
//! pipeline sockets over in-process, TCP and IPC pipes, driven synchronously
//! or through completion callbacks.
//!
//! Two layers sit on top of the sockets:
//!
//! - [`rpc`] multiplexes many concurrent requests over one raw request
//!   socket with a cookie per request.
//! - [`relax`] computes shortest hop counts by letting the nodes of a bus
//!   network relax their potentials against each other.

pub mod aio;
pub mod config;
pub mod error;
pub mod hex;
pub mod msg;
pub(crate) mod runtime;
pub mod socket;
pub mod transport;
pub mod wire;

#[cfg(feature = "relax")]
pub mod relax;
#[cfg(feature = "rpc")]
pub mod rpc;

pub use aio::Aio;
pub use config::SocketOptions;
pub use error::{Error, Result};
pub use msg::{Msg, Region};
pub use socket::{DialMode, Dialer, Listener, PipeId, Protocol, Socket};
