//! Turns address strings into byte streams.
//!
//! Three schemes are understood:
//!
//! - `inproc://name`: in-process pipes, paired through a process-wide name
//!   table. Nothing touches the operating system.
//! - `tcp://host:port`
//! - `ipc://path`: Unix domain sockets (unix only)
//!
//! Everything above this module sees a [`BoxedStream`] per connection and an
//! [`Acceptor`] per listening address.

use std::{
    fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard, OnceLock,
    },
};

use hashbrown::HashMap;
use tokio::{
    io::{AsyncRead, AsyncWrite, DuplexStream},
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Buffer size of each direction of an in-process pipe.
const INPROC_BUFFER: usize = 64 * 1024;

pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedStream = Box<dyn Stream>;

/// A parsed endpoint address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Address {
    Inproc(String),
    Tcp(String),
    #[cfg(unix)]
    Ipc(std::path::PathBuf),
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| Error::InvalidAddress(url.to_string()))?;
        if rest.is_empty() {
            return Err(Error::InvalidAddress(url.to_string()));
        }
        match scheme {
            "inproc" => Ok(Self::Inproc(rest.to_string())),
            "tcp" => Ok(Self::Tcp(rest.to_string())),
            #[cfg(unix)]
            "ipc" => Ok(Self::Ipc(rest.into())),
            _ => Err(Error::InvalidAddress(url.to_string())),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inproc(name) => write!(f, "inproc://{}", name),
            Self::Tcp(addr) => write!(f, "tcp://{}", addr),
            #[cfg(unix)]
            Self::Ipc(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}

struct InprocBinding {
    token: u64,
    backlog: mpsc::UnboundedSender<DuplexStream>,
}

fn inproc_names() -> MutexGuard<'static, HashMap<String, InprocBinding>> {
    static NAMES: OnceLock<Mutex<HashMap<String, InprocBinding>>> = OnceLock::new();
    NAMES
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .expect("inproc name table poisoned")
}

fn next_token() -> u64 {
    static TOKENS: AtomicU64 = AtomicU64::new(1);
    TOKENS.fetch_add(1, Ordering::Relaxed)
}

/// Opens a connection to a listening address.
pub async fn connect(address: &Address) -> Result<BoxedStream> {
    match address {
        Address::Inproc(name) => {
            let backlog = inproc_names()
                .get(name)
                .map(|binding| binding.backlog.clone())
                .ok_or_else(|| Error::ConnectionRefused(address.to_string()))?;
            let (ours, theirs) = tokio::io::duplex(INPROC_BUFFER);
            backlog
                .send(theirs)
                .map_err(|_| Error::ConnectionRefused(address.to_string()))?;
            trace!(%address, "inproc connection queued");
            Ok(Box::new(ours))
        }
        Address::Tcp(addr) => {
            let stream = TcpStream::connect(addr.as_str()).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
        #[cfg(unix)]
        Address::Ipc(path) => Ok(Box::new(tokio::net::UnixStream::connect(path).await?)),
    }
}

/// Starts accepting connections on an address.
pub async fn listen(address: &Address) -> Result<Acceptor> {
    match address {
        Address::Inproc(name) => {
            let mut names = inproc_names();
            if let Some(existing) = names.get(name) {
                if !existing.backlog.is_closed() {
                    return Err(Error::AddressInUse(address.to_string()));
                }
            }
            let (backlog, incoming) = mpsc::unbounded_channel();
            let token = next_token();
            names.insert(name.clone(), InprocBinding { token, backlog });
            debug!(%address, "inproc name bound");
            Ok(Acceptor::Inproc {
                name: name.clone(),
                token,
                incoming,
            })
        }
        Address::Tcp(addr) => Ok(Acceptor::Tcp(TcpListener::bind(addr.as_str()).await?)),
        #[cfg(unix)]
        Address::Ipc(path) => {
            let listener = match tokio::net::UnixListener::bind(path) {
                Ok(listener) => listener,
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    // a socket file nobody answers on is left over from a dead
                    // process
                    if tokio::net::UnixStream::connect(path).await.is_ok() {
                        return Err(Error::AddressInUse(address.to_string()));
                    }
                    debug!(%address, "removing stale ipc socket");
                    std::fs::remove_file(path)?;
                    tokio::net::UnixListener::bind(path)?
                }
                Err(e) => return Err(e.into()),
            };
            Ok(Acceptor::Ipc {
                listener,
                path: path.clone(),
            })
        }
    }
}

/// Releases an in-process name right away, without waiting for the acceptor
/// that owns it to be dropped. Only the binding identified by `token` is
/// removed, so a newer listener on the same name is left alone.
pub(crate) fn unbind(address: &Address, token: u64) {
    if let Address::Inproc(name) = address {
        let mut names = inproc_names();
        if names.get(name).map_or(false, |b| b.token == token) {
            names.remove(name);
            debug!(%address, "inproc name released");
        }
    }
}

/// The passive half of a transport.
pub enum Acceptor {
    Inproc {
        name: String,
        token: u64,
        incoming: mpsc::UnboundedReceiver<DuplexStream>,
    },
    Tcp(TcpListener),
    #[cfg(unix)]
    Ipc {
        listener: tokio::net::UnixListener,
        path: std::path::PathBuf,
    },
}

impl Acceptor {
    /// Waits for the next inbound connection and describes its remote end.
    pub async fn accept(&mut self) -> Result<(BoxedStream, String)> {
        match self {
            Self::Inproc { name, incoming, .. } => {
                let stream = incoming.recv().await.ok_or(Error::Closed)?;
                Ok((Box::new(stream), format!("inproc://{}", name)))
            }
            Self::Tcp(listener) => {
                let (stream, remote) = listener.accept().await?;
                stream.set_nodelay(true)?;
                Ok((Box::new(stream), format!("tcp://{}", remote)))
            }
            #[cfg(unix)]
            Self::Ipc { listener, path } => {
                let (stream, _) = listener.accept().await?;
                Ok((Box::new(stream), format!("ipc://{}", path.display())))
            }
        }
    }

    /// The bound address; for `tcp://host:0` this carries the real port.
    pub fn local_address(&self) -> Result<String> {
        match self {
            Self::Inproc { name, .. } => Ok(format!("inproc://{}", name)),
            Self::Tcp(listener) => Ok(format!("tcp://{}", listener.local_addr()?)),
            #[cfg(unix)]
            Self::Ipc { path, .. } => Ok(format!("ipc://{}", path.display())),
        }
    }

    pub(crate) fn token(&self) -> Option<u64> {
        match self {
            Self::Inproc { token, .. } => Some(*token),
            _ => None,
        }
    }
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        match self {
            Self::Inproc { name, token, .. } => {
                unbind(&Address::Inproc(name.clone()), *token);
            }
            Self::Tcp(_) => {}
            #[cfg(unix)]
            Self::Ipc { path, .. } => {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::runtime;

    #[test]
    fn parses_schemes() {
        assert_eq!(
            "inproc://a/b".parse::<Address>(),
            Ok(Address::Inproc("a/b".into()))
        );
        assert_eq!(
            "tcp://127.0.0.1:5555".parse::<Address>(),
            Ok(Address::Tcp("127.0.0.1:5555".into()))
        );
        assert!("carrier-pigeon://x".parse::<Address>().is_err());
        assert!("inproc://".parse::<Address>().is_err());
        assert!("no-scheme".parse::<Address>().is_err());
    }

    #[test]
    fn inproc_requires_a_listener() {
        let address: Address = "inproc://transport-no-listener".parse().unwrap();
        let result = runtime::block_on(connect(&address));
        assert!(matches!(result, Err(Error::ConnectionRefused(_))));
    }

    #[test]
    fn inproc_names_are_exclusive_until_released() {
        let address: Address = "inproc://transport-exclusive".parse().unwrap();
        runtime::block_on(async {
            let first = listen(&address).await.unwrap();
            assert!(matches!(
                listen(&address).await,
                Err(Error::AddressInUse(_))
            ));
            drop(first);
            listen(&address).await.unwrap();
        });
    }

    #[test]
    fn inproc_carries_bytes_both_ways() {
        let address: Address = "inproc://transport-echo".parse().unwrap();
        runtime::block_on(async {
            let mut acceptor = listen(&address).await.unwrap();
            let mut client = connect(&address).await.unwrap();
            let (mut server, remote) = acceptor.accept().await.unwrap();
            assert_eq!(remote, "inproc://transport-echo");

            client.write_all(b"ping").await.unwrap();
            let mut buf = [0u8; 4];
            server.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping");

            server.write_all(b"pong").await.unwrap();
            client.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"pong");
        });
    }
}
