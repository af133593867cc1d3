use std::{sync::Arc, time::Duration};

use tracing::{debug, warn};

use super::CorrelationTable;
use crate::{
    aio::Aio,
    config::SocketOptions,
    error::{Error, Result},
    msg::Msg,
    runtime,
    socket::{Dialer, Protocol, Socket},
};

/// Issues requests from any number of threads over one connection.
///
/// ```no_run
/// # use std::time::Duration;
/// # use dendrite::rpc::RpcClient;
/// let client = RpcClient::dial("inproc://jobs")?;
/// let reply = client.issue(&250u32.to_be_bytes(), Duration::from_secs(5))?;
/// # Ok::<(), dendrite::Error>(())
/// ```
pub struct RpcClient {
    socket: Socket,
    dialer: Dialer,
    table: Arc<CorrelationTable>,
    receiver: Aio,
}

impl RpcClient {
    pub fn dial(url: &str) -> Result<Self> {
        Self::dial_with(url, SocketOptions::default())
    }

    /// Dials with custom socket options. The socket is always raw.
    pub fn dial_with(url: &str, options: SocketOptions) -> Result<Self> {
        let socket = Socket::with_options(
            Protocol::Req,
            SocketOptions {
                raw: true,
                ..options
            },
        );
        let dialer = socket.dial(url)?;
        let table = Arc::new(CorrelationTable::new());
        let receiver = {
            let socket = socket.clone();
            let table = table.clone();
            Aio::new(move |aio| {
                if let Err(e) = aio.result() {
                    debug!(error = %e, "reply loop stopped");
                    return;
                }
                let reply = aio.take_msg();
                if let Err(e) = socket.recv_aio(aio) {
                    warn!(error = %e, "could not re-arm the reply loop");
                }
                let Some(mut reply) = reply else { return };
                match reply.header_trim_u32() {
                    Ok(cookie) => {
                        table.complete(cookie, reply);
                    }
                    Err(_) => table.record_violation(0),
                }
            })
        };
        socket.recv_aio(&receiver)?;
        Ok(Self {
            socket,
            dialer,
            table,
            receiver,
        })
    }

    /// Sends `body` as one request and blocks until its reply arrives or
    /// `timeout` elapses.
    pub fn issue(&self, body: &[u8], timeout: Duration) -> Result<Msg> {
        let (cookie, reply) = self.table.register();
        let mut request = Msg::from(body);
        request.header_append_u32(cookie);
        if let Err(e) = self.socket.send(request) {
            self.table.forget(cookie);
            return Err(e);
        }
        // the timer has to be created on the runtime
        match runtime::block_on(async { tokio::time::timeout(timeout, reply).await }) {
            Ok(Ok(reply)) => Ok(reply),
            // waiter dropped by close()
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                self.table.forget(cookie);
                debug!(cookie = format_args!("{:#010x}", cookie), "request timed out");
                Err(Error::TimedOut)
            }
        }
    }

    /// Requests still waiting for a reply.
    pub fn in_flight(&self) -> usize {
        self.table.in_flight()
    }

    /// Replies that matched no outstanding request.
    pub fn protocol_violations(&self) -> u64 {
        self.table.violations()
    }

    pub fn is_connected(&self) -> bool {
        self.dialer.is_connected()
    }

    /// Closes the socket, which ends the reply loop. Requests still waiting
    /// fail with [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        let closed = self.socket.close();
        self.receiver.wait();
        self.table.clear();
        closed
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        let _ = self.socket.close();
        self.receiver.wait();
        self.table.clear();
    }
}
