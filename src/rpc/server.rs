use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    aio::Aio,
    config::SocketOptions,
    error::Result,
    msg::Msg,
    socket::{Listener, Protocol, Socket},
};

/// Answers requests from a raw reply socket.
///
/// The handler rewrites the request body into the reply; the header, which
/// holds the client's cookie, goes back untouched. The receive loop re-arms
/// before the handler runs, so slow requests do not hold up the ones behind
/// them.
pub struct RpcServer {
    socket: Socket,
    listener: Listener,
    receiver: Aio,
}

impl RpcServer {
    pub fn listen<H>(url: &str, handler: H) -> Result<Self>
    where
        H: Fn(&mut Msg) -> Result<()> + Send + Sync + 'static,
    {
        let socket = Socket::with_options(
            Protocol::Rep,
            SocketOptions::builder().raw(true).build(),
        );
        let listener = socket.listen(url)?;
        let receiver = {
            let socket = socket.clone();
            Aio::new(move |aio| {
                if let Err(e) = aio.result() {
                    debug!(error = %e, "request loop stopped");
                    return;
                }
                let request = aio.take_msg();
                if let Err(e) = socket.recv_aio(aio) {
                    warn!(error = %e, "could not re-arm the request loop");
                }
                let Some(mut msg) = request else { return };
                if let Err(e) = handler(&mut msg) {
                    warn!(error = %e, "handler failed, request dropped");
                    return;
                }
                if let Err(e) = socket.send(msg) {
                    debug!(error = %e, "reply not sent");
                }
            })
        };
        socket.recv_aio(&receiver)?;
        Ok(Self {
            socket,
            listener,
            receiver,
        })
    }

    /// Where clients should dial.
    pub fn address(&self) -> &str {
        self.listener.address()
    }

    pub fn close(&self) -> Result<()> {
        let closed = self.socket.close();
        self.receiver.wait();
        closed
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        let _ = self.socket.close();
        self.receiver.wait();
    }
}

/// Sleeps for the number of milliseconds in the leading u32 of the body,
/// standing in for work of varying cost. The rest of the body is echoed.
pub fn delay_handler(msg: &mut Msg) -> Result<()> {
    let millis = msg.trim_u32()?;
    std::thread::sleep(Duration::from_millis(millis.into()));
    Ok(())
}
