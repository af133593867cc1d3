use std::{
    sync::{Arc, Mutex, OnceLock, Weak},
    time::Duration,
};

use tracing::{debug, debug_span, warn, Instrument};

use super::{Core, Endpoint, EndpointId, Socket, Stage};
use crate::{
    error::{Error, Result},
    runtime,
    transport::{self, Acceptor, Address},
};

const ACCEPT_RETRY: Duration = Duration::from_millis(50);

/// Accepts inbound connections on one address and turns each into a pipe of
/// its socket.
#[derive(Debug)]
pub struct Listener {
    id: EndpointId,
    address: Address,
    requested: String,
    bound: OnceLock<String>,
    core: Weak<Core>,
    stage: Mutex<Stage>,
}

impl Listener {
    /// Creates the listener and binds it in one step.
    pub fn listen(socket: &Socket, url: &str) -> Result<Self> {
        let listener = Self::create(socket, url)?;
        listener.start()?;
        Ok(listener)
    }

    /// Checks the address and ties the listener to `socket` without binding
    /// it.
    pub fn create(socket: &Socket, url: &str) -> Result<Self> {
        let address: Address = url.parse()?;
        let core = socket.core();
        if core.is_closed() {
            return Err(Error::Closed);
        }
        Ok(Self {
            id: EndpointId::next(),
            requested: address.to_string(),
            address,
            bound: OnceLock::new(),
            core: Arc::downgrade(core),
            stage: Mutex::new(Stage::Created),
        })
    }

    /// Binds the address and starts accepting.
    pub fn start(&self) -> Result<()> {
        let mut stage = self.stage.lock().expect("listener stage lock poisoned");
        match *stage {
            Stage::Created => {}
            Stage::Started => return Err(Error::InvalidState("listener already started")),
            Stage::Closed => return Err(Error::Closed),
        }
        let core = self.core.upgrade().ok_or(Error::Closed)?;
        if core.is_closed() {
            return Err(Error::Closed);
        }
        let acceptor = runtime::block_on(transport::listen(&self.address))?;
        let local = acceptor.local_address()?;
        let binding = acceptor.token().map(|token| (self.address.clone(), token));
        let span = debug_span!("listener", socket = core.id, address = %local);
        let task = runtime::handle()
            .spawn(accept(self.core.clone(), acceptor, self.id).instrument(span));
        core.add_endpoint(self.id, Endpoint { task, binding })?;
        debug!(socket = core.id, address = %local, "listening");
        let _ = self.bound.set(local);
        *stage = Stage::Started;
        Ok(())
    }

    /// The bound address once started, the requested one before. For
    /// `tcp://host:0` this names the port the system picked.
    pub fn address(&self) -> &str {
        self.bound.get().unwrap_or(&self.requested)
    }

    /// Stops accepting and closes every pipe this listener accepted.
    pub fn close(&self) -> Result<()> {
        let mut stage = self.stage.lock().expect("listener stage lock poisoned");
        match std::mem::replace(&mut *stage, Stage::Closed) {
            Stage::Created => Ok(()),
            Stage::Closed => Err(Error::Closed),
            Stage::Started => self
                .core
                .upgrade()
                .ok_or(Error::Closed)?
                .remove_endpoint(self.id),
        }
    }
}

/// Accepts connections until the acceptor shuts down or the socket goes
/// away. Each handshake runs in its own task.
async fn accept(core: Weak<Core>, mut acceptor: Acceptor, id: EndpointId) {
    loop {
        let (stream, remote) = match acceptor.accept().await {
            Ok(connection) => connection,
            Err(Error::Closed) => return,
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_RETRY).await;
                continue;
            }
        };
        let Some(core) = core.upgrade() else { return };
        let span = debug_span!("inbound", %remote);
        tokio::spawn(
            async move {
                if let Err(e) = core.establish(stream, remote, id).await {
                    debug!(error = %e, "inbound connection rejected");
                }
            }
            .instrument(span),
        );
    }
}
