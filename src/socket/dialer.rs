use std::{
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use tokio::sync::oneshot;
use tracing::{debug, debug_span, Instrument};

use super::{Core, Endpoint, EndpointId, Socket, Stage};
use crate::{
    error::{Error, Result},
    runtime,
    transport::{self, Address},
};

/// Whether [`Dialer::dial`] waits for its first connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DialMode {
    /// The first attempt happens before `dial` returns, and its failure is
    /// the caller's error.
    #[default]
    Blocking,
    /// Every attempt happens in the background; `dial` only fails on a bad
    /// address or a closed socket.
    NonBlocking,
}

/// Keeps one outbound connection alive, redialing with exponential backoff
/// whenever it drops.
///
/// The handle does not own the connection: dropping it leaves the dialer
/// running until [`Dialer::close`] or the socket's close.
#[derive(Debug)]
pub struct Dialer {
    id: EndpointId,
    address: Address,
    core: Weak<Core>,
    stage: Mutex<Stage>,
}

impl Dialer {
    /// Creates and starts a dialer in one step.
    pub fn dial(socket: &Socket, url: &str, mode: DialMode) -> Result<Self> {
        let dialer = Self::create(socket, url)?;
        dialer.start(mode)?;
        Ok(dialer)
    }

    /// Checks the address and ties the dialer to `socket` without
    /// connecting.
    pub fn create(socket: &Socket, url: &str) -> Result<Self> {
        let address: Address = url.parse()?;
        let core = socket.core();
        if core.is_closed() {
            return Err(Error::Closed);
        }
        Ok(Self {
            id: EndpointId::next(),
            address,
            core: Arc::downgrade(core),
            stage: Mutex::new(Stage::Created),
        })
    }

    /// Starts connecting. A blocking start that fails leaves the dialer
    /// created, so it can be started again.
    pub fn start(&self, mode: DialMode) -> Result<()> {
        let mut stage = self.stage.lock().expect("dialer stage lock poisoned");
        match *stage {
            Stage::Created => {}
            Stage::Started => return Err(Error::InvalidState("dialer already started")),
            Stage::Closed => return Err(Error::Closed),
        }
        let core = self.core.upgrade().ok_or(Error::Closed)?;
        if core.is_closed() {
            return Err(Error::Closed);
        }
        let span = debug_span!("dialer", socket = core.id, address = %self.address);
        let connected = match mode {
            DialMode::Blocking => Some(runtime::block_on(
                connect(&core, &self.address, self.id).instrument(span.clone()),
            )?),
            DialMode::NonBlocking => None,
        };
        let task = runtime::handle().spawn(
            redial(self.core.clone(), self.address.clone(), self.id, connected).instrument(span),
        );
        core.add_endpoint(
            self.id,
            Endpoint {
                task,
                binding: None,
            },
        )?;
        *stage = Stage::Started;
        Ok(())
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// True while the dialer has a live pipe.
    pub fn is_connected(&self) -> bool {
        self.core
            .upgrade()
            .map_or(false, |core| core.endpoint_connected(self.id))
    }

    /// Fails with [`Error::NotConnected`] while the dialer is between
    /// connections.
    pub fn check(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Stops redialing and closes the dialer's pipe.
    pub fn close(&self) -> Result<()> {
        let mut stage = self.stage.lock().expect("dialer stage lock poisoned");
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

async fn connect(
    core: &Arc<Core>,
    address: &Address,
    id: EndpointId,
) -> Result<oneshot::Receiver<()>> {
    let stream = transport::connect(address).await?;
    let departed = core.establish(stream, address.to_string(), id).await?;
    debug!("connected");
    Ok(departed)
}

struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            current: min,
        }
    }

    fn next(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.min;
    }
}

async fn redial(
    core: Weak<Core>,
    address: Address,
    id: EndpointId,
    mut connected: Option<oneshot::Receiver<()>>,
) {
    let Some((min, max)) = core
        .upgrade()
        .map(|core| core.with_options(|o| (o.reconnect_min, o.reconnect_max)))
    else {
        return;
    };
    let mut backoff = Backoff::new(min, max);
    loop {
        if let Some(departed) = connected.take() {
            let _ = departed.await;
            backoff.reset();
            let delay = backoff.next();
            debug!(?delay, "connection lost, redialing");
            tokio::time::sleep(delay).await;
        }
        let Some(strong) = core.upgrade() else { return };
        if strong.is_closed() {
            return;
        }
        match connect(&strong, &address, id).await {
            Ok(departed) => connected = Some(departed),
            Err(e) => {
                drop(strong);
                let delay = backoff.next();
                debug!(error = %e, ?delay, "dial failed");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
