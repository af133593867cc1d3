//! Sockets, the patterns they speak, and the pipes that connect them.
//!
//! A [`Socket`] owns a set of pipes, one per live connection, created by its
//! [`Dialer`]s and [`Listener`]s. Each pipe runs a reader task that feeds a
//! single inbound queue and a writer task that drains the pipe's outbox. The
//! pattern logic (request ids, reply routing, bus fan-out, load balancing)
//! sits between the application and those queues, guarded by one lock.
//!
//! Sockets start in cooked mode. Raw mode hands header handling to the
//! application, which is what the RPC layer builds on.

mod dialer;
mod listener;
mod pipe;

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex, MutexGuard, OnceLock, Weak,
    },
    time::Duration,
};

use hashbrown::HashMap;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, debug_span, trace, Instrument};

pub use self::{
    dialer::{DialMode, Dialer},
    listener::Listener,
    pipe::PipeId,
};
use self::pipe::Pipe;
use crate::{
    aio::{Aio, Op},
    config::SocketOptions,
    error::{Error, Result},
    msg::Msg,
    runtime,
    transport::{self, Address, BoxedStream},
    wire::{self, FrameReader, FrameWriter},
};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// The communication pattern a socket speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Sends requests, receives the matching replies.
    Req,
    /// Receives requests, answers each on the pipe it came from.
    Rep,
    /// Many to many. Every message goes to every directly connected peer.
    Bus,
    /// Exactly one peer at a time; both sides send and receive.
    Pair,
    /// Sending end of a pipeline. Messages are spread over the connected
    /// pullers.
    Push,
    /// Receiving end of a pipeline.
    Pull,
}

impl Protocol {
    /// Identifier exchanged in the connection handshake.
    pub fn id(self) -> u16 {
        match self {
            Self::Req => 0x30,
            Self::Rep => 0x31,
            Self::Bus => 0x70,
            Self::Pair => 0x10,
            Self::Push => 0x50,
            Self::Pull => 0x51,
        }
    }

    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            0x30 => Some(Self::Req),
            0x31 => Some(Self::Rep),
            0x70 => Some(Self::Bus),
            0x10 => Some(Self::Pair),
            0x50 => Some(Self::Push),
            0x51 => Some(Self::Pull),
            _ => None,
        }
    }

    /// The only protocol a socket of this kind accepts on the other end.
    pub fn peer(self) -> Self {
        match self {
            Self::Req => Self::Rep,
            Self::Rep => Self::Req,
            Self::Bus => Self::Bus,
            Self::Pair => Self::Pair,
            Self::Push => Self::Pull,
            Self::Pull => Self::Push,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Req => "req",
            Self::Rep => "rep",
            Self::Bus => "bus",
            Self::Pair => "pair",
            Self::Push => "push",
            Self::Pull => "pull",
        }
    }

    fn can_recv(self) -> bool {
        self != Self::Push
    }

    /// Patterns that hold messages until a peer shows up.
    fn buffers_sends(self) -> bool {
        matches!(self, Self::Pair | Self::Push)
    }
}

/// Where a dialer or listener is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Stage {
    Created,
    Started,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct EndpointId(u32);

impl EndpointId {
    fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A dialer's or listener's background task, plus the in-process name a
/// listener holds.
pub(crate) struct Endpoint {
    task: JoinHandle<()>,
    binding: Option<(Address, u64)>,
}

impl Endpoint {
    fn shutdown(self) {
        self.task.abort();
        if let Some((address, token)) = &self.binding {
            transport::unbind(address, *token);
        }
    }
}

/// The request a cooked req socket is waiting on.
struct Pending {
    id: u32,
    msg: Msg,
    /// Where the request was last written. `None` means it still needs a
    /// pipe.
    pipe: Option<PipeId>,
}

#[derive(Default)]
struct Shared {
    closed: bool,
    pipes: HashMap<PipeId, Pipe>,
    endpoints: HashMap<EndpointId, Endpoint>,
    cursor: usize,
    request: Option<Pending>,
    /// Pipe and header of the request a cooked rep socket owes a reply to.
    backtrace: Option<(PipeId, Vec<u8>)>,
    /// Pair and push messages sent while no peer was connected.
    backlog: VecDeque<Msg>,
}

impl Shared {
    /// Round robin over the live pipes.
    fn pick_pipe(&mut self) -> Option<PipeId> {
        if self.pipes.is_empty() {
            return None;
        }
        self.cursor = self.cursor.wrapping_add(1);
        self.pipes.keys().nth(self.cursor % self.pipes.len()).copied()
    }

    /// Writes the pending request to a pipe unless it already sits on one.
    fn dispatch_request(&mut self) {
        if !matches!(&self.request, Some(pending) if pending.pipe.is_none()) {
            return;
        }
        let Some(id) = self.pick_pipe() else {
            trace!("no pipe for pending request yet");
            return;
        };
        let (Some(pending), Some(pipe)) = (self.request.as_mut(), self.pipes.get(&id)) else {
            return;
        };
        if pipe.outbox.send(pending.msg.clone()).is_ok() {
            trace!(pipe = %id, request = pending.id, "request dispatched");
            pending.pipe = Some(id);
        }
    }

    /// Hands `msg` to the next pipe, or parks it until one attaches.
    fn distribute(&mut self, msg: Msg) {
        let Some(id) = self.pick_pipe() else {
            trace!(queued = self.backlog.len() + 1, "no peer yet, message queued");
            self.backlog.push_back(msg);
            return;
        };
        self.deliver(id, msg);
    }

    fn flush_backlog(&mut self) {
        while !self.pipes.is_empty() {
            let Some(msg) = self.backlog.pop_front() else { return };
            self.distribute(msg);
        }
    }

    fn deliver(&self, pipe: PipeId, msg: Msg) {
        match self.pipes.get(&pipe) {
            Some(target) => {
                if target.outbox.send(msg).is_err() {
                    debug!(pipe = %pipe, "pipe is shutting down, message dropped");
                }
            }
            None => debug!(pipe = %pipe, "destination pipe is gone, message dropped"),
        }
    }
}

pub(crate) struct Core {
    id: u32,
    protocol: Protocol,
    options: Mutex<SocketOptions>,
    shared: Mutex<Shared>,
    inbound_tx: mpsc::UnboundedSender<Msg>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Msg>>,
    closed: watch::Sender<bool>,
    request_ids: AtomicU32,
}

impl Core {
    fn new(protocol: Protocol, options: SocketOptions) -> Self {
        static SOCKET_IDS: AtomicU32 = AtomicU32::new(1);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        Self {
            id: SOCKET_IDS.fetch_add(1, Ordering::Relaxed),
            protocol,
            options: Mutex::new(options),
            shared: Mutex::new(Shared::default()),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            closed,
            request_ids: AtomicU32::new(0),
        }
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().expect("socket state lock poisoned")
    }

    fn with_options<T>(&self, f: impl FnOnce(&mut SocketOptions) -> T) -> T {
        let mut options = self.options.lock().expect("socket options lock poisoned");
        f(&mut options)
    }

    fn is_closed(&self) -> bool {
        self.shared().closed
    }

    fn cooked(&self, protocol: Protocol) -> bool {
        self.protocol == protocol && !self.with_options(|o| o.raw)
    }

    /// Hands a message to the pattern. A message that could not be accepted
    /// comes back with the error.
    fn send(self: &Arc<Self>, mut msg: Msg) -> std::result::Result<(), (Error, Msg)> {
        let (raw, max, resend) =
            self.with_options(|o| (o.raw, o.max_message_size, o.resend_interval));
        let size = msg.header_len() + msg.len();
        if size > max {
            return Err((Error::MessageTooLarge { size, max }, msg));
        }
        let mut shared = self.shared();
        if shared.closed {
            return Err((Error::Closed, msg));
        }
        match (self.protocol, raw) {
            (Protocol::Req, false) => {
                let id = (self.request_ids.fetch_add(1, Ordering::Relaxed) & 0x7fff_ffff)
                    | 0x8000_0000;
                msg.header_clear();
                msg.header_append_u32(id);
                msg.set_pipe(None);
                let abandoned = shared.request.replace(Pending {
                    id,
                    msg,
                    pipe: None,
                });
                if let Some(abandoned) = abandoned {
                    debug!(request = abandoned.id, "abandoning unanswered request");
                }
                shared.dispatch_request();
                drop(shared);
                self.schedule_resend(id, resend);
            }
            (Protocol::Rep, false) => {
                let Some((pipe, header)) = shared.backtrace.take() else {
                    let e = Error::InvalidState("reply sent before a request was received");
                    return Err((e, msg));
                };
                msg.header_clear();
                msg.header_append(&header);
                shared.deliver(pipe, msg);
            }
            (Protocol::Req, true) => {
                let Some(pipe) = shared.pick_pipe() else {
                    return Err((Error::NotConnected, msg));
                };
                shared.deliver(pipe, msg);
            }
            (Protocol::Rep, true) => match msg.pipe() {
                Some(pipe) => shared.deliver(pipe, msg),
                None => debug!("raw reply without a pipe, dropped"),
            },
            (Protocol::Bus, _) => {
                let origin = if raw { msg.pipe() } else { None };
                let targets: Vec<_> = shared
                    .pipes
                    .values()
                    .filter(|pipe| Some(pipe.id) != origin)
                    .map(|pipe| pipe.outbox.clone())
                    .collect();
                drop(shared);
                if targets.is_empty() {
                    trace!("bus send with no peers");
                }
                for outbox in targets {
                    let _ = outbox.send(msg.clone());
                }
            }
            (Protocol::Pair | Protocol::Push, _) => shared.distribute(msg),
            (Protocol::Pull, _) => return Err((Error::NotSupported(self.protocol.name()), msg)),
        }
        Ok(())
    }

    fn schedule_resend(self: &Arc<Self>, id: u32, interval: Duration) {
        let core = Arc::downgrade(self);
        runtime::handle().spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(core) = core.upgrade() else { return };
                let mut shared = core.shared();
                match shared.request.as_mut() {
                    Some(pending) if pending.id == id => {
                        debug!(request = id, "no reply yet, resending");
                        pending.pipe = None;
                        shared.dispatch_request();
                    }
                    _ => return,
                }
            }
        });
    }

    /// Waits for the next message from any pipe.
    async fn next_inbound(&self) -> Result<Msg> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(Error::Closed);
        }
        let mut inbound = tokio::select! {
            guard = self.inbound_rx.lock() => guard,
            _ = closed.wait_for(|closed| *closed) => return Err(Error::Closed),
        };
        tokio::select! {
            msg = inbound.recv() => msg.ok_or(Error::Closed),
            _ = closed.wait_for(|closed| *closed) => Err(Error::Closed),
        }
    }

    async fn recv(&self) -> Result<Msg> {
        if !self.protocol.can_recv() {
            return Err(Error::NotSupported(self.protocol.name()));
        }
        if self.cooked(Protocol::Req) {
            self.recv_reply().await
        } else if self.cooked(Protocol::Rep) {
            self.recv_request().await
        } else {
            self.next_inbound().await
        }
    }

    async fn recv_reply(&self) -> Result<Msg> {
        if self.shared().request.is_none() {
            return Err(Error::InvalidState("receive without a pending request"));
        }
        loop {
            let mut msg = self.next_inbound().await?;
            let Ok(id) = msg.header_trim_u32() else {
                debug!("dropping reply without a request id");
                continue;
            };
            let mut shared = self.shared();
            if shared.request.as_ref().map(|pending| pending.id) == Some(id) {
                shared.request = None;
                drop(shared);
                msg.header_clear();
                return Ok(msg);
            }
            trace!(request = id, "discarding stale reply");
        }
    }

    async fn recv_request(&self) -> Result<Msg> {
        loop {
            let mut msg = self.next_inbound().await?;
            let Some(pipe) = msg.pipe().filter(|_| msg.header_len() >= 4) else {
                debug!("dropping request without an id");
                continue;
            };
            let header = msg.header().to_vec();
            msg.header_clear();
            self.shared().backtrace = Some((pipe, header));
            return Ok(msg);
        }
    }

    /// Runs the handshake on a fresh connection and turns it into a pipe.
    /// The returned receiver resolves once the pipe is gone.
    async fn establish(
        self: &Arc<Self>,
        mut stream: BoxedStream,
        remote: String,
        endpoint: EndpointId,
    ) -> Result<oneshot::Receiver<()>> {
        match tokio::time::timeout(HANDSHAKE_TIMEOUT, wire::handshake(&mut stream, self.protocol))
            .await
        {
            Ok(peer) => peer?,
            Err(_) => return Err(Error::TimedOut),
        };
        self.attach(stream, remote, endpoint)
    }

    fn attach(
        self: &Arc<Self>,
        stream: BoxedStream,
        remote: String,
        endpoint: EndpointId,
    ) -> Result<oneshot::Receiver<()>> {
        let max = self.with_options(|o| o.max_message_size);
        let cooked_req = self.cooked(Protocol::Req);
        let mut shared = self.shared();
        if shared.closed {
            return Err(Error::Closed);
        }
        if self.protocol == Protocol::Pair && !shared.pipes.is_empty() {
            debug!(socket = self.id, %remote, "pair already has a peer, connection refused");
            return Err(Error::InvalidState("pair socket already has a peer"));
        }
        let id = PipeId::next();
        let (read, write) = tokio::io::split(stream);
        let (outbox, outgoing) = mpsc::unbounded_channel();
        let (gone, departed) = oneshot::channel();
        let span = debug_span!("pipe", socket = self.id, pipe = %id, %remote);
        let handle = runtime::handle();
        let reader = handle.spawn(
            pipe::read_loop(
                Arc::downgrade(self),
                id,
                FrameReader::new(read, max),
                self.inbound_tx.clone(),
            )
            .instrument(span.clone()),
        );
        handle.spawn(
            pipe::write_loop(Arc::downgrade(self), id, FrameWriter::new(write), outgoing)
                .instrument(span),
        );
        debug!(socket = self.id, pipe = %id, %remote, "pipe attached");
        shared.pipes.insert(
            id,
            Pipe {
                id,
                endpoint,
                remote,
                outbox,
                reader,
                _gone: gone,
            },
        );
        if cooked_req {
            shared.dispatch_request();
        }
        if self.protocol.buffers_sends() {
            shared.flush_backlog();
        }
        Ok(departed)
    }

    fn remove_pipe(&self, id: PipeId) {
        let cooked_req = self.cooked(Protocol::Req);
        let mut shared = self.shared();
        let Some(pipe) = shared.pipes.remove(&id) else { return };
        debug!(socket = self.id, pipe = %id, remote = %pipe.remote, "pipe detached");
        if let Some(pending) = shared.request.as_mut() {
            if pending.pipe == Some(id) {
                pending.pipe = None;
            }
        }
        if cooked_req {
            shared.dispatch_request();
        }
    }

    fn add_endpoint(&self, id: EndpointId, endpoint: Endpoint) -> Result<()> {
        let mut shared = self.shared();
        if shared.closed {
            drop(shared);
            endpoint.shutdown();
            return Err(Error::Closed);
        }
        shared.endpoints.insert(id, endpoint);
        Ok(())
    }

    /// Stops a dialer or listener and drops the pipes it created.
    fn remove_endpoint(&self, id: EndpointId) -> Result<()> {
        let cooked_req = self.cooked(Protocol::Req);
        let (endpoint, pipes) = {
            let mut shared = self.shared();
            let endpoint = shared.endpoints.remove(&id).ok_or(Error::Closed)?;
            let doomed: Vec<PipeId> = shared
                .pipes
                .values()
                .filter(|pipe| pipe.endpoint == id)
                .map(|pipe| pipe.id)
                .collect();
            if let Some(pending) = shared.request.as_mut() {
                if pending.pipe.map_or(false, |pipe| doomed.contains(&pipe)) {
                    pending.pipe = None;
                }
            }
            let pipes: Vec<Pipe> = doomed
                .iter()
                .filter_map(|pipe| shared.pipes.remove(pipe))
                .collect();
            if cooked_req {
                shared.dispatch_request();
            }
            (endpoint, pipes)
        };
        endpoint.shutdown();
        debug!(socket = self.id, pipes = pipes.len(), "endpoint closed");
        Ok(())
    }

    fn endpoint_connected(&self, id: EndpointId) -> bool {
        self.shared().pipes.values().any(|pipe| pipe.endpoint == id)
    }

    fn shutdown(&self) -> Result<()> {
        let (pipes, endpoints) = {
            let mut shared = self.shared();
            if shared.closed {
                return Err(Error::Closed);
            }
            shared.closed = true;
            shared.request = None;
            shared.backtrace = None;
            shared.backlog.clear();
            (
                std::mem::take(&mut shared.pipes),
                std::mem::take(&mut shared.endpoints),
            )
        };
        self.closed.send_replace(true);
        for (_, endpoint) in endpoints {
            endpoint.shutdown();
        }
        debug!(socket = self.id, pipes = pipes.len(), "socket closed");
        Ok(())
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        let _ = self.shutdown();
        registry().remove(&self.id);
    }
}

/// Every open socket in the process, for [`Socket::close_all`].
fn registry() -> MutexGuard<'static, HashMap<u32, Weak<Core>>> {
    static SOCKETS: OnceLock<Mutex<HashMap<u32, Weak<Core>>>> = OnceLock::new();
    SOCKETS
        .get_or_init(Default::default)
        .lock()
        .expect("socket registry lock poisoned")
}

/// A messaging endpoint bound to one [`Protocol`].
///
/// Clones are handles to the same socket. Closing any of them closes it for
/// all; a socket with an operation still armed stays open until it is closed
/// explicitly.
#[derive(Clone)]
pub struct Socket {
    core: Arc<Core>,
}

impl Socket {
    pub fn open(protocol: Protocol) -> Self {
        Self::with_options(protocol, SocketOptions::default())
    }

    pub fn with_options(protocol: Protocol, options: SocketOptions) -> Self {
        let name = options.name.clone().unwrap_or_default();
        let core = Arc::new(Core::new(protocol, options));
        registry().insert(core.id, Arc::downgrade(&core));
        debug!(socket = core.id, protocol = protocol.name(), %name, "socket opened");
        Self { core }
    }

    pub fn req() -> Self {
        Self::open(Protocol::Req)
    }

    pub fn rep() -> Self {
        Self::open(Protocol::Rep)
    }

    pub fn bus() -> Self {
        Self::open(Protocol::Bus)
    }

    pub fn pair() -> Self {
        Self::open(Protocol::Pair)
    }

    pub fn push() -> Self {
        Self::open(Protocol::Push)
    }

    pub fn pull() -> Self {
        Self::open(Protocol::Pull)
    }

    /// Closes every socket in the process and returns how many were open.
    /// Meant for teardown; handles held elsewhere see [`Error::Closed`].
    pub fn close_all() -> usize {
        let sockets: Vec<Arc<Core>> = registry().values().filter_map(Weak::upgrade).collect();
        let closed = sockets.iter().filter(|core| core.shutdown().is_ok()).count();
        debug!(closed, "closed every socket");
        closed
    }

    pub(crate) fn core(&self) -> &Arc<Core> {
        &self.core
    }

    /// Process-unique socket number, as it appears in log lines.
    pub fn id(&self) -> u32 {
        self.core.id
    }

    pub fn protocol(&self) -> Protocol {
        self.core.protocol
    }

    /// A snapshot of the current options.
    pub fn options(&self) -> SocketOptions {
        self.core.with_options(|o| o.clone())
    }

    fn set_option(&self, f: impl FnOnce(&mut SocketOptions)) -> Result<()> {
        if self.core.is_closed() {
            return Err(Error::Closed);
        }
        self.core.with_options(f);
        Ok(())
    }

    pub fn set_raw(&self, raw: bool) -> Result<()> {
        self.set_option(|o| o.raw = raw)
    }

    pub fn set_recv_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.set_option(|o| o.recv_timeout = timeout)
    }

    /// Applies to sends right away and to receives on pipes attached after
    /// the call.
    pub fn set_max_message_size(&self, size: usize) -> Result<()> {
        self.set_option(|o| o.max_message_size = size)
    }

    pub fn set_resend_interval(&self, interval: Duration) -> Result<()> {
        self.set_option(|o| o.resend_interval = interval)
    }

    pub fn set_reconnect(&self, min: Duration, max: Duration) -> Result<()> {
        self.set_option(|o| {
            o.reconnect_min = min;
            o.reconnect_max = max.max(min);
        })
    }

    /// Number of live connections.
    pub fn pipe_count(&self) -> usize {
        self.core.shared().pipes.len()
    }

    /// Dials `url`, failing if the first connection attempt fails.
    pub fn dial(&self, url: &str) -> Result<Dialer> {
        Dialer::dial(self, url, DialMode::Blocking)
    }

    pub fn listen(&self, url: &str) -> Result<Listener> {
        Listener::listen(self, url)
    }

    /// A dialer for `url` that does nothing until [`Dialer::start`].
    pub fn dialer(&self, url: &str) -> Result<Dialer> {
        Dialer::create(self, url)
    }

    /// A listener for `url` that binds on [`Listener::start`].
    pub fn listener(&self, url: &str) -> Result<Listener> {
        Listener::create(self, url)
    }

    /// Hands `msg` to the pattern. Never waits for a peer: a cooked request,
    /// or a pair or push message, with no pipe yet is held until one
    /// connects; a bus message with no peers is dropped. Pull sockets
    /// cannot send.
    pub fn send(&self, msg: Msg) -> Result<()> {
        self.core.send(msg).map_err(|(e, _)| e)
    }

    pub fn send_bytes(&self, data: &[u8]) -> Result<()> {
        self.send(Msg::from(data))
    }

    /// Blocks until a message arrives, the receive timeout elapses, or the
    /// socket is closed. Must not be called from inside an async task. Push
    /// sockets cannot receive.
    pub fn recv(&self) -> Result<Msg> {
        let timeout = self.core.with_options(|o| o.recv_timeout);
        runtime::block_on(async {
            match timeout {
                Some(timeout) => match tokio::time::timeout(timeout, self.core.recv()).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::TimedOut),
                },
                None => self.core.recv().await,
            }
        })
    }

    pub fn recv_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.recv()?.body().to_vec())
    }

    /// Sends the message attached to `aio`. Returns at once; the outcome
    /// goes to the callback. On failure the message is handed back through
    /// [`Aio::take_msg`].
    pub fn send_aio(&self, aio: &Aio) -> Result<()> {
        let mut armed = aio.arm(Op::Send)?;
        match armed.take_msg() {
            None => aio.finish(Err(Error::MissingMessage), None),
            Some(msg) => match self.core.send(msg) {
                Ok(()) => aio.finish(Ok(()), None),
                Err((e, msg)) => aio.finish(Err(e), Some(msg)),
            },
        }
        Ok(())
    }

    /// Starts a receive on `aio`. Returns at once; the message or the error
    /// goes to the callback.
    pub fn recv_aio(&self, aio: &Aio) -> Result<()> {
        let armed = aio.arm(Op::Recv)?;
        let core = self.core.clone();
        let aio = aio.clone();
        runtime::handle().spawn(async move {
            match armed.run(core.recv()).await {
                Ok(msg) => aio.finish(Ok(()), Some(msg)),
                Err(e) => aio.finish(Err(e), None),
            }
        });
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Closes the socket. Pending receives finish with [`Error::Closed`],
    /// every pipe is torn down and every dialer and listener stops.
    pub fn close(&self) -> Result<()> {
        self.core.shutdown()
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.core.id)
            .field("protocol", &self.core.protocol)
            .field("pipes", &self.pipe_count())
            .finish()
    }
}
