use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use tracing::{debug, info, trace, warn};
use typed_builder::TypedBuilder;

use super::{Potentials, Topology, UNREACHABLE};
use crate::{
    aio::Aio,
    error::{Error, Result},
    msg::Msg,
    socket::{Dialer, Listener, Socket},
};

#[derive(TypedBuilder, Clone, Debug)]
pub struct RelaxConfig {
    /// Node `i` listens on `{prefix}{i}`.
    #[builder(default = "inproc://relax-".to_string(), setter(into))]
    pub prefix: String,
    #[builder(default)]
    pub source: usize,
    /// How often the received counter is sampled while waiting for
    /// quiescence.
    #[builder(default = Duration::from_millis(100))]
    pub poll_interval: Duration,
    /// Upper bound on [`RelaxNetwork::wait_quiescent`].
    #[builder(default = Duration::from_secs(60))]
    pub max_duration: Duration,
    /// How long [`RelaxNetwork::build`] waits for every pipe to come up.
    #[builder(default = Duration::from_secs(10))]
    pub wiring_timeout: Duration,
}

impl Default for RelaxConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RelaxConfig {
    fn address(&self, node: usize) -> String {
        format!("{}{}", self.prefix, node)
    }
}

/// What a run looked like when the counter stopped moving.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelaxReport {
    /// Receive completions over all nodes, failed ones included.
    pub received: u64,
    pub elapsed: Duration,
    pub potentials: Vec<u32>,
    /// False when `max_duration` ran out before the network went quiet.
    pub quiescent: bool,
}

impl RelaxReport {
    pub fn reached(&self) -> usize {
        self.potentials.iter().filter(|&&p| p != UNREACHABLE).count()
    }
}

struct Shared {
    sockets: Vec<Socket>,
    senders: Vec<Mutex<Aio>>,
    potentials: Potentials,
    received: AtomicU64,
}

/// One bus socket per node, wired according to a [`Topology`].
///
/// Nodes have no threads of their own. Each owns a receive [`Aio`] whose
/// callback relaxes the node's potential and, on improvement, broadcasts the
/// new value to every neighbour.
///
/// A receive callback waits for its node's previous broadcast to settle, so
/// a burst can hold two blocking-pool threads per node. The shared runtime
/// allows a few thousand nodes before callbacks start queueing.
pub struct RelaxNetwork {
    config: RelaxConfig,
    topology: Topology,
    shared: Arc<Shared>,
    receivers: Vec<Aio>,
    _listeners: Vec<Listener>,
    _dialers: Vec<Dialer>,
}

impl RelaxNetwork {
    /// Opens the sockets, listens, dials every edge and waits until each
    /// socket has all its pipes.
    pub fn build(topology: Topology, config: RelaxConfig) -> Result<Self> {
        let nodes = topology.nodes();
        if config.source >= nodes {
            return Err(Error::InvalidState("relaxation source is not a node"));
        }
        let sockets: Vec<Socket> = (0..nodes).map(|_| Socket::bus()).collect();
        let listeners = sockets
            .iter()
            .enumerate()
            .map(|(node, socket)| socket.listen(&config.address(node)))
            .collect::<Result<Vec<_>>>()?;
        let dialers = topology
            .edges()
            .iter()
            .map(|&(from, to)| sockets[from].dial(&config.address(to)))
            .collect::<Result<Vec<_>>>()?;

        let deadline = Instant::now() + config.wiring_timeout;
        for (node, socket) in sockets.iter().enumerate() {
            let expected = topology.expected_pipes(node);
            while socket.pipe_count() < expected {
                if Instant::now() >= deadline {
                    warn!(node, expected, pipes = socket.pipe_count(), "network not wired in time");
                    return Err(Error::TimedOut);
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        debug!(nodes, edges = topology.edges().len(), "relaxation network wired");

        let senders = (0..nodes)
            .map(|node| {
                Mutex::new(Aio::new(move |aio| {
                    if let Err(e) = aio.result() {
                        trace!(node, error = %e, "broadcast dropped");
                        drop(aio.take_msg());
                    }
                }))
            })
            .collect();
        let shared = Arc::new(Shared {
            sockets,
            senders,
            potentials: Potentials::new(nodes),
            received: AtomicU64::new(0),
        });
        let receivers = (0..nodes)
            .map(|node| {
                let shared = shared.clone();
                Aio::with_context(node, move |aio, &node| on_received(&shared, aio, node))
            })
            .collect();
        Ok(Self {
            config,
            topology,
            shared,
            receivers,
            _listeners: listeners,
            _dialers: dialers,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn potentials(&self) -> &Potentials {
        &self.shared.potentials
    }

    pub fn received(&self) -> u64 {
        self.shared.received.load(Ordering::Relaxed)
    }

    /// Arms every node and has the source announce potential zero.
    pub fn start(&self) -> Result<()> {
        for (socket, receiver) in self.shared.sockets.iter().zip(&self.receivers) {
            socket.recv_aio(receiver)?;
        }
        let source = self.config.source;
        self.shared.potentials.relax(source, 0);
        let mut msg = Msg::new();
        msg.append_u32(0);
        info!(source, nodes = self.topology.nodes(), "relaxation started");
        self.shared.sockets[source].send(msg)
    }

    /// Samples the received counter every `poll_interval` and returns once a
    /// whole interval passes without a new completion.
    ///
    /// A quiet interval is strong evidence of a fixpoint, not proof: a
    /// message delayed for longer than the interval would be missed.
    pub fn wait_quiescent(&self) -> RelaxReport {
        let started = Instant::now();
        let mut last = self.received();
        let quiescent = loop {
            std::thread::sleep(self.config.poll_interval);
            let now = self.received();
            if now == last {
                break true;
            }
            last = now;
            if started.elapsed() >= self.config.max_duration {
                break false;
            }
        };
        let report = RelaxReport {
            received: last,
            elapsed: started.elapsed(),
            potentials: self.shared.potentials.snapshot(),
            quiescent,
        };
        info!(
            received = report.received,
            reached = report.reached(),
            elapsed = ?report.elapsed,
            quiescent,
            "relaxation settled"
        );
        report
    }

    /// Closes every socket, which ends every receive loop.
    pub fn close(&self) {
        for socket in &self.shared.sockets {
            let _ = socket.close();
        }
        for receiver in &self.receivers {
            receiver.wait();
        }
        for sender in &self.shared.senders {
            sender.lock().expect("sender lock poisoned").wait();
        }
    }
}

impl Drop for RelaxNetwork {
    fn drop(&mut self) {
        self.close();
    }
}

fn on_received(shared: &Shared, aio: &Aio, node: usize) {
    shared.received.fetch_add(1, Ordering::Relaxed);
    if let Err(e) = aio.result() {
        trace!(node, error = %e, "receive loop stopped");
        return;
    }
    let Some(mut msg) = aio.take_msg() else { return };
    let socket = &shared.sockets[node];
    if let Err(e) = socket.recv_aio(aio) {
        warn!(node, error = %e, "could not re-arm receive");
    }
    let Ok(value) = msg.chop_u32() else {
        warn!(node, "potential update without a value");
        return;
    };
    if !shared.potentials.relax(node, value.saturating_add(1)) {
        return;
    }
    let potential = shared.potentials.get(node);
    trace!(node, potential, "potential lowered");
    msg.clear();
    msg.append_u32(potential);
    let sender = shared.senders[node].lock().expect("sender lock poisoned");
    sender.wait();
    sender.set_msg(msg);
    if let Err(e) = socket.send_aio(&sender) {
        debug!(node, error = %e, "broadcast not started");
    }
}
