//! Single-source shortest hop counts, computed by the nodes of a bus network
//! talking to each other.
//!
//! Every node keeps a potential. When a neighbour announces `v`, the node
//! tries to lower its own potential to `v + 1` and, if that worked,
//! announces the new value in turn. Messages may arrive in any order and
//! more than once; since potentials only decrease, the network still settles
//! on the true distances. Nobody inside the network knows when that has
//! happened, so [`RelaxNetwork::wait_quiescent`] watches from outside.

mod network;
mod potentials;
mod topology;

pub use self::{
    network::{RelaxConfig, RelaxNetwork, RelaxReport},
    potentials::{Potentials, UNREACHABLE},
    topology::{Topology, RANDOM_OUT_DEGREE},
};
