use std::sync::atomic::{AtomicU32, Ordering};

/// Potential of a node no message has reached yet.
pub const UNREACHABLE: u32 = u32::MAX;

/// One potential per node. Values only ever go down, and only through
/// compare-and-swap, so concurrent updates to one node can neither regress
/// it nor lose the smallest proposal.
#[derive(Debug)]
pub struct Potentials(Vec<AtomicU32>);

impl Potentials {
    pub fn new(nodes: usize) -> Self {
        Self((0..nodes).map(|_| AtomicU32::new(UNREACHABLE)).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, node: usize) -> u32 {
        self.0[node].load(Ordering::Acquire)
    }

    /// Lowers `node` to `candidate` if that is an improvement. Returns
    /// whether this call changed the value.
    pub fn relax(&self, node: usize, candidate: u32) -> bool {
        let slot = &self.0[node];
        let mut current = slot.load(Ordering::Acquire);
        while candidate < current {
            match slot.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    pub fn snapshot(&self) -> Vec<u32> {
        self.0.iter().map(|p| p.load(Ordering::Acquire)).collect()
    }
}
