//! Many concurrent requests multiplexed over one raw request socket.
//!
//! Each request gets a cookie (a 32 bit counter with the high bit forced on)
//! in its header. The server echoes headers untouched, so a single receive
//! loop on the client can hand every reply to the caller waiting on its
//! cookie, whatever order replies come back in.

mod client;
mod server;

use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Mutex, MutexGuard,
};

use hashbrown::HashMap;
use tokio::sync::oneshot;
use tracing::{error, trace};

pub use self::{
    client::RpcClient,
    server::{delay_handler, RpcServer},
};
use crate::msg::Msg;

/// Where the cookie counter starts.
pub const FIRST_COOKIE: u32 = 700;
const COOKIE_FLAG: u32 = 0x8000_0000;

/// Outstanding requests keyed by cookie, each with a one-shot slot for its
/// reply.
#[derive(Debug)]
pub struct CorrelationTable {
    counter: AtomicU32,
    waiters: Mutex<HashMap<u32, oneshot::Sender<Msg>>>,
    violations: AtomicU64,
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            counter: AtomicU32::new(FIRST_COOKIE),
            waiters: Mutex::new(HashMap::new()),
            violations: AtomicU64::new(0),
        }
    }

    fn waiters(&self) -> MutexGuard<'_, HashMap<u32, oneshot::Sender<Msg>>> {
        self.waiters.lock().expect("correlation table poisoned")
    }

    pub fn next_cookie(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1) | COOKIE_FLAG
    }

    /// Allocates a cookie and the receiver its reply will arrive on.
    pub fn register(&self) -> (u32, oneshot::Receiver<Msg>) {
        let cookie = self.next_cookie();
        let (tx, rx) = oneshot::channel();
        self.waiters().insert(cookie, tx);
        (cookie, rx)
    }

    /// Hands `reply` to whoever waits on `cookie`. A reply nobody waits for
    /// is a protocol violation: it is counted, logged and dropped.
    pub fn complete(&self, cookie: u32, reply: Msg) -> bool {
        let waiter = self.waiters().remove(&cookie);
        match waiter {
            Some(waiter) => {
                trace!(cookie = format_args!("{:#010x}", cookie), "reply matched");
                // the caller may have given up in the meantime
                waiter.send(reply).is_ok()
            }
            None => {
                self.record_violation(cookie);
                false
            }
        }
    }

    pub fn record_violation(&self, cookie: u32) {
        self.violations.fetch_add(1, Ordering::Relaxed);
        error!(
            cookie = format_args!("{:#010x}", cookie),
            "reply does not match any outstanding request"
        );
    }

    /// Drops the waiter for `cookie`, e.g. after its caller timed out.
    pub fn forget(&self, cookie: u32) -> bool {
        self.waiters().remove(&cookie).is_some()
    }

    pub fn in_flight(&self) -> usize {
        self.waiters().len()
    }

    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    /// Drops every waiter; their callers see the table as closed.
    pub fn clear(&self) {
        self.waiters().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc, thread};

    use super::*;

    #[test]
    fn cookies_have_the_high_bit_and_start_after_700() {
        let table = CorrelationTable::new();
        assert_eq!(table.next_cookie(), 701 | COOKIE_FLAG);
        assert_eq!(table.next_cookie(), 702 | COOKIE_FLAG);
    }

    #[test]
    fn cookies_are_unique_across_threads() {
        let table = Arc::new(CorrelationTable::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                thread::spawn(move || (0..1000).map(|_| table.next_cookie()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for cookie in handle.join().unwrap() {
                assert!(cookie & COOKIE_FLAG != 0);
                assert!(seen.insert(cookie));
            }
        }
    }

    #[test]
    fn complete_wakes_exactly_the_matching_waiter() {
        let table = CorrelationTable::new();
        let (first, mut first_rx) = table.register();
        let (second, mut second_rx) = table.register();
        assert_eq!(table.in_flight(), 2);

        assert!(table.complete(second, Msg::from(&b"two"[..])));
        assert_eq!(second_rx.try_recv().unwrap().body(), b"two");
        assert!(first_rx.try_recv().is_err());

        assert!(table.complete(first, Msg::from(&b"one"[..])));
        assert_eq!(first_rx.try_recv().unwrap().body(), b"one");
        assert_eq!(table.in_flight(), 0);
    }

    #[test]
    fn unknown_cookie_is_a_violation() {
        let table = CorrelationTable::new();
        assert!(!table.complete(0x8000_0001, Msg::new()));
        assert_eq!(table.violations(), 1);
    }

    #[test]
    fn forgotten_waiters_turn_late_replies_into_violations() {
        let table = CorrelationTable::new();
        let (cookie, _rx) = table.register();
        assert!(table.forget(cookie));
        assert!(!table.forget(cookie));
        assert!(!table.complete(cookie, Msg::new()));
        assert_eq!(table.violations(), 1);
    }
}
