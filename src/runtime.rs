//! The process-wide runtime behind every socket.
//!
//! Pipe I/O, dialers, listeners and armed operations run as tasks on a
//! multi-threaded tokio runtime. Completion callbacks are handed to its
//! blocking pool, so they are free to sleep or call the synchronous socket
//! API without stalling the I/O workers.
//!
//! A callback that waits on another handle's callback holds one pool thread
//! while the other needs a second. The pool is sized for a few thousand such
//! pairs; beyond that, callbacks queue behind each other and can deadlock.

use std::{future::Future, sync::OnceLock};

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

/// Room for one blocked callback plus the callback it waits on, per node of
/// a few-thousand-node relaxation network.
const MAX_BLOCKING_THREADS: usize = 8192;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        debug!("starting dendrite runtime");
        Builder::new_multi_thread()
            .enable_all()
            .max_blocking_threads(MAX_BLOCKING_THREADS)
            .thread_name("dendrite-io")
            .build()
            .expect("failed to build the dendrite runtime")
    })
}

pub(crate) fn handle() -> &'static Handle {
    runtime().handle()
}

/// Runs a future to completion on the calling thread.
///
/// Works from plain threads and from completion callbacks (which run on the
/// blocking pool), but not from inside an async task. Futures that own a
/// timer must be built inside an `async` block, since the timer is bound to
/// the runtime on creation.
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    handle().block_on(future)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use super::*;

    #[test]
    fn blocking_pool_outgrows_the_tokio_default() {
        // tokio's default ceiling is 512 threads; all of these must run at once
        let parties = 600;
        let barrier = Arc::new(Barrier::new(parties));
        let tasks: Vec<_> = (0..parties)
            .map(|_| {
                let barrier = barrier.clone();
                handle().spawn_blocking(move || {
                    barrier.wait();
                })
            })
            .collect();
        for task in tasks {
            block_on(task).unwrap();
        }
    }
}
