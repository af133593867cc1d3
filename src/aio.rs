//! Completion handles for asynchronous socket operations.
//!
//! An [`Aio`] carries one send or receive at a time. It is armed by
//! [`Socket::send_aio`](crate::socket::Socket::send_aio) or
//! [`Socket::recv_aio`](crate::socket::Socket::recv_aio), and when the
//! operation finishes its callback runs on the shared blocking pool. The
//! callback reads [`Aio::result`], takes the message if there is one, and
//! re-arms the handle if it wants another round; operations never repeat by
//! themselves.
//!
//! ```text
//! Idle --arm--> Armed(Send|Recv) --finish--> Completed --arm--> Armed ...
//! ```

use std::{
    fmt,
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Condvar, Mutex, MutexGuard},
    time::Duration,
};

use tokio::sync::oneshot;
use tracing::{error, trace};

use crate::{
    error::{Error, Result},
    msg::Msg,
    runtime,
};

/// The kind of operation an [`Aio`] is armed with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Send,
    Recv,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Armed(Op),
    Completed,
}

struct State {
    phase: Phase,
    result: Result<()>,
    msg: Option<Msg>,
    timeout: Option<Duration>,
    cancel: Option<oneshot::Sender<()>>,
    /// Callbacks dispatched but not yet returned.
    running: usize,
}

impl State {
    fn busy(&self) -> bool {
        matches!(self.phase, Phase::Armed(_)) || self.running > 0
    }
}

type Callback = Box<dyn Fn(&Aio) + Send + Sync>;

struct Inner {
    state: Mutex<State>,
    settled: Condvar,
    callback: Callback,
}

/// A reusable handle for one outstanding asynchronous operation.
///
/// Cloning yields another handle to the same operation slot.
#[derive(Clone)]
pub struct Aio {
    inner: Arc<Inner>,
}

impl Aio {
    /// Creates a handle whose `callback` runs once per finished operation.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Aio) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    result: Ok(()),
                    msg: None,
                    timeout: None,
                    cancel: None,
                    running: 0,
                }),
                settled: Condvar::new(),
                callback: Box::new(callback),
            }),
        }
    }

    /// Creates a handle whose callback also receives `context` on every
    /// invocation, e.g. the index of the node or client it serves.
    pub fn with_context<C, F>(context: C, callback: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(&Aio, &C) + Send + Sync + 'static,
    {
        Self::new(move |aio| callback(aio, &context))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().expect("aio state lock poisoned")
    }

    /// Outcome of the last finished operation.
    pub fn result(&self) -> Result<()> {
        self.state().result.clone()
    }

    /// Takes the message delivered by a receive, or handed back by a failed
    /// send.
    pub fn take_msg(&self) -> Option<Msg> {
        self.state().msg.take()
    }

    /// Attaches the message the next send will transmit.
    pub fn set_msg(&self, msg: Msg) {
        self.state().msg = Some(msg);
    }

    /// Bounds every following operation; an operation still running when
    /// the timeout elapses finishes with [`Error::TimedOut`].
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.state().timeout = timeout;
    }

    /// True while an operation is outstanding or its callback is running.
    pub fn is_busy(&self) -> bool {
        self.state().busy()
    }

    /// Asks the outstanding operation to stop early. The callback still
    /// fires, with [`Error::Canceled`]. Does nothing when idle.
    pub fn cancel(&self) {
        if let Some(cancel) = self.state().cancel.take() {
            trace!("canceling aio operation");
            let _ = cancel.send(());
        }
    }

    /// Blocks until no operation is outstanding and the last callback has
    /// returned. Must not be called from this handle's own callback.
    pub fn wait(&self) {
        let state = self.state();
        let _state = self
            .inner
            .settled
            .wait_while(state, |state| state.busy())
            .expect("aio state lock poisoned");
    }

    /// Cancels the outstanding operation, then waits for it to settle.
    pub fn stop(&self) {
        self.cancel();
        self.wait();
    }

    /// Moves the handle to `Armed(op)`. A send takes the attached message
    /// with it.
    pub(crate) fn arm(&self, op: Op) -> Result<Armed> {
        let mut state = self.state();
        if let Phase::Armed(current) = state.phase {
            error!(?current, requested = ?op, "aio armed while an operation is outstanding");
            return Err(Error::AlreadyArmed);
        }
        let msg = match op {
            Op::Send => state.msg.take(),
            Op::Recv => {
                // an unclaimed message from an earlier receive is released
                state.msg = None;
                None
            }
        };
        let (cancel, canceled) = oneshot::channel();
        state.phase = Phase::Armed(op);
        state.result = Ok(());
        state.cancel = Some(cancel);
        trace!(?op, "aio armed");
        Ok(Armed {
            msg,
            timeout: state.timeout,
            canceled,
        })
    }

    /// Records the outcome and hands the callback to the blocking pool.
    pub(crate) fn finish(&self, result: Result<()>, msg: Option<Msg>) {
        {
            let mut state = self.state();
            trace!(?result, "aio finished");
            state.phase = Phase::Completed;
            state.result = result;
            state.msg = msg;
            state.cancel = None;
            state.running += 1;
        }
        let aio = self.clone();
        runtime::handle().spawn_blocking(move || {
            // a panicking callback must still settle the handle
            if panic::catch_unwind(AssertUnwindSafe(|| (aio.inner.callback)(&aio))).is_err() {
                error!("aio callback panicked");
            }
            let mut state = aio.state();
            state.running -= 1;
            if !state.busy() && state.phase == Phase::Completed {
                state.phase = Phase::Idle;
            }
            drop(state);
            aio.inner.settled.notify_all();
        });
    }
}

impl fmt::Debug for Aio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Aio")
            .field("phase", &state.phase)
            .field("result", &state.result)
            .field("running", &state.running)
            .finish()
    }
}

/// An operation that has been accepted by an [`Aio`] and is about to run.
pub(crate) struct Armed {
    msg: Option<Msg>,
    timeout: Option<Duration>,
    canceled: oneshot::Receiver<()>,
}

impl Armed {
    pub(crate) fn take_msg(&mut self) -> Option<Msg> {
        self.msg.take()
    }

    /// Drives `op` until it finishes, the handle's timeout elapses, or the
    /// handle is canceled.
    pub(crate) async fn run<T, F>(self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let Armed {
            timeout,
            mut canceled,
            ..
        } = self;
        let op = async move {
            match timeout {
                Some(timeout) => match tokio::time::timeout(timeout, op).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::TimedOut),
                },
                None => op.await,
            }
        };
        tokio::select! {
            result = op => result,
            Ok(()) = &mut canceled => Err(Error::Canceled),
        }
    }
}
