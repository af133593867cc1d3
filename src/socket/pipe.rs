use std::{
    fmt,
    sync::{
        atomic::{AtomicU32, Ordering},
        Weak,
    },
};

use tokio::{
    io::{ReadHalf, WriteHalf},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, trace};

use super::{Core, EndpointId};
use crate::{
    hex::HexDisplayExt,
    msg::Msg,
    transport::BoxedStream,
    wire::{FrameReader, FrameWriter},
};

/// Identifies one connection of a socket. Received messages carry the id of
/// the pipe they arrived on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipeId(u32);

impl PipeId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The socket's side of a live connection.
///
/// Dropping it stops the reader, lets the writer drain and shut the stream
/// down, and wakes whoever waits on the pipe's departure.
pub(crate) struct Pipe {
    pub(crate) id: PipeId,
    pub(crate) endpoint: EndpointId,
    pub(crate) remote: String,
    pub(crate) outbox: mpsc::UnboundedSender<Msg>,
    pub(crate) reader: JoinHandle<()>,
    pub(crate) _gone: oneshot::Sender<()>,
}

impl Drop for Pipe {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

pub(crate) async fn read_loop(
    core: Weak<Core>,
    id: PipeId,
    mut frames: FrameReader<ReadHalf<BoxedStream>>,
    inbound: mpsc::UnboundedSender<Msg>,
) {
    loop {
        match frames.recv().await {
            Ok(mut msg) => {
                trace!(header = %msg.header().hex(), len = msg.len(), "frame received");
                msg.set_pipe(Some(id));
                if inbound.send(msg).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "pipe read ended");
                break;
            }
        }
    }
    if let Some(core) = core.upgrade() {
        core.remove_pipe(id);
    }
}

pub(crate) async fn write_loop(
    core: Weak<Core>,
    id: PipeId,
    mut frames: FrameWriter<WriteHalf<BoxedStream>>,
    mut outbox: mpsc::UnboundedReceiver<Msg>,
) {
    while let Some(msg) = outbox.recv().await {
        if let Err(e) = frames.send(msg).await {
            debug!(error = %e, "pipe write failed");
            if let Some(core) = core.upgrade() {
                core.remove_pipe(id);
            }
            return;
        }
    }
    frames.shutdown().await;
}
