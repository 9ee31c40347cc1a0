//! In-process channel sockets backed by Tokio mpsc queues.
//!
//! [`kernel_pair`] returns the kernel's [`KernelSockets`] together with the
//! matching frontend ends, so a whole kernel can be driven from a test without
//! opening a single port.  Frames are delivered exactly as sent; there is no
//! ROUTER-style identity rewriting, so a frontend that wants routed replies
//! includes its own identity frames before the delimiter.

use async_trait::async_trait;
use bytes::Bytes;
use nbkernel_core::Channel;
use tokio::sync::mpsc;

use super::{FrameSocket, HeartbeatEndpoint, KernelSockets, TransportError};

/// One end of an in-memory socket pair.
pub struct MemorySocket {
    channel: Channel,
    tx: mpsc::UnboundedSender<Vec<Bytes>>,
    rx: mpsc::UnboundedReceiver<Vec<Bytes>>,
}

/// Creates two connected sockets for `channel`.
pub fn channel(channel: Channel) -> (MemorySocket, MemorySocket) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        MemorySocket {
            channel,
            tx: a_tx,
            rx: a_rx,
        },
        MemorySocket {
            channel,
            tx: b_tx,
            rx: b_rx,
        },
    )
}

#[async_trait]
impl FrameSocket for MemorySocket {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn recv_frames(&mut self) -> Result<Vec<Bytes>, TransportError> {
        self.rx
            .recv()
            .await
            .ok_or(TransportError::Closed(self.channel))
    }

    async fn send_frames(&mut self, frames: Vec<Bytes>) -> Result<(), TransportError> {
        if frames.is_empty() {
            return Err(TransportError::EmptyMessage(self.channel));
        }
        self.tx
            .send(frames)
            .map_err(|_| TransportError::Closed(self.channel))
    }
}

/// A heartbeat endpoint that hands over an already connected memory socket.
pub struct MemoryHeartbeat(MemorySocket);

#[async_trait]
impl HeartbeatEndpoint for MemoryHeartbeat {
    async fn open(self: Box<Self>) -> Result<Box<dyn FrameSocket>, TransportError> {
        Ok(Box::new(self.0))
    }
}

/// The frontend ends of an in-memory kernel.
pub struct FrontendSockets {
    pub shell: MemorySocket,
    pub control: MemorySocket,
    pub stdin: MemorySocket,
    pub iopub: MemorySocket,
    pub heartbeat: MemorySocket,
}

/// Creates a full set of kernel sockets and their frontend peers.
pub fn kernel_pair() -> (KernelSockets, FrontendSockets) {
    let (k_shell, f_shell) = channel(Channel::Shell);
    let (k_control, f_control) = channel(Channel::Control);
    let (k_stdin, f_stdin) = channel(Channel::Stdin);
    let (k_iopub, f_iopub) = channel(Channel::IoPub);
    let (k_hb, f_hb) = channel(Channel::Heartbeat);

    let kernel = KernelSockets {
        shell: Box::new(k_shell),
        control: Box::new(k_control),
        stdin: Box::new(k_stdin),
        iopub: Box::new(k_iopub),
        heartbeat: Box::new(MemoryHeartbeat(k_hb)),
    };
    let frontend = FrontendSockets {
        shell: f_shell,
        control: f_control,
        stdin: f_stdin,
        iopub: f_iopub,
        heartbeat: f_hb,
    };
    (kernel, frontend)
}
