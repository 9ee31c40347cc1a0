//! Channel transport: five sockets carrying raw multipart frames.
//!
//! The transport never looks inside a message.  Shell, control and stdin are
//! routed request/reply sockets, iopub is send-only broadcast, and heartbeat
//! echoes whatever arrives.
//!
//! Two implementations exist:
//!
//! - **`zmq`** – ZeroMQ sockets bound to the ports of a connection profile.
//! - **`memory`** – in-process socket pairs, used by tests and for embedding a
//!   kernel next to its frontend.
//!
//! The heartbeat socket is handed over as a [`HeartbeatEndpoint`] rather than
//! a ready socket so that it can be opened on the dedicated thread that serves
//! it; nothing on that path is shared with the other four channels.

pub mod memory;
pub mod zmq;

use async_trait::async_trait;
use bytes::Bytes;
use nbkernel_core::Channel;
use thiserror::Error;

/// Error type for socket operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {channel} socket to {endpoint}: {reason}")]
    Bind {
        channel: Channel,
        endpoint: String,
        reason: String,
    },

    #[error("{channel} socket error: {reason}")]
    Socket { channel: Channel, reason: String },

    #[error("{0} socket is closed")]
    Closed(Channel),

    #[error("{0} socket does not support receiving")]
    SendOnly(Channel),

    #[error("refusing to send an empty multipart message on {0}")]
    EmptyMessage(Channel),
}

/// One bound endpoint that moves complete multipart messages.
#[async_trait]
pub trait FrameSocket: Send {
    /// The channel this socket serves, used in logs and errors.
    fn channel(&self) -> Channel;

    /// Waits for the next complete multipart message.
    async fn recv_frames(&mut self) -> Result<Vec<Bytes>, TransportError>;

    /// Sends one complete multipart message.
    async fn send_frames(&mut self, frames: Vec<Bytes>) -> Result<(), TransportError>;
}

/// Opens the heartbeat socket on the thread that will serve it.
#[async_trait]
pub trait HeartbeatEndpoint: Send {
    async fn open(self: Box<Self>) -> Result<Box<dyn FrameSocket>, TransportError>;
}

/// The kernel's five channel endpoints.
pub struct KernelSockets {
    pub shell: Box<dyn FrameSocket>,
    pub control: Box<dyn FrameSocket>,
    pub stdin: Box<dyn FrameSocket>,
    pub iopub: Box<dyn FrameSocket>,
    pub heartbeat: Box<dyn HeartbeatEndpoint>,
}
