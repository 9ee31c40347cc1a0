//! ZeroMQ-backed channel sockets.
//!
//! | Channel   | Socket type |
//! |-----------|-------------|
//! | shell     | ROUTER      |
//! | control   | ROUTER      |
//! | stdin     | ROUTER      |
//! | iopub     | PUB         |
//! | heartbeat | REP         |
//!
//! ROUTER sockets prepend the peer identity to every received message and use
//! the first frame of every sent message to pick the peer, which is how replies
//! find their way back to the frontend that asked.

use async_trait::async_trait;
use bytes::Bytes;
use nbkernel_core::{Channel, Profile};
use tracing::info;
use zeromq::{PubSocket, RepSocket, RouterSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use super::{FrameSocket, HeartbeatEndpoint, KernelSockets, TransportError};

/// Binds shell, control, stdin and iopub to the profile's endpoints.
///
/// The heartbeat endpoint is returned unbound; it binds when opened on the
/// heartbeat thread.
///
/// # Errors
///
/// Returns [`TransportError::Bind`] if any socket cannot be bound.
pub async fn bind_all(profile: &Profile) -> Result<KernelSockets, TransportError> {
    let shell = ZmqDuplex::bind(RouterSocket::new(), Channel::Shell, profile).await?;
    let control = ZmqDuplex::bind(RouterSocket::new(), Channel::Control, profile).await?;
    let stdin = ZmqDuplex::bind(RouterSocket::new(), Channel::Stdin, profile).await?;
    let iopub = ZmqPublisher::bind(profile).await?;

    Ok(KernelSockets {
        shell: Box::new(shell),
        control: Box::new(control),
        stdin: Box::new(stdin),
        iopub: Box::new(iopub),
        heartbeat: Box::new(ZmqHeartbeat {
            endpoint: profile.endpoint(Channel::Heartbeat),
        }),
    })
}

async fn bind_socket<S: Socket>(
    socket: &mut S,
    channel: Channel,
    endpoint: &str,
) -> Result<(), TransportError> {
    info!("binding {channel} socket to {endpoint}");
    socket
        .bind(endpoint)
        .await
        .map_err(|e| TransportError::Bind {
            channel,
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
    Ok(())
}

fn to_zmq(channel: Channel, frames: Vec<Bytes>) -> Result<ZmqMessage, TransportError> {
    let mut frames = frames.into_iter();
    let first = frames.next().ok_or(TransportError::EmptyMessage(channel))?;
    let mut msg = ZmqMessage::from(first);
    for frame in frames {
        msg.push_back(frame);
    }
    Ok(msg)
}

fn socket_error(channel: Channel, e: zeromq::ZmqError) -> TransportError {
    TransportError::Socket {
        channel,
        reason: e.to_string(),
    }
}

// ── Request/reply sockets ─────────────────────────────────────────────────────

/// A bidirectional ZeroMQ socket (ROUTER or REP).
pub struct ZmqDuplex<S> {
    socket: S,
    channel: Channel,
}

impl<S: Socket> ZmqDuplex<S> {
    /// Binds `socket` to the profile endpoint for `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] on failure.
    pub async fn bind(
        mut socket: S,
        channel: Channel,
        profile: &Profile,
    ) -> Result<Self, TransportError> {
        bind_socket(&mut socket, channel, &profile.endpoint(channel)).await?;
        Ok(Self { socket, channel })
    }
}

#[async_trait]
impl<S> FrameSocket for ZmqDuplex<S>
where
    S: SocketRecv + SocketSend + Send,
{
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn recv_frames(&mut self) -> Result<Vec<Bytes>, TransportError> {
        let msg = self
            .socket
            .recv()
            .await
            .map_err(|e| socket_error(self.channel, e))?;
        Ok(msg.into_vec())
    }

    async fn send_frames(&mut self, frames: Vec<Bytes>) -> Result<(), TransportError> {
        let msg = to_zmq(self.channel, frames)?;
        self.socket
            .send(msg)
            .await
            .map_err(|e| socket_error(self.channel, e))
    }
}

// ── Broadcast socket ──────────────────────────────────────────────────────────

/// The iopub PUB socket.  Send-only.
pub struct ZmqPublisher {
    socket: PubSocket,
}

impl ZmqPublisher {
    /// Binds a PUB socket to the profile's iopub endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] on failure.
    pub async fn bind(profile: &Profile) -> Result<Self, TransportError> {
        let mut socket = PubSocket::new();
        bind_socket(&mut socket, Channel::IoPub, &profile.endpoint(Channel::IoPub)).await?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl FrameSocket for ZmqPublisher {
    fn channel(&self) -> Channel {
        Channel::IoPub
    }

    async fn recv_frames(&mut self) -> Result<Vec<Bytes>, TransportError> {
        Err(TransportError::SendOnly(Channel::IoPub))
    }

    async fn send_frames(&mut self, frames: Vec<Bytes>) -> Result<(), TransportError> {
        let msg = to_zmq(Channel::IoPub, frames)?;
        self.socket
            .send(msg)
            .await
            .map_err(|e| socket_error(Channel::IoPub, e))
    }
}

// ── Heartbeat ─────────────────────────────────────────────────────────────────

/// Heartbeat REP endpoint, bound lazily on the heartbeat thread.
pub struct ZmqHeartbeat {
    endpoint: String,
}

#[async_trait]
impl HeartbeatEndpoint for ZmqHeartbeat {
    async fn open(self: Box<Self>) -> Result<Box<dyn FrameSocket>, TransportError> {
        let mut socket = RepSocket::new();
        bind_socket(&mut socket, Channel::Heartbeat, &self.endpoint).await?;
        Ok(Box::new(ZmqDuplex {
            socket,
            channel: Channel::Heartbeat,
        }))
    }
}
