//! Dispatch loop: turns channel traffic into handler calls and replies.
//!
//! # Task layout
//!
//! ```text
//! KernelServer::run()
//!  ├─ heartbeat   (own OS thread + current-thread runtime, echo only)
//!  ├─ iopub       (single owner of the PUB socket, drains the publication queue)
//!  ├─ stdin       (forwards input_request, waits for input_reply)
//!  ├─ shell       (requests answered in arrival order)
//!  └─ control     (interrupt / shutdown / kernel_info, never queued behind shell)
//! ```
//!
//! For every accepted shell/control request the loop publishes `busy`, calls
//! the handler, publishes `idle` (waiting until it has been written), then
//! sends the reply on the channel the request came from.  A message that fails
//! to parse, verify or decode is logged and dropped; it never stops the loop.
//!
//! The heartbeat socket is opened before any other task starts; if that fails
//! [`KernelServer::run`] returns the error without serving anything.  A later
//! heartbeat failure stops the kernel and is reported by `run`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nbkernel_core::protocol::messages::{
    ExecuteInput, ExecuteReply, ExecuteRequest, ExecuteResult, ExecutionState, InputReply,
    Shutdown, Status,
};
use nbkernel_core::wire::iopub_topic;
use nbkernel_core::{Channel, Content, Envelope, FrameError, Message, MessageType, Session, Signer};
use serde_json::Map;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::execution::ExecutionCounter;
use super::handler::{ExecuteOutcome, KernelHandler};
use super::output::{InputCall, OutputHandle, Publication};
use crate::infrastructure::transport::{
    FrameSocket, HeartbeatEndpoint, KernelSockets, TransportError,
};

/// Error type for the kernel runtime.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("the current request does not allow stdin")]
    StdinNotAllowed,

    #[error("input request was cancelled before a reply arrived")]
    InputCancelled,

    #[error("heartbeat failure: {0}")]
    Heartbeat(String),

    #[error("kernel task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// A one-way latch that stops every channel task once triggered.
///
/// Cloned handles share the same latch.  Triggering is idempotent.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`trigger`](Self::trigger) has been called.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        rx.wait_for(|triggered| *triggered).await.ok();
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ── Kernel server ─────────────────────────────────────────────────────────────

/// Serves one kernel session over a set of channel sockets.
pub struct KernelServer<H> {
    handler: Arc<H>,
    signer: Arc<Signer>,
    session: Arc<Session>,
    counter: Arc<ExecutionCounter>,
    interrupted: Arc<AtomicBool>,
    shutdown: ShutdownSignal,
}

impl<H: KernelHandler> KernelServer<H> {
    pub fn new(handler: H, signer: Signer, session: Session) -> Self {
        Self {
            handler: Arc::new(handler),
            signer: Arc::new(signer),
            session: Arc::new(session),
            counter: Arc::new(ExecutionCounter::new()),
            interrupted: Arc::new(AtomicBool::new(false)),
            shutdown: ShutdownSignal::new(),
        }
    }

    /// A handle that stops [`run`](Self::run) from outside, e.g. on Ctrl-C.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn execution_counter(&self) -> Arc<ExecutionCounter> {
        Arc::clone(&self.counter)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs all five channels until shutdown.
    ///
    /// Returns once a `shutdown_request` has been answered, the
    /// [`ShutdownSignal`] fires, or a request socket closes.
    ///
    /// # Errors
    ///
    /// Returns the heartbeat socket's open error before serving anything.
    /// Otherwise returns the first failure of a channel task or of the
    /// heartbeat thread.
    pub async fn run(self, sockets: KernelSockets) -> Result<(), KernelError> {
        let KernelSockets {
            shell,
            control,
            stdin,
            iopub,
            heartbeat,
        } = sockets;

        info!(session = %self.session.id, "kernel starting");
        let heartbeat = spawn_heartbeat(heartbeat, self.shutdown.clone()).await?;

        let (iopub_tx, iopub_rx) = mpsc::unbounded_channel();
        let iopub_task = tokio::spawn(serve_iopub(iopub, iopub_rx, Arc::clone(&self.signer)));
        let starting = Message::new(
            Content::Status(Status {
                execution_state: ExecutionState::Starting,
            }),
            &self.session,
        );
        if iopub_tx
            .send(Publication {
                message: starting,
                written: None,
            })
            .is_err()
        {
            warn!("iopub task exited before the starting status was queued");
        }

        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        let stdin_task = tokio::spawn(serve_stdin(
            stdin,
            stdin_rx,
            Arc::clone(&self.signer),
            self.shutdown.clone(),
        ));

        let dispatcher = Arc::new(Dispatcher {
            handler: Arc::clone(&self.handler),
            signer: Arc::clone(&self.signer),
            session: Arc::clone(&self.session),
            counter: Arc::clone(&self.counter),
            interrupted: Arc::clone(&self.interrupted),
            iopub: iopub_tx,
            stdin: stdin_tx,
            shutdown: self.shutdown.clone(),
        });
        let shell_task = tokio::spawn(serve_channel(Arc::clone(&dispatcher), shell));
        let control_task = tokio::spawn(serve_channel(dispatcher, control));

        let mut first_error = None;
        for result in [shell_task.await, control_task.await, stdin_task.await] {
            if let Err(e) = result.map_err(KernelError::from).and_then(|r| r) {
                error!("channel task failed: {e}");
                first_error.get_or_insert(e);
            }
        }

        // Every queue sender is gone once the channel tasks have returned, so
        // the iopub task drains what is left and exits.
        if let Err(e) = iopub_task.await {
            first_error.get_or_insert(e.into());
        }

        if let Err(e) = join_heartbeat(heartbeat).await {
            first_error.get_or_insert(e);
        }

        info!(executions = self.counter.current(), "kernel stopped");
        first_error.map_or(Ok(()), Err)
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Shared state of the shell and control tasks.
struct Dispatcher<H> {
    handler: Arc<H>,
    signer: Arc<Signer>,
    session: Arc<Session>,
    counter: Arc<ExecutionCounter>,
    interrupted: Arc<AtomicBool>,
    iopub: mpsc::UnboundedSender<Publication>,
    stdin: mpsc::UnboundedSender<InputCall>,
    shutdown: ShutdownSignal,
}

/// Whether `msg_type` is served on `channel`.
fn accepts(channel: Channel, msg_type: MessageType) -> bool {
    match channel {
        Channel::Control => matches!(
            msg_type,
            MessageType::KernelInfoRequest
                | MessageType::ShutdownRequest
                | MessageType::InterruptRequest
        ),
        Channel::Shell => matches!(
            msg_type,
            MessageType::KernelInfoRequest
                | MessageType::CommInfoRequest
                | MessageType::ExecuteRequest
                | MessageType::InspectRequest
                | MessageType::CompleteRequest
                | MessageType::IsCompleteRequest
                | MessageType::HistoryRequest
                | MessageType::ShutdownRequest
                | MessageType::CommOpen
                | MessageType::CommMsg
                | MessageType::CommClose
        ),
        _ => false,
    }
}

/// Keeps `reply` only when it is the reply type paired with `request_type`.
///
/// Comm traffic has no paired reply, so anything produced for it is dropped.
fn labelled_reply(request_type: MessageType, reply: Option<Content>) -> Option<Content> {
    let expected = request_type.reply_type();
    match (expected, reply) {
        (Some(expected), Some(content)) if content.message_type() == expected => Some(content),
        (Some(expected), None) => {
            error!("no {expected} produced for {request_type}");
            None
        }
        (_, Some(content)) => {
            error!(
                "dropping {} produced for {request_type}",
                content.message_type()
            );
            None
        }
        (None, None) => None,
    }
}

impl<H: KernelHandler> Dispatcher<H> {
    /// Handles one decoded request and returns the reply to send, if any.
    async fn dispatch(&self, channel: Channel, request: Message) -> Option<Message> {
        let msg_type = request.message_type();
        if !accepts(channel, msg_type) {
            warn!("ignoring {msg_type} received on {channel}");
            return None;
        }
        debug!(msg_id = %request.header.message_id, "dispatching {msg_type} from {channel}");

        let output = self.output_for(&request);
        output.publish(Content::Status(Status {
            execution_state: ExecutionState::Busy,
        }));
        let reply = self.handle(&request, &output).await;
        output
            .publish_and_wait(Content::Status(Status {
                execution_state: ExecutionState::Idle,
            }))
            .await;

        labelled_reply(msg_type, reply)
            .map(|content| Message::child_of(&request.header, content, &self.session))
    }

    fn output_for(&self, request: &Message) -> OutputHandle {
        let stdin = match &request.content {
            Content::ExecuteRequest(req) if req.allow_stdin => Some(self.stdin.clone()),
            _ => None,
        };
        OutputHandle::new(
            request.header.clone(),
            Arc::clone(&self.session),
            self.iopub.clone(),
            stdin,
            Arc::clone(&self.interrupted),
        )
    }

    async fn handle(&self, request: &Message, output: &OutputHandle) -> Option<Content> {
        let handler = &self.handler;
        match &request.content {
            Content::KernelInfoRequest => Some(Content::KernelInfoReply(handler.kernel_info())),
            Content::ExecuteRequest(req) => Some(self.execute(req, output).await),
            Content::InspectRequest(req) => Some(Content::InspectReply(handler.inspect(req).await)),
            Content::CompleteRequest(req) => {
                Some(Content::CompleteReply(handler.complete(req).await))
            }
            Content::IsCompleteRequest(req) => {
                Some(Content::IsCompleteReply(handler.is_complete(req).await))
            }
            Content::HistoryRequest(req) => Some(Content::HistoryReply(handler.history(req).await)),
            Content::CommInfoRequest(req) => {
                Some(Content::CommInfoReply(handler.comm_info(req).await))
            }
            Content::CommOpen(req) => {
                handler.comm_open(req, output).await;
                None
            }
            Content::CommMsg(req) => {
                handler.comm_msg(req, output).await;
                None
            }
            Content::CommClose(req) => {
                handler.comm_close(req, output).await;
                None
            }
            Content::InterruptRequest => {
                info!("interrupt requested");
                self.interrupted.store(true, Ordering::Release);
                handler.interrupt().await;
                Some(Content::InterruptReply)
            }
            Content::ShutdownRequest(req) => {
                info!(restart = req.restart, "shutdown requested");
                self.interrupted.store(true, Ordering::Release);
                handler.shutdown(req.restart).await;
                Some(Content::ShutdownReply(Shutdown {
                    restart: req.restart,
                }))
            }
            other => {
                debug!("no handler for {}", other.message_type());
                None
            }
        }
    }

    async fn execute(&self, request: &ExecuteRequest, output: &OutputHandle) -> Content {
        self.interrupted.store(false, Ordering::Release);
        let execution_count = if request.silent {
            self.counter.current()
        } else {
            self.counter.next()
        };
        if !request.silent {
            output.publish(Content::ExecuteInput(ExecuteInput {
                code: request.code.clone(),
                execution_count,
            }));
        }

        let outcome = self
            .handler
            .execute(request, execution_count, output)
            .await;
        let status = outcome.status();
        let reply = match outcome {
            ExecuteOutcome::Ok {
                result,
                pager,
                user_expressions,
            } => {
                if let Some(data) = result.filter(|_| !request.silent) {
                    output.publish(Content::ExecuteResult(ExecuteResult {
                        execution_count,
                        data,
                    }));
                }
                ExecuteReply {
                    status,
                    execution_count,
                    pager,
                    user_expressions,
                    error: None,
                }
            }
            ExecuteOutcome::Error(report) => {
                output.publish(Content::Error(report.clone()));
                ExecuteReply {
                    status,
                    execution_count,
                    pager: Vec::new(),
                    user_expressions: Map::new(),
                    error: Some(report),
                }
            }
            ExecuteOutcome::Aborted => ExecuteReply {
                status,
                execution_count,
                pager: Vec::new(),
                user_expressions: Map::new(),
                error: None,
            },
        };
        Content::ExecuteReply(reply)
    }
}

/// Serves one request/reply channel (shell or control).
async fn serve_channel<H: KernelHandler>(
    dispatcher: Arc<Dispatcher<H>>,
    mut socket: Box<dyn FrameSocket>,
) -> Result<(), KernelError> {
    let channel = socket.channel();
    debug!("{channel} task started");
    loop {
        let frames = tokio::select! {
            _ = dispatcher.shutdown.wait() => break,
            frames = socket.recv_frames() => frames,
        };
        let frames = match frames {
            Ok(frames) => frames,
            Err(TransportError::Closed(_)) => {
                info!("{channel} socket closed; shutting down");
                dispatcher.shutdown.trigger();
                break;
            }
            Err(e) => {
                dispatcher.shutdown.trigger();
                return Err(e.into());
            }
        };

        let request = match Envelope::open(frames, &dispatcher.signer) {
            Ok(request) => request,
            Err(e) => {
                warn!("dropping message on {channel}: {e}");
                continue;
            }
        };

        let Some(reply) = dispatcher.dispatch(channel, request).await else {
            continue;
        };
        let reply_type = reply.message_type();
        match Envelope::from_message(&reply, &dispatcher.signer) {
            Ok(envelope) => {
                if let Err(e) = socket.send_frames(envelope.into_frames()).await {
                    warn!("failed to send {reply_type} on {channel}: {e}");
                }
            }
            Err(e) => error!("failed to encode {reply_type}: {e}"),
        }
        if reply_type == MessageType::ShutdownReply {
            dispatcher.shutdown.trigger();
        }
    }
    debug!("{channel} task stopped");
    Ok(())
}

// ── iopub / stdin / heartbeat ─────────────────────────────────────────────────

/// Owns the iopub socket; every broadcast goes through this queue.
async fn serve_iopub(
    mut socket: Box<dyn FrameSocket>,
    mut queue: mpsc::UnboundedReceiver<Publication>,
    signer: Arc<Signer>,
) {
    while let Some(Publication { message, written }) = queue.recv().await {
        let msg_type = message.message_type();
        match Envelope::from_message(&message, &signer) {
            Ok(envelope) => {
                let topic = iopub_topic(&message.header.session_id, msg_type);
                if let Err(e) = socket.send_frames(envelope.with_topic(topic).into_frames()).await {
                    warn!("failed to publish {msg_type}: {e}");
                }
            }
            Err(e) => error!("failed to encode {msg_type} for iopub: {e}"),
        }
        if let Some(written) = written {
            written.send(()).ok();
        }
    }
    debug!("iopub queue closed");
}

/// Forwards `input_request`s to the frontend and routes back the answers.
async fn serve_stdin(
    mut socket: Box<dyn FrameSocket>,
    mut calls: mpsc::UnboundedReceiver<InputCall>,
    signer: Arc<Signer>,
    shutdown: ShutdownSignal,
) -> Result<(), KernelError> {
    loop {
        let call = tokio::select! {
            _ = shutdown.wait() => break,
            call = calls.recv() => match call {
                Some(call) => call,
                None => break,
            },
        };
        let InputCall { request, reply } = call;

        let envelope = match Envelope::from_message(&request, &signer) {
            Ok(envelope) => envelope,
            Err(e) => {
                reply.send(Err(e.into())).ok();
                continue;
            }
        };
        if let Err(e) = socket.send_frames(envelope.into_frames()).await {
            warn!("failed to send input_request: {e}");
            reply.send(Err(KernelError::InputCancelled)).ok();
            continue;
        }

        let answer = tokio::select! {
            _ = shutdown.wait() => {
                reply.send(Err(KernelError::InputCancelled)).ok();
                break;
            }
            answer = next_input_reply(&mut socket, &signer) => answer,
        };
        let closed = matches!(answer, Err(KernelError::Transport(TransportError::Closed(_))));
        reply.send(answer).ok();
        if closed {
            info!("stdin socket closed");
            break;
        }
    }
    Ok(())
}

async fn next_input_reply(
    socket: &mut Box<dyn FrameSocket>,
    signer: &Signer,
) -> Result<String, KernelError> {
    loop {
        let frames = socket.recv_frames().await?;
        match Envelope::open(frames, signer) {
            Ok(Message {
                content: Content::InputReply(InputReply { value }),
                ..
            }) => return Ok(value),
            Ok(other) => warn!(
                "ignoring {} on stdin while waiting for input_reply",
                other.message_type()
            ),
            Err(e) => warn!("dropping message on stdin: {e}"),
        }
    }
}

type HeartbeatThread = std::thread::JoinHandle<Result<(), KernelError>>;

/// Starts the heartbeat echo on its own thread and runtime.
///
/// Resolves once the heartbeat socket is open, or with the error that kept it
/// from opening.  A failure after that point triggers `shutdown` and is
/// returned from the thread.
async fn spawn_heartbeat(
    endpoint: Box<dyn HeartbeatEndpoint>,
    shutdown: ShutdownSignal,
) -> Result<HeartbeatThread, KernelError> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let thread = std::thread::Builder::new()
        .name("kernel-heartbeat".to_string())
        .spawn(move || {
            let result = run_heartbeat(endpoint, shutdown.clone(), ready_tx);
            if let Err(e) = &result {
                error!("heartbeat stopped: {e}");
                shutdown.trigger();
            }
            result
        })
        .map_err(|e| KernelError::Heartbeat(e.to_string()))?;

    if ready_rx.await.is_err() {
        // The thread only drops the sender without sending when it failed.
        join_heartbeat(thread).await?;
        return Err(KernelError::Heartbeat(
            "heartbeat stopped before its socket was ready".to_string(),
        ));
    }
    Ok(thread)
}

fn run_heartbeat(
    endpoint: Box<dyn HeartbeatEndpoint>,
    shutdown: ShutdownSignal,
    ready: oneshot::Sender<()>,
) -> Result<(), KernelError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| KernelError::Heartbeat(format!("failed to start runtime: {e}")))?;
    runtime.block_on(async move {
        let socket = endpoint.open().await?;
        ready.send(()).ok();
        debug!("heartbeat ready");
        serve_heartbeat(socket, shutdown).await
    })
}

async fn serve_heartbeat(
    mut socket: Box<dyn FrameSocket>,
    shutdown: ShutdownSignal,
) -> Result<(), KernelError> {
    loop {
        tokio::select! {
            _ = shutdown.wait() => return Ok(()),
            frames = socket.recv_frames() => match frames {
                Ok(frames) => socket.send_frames(frames).await?,
                Err(TransportError::Closed(_)) => return Ok(()),
                Err(e) => return Err(e.into()),
            },
        }
    }
}

async fn join_heartbeat(thread: HeartbeatThread) -> Result<(), KernelError> {
    match tokio::task::spawn_blocking(move || thread.join()).await? {
        Ok(result) => result,
        Err(_) => Err(KernelError::Heartbeat(
            "heartbeat thread panicked".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_signal_releases_waiters() {
        // Arrange
        let signal = ShutdownSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };

        // Act
        signal.trigger();

        // Assert
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter released")
            .expect("waiter task");
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_wait_after_trigger_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        signal.trigger();

        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("already triggered");
    }

    #[test]
    fn test_interrupt_is_control_only() {
        assert!(accepts(Channel::Control, MessageType::InterruptRequest));
        assert!(!accepts(Channel::Shell, MessageType::InterruptRequest));
    }

    #[test]
    fn test_kernel_info_is_served_on_both_request_channels() {
        assert!(accepts(Channel::Shell, MessageType::KernelInfoRequest));
        assert!(accepts(Channel::Control, MessageType::KernelInfoRequest));
    }

    #[test]
    fn test_replies_and_broadcasts_are_never_dispatched() {
        for msg_type in [
            MessageType::ExecuteReply,
            MessageType::Status,
            MessageType::InputReply,
        ] {
            assert!(!accepts(Channel::Shell, msg_type));
            assert!(!accepts(Channel::Control, msg_type));
        }
        assert!(!accepts(Channel::IoPub, MessageType::ExecuteRequest));
    }

    #[test]
    fn test_reply_of_the_paired_type_is_kept() {
        let reply = labelled_reply(MessageType::InterruptRequest, Some(Content::InterruptReply));

        assert!(matches!(reply, Some(Content::InterruptReply)));
    }

    #[test]
    fn test_reply_of_another_type_is_dropped() {
        let reply = labelled_reply(MessageType::ExecuteRequest, Some(Content::InterruptReply));

        assert!(reply.is_none());
    }

    #[test]
    fn test_comm_traffic_never_produces_a_reply() {
        for msg_type in [
            MessageType::CommOpen,
            MessageType::CommMsg,
            MessageType::CommClose,
        ] {
            assert!(labelled_reply(msg_type, None).is_none());
            assert!(labelled_reply(msg_type, Some(Content::InterruptReply)).is_none());
        }
    }

    struct UnbindableHeartbeat;

    #[async_trait::async_trait]
    impl HeartbeatEndpoint for UnbindableHeartbeat {
        async fn open(self: Box<Self>) -> Result<Box<dyn FrameSocket>, TransportError> {
            Err(TransportError::Bind {
                channel: Channel::Heartbeat,
                endpoint: "tcp://127.0.0.1:1".to_string(),
                reason: "address in use".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_heartbeat_open_failure_is_returned_and_stops_the_kernel() {
        // Arrange
        let shutdown = ShutdownSignal::new();

        // Act
        let result = spawn_heartbeat(Box::new(UnbindableHeartbeat), shutdown.clone()).await;

        // Assert
        assert!(matches!(
            result,
            Err(KernelError::Transport(TransportError::Bind {
                channel: Channel::Heartbeat,
                ..
            }))
        ));
        assert!(shutdown.is_triggered());
    }
}
