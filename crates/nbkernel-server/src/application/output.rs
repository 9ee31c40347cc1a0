//! Side-channel output surface handed to request handlers.
//!
//! While a handler runs it can publish stream text, rich display data and
//! comm traffic on iopub, and ask the frontend for input over stdin.  Every
//! message emitted through an [`OutputHandle`] is parented to the request
//! being handled, which is how the frontend attaches output to the right cell.
//!
//! Publications are queued to the single task that owns the iopub socket, so
//! concurrent producers never interleave frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nbkernel_core::protocol::messages::{
    ClearOutput, CommData, CommOpen, Content, Display, InputRequest, Stream, StreamName,
};
use nbkernel_core::{DisplayData, Message, MessageHeader, Session};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::dispatch::KernelError;

/// One queued iopub message, optionally acknowledged once written.
pub(crate) struct Publication {
    pub message: Message,
    pub written: Option<oneshot::Sender<()>>,
}

/// A pending `input_request` waiting for the frontend's `input_reply`.
pub(crate) struct InputCall {
    pub request: Message,
    pub reply: oneshot::Sender<Result<String, KernelError>>,
}

/// Emits output on behalf of the request currently being handled.
#[derive(Clone)]
pub struct OutputHandle {
    parent: Arc<MessageHeader>,
    session: Arc<Session>,
    iopub: mpsc::UnboundedSender<Publication>,
    stdin: Option<mpsc::UnboundedSender<InputCall>>,
    interrupted: Arc<AtomicBool>,
}

impl OutputHandle {
    pub(crate) fn new(
        parent: MessageHeader,
        session: Arc<Session>,
        iopub: mpsc::UnboundedSender<Publication>,
        stdin: Option<mpsc::UnboundedSender<InputCall>>,
        interrupted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            parent: Arc::new(parent),
            session,
            iopub,
            stdin,
            interrupted,
        }
    }

    /// The header of the request this handle emits output for.
    pub fn parent(&self) -> &MessageHeader {
        &self.parent
    }

    /// Queues `content` for publication on iopub.
    pub fn publish(&self, content: Content) {
        let message = Message::child_of(&self.parent, content, &self.session);
        if self
            .iopub
            .send(Publication {
                message,
                written: None,
            })
            .is_err()
        {
            debug!("iopub closed; dropping publication");
        }
    }

    /// Publishes `content` and waits until it has been handed to the socket.
    pub(crate) async fn publish_and_wait(&self, content: Content) {
        let message = Message::child_of(&self.parent, content, &self.session);
        let (tx, rx) = oneshot::channel();
        let queued = self.iopub.send(Publication {
            message,
            written: Some(tx),
        });
        if queued.is_err() || rx.await.is_err() {
            debug!("iopub closed before publication was written");
        }
    }

    pub fn stream(&self, name: StreamName, text: impl Into<String>) {
        self.publish(Content::Stream(Stream {
            name,
            text: text.into(),
        }));
    }

    pub fn stdout(&self, text: impl Into<String>) {
        self.stream(StreamName::Stdout, text);
    }

    pub fn stderr(&self, text: impl Into<String>) {
        self.stream(StreamName::Stderr, text);
    }

    /// Publishes `display_data`.  Pass a `display_id` to allow later updates.
    pub fn display(&self, data: Vec<DisplayData>, display_id: Option<String>) {
        self.publish(Content::DisplayData(Display { data, display_id }));
    }

    /// Replaces the output previously displayed under `display_id`.
    pub fn update_display(&self, data: Vec<DisplayData>, display_id: impl Into<String>) {
        self.publish(Content::UpdateDisplayData(Display {
            data,
            display_id: Some(display_id.into()),
        }));
    }

    /// Clears the cell output; with `wait` the clear is deferred until new
    /// output arrives.
    pub fn clear_output(&self, wait: bool) {
        self.publish(Content::ClearOutput(ClearOutput { wait }));
    }

    pub fn comm_open(
        &self,
        comm_id: impl Into<String>,
        target_name: impl Into<String>,
        data: Value,
    ) {
        self.publish(Content::CommOpen(CommOpen {
            comm_id: comm_id.into(),
            target_name: target_name.into(),
            target_module: None,
            data,
        }));
    }

    pub fn comm_msg(&self, comm_id: impl Into<String>, data: Value) {
        self.publish(Content::CommMsg(CommData {
            comm_id: comm_id.into(),
            data,
        }));
    }

    pub fn comm_close(&self, comm_id: impl Into<String>, data: Value) {
        self.publish(Content::CommClose(CommData {
            comm_id: comm_id.into(),
            data,
        }));
    }

    /// Asks the frontend for a line of input and waits for the answer.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::StdinNotAllowed`] when the request being handled
    /// did not allow stdin, and [`KernelError::InputCancelled`] when the stdin
    /// channel shut down before a reply arrived.
    pub async fn input(&self, prompt: &str, password: bool) -> Result<String, KernelError> {
        let stdin = self.stdin.as_ref().ok_or(KernelError::StdinNotAllowed)?;
        let request = Message::child_of(
            &self.parent,
            Content::InputRequest(InputRequest {
                prompt: prompt.to_string(),
                password,
            }),
            &self.session,
        );
        let (tx, rx) = oneshot::channel();
        stdin
            .send(InputCall { request, reply: tx })
            .map_err(|_| KernelError::InputCancelled)?;
        rx.await.map_err(|_| KernelError::InputCancelled)?
    }

    /// Whether an `interrupt_request` arrived since this execution started.
    ///
    /// Long-running handlers poll this and stop early when it turns true.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }
}
