//! Message types and the in-memory message header.
//!
//! The in-memory [`MessageHeader`] is richer than what travels in the header's
//! own JSON object.  On the wire the header object only carries `msg_id`,
//! `session`, `username`, `version` and `msg_type`; routing identities, the
//! parent header and the metadata map each travel as separate frames of the
//! multipart envelope and are attached to the header after decoding.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::ids::{new_id, Session};

/// Protocol version written into every outgoing header.
pub const PROTOCOL_VERSION: &str = "5.0";

// ── Message type codes ────────────────────────────────────────────────────────

/// Every `msg_type` the kernel understands.
///
/// Unlike MIME types this set is strict: a header whose `msg_type` is not in
/// the table cannot be routed and is rejected by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    // Shell / control requests and replies
    KernelInfoRequest,
    KernelInfoReply,
    CommInfoRequest,
    CommInfoReply,
    ExecuteRequest,
    ExecuteReply,
    InspectRequest,
    InspectReply,
    CompleteRequest,
    CompleteReply,
    IsCompleteRequest,
    IsCompleteReply,
    HistoryRequest,
    HistoryReply,
    ShutdownRequest,
    ShutdownReply,
    InterruptRequest,
    InterruptReply,
    // IOPub broadcasts
    Status,
    Stream,
    DisplayData,
    UpdateDisplayData,
    ExecuteInput,
    ExecuteResult,
    Error,
    ClearOutput,
    // Stdin
    InputRequest,
    InputReply,
    // Comms
    CommOpen,
    CommMsg,
    CommClose,
}

/// Wire string table; the single source of truth for both directions.
const MESSAGE_TYPE_TABLE: &[(MessageType, &str)] = &[
    (MessageType::KernelInfoRequest, "kernel_info_request"),
    (MessageType::KernelInfoReply, "kernel_info_reply"),
    (MessageType::CommInfoRequest, "comm_info_request"),
    (MessageType::CommInfoReply, "comm_info_reply"),
    (MessageType::ExecuteRequest, "execute_request"),
    (MessageType::ExecuteReply, "execute_reply"),
    (MessageType::InspectRequest, "inspect_request"),
    (MessageType::InspectReply, "inspect_reply"),
    (MessageType::CompleteRequest, "complete_request"),
    (MessageType::CompleteReply, "complete_reply"),
    (MessageType::IsCompleteRequest, "is_complete_request"),
    (MessageType::IsCompleteReply, "is_complete_reply"),
    (MessageType::HistoryRequest, "history_request"),
    (MessageType::HistoryReply, "history_reply"),
    (MessageType::ShutdownRequest, "shutdown_request"),
    (MessageType::ShutdownReply, "shutdown_reply"),
    (MessageType::InterruptRequest, "interrupt_request"),
    (MessageType::InterruptReply, "interrupt_reply"),
    (MessageType::Status, "status"),
    (MessageType::Stream, "stream"),
    (MessageType::DisplayData, "display_data"),
    (MessageType::UpdateDisplayData, "update_display_data"),
    (MessageType::ExecuteInput, "execute_input"),
    (MessageType::ExecuteResult, "execute_result"),
    (MessageType::Error, "error"),
    (MessageType::ClearOutput, "clear_output"),
    (MessageType::InputRequest, "input_request"),
    (MessageType::InputReply, "input_reply"),
    (MessageType::CommOpen, "comm_open"),
    (MessageType::CommMsg, "comm_msg"),
    (MessageType::CommClose, "comm_close"),
];

impl MessageType {
    /// All message types, in table order.
    pub fn all() -> impl Iterator<Item = MessageType> {
        MESSAGE_TYPE_TABLE.iter().map(|(ty, _)| *ty)
    }

    /// Returns the wire string, e.g. `"execute_request"`.
    pub fn as_str(self) -> &'static str {
        MESSAGE_TYPE_TABLE
            .iter()
            .find(|(ty, _)| *ty == self)
            .map(|(_, s)| *s)
            .unwrap_or("")
    }

    /// Parses a wire string; `None` when it is not a known type.
    pub fn parse(raw: &str) -> Option<Self> {
        MESSAGE_TYPE_TABLE
            .iter()
            .find(|(_, s)| *s == raw)
            .map(|(ty, _)| *ty)
    }

    /// The reply type paired with a request, or `None` for one-way messages.
    ///
    /// Total over the table: publishes, replies and comm traffic all map to
    /// `None`.
    pub fn reply_type(self) -> Option<MessageType> {
        use MessageType::*;
        match self {
            KernelInfoRequest => Some(KernelInfoReply),
            CommInfoRequest => Some(CommInfoReply),
            ExecuteRequest => Some(ExecuteReply),
            InspectRequest => Some(InspectReply),
            CompleteRequest => Some(CompleteReply),
            IsCompleteRequest => Some(IsCompleteReply),
            HistoryRequest => Some(HistoryReply),
            ShutdownRequest => Some(ShutdownReply),
            InterruptRequest => Some(InterruptReply),
            InputRequest => Some(InputReply),
            KernelInfoReply | CommInfoReply | ExecuteReply | InspectReply | CompleteReply
            | IsCompleteReply | HistoryReply | ShutdownReply | InterruptReply | Status
            | Stream | DisplayData | UpdateDisplayData | ExecuteInput | ExecuteResult | Error
            | ClearOutput | InputReply | CommOpen | CommMsg | CommClose => None,
        }
    }

    /// Messages the kernel only ever receives and therefore has no encoder for.
    pub fn is_receive_only(self) -> bool {
        use MessageType::*;
        matches!(
            self,
            KernelInfoRequest
                | CommInfoRequest
                | ExecuteRequest
                | InspectRequest
                | CompleteRequest
                | IsCompleteRequest
                | HistoryRequest
                | ShutdownRequest
                | InterruptRequest
                | InputReply
        )
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Header ────────────────────────────────────────────────────────────────────

/// The full in-memory header of a message.
///
/// Headers are built once (fresh for outgoing messages, parsed for incoming
/// ones) and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageHeader {
    /// Routing frames that preceded the delimiter.  Replies reuse them so the
    /// ROUTER socket can deliver the answer to the right peer.
    pub identities: Vec<Vec<u8>>,
    /// The header of the message that caused this one, if any.
    pub parent_header: Option<Box<MessageHeader>>,
    /// Free-form metadata part.
    pub metadata: Map<String, Value>,
    pub message_id: String,
    pub session_id: String,
    pub username: String,
    pub msg_type: MessageType,
}

impl MessageHeader {
    /// Creates a header with no parent, e.g. for the initial `starting` status.
    pub fn new(msg_type: MessageType, session: &Session) -> Self {
        Self {
            identities: Vec::new(),
            parent_header: None,
            metadata: Map::new(),
            message_id: new_id(),
            session_id: session.id.clone(),
            username: session.username.clone(),
            msg_type,
        }
    }

    /// Creates the header of a message caused by `self`.
    ///
    /// The child gets a fresh message id, the kernel session, the same routing
    /// identities, and an owned copy of `self` as its parent.
    pub fn child(&self, msg_type: MessageType, session: &Session) -> Self {
        Self {
            identities: self.identities.clone(),
            parent_header: Some(Box::new(self.clone())),
            metadata: Map::new(),
            message_id: new_id(),
            session_id: session.id.clone(),
            username: session.username.clone(),
            msg_type,
        }
    }

    /// Returns the wire form of this header (the JSON header part).
    pub fn to_wire(&self) -> WireHeader {
        WireHeader {
            msg_id: self.message_id.clone(),
            session: self.session_id.clone(),
            username: self.username.clone(),
            version: PROTOCOL_VERSION.to_string(),
            msg_type: self.msg_type.as_str().to_string(),
        }
    }
}

/// The header JSON object exactly as it appears on the wire.
///
/// Extra keys sent by frontends (such as `date`) are ignored on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireHeader {
    pub msg_id: String,
    pub session: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub version: String,
    pub msg_type: String,
}
