//! The typed message catalogue.
//!
//! A [`Message`] is a [`MessageHeader`] plus a [`Content`] body.  The body is a
//! closed sum type with one payload struct per message kind; routing and
//! signing only ever look at the header, so the body codec stays independent
//! of the transport.

use serde_json::{Map, Value};

use crate::protocol::header::{MessageHeader, MessageType};
use crate::protocol::ids::Session;
use crate::protocol::mime::DisplayData;

// ── String-enum tables ────────────────────────────────────────────────────────

/// Kernel execution state announced on iopub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Starting,
    Idle,
    Busy,
}

impl ExecutionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionState::Starting => "starting",
            ExecutionState::Idle => "idle",
            ExecutionState::Busy => "busy",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "starting" => Some(ExecutionState::Starting),
            "idle" => Some(ExecutionState::Idle),
            "busy" => Some(ExecutionState::Busy),
            _ => None,
        }
    }
}

/// Output stream names for `stream` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamName {
    Stdout,
    Stderr,
}

impl StreamName {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamName::Stdout => "stdout",
            StreamName::Stderr => "stderr",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "stdout" => Some(StreamName::Stdout),
            "stderr" => Some(StreamName::Stderr),
            _ => None,
        }
    }
}

/// Status field of replies.
///
/// Decoding is lenient: an unrecognised status is kept in `Unknown` rather
/// than failing the whole message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteStatus {
    Ok,
    Error,
    Abort,
    Unknown(String),
}

impl ExecuteStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ExecuteStatus::Ok => "ok",
            ExecuteStatus::Error => "error",
            ExecuteStatus::Abort => "abort",
            ExecuteStatus::Unknown(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "ok" => ExecuteStatus::Ok,
            "error" => ExecuteStatus::Error,
            "abort" => ExecuteStatus::Abort,
            other => ExecuteStatus::Unknown(other.to_string()),
        }
    }
}

/// Answer to an `is_complete_request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCompleteness {
    Complete,
    Incomplete,
    Invalid,
    Unknown,
}

impl CodeCompleteness {
    pub fn as_str(self) -> &'static str {
        match self {
            CodeCompleteness::Complete => "complete",
            CodeCompleteness::Incomplete => "incomplete",
            CodeCompleteness::Invalid => "invalid",
            CodeCompleteness::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "complete" => Some(CodeCompleteness::Complete),
            "incomplete" => Some(CodeCompleteness::Incomplete),
            "invalid" => Some(CodeCompleteness::Invalid),
            "unknown" => Some(CodeCompleteness::Unknown),
            _ => None,
        }
    }
}

/// How a `history_request` wants history to be selected.
///
/// Only the access type itself is interpreted; the per-type fields
/// (`start`/`stop`, `n`, `pattern`) are not read and all three variants are
/// served identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAccessType {
    Range,
    Tail,
    Search,
}

impl HistoryAccessType {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryAccessType::Range => "range",
            HistoryAccessType::Tail => "tail",
            HistoryAccessType::Search => "search",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "range" => Some(HistoryAccessType::Range),
            "tail" => Some(HistoryAccessType::Tail),
            "search" => Some(HistoryAccessType::Search),
            _ => None,
        }
    }
}

// ── Per-message payload structs ───────────────────────────────────────────────

/// Language description inside `kernel_info_reply`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LanguageInfo {
    pub name: String,
    pub version: String,
    pub mimetype: String,
    pub file_extension: String,
    pub pygments_lexer: Option<String>,
    pub codemirror_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpLink {
    pub text: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelInfoReply {
    pub protocol_version: String,
    pub implementation: String,
    pub implementation_version: String,
    pub language_info: LanguageInfo,
    pub banner: String,
    pub help_links: Vec<HelpLink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommInfoRequest {
    pub target_name: Option<String>,
}

/// One open comm as listed in `comm_info_reply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommInfo {
    pub comm_id: String,
    pub target_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommInfoReply {
    pub comms: Vec<CommInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteRequest {
    pub code: String,
    pub silent: bool,
    pub store_history: bool,
    pub user_expressions: Map<String, Value>,
    pub allow_stdin: bool,
    pub stop_on_error: bool,
}

impl ExecuteRequest {
    /// A request with protocol defaults for every flag.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            silent: false,
            store_history: true,
            user_expressions: Map::new(),
            allow_stdin: true,
            stop_on_error: true,
        }
    }
}

/// Error description shared by `error` broadcasts and failed `execute_reply`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub ename: String,
    pub evalue: String,
    pub traceback: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteReply {
    pub status: ExecuteStatus,
    pub execution_count: u32,
    /// Rich text shown in the frontend pager.
    pub pager: Vec<DisplayData>,
    pub user_expressions: Map<String, Value>,
    /// Present when `status` is `Error`.
    pub error: Option<ErrorReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteInput {
    pub code: String,
    pub execution_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteResult {
    pub execution_count: u32,
    pub data: Vec<DisplayData>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub execution_state: ExecutionState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub name: StreamName,
    pub text: String,
}

/// Payload of `display_data` and `update_display_data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Display {
    pub data: Vec<DisplayData>,
    pub display_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearOutput {
    pub wait: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectRequest {
    pub code: String,
    pub cursor_pos: usize,
    pub detail_level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectReply {
    pub status: ExecuteStatus,
    pub found: bool,
    pub data: Vec<DisplayData>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteRequest {
    pub code: String,
    pub cursor_pos: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompleteReply {
    pub status: ExecuteStatus,
    pub matches: Vec<String>,
    pub cursor_start: usize,
    pub cursor_end: usize,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsCompleteRequest {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsCompleteReply {
    pub status: CodeCompleteness,
    /// Indentation hint, only meaningful for `Incomplete`.
    pub indent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub output: bool,
    pub raw: bool,
    pub access_type: HistoryAccessType,
}

/// Input-only or input-and-output history entry content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryContent {
    Input(String),
    InputOutput { input: String, output: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryReplyElement {
    pub session: u32,
    pub line_number: u32,
    pub content: HistoryContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryReply {
    pub history: Vec<HistoryReplyElement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shutdown {
    pub restart: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRequest {
    pub prompt: String,
    pub password: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputReply {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommOpen {
    pub comm_id: String,
    pub target_name: String,
    pub target_module: Option<String>,
    pub data: Value,
}

/// Payload of `comm_msg` and `comm_close`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommData {
    pub comm_id: String,
    pub data: Value,
}

// ── Top-level message types ───────────────────────────────────────────────────

/// Every message body, discriminated by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    KernelInfoRequest,
    KernelInfoReply(KernelInfoReply),
    CommInfoRequest(CommInfoRequest),
    CommInfoReply(CommInfoReply),
    ExecuteRequest(ExecuteRequest),
    ExecuteReply(ExecuteReply),
    InspectRequest(InspectRequest),
    InspectReply(InspectReply),
    CompleteRequest(CompleteRequest),
    CompleteReply(CompleteReply),
    IsCompleteRequest(IsCompleteRequest),
    IsCompleteReply(IsCompleteReply),
    HistoryRequest(HistoryRequest),
    HistoryReply(HistoryReply),
    ShutdownRequest(Shutdown),
    ShutdownReply(Shutdown),
    InterruptRequest,
    InterruptReply,
    Status(Status),
    Stream(Stream),
    DisplayData(Display),
    UpdateDisplayData(Display),
    ExecuteInput(ExecuteInput),
    ExecuteResult(ExecuteResult),
    Error(ErrorReport),
    ClearOutput(ClearOutput),
    InputRequest(InputRequest),
    InputReply(InputReply),
    CommOpen(CommOpen),
    CommMsg(CommData),
    CommClose(CommData),
}

impl Content {
    /// Returns the [`MessageType`] discriminant for this body.
    pub fn message_type(&self) -> MessageType {
        match self {
            Content::KernelInfoRequest => MessageType::KernelInfoRequest,
            Content::KernelInfoReply(_) => MessageType::KernelInfoReply,
            Content::CommInfoRequest(_) => MessageType::CommInfoRequest,
            Content::CommInfoReply(_) => MessageType::CommInfoReply,
            Content::ExecuteRequest(_) => MessageType::ExecuteRequest,
            Content::ExecuteReply(_) => MessageType::ExecuteReply,
            Content::InspectRequest(_) => MessageType::InspectRequest,
            Content::InspectReply(_) => MessageType::InspectReply,
            Content::CompleteRequest(_) => MessageType::CompleteRequest,
            Content::CompleteReply(_) => MessageType::CompleteReply,
            Content::IsCompleteRequest(_) => MessageType::IsCompleteRequest,
            Content::IsCompleteReply(_) => MessageType::IsCompleteReply,
            Content::HistoryRequest(_) => MessageType::HistoryRequest,
            Content::HistoryReply(_) => MessageType::HistoryReply,
            Content::ShutdownRequest(_) => MessageType::ShutdownRequest,
            Content::ShutdownReply(_) => MessageType::ShutdownReply,
            Content::InterruptRequest => MessageType::InterruptRequest,
            Content::InterruptReply => MessageType::InterruptReply,
            Content::Status(_) => MessageType::Status,
            Content::Stream(_) => MessageType::Stream,
            Content::DisplayData(_) => MessageType::DisplayData,
            Content::UpdateDisplayData(_) => MessageType::UpdateDisplayData,
            Content::ExecuteInput(_) => MessageType::ExecuteInput,
            Content::ExecuteResult(_) => MessageType::ExecuteResult,
            Content::Error(_) => MessageType::Error,
            Content::ClearOutput(_) => MessageType::ClearOutput,
            Content::InputRequest(_) => MessageType::InputRequest,
            Content::InputReply(_) => MessageType::InputReply,
            Content::CommOpen(_) => MessageType::CommOpen,
            Content::CommMsg(_) => MessageType::CommMsg,
            Content::CommClose(_) => MessageType::CommClose,
        }
    }
}

/// A complete protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: MessageHeader,
    pub content: Content,
}

impl Message {
    /// Builds a message with no parent.
    pub fn new(content: Content, session: &Session) -> Self {
        Self {
            header: MessageHeader::new(content.message_type(), session),
            content,
        }
    }

    /// Builds a message caused by `parent`, copying its routing identities and
    /// linking its header as the new parent header.
    pub fn child_of(parent: &MessageHeader, content: Content, session: &Session) -> Self {
        Self {
            header: parent.child(content.message_type(), session),
            content,
        }
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn message_type(&self) -> MessageType {
        self.header.msg_type
    }
}
