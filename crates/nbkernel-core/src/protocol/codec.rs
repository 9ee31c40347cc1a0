//! JSON codec between typed [`Message`]s and the four JSON wire parts.
//!
//! Wire parts, in envelope order:
//! ```text
//! [header][parent_header][metadata][content]
//! ```
//! The header part is parsed first to learn the `msg_type`, which selects the
//! content parser.  Content parsers are individually partial: each one names
//! the keys it requires and fails with [`DecodeError::MissingField`] when one
//! is absent.  Optional keys fall back to protocol defaults.
//!
//! Decoding is strict about structure (unknown `msg_type`, missing keys) but
//! lenient about informational leaves: unrecognised MIME types and reply
//! status strings are kept as explicit `Unknown` values.

use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::header::{MessageHeader, MessageType, WireHeader};
use crate::protocol::messages::{
    ClearOutput, CodeCompleteness, CommData, CommInfo, CommInfoReply, CommInfoRequest, CommOpen,
    CompleteReply, CompleteRequest, Content, Display, ErrorReport, ExecuteInput, ExecuteReply,
    ExecuteRequest, ExecuteResult, ExecuteStatus, ExecutionState, HelpLink, HistoryAccessType,
    HistoryContent, HistoryReply, HistoryReplyElement, HistoryRequest, InputReply, InputRequest,
    InspectReply, InspectRequest, IsCompleteReply, IsCompleteRequest, KernelInfoReply,
    LanguageInfo, Message, Shutdown, Status, Stream, StreamName,
};
use crate::protocol::mime::{DisplayData, ImageSize, MimeType};

/// Errors produced while decoding the JSON parts of a message.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A part is not valid JSON.
    #[error("invalid JSON in {part} part: {source}")]
    InvalidJson {
        part: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A part that must be a JSON object is some other JSON value.
    #[error("{part} part is not a JSON object")]
    NotAnObject { part: &'static str },

    /// The header names a `msg_type` outside the catalogue.
    #[error("unknown message type: {0:?}")]
    UnknownMessageType(String),

    /// The content lacks a key its parser requires.
    #[error("{msg_type}: missing required field `{field}`")]
    MissingField {
        msg_type: MessageType,
        field: &'static str,
    },

    /// A key is present but its value has the wrong shape.
    #[error("{msg_type}: invalid value for field `{field}`")]
    InvalidField {
        msg_type: MessageType,
        field: &'static str,
    },
}

/// Errors produced while encoding a message.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The message kind is only ever received by a kernel and has no encoder.
    #[error("{0} is receive-only and cannot be encoded")]
    ReceiveOnly(MessageType),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// The four serialized JSON parts of one message, ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedParts {
    pub header: Vec<u8>,
    pub parent_header: Vec<u8>,
    pub metadata: Vec<u8>,
    pub content: Vec<u8>,
}

impl EncodedParts {
    /// The parts in signing order.
    pub fn as_slices(&self) -> [&[u8]; 4] {
        [
            &self.header,
            &self.parent_header,
            &self.metadata,
            &self.content,
        ]
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one message from its raw parts.
///
/// `identities` are the routing frames that preceded the envelope delimiter;
/// they are attached to the decoded header (and to its parent).
///
/// # Errors
///
/// Returns [`DecodeError`] when the header cannot be parsed, the `msg_type` is
/// unknown, or the content lacks a required key.  A malformed metadata part is
/// not an error: it decodes as an empty map.
///
/// # Examples
///
/// ```rust
/// use nbkernel_core::protocol::codec::decode;
/// use nbkernel_core::protocol::messages::Content;
///
/// let header = br#"{"msg_id":"1","session":"s","username":"u","version":"5.0","msg_type":"kernel_info_request"}"#;
/// let msg = decode(Vec::new(), header, b"{}", b"{}", b"{}").unwrap();
/// assert_eq!(msg.content, Content::KernelInfoRequest);
/// assert!(msg.header.parent_header.is_none());
/// ```
pub fn decode(
    identities: Vec<Vec<u8>>,
    header: &[u8],
    parent_header: &[u8],
    metadata: &[u8],
    content: &[u8],
) -> Result<Message, DecodeError> {
    let metadata = decode_metadata(metadata);
    let header = decode_header(identities, header, parent_header, metadata)?;

    let content_value: Value = serde_json::from_slice(content).map_err(|source| {
        DecodeError::InvalidJson {
            part: "content",
            source,
        }
    })?;
    let content_obj = content_value
        .as_object()
        .ok_or(DecodeError::NotAnObject { part: "content" })?;

    let content = decode_content(header.msg_type, content_obj)?;
    Ok(Message { header, content })
}

/// Like [`decode`], but yields `None` instead of an error.
///
/// This is the entry point for the serving loop: an undecodable message is
/// logged and dropped, never propagated.
pub fn try_decode(
    identities: Vec<Vec<u8>>,
    header: &[u8],
    parent_header: &[u8],
    metadata: &[u8],
    content: &[u8],
) -> Option<Message> {
    match decode(identities, header, parent_header, metadata, content) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!("dropping undecodable message: {e}");
            None
        }
    }
}

/// Decodes a header part together with its parent header part.
///
/// An empty JSON object as the parent part means "no parent".  Otherwise the
/// parent is decoded as a header one level deep: it shares `identities` and
/// `metadata` with the outer header and its own parent is not resolved.
///
/// # Errors
///
/// Returns [`DecodeError`] if either part is not a well-formed header.
pub fn decode_header(
    identities: Vec<Vec<u8>>,
    header: &[u8],
    parent_header: &[u8],
    metadata: Map<String, Value>,
) -> Result<MessageHeader, DecodeError> {
    let parent: Value = serde_json::from_slice(parent_header).map_err(|source| {
        DecodeError::InvalidJson {
            part: "parent_header",
            source,
        }
    })?;

    let parent_header = match parent.as_object() {
        Some(obj) if obj.is_empty() => None,
        Some(_) => {
            let wire: WireHeader =
                serde_json::from_value(parent).map_err(|source| DecodeError::InvalidJson {
                    part: "parent_header",
                    source,
                })?;
            Some(Box::new(from_wire(
                wire,
                identities.clone(),
                None,
                metadata.clone(),
            )?))
        }
        None => {
            return Err(DecodeError::NotAnObject {
                part: "parent_header",
            })
        }
    };

    let wire: WireHeader = serde_json::from_slice(header)
        .map_err(|source| DecodeError::InvalidJson {
            part: "header",
            source,
        })?;
    from_wire(wire, identities, parent_header, metadata)
}

/// Encodes a message into its four JSON parts.
///
/// # Errors
///
/// Returns [`EncodeError::ReceiveOnly`] for request kinds the kernel never
/// sends; calling this with one of those is a programming error.
pub fn encode(msg: &Message) -> Result<EncodedParts, EncodeError> {
    let content = encode_content(&msg.content)?;

    let header = serde_json::to_vec(&msg.header.to_wire())?;
    let parent_header = match &msg.header.parent_header {
        Some(parent) => serde_json::to_vec(&parent.to_wire())?,
        None => b"{}".to_vec(),
    };
    let metadata = serde_json::to_vec(&msg.header.metadata)?;
    let content = serde_json::to_vec(&content)?;

    Ok(EncodedParts {
        header,
        parent_header,
        metadata,
        content,
    })
}

// ── Header helpers ────────────────────────────────────────────────────────────

fn from_wire(
    wire: WireHeader,
    identities: Vec<Vec<u8>>,
    parent_header: Option<Box<MessageHeader>>,
    metadata: Map<String, Value>,
) -> Result<MessageHeader, DecodeError> {
    let msg_type = MessageType::parse(&wire.msg_type)
        .ok_or_else(|| DecodeError::UnknownMessageType(wire.msg_type.clone()))?;
    Ok(MessageHeader {
        identities,
        parent_header,
        metadata,
        message_id: wire.msg_id,
        session_id: wire.session,
        username: wire.username,
        msg_type,
    })
}

fn decode_metadata(bytes: &[u8]) -> Map<String, Value> {
    match serde_json::from_slice::<Map<String, Value>>(bytes) {
        Ok(map) => map,
        Err(e) => {
            debug!("metadata part unreadable, using empty map: {e}");
            Map::new()
        }
    }
}

// ── Content decoding ──────────────────────────────────────────────────────────

/// Typed accessors over a content object that report failures against the
/// message type being decoded.
struct Fields<'a> {
    msg_type: MessageType,
    obj: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn missing(&self, field: &'static str) -> DecodeError {
        DecodeError::MissingField {
            msg_type: self.msg_type,
            field,
        }
    }

    fn invalid(&self, field: &'static str) -> DecodeError {
        DecodeError::InvalidField {
            msg_type: self.msg_type,
            field,
        }
    }

    fn require(&self, field: &'static str) -> Result<&'a Value, DecodeError> {
        self.obj.get(field).ok_or_else(|| self.missing(field))
    }

    fn string(&self, field: &'static str) -> Result<String, DecodeError> {
        self.require(field)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.invalid(field))
    }

    fn string_or(&self, field: &'static str, default: &str) -> Result<String, DecodeError> {
        match self.obj.get(field) {
            None | Some(Value::Null) => Ok(default.to_string()),
            Some(v) => v.as_str().map(str::to_string).ok_or_else(|| self.invalid(field)),
        }
    }

    fn opt_string(&self, field: &'static str) -> Result<Option<String>, DecodeError> {
        match self.obj.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| self.invalid(field)),
        }
    }

    fn boolean(&self, field: &'static str) -> Result<bool, DecodeError> {
        self.require(field)?
            .as_bool()
            .ok_or_else(|| self.invalid(field))
    }

    fn boolean_or(&self, field: &'static str, default: bool) -> Result<bool, DecodeError> {
        match self.obj.get(field) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| self.invalid(field)),
        }
    }

    fn uint(&self, field: &'static str) -> Result<u64, DecodeError> {
        self.require(field)?
            .as_u64()
            .ok_or_else(|| self.invalid(field))
    }

    fn count(&self, field: &'static str) -> Result<u32, DecodeError> {
        u32::try_from(self.uint(field)?).map_err(|_| self.invalid(field))
    }

    fn position(&self, field: &'static str) -> Result<usize, DecodeError> {
        usize::try_from(self.uint(field)?).map_err(|_| self.invalid(field))
    }

    fn object_or_empty(&self, field: &'static str) -> Result<Map<String, Value>, DecodeError> {
        match self.obj.get(field) {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(_) => Err(self.invalid(field)),
        }
    }

    fn value_or_empty_object(&self, field: &'static str) -> Value {
        self.obj
            .get(field)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    fn strings(&self, field: &'static str) -> Result<Vec<String>, DecodeError> {
        let list = self
            .require(field)?
            .as_array()
            .ok_or_else(|| self.invalid(field))?;
        list.iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(|| self.invalid(field)))
            .collect()
    }

    fn strings_or_empty(&self, field: &'static str) -> Result<Vec<String>, DecodeError> {
        if self.obj.contains_key(field) {
            self.strings(field)
        } else {
            Ok(Vec::new())
        }
    }

    fn status(&self) -> ExecuteStatus {
        self.obj
            .get("status")
            .and_then(Value::as_str)
            .map(ExecuteStatus::parse)
            .unwrap_or(ExecuteStatus::Ok)
    }
}

/// Decodes a content object for the given message type.
///
/// # Errors
///
/// Returns [`DecodeError::MissingField`] or [`DecodeError::InvalidField`] when
/// the object does not satisfy the parser for `msg_type`.
pub fn decode_content(
    msg_type: MessageType,
    obj: &Map<String, Value>,
) -> Result<Content, DecodeError> {
    let f = Fields { msg_type, obj };
    let content = match msg_type {
        MessageType::KernelInfoRequest => Content::KernelInfoRequest,
        MessageType::KernelInfoReply => Content::KernelInfoReply(decode_kernel_info_reply(&f)?),
        MessageType::CommInfoRequest => Content::CommInfoRequest(CommInfoRequest {
            target_name: f.opt_string("target_name")?,
        }),
        MessageType::CommInfoReply => Content::CommInfoReply(decode_comm_info_reply(&f)?),
        MessageType::ExecuteRequest => Content::ExecuteRequest(decode_execute_request(&f)?),
        MessageType::ExecuteReply => Content::ExecuteReply(decode_execute_reply(&f)?),
        MessageType::InspectRequest => Content::InspectRequest(InspectRequest {
            code: f.string("code")?,
            cursor_pos: f.position("cursor_pos")?,
            detail_level: match f.obj.get("detail_level") {
                None | Some(Value::Null) => 0,
                Some(v) => v
                    .as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| f.invalid("detail_level"))?,
            },
        }),
        MessageType::InspectReply => Content::InspectReply(InspectReply {
            status: f.status(),
            found: f.boolean_or("found", false)?,
            data: decode_display_bundle(&f, false)?,
        }),
        MessageType::CompleteRequest => Content::CompleteRequest(CompleteRequest {
            code: f.string("code")?,
            cursor_pos: f.position("cursor_pos")?,
        }),
        MessageType::CompleteReply => Content::CompleteReply(CompleteReply {
            status: f.status(),
            matches: f.strings("matches")?,
            cursor_start: f.position("cursor_start")?,
            cursor_end: f.position("cursor_end")?,
            metadata: f.object_or_empty("metadata")?,
        }),
        MessageType::IsCompleteRequest => Content::IsCompleteRequest(IsCompleteRequest {
            code: f.string("code")?,
        }),
        MessageType::IsCompleteReply => Content::IsCompleteReply(IsCompleteReply {
            status: CodeCompleteness::parse(&f.string("status")?)
                .ok_or_else(|| f.invalid("status"))?,
            indent: f.string_or("indent", "")?,
        }),
        MessageType::HistoryRequest => Content::HistoryRequest(HistoryRequest {
            output: f.boolean("output")?,
            raw: f.boolean("raw")?,
            access_type: HistoryAccessType::parse(&f.string("hist_access_type")?)
                .ok_or_else(|| f.invalid("hist_access_type"))?,
        }),
        MessageType::HistoryReply => Content::HistoryReply(decode_history_reply(&f)?),
        MessageType::ShutdownRequest => Content::ShutdownRequest(Shutdown {
            restart: f.boolean_or("restart", false)?,
        }),
        MessageType::ShutdownReply => Content::ShutdownReply(Shutdown {
            restart: f.boolean_or("restart", false)?,
        }),
        MessageType::InterruptRequest => Content::InterruptRequest,
        MessageType::InterruptReply => Content::InterruptReply,
        MessageType::Status => Content::Status(Status {
            execution_state: ExecutionState::parse(&f.string("execution_state")?)
                .ok_or_else(|| f.invalid("execution_state"))?,
        }),
        MessageType::Stream => Content::Stream(Stream {
            name: StreamName::parse(&f.string("name")?).ok_or_else(|| f.invalid("name"))?,
            text: f.string("text")?,
        }),
        MessageType::DisplayData => Content::DisplayData(decode_display(&f)?),
        MessageType::UpdateDisplayData => Content::UpdateDisplayData(decode_display(&f)?),
        MessageType::ExecuteInput => Content::ExecuteInput(ExecuteInput {
            code: f.string("code")?,
            execution_count: f.count("execution_count")?,
        }),
        MessageType::ExecuteResult => Content::ExecuteResult(ExecuteResult {
            execution_count: f.count("execution_count")?,
            data: decode_display_bundle(&f, true)?,
        }),
        MessageType::Error => Content::Error(ErrorReport {
            ename: f.string("ename")?,
            evalue: f.string("evalue")?,
            traceback: f.strings_or_empty("traceback")?,
        }),
        MessageType::ClearOutput => Content::ClearOutput(ClearOutput {
            wait: f.boolean_or("wait", false)?,
        }),
        MessageType::InputRequest => Content::InputRequest(InputRequest {
            prompt: f.string_or("prompt", "")?,
            password: f.boolean_or("password", false)?,
        }),
        MessageType::InputReply => Content::InputReply(InputReply {
            value: f.string("value")?,
        }),
        MessageType::CommOpen => Content::CommOpen(CommOpen {
            comm_id: f.string("comm_id")?,
            target_name: f.string("target_name")?,
            target_module: f.opt_string("target_module")?,
            data: f.value_or_empty_object("data"),
        }),
        MessageType::CommMsg => Content::CommMsg(decode_comm_data(&f)?),
        MessageType::CommClose => Content::CommClose(decode_comm_data(&f)?),
    };
    Ok(content)
}

fn decode_kernel_info_reply(f: &Fields<'_>) -> Result<KernelInfoReply, DecodeError> {
    let info_obj = f
        .require("language_info")?
        .as_object()
        .ok_or_else(|| f.invalid("language_info"))?;
    let info = Fields {
        msg_type: f.msg_type,
        obj: info_obj,
    };

    let help_links = match f.obj.get("help_links") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(links)) => links
            .iter()
            .map(|link| {
                let text = link.get("text").and_then(Value::as_str);
                let url = link.get("url").and_then(Value::as_str);
                match (text, url) {
                    (Some(text), Some(url)) => Ok(HelpLink {
                        text: text.to_string(),
                        url: url.to_string(),
                    }),
                    _ => Err(f.invalid("help_links")),
                }
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(f.invalid("help_links")),
    };

    Ok(KernelInfoReply {
        protocol_version: f.string_or("protocol_version", "")?,
        implementation: f.string_or("implementation", "")?,
        implementation_version: f.string_or("implementation_version", "")?,
        language_info: LanguageInfo {
            name: info.string("name")?,
            version: info.string_or("version", "")?,
            mimetype: info.string_or("mimetype", "")?,
            file_extension: info.string_or("file_extension", "")?,
            pygments_lexer: info.opt_string("pygments_lexer")?,
            codemirror_mode: info.opt_string("codemirror_mode")?,
        },
        banner: f.string_or("banner", "")?,
        help_links,
    })
}

fn decode_comm_info_reply(f: &Fields<'_>) -> Result<CommInfoReply, DecodeError> {
    let comms = f
        .require("comms")?
        .as_object()
        .ok_or_else(|| f.invalid("comms"))?;
    let comms = comms
        .iter()
        .map(|(comm_id, info)| {
            info.get("target_name")
                .and_then(Value::as_str)
                .map(|target| CommInfo {
                    comm_id: comm_id.clone(),
                    target_name: target.to_string(),
                })
                .ok_or_else(|| f.invalid("comms"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CommInfoReply { comms })
}

fn decode_execute_request(f: &Fields<'_>) -> Result<ExecuteRequest, DecodeError> {
    let silent = f.boolean_or("silent", false)?;
    Ok(ExecuteRequest {
        code: f.string("code")?,
        silent,
        store_history: f.boolean_or("store_history", !silent)?,
        user_expressions: f.object_or_empty("user_expressions")?,
        allow_stdin: f.boolean_or("allow_stdin", true)?,
        stop_on_error: f.boolean_or("stop_on_error", true)?,
    })
}

fn decode_execute_reply(f: &Fields<'_>) -> Result<ExecuteReply, DecodeError> {
    let status = ExecuteStatus::parse(&f.string("status")?);

    let mut pager = Vec::new();
    if let Some(payload) = f.obj.get("payload") {
        let entries = payload.as_array().ok_or_else(|| f.invalid("payload"))?;
        for entry in entries {
            if entry.get("source").and_then(Value::as_str) != Some("page") {
                continue;
            }
            let data = entry
                .get("data")
                .and_then(Value::as_object)
                .ok_or_else(|| f.invalid("payload"))?;
            pager.extend(decode_mime_bundle(data, None));
        }
    }

    let error = if f.obj.contains_key("ename") {
        Some(ErrorReport {
            ename: f.string("ename")?,
            evalue: f.string_or("evalue", "")?,
            traceback: f.strings_or_empty("traceback")?,
        })
    } else {
        None
    };

    Ok(ExecuteReply {
        status,
        execution_count: f.count("execution_count")?,
        pager,
        user_expressions: f.object_or_empty("user_expressions")?,
        error,
    })
}

fn decode_history_reply(f: &Fields<'_>) -> Result<HistoryReply, DecodeError> {
    let entries = f
        .require("history")?
        .as_array()
        .ok_or_else(|| f.invalid("history"))?;

    let history = entries
        .iter()
        .map(|entry| decode_history_element(entry).ok_or_else(|| f.invalid("history")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HistoryReply { history })
}

/// Decodes `[session, line, input]` or `[session, line, [input, output]]`.
fn decode_history_element(entry: &Value) -> Option<HistoryReplyElement> {
    let parts = entry.as_array()?;
    if parts.len() != 3 {
        return None;
    }
    let session = u32::try_from(parts[0].as_u64()?).ok()?;
    let line_number = u32::try_from(parts[1].as_u64()?).ok()?;
    let content = match &parts[2] {
        Value::String(input) => HistoryContent::Input(input.clone()),
        Value::Array(pair) if pair.len() == 2 => HistoryContent::InputOutput {
            input: pair[0].as_str()?.to_string(),
            output: pair[1].as_str()?.to_string(),
        },
        _ => return None,
    };
    Some(HistoryReplyElement {
        session,
        line_number,
        content,
    })
}

fn decode_display(f: &Fields<'_>) -> Result<Display, DecodeError> {
    let display_id = f
        .obj
        .get("transient")
        .and_then(|t| t.get("display_id"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(Display {
        data: decode_display_bundle(f, true)?,
        display_id,
    })
}

fn decode_comm_data(f: &Fields<'_>) -> Result<CommData, DecodeError> {
    Ok(CommData {
        comm_id: f.string("comm_id")?,
        data: f.value_or_empty_object("data"),
    })
}

/// Decodes the display payload of an output-style message.
///
/// Producers use either a `data` MIME bundle or a legacy plain `text` key; when
/// both are present the bundle entries come first, followed by the text.
fn decode_display_bundle(
    f: &Fields<'_>,
    required: bool,
) -> Result<Vec<DisplayData>, DecodeError> {
    let data = f.obj.get("data");
    let text = f.obj.get("text");
    if required && data.is_none() && text.is_none() {
        return Err(f.missing("data"));
    }

    let mut out = Vec::new();
    if let Some(data) = data {
        let bundle = data.as_object().ok_or_else(|| f.invalid("data"))?;
        let metadata = f.obj.get("metadata").and_then(Value::as_object);
        out.extend(decode_mime_bundle(bundle, metadata));
    }
    if let Some(text) = text {
        let text = text.as_str().ok_or_else(|| f.invalid("text"))?;
        out.push(DisplayData::plain(text));
    }
    Ok(out)
}

fn decode_mime_bundle(
    bundle: &Map<String, Value>,
    metadata: Option<&Map<String, Value>>,
) -> Vec<DisplayData> {
    bundle
        .iter()
        .map(|(key, value)| {
            let mime = MimeType::parse(key);
            let mime = match mime.image_size() {
                Some(_) => mime.with_image_size(image_size_from_metadata(metadata, key)),
                None => mime,
            };
            // JSON renderings keep their serialized form, strings included.
            let content = match value {
                Value::String(s) if !mime.is_json() => s.clone(),
                other => other.to_string(),
            };
            DisplayData { mime, content }
        })
        .collect()
}

fn image_size_from_metadata(metadata: Option<&Map<String, Value>>, key: &str) -> ImageSize {
    let entry = metadata.and_then(|m| m.get(key));
    let dim = |name: &str| {
        entry
            .and_then(|e| e.get(name))
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    };
    ImageSize::new(dim("width"), dim("height"))
}

// ── Content encoding ──────────────────────────────────────────────────────────

/// Encodes a content body as its wire JSON object.
///
/// # Errors
///
/// Returns [`EncodeError::ReceiveOnly`] for kinds the kernel never sends.
pub fn encode_content(content: &Content) -> Result<Value, EncodeError> {
    let value = match content {
        Content::KernelInfoRequest
        | Content::CommInfoRequest(_)
        | Content::ExecuteRequest(_)
        | Content::InspectRequest(_)
        | Content::CompleteRequest(_)
        | Content::IsCompleteRequest(_)
        | Content::HistoryRequest(_)
        | Content::ShutdownRequest(_)
        | Content::InterruptRequest
        | Content::InputReply(_) => {
            return Err(EncodeError::ReceiveOnly(content.message_type()));
        }
        Content::KernelInfoReply(m) => encode_kernel_info_reply(m),
        Content::CommInfoReply(m) => {
            let comms: Map<String, Value> = m
                .comms
                .iter()
                .map(|c| (c.comm_id.clone(), json!({ "target_name": c.target_name })))
                .collect();
            json!({ "status": "ok", "comms": comms })
        }
        Content::ExecuteReply(m) => encode_execute_reply(m),
        Content::InspectReply(m) => {
            let mut obj = Map::new();
            obj.insert("status".to_string(), json!(m.status.as_str()));
            obj.insert("found".to_string(), json!(m.found));
            encode_mime_bundle(&m.data).into_content(obj)
        }
        Content::CompleteReply(m) => json!({
            "status": m.status.as_str(),
            "matches": m.matches,
            "cursor_start": m.cursor_start,
            "cursor_end": m.cursor_end,
            "metadata": m.metadata,
        }),
        Content::IsCompleteReply(m) => json!({
            "status": m.status.as_str(),
            "indent": m.indent,
        }),
        Content::HistoryReply(m) => {
            let history: Vec<Value> = m
                .history
                .iter()
                .map(|e| match &e.content {
                    HistoryContent::Input(input) => json!([e.session, e.line_number, input]),
                    HistoryContent::InputOutput { input, output } => {
                        json!([e.session, e.line_number, [input, output]])
                    }
                })
                .collect();
            json!({ "status": "ok", "history": history })
        }
        Content::ShutdownReply(m) => json!({ "status": "ok", "restart": m.restart }),
        Content::InterruptReply => json!({ "status": "ok" }),
        Content::Status(m) => json!({ "execution_state": m.execution_state.as_str() }),
        Content::Stream(m) => json!({ "name": m.name.as_str(), "text": m.text }),
        Content::DisplayData(m) | Content::UpdateDisplayData(m) => {
            let transient = match &m.display_id {
                Some(id) => json!({ "display_id": id }),
                None => json!({}),
            };
            let mut obj = Map::new();
            obj.insert("transient".to_string(), transient);
            encode_mime_bundle(&m.data).into_content(obj)
        }
        Content::ExecuteInput(m) => json!({
            "code": m.code,
            "execution_count": m.execution_count,
        }),
        Content::ExecuteResult(m) => {
            let mut obj = Map::new();
            obj.insert("execution_count".to_string(), json!(m.execution_count));
            encode_mime_bundle(&m.data).into_content(obj)
        }
        Content::Error(m) => json!({
            "ename": m.ename,
            "evalue": m.evalue,
            "traceback": m.traceback,
        }),
        Content::ClearOutput(m) => json!({ "wait": m.wait }),
        Content::InputRequest(m) => json!({ "prompt": m.prompt, "password": m.password }),
        Content::CommOpen(m) => {
            let mut obj = json!({
                "comm_id": m.comm_id,
                "target_name": m.target_name,
                "data": m.data,
            });
            if let (Some(module), Some(map)) = (&m.target_module, obj.as_object_mut()) {
                map.insert("target_module".to_string(), json!(module));
            }
            obj
        }
        Content::CommMsg(m) | Content::CommClose(m) => json!({
            "comm_id": m.comm_id,
            "data": m.data,
        }),
    };
    Ok(value)
}

fn encode_kernel_info_reply(m: &KernelInfoReply) -> Value {
    let mut language_info = json!({
        "name": m.language_info.name,
        "version": m.language_info.version,
        "mimetype": m.language_info.mimetype,
        "file_extension": m.language_info.file_extension,
    });
    if let Some(info) = language_info.as_object_mut() {
        if let Some(lexer) = &m.language_info.pygments_lexer {
            info.insert("pygments_lexer".to_string(), json!(lexer));
        }
        if let Some(mode) = &m.language_info.codemirror_mode {
            info.insert("codemirror_mode".to_string(), json!(mode));
        }
    }
    let help_links: Vec<Value> = m
        .help_links
        .iter()
        .map(|l| json!({ "text": l.text, "url": l.url }))
        .collect();
    json!({
        "status": "ok",
        "protocol_version": m.protocol_version,
        "implementation": m.implementation,
        "implementation_version": m.implementation_version,
        "language_info": language_info,
        "banner": m.banner,
        "help_links": help_links,
    })
}

fn encode_execute_reply(m: &ExecuteReply) -> Value {
    let payload: Vec<Value> = if m.pager.is_empty() {
        Vec::new()
    } else {
        let data = encode_mime_bundle(&m.pager).data;
        vec![json!({ "source": "page", "data": data, "start": 0 })]
    };

    let mut obj = json!({
        "status": m.status.as_str(),
        "execution_count": m.execution_count,
        "payload": payload,
        "user_expressions": m.user_expressions,
    });
    if let (Some(err), Some(map)) = (&m.error, obj.as_object_mut()) {
        map.insert("ename".to_string(), json!(err.ename));
        map.insert("evalue".to_string(), json!(err.evalue));
        map.insert("traceback".to_string(), json!(err.traceback));
    }
    obj
}

/// An encoded display payload: the `data` bundle, its `metadata` and an
/// optional legacy `text` rendering.
struct EncodedBundle {
    data: Value,
    metadata: Value,
    text: Option<String>,
}

impl EncodedBundle {
    /// Writes the bundle into an output-style message object.
    fn into_content(self, mut obj: Map<String, Value>) -> Value {
        obj.insert("data".to_string(), self.data);
        obj.insert("metadata".to_string(), self.metadata);
        if let Some(text) = self.text {
            obj.insert("text".to_string(), Value::String(text));
        }
        Value::Object(obj)
    }
}

/// Builds the `data` bundle and its companion `metadata` object.
///
/// The bundle holds one rendering per MIME type, the first one given. A second
/// `text/plain` rendering goes to the legacy `text` key, which decoding appends
/// after the bundle entries; any further duplicates are dropped. JSON-typed
/// renderings are embedded as JSON when their text parses; image dimensions
/// go into `metadata` under the MIME key.
fn encode_mime_bundle(data: &[DisplayData]) -> EncodedBundle {
    let mut bundle = Map::new();
    let mut metadata = Map::new();
    let mut text = None;
    for entry in data {
        let key = entry.mime.as_str().to_string();
        if bundle.contains_key(&key) {
            if entry.mime == MimeType::PlainText && text.is_none() {
                text = Some(entry.content.clone());
            } else {
                debug!(mime = %key, "dropping duplicate rendering");
            }
            continue;
        }
        let value = if entry.mime.is_json() {
            serde_json::from_str(&entry.content)
                .unwrap_or_else(|_| Value::String(entry.content.clone()))
        } else {
            Value::String(entry.content.clone())
        };
        if let Some(size) = entry.mime.image_size() {
            if !size.is_unspecified() {
                metadata.insert(
                    key.clone(),
                    json!({ "width": size.width, "height": size.height }),
                );
            }
        }
        bundle.insert(key, value);
    }
    EncodedBundle {
        data: Value::Object(bundle),
        metadata: Value::Object(metadata),
        text,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ids::Session;

    fn header_bytes(msg_type: &str) -> Vec<u8> {
        format!(
            r#"{{"msg_id":"m-1","session":"s-1","username":"frontend","version":"5.3","msg_type":"{msg_type}"}}"#
        )
        .into_bytes()
    }

    fn decode_content_str(msg_type: &str, content: &str) -> Result<Message, DecodeError> {
        decode(Vec::new(), &header_bytes(msg_type), b"{}", b"{}", content.as_bytes())
    }

    // ── Header and parent header ──────────────────────────────────────────────

    #[test]
    fn test_empty_parent_header_decodes_as_absent() {
        let header = decode_header(Vec::new(), &header_bytes("status"), b"{}", Map::new())
            .expect("decode");

        assert!(header.parent_header.is_none());
        assert_eq!(header.msg_type, MessageType::Status);
        assert_eq!(header.message_id, "m-1");
        assert_eq!(header.session_id, "s-1");
    }

    #[test]
    fn test_present_parent_header_decodes_one_level() {
        // Arrange
        let identities = vec![b"router-id".to_vec()];
        let mut metadata = Map::new();
        metadata.insert("k".to_string(), json!(1));
        let parent = header_bytes("execute_request");

        // Act
        let header = decode_header(
            identities.clone(),
            &header_bytes("execute_reply"),
            &parent,
            metadata.clone(),
        )
        .expect("decode");

        // Assert
        let parent = header.parent_header.expect("parent must be present");
        assert_eq!(parent.msg_type, MessageType::ExecuteRequest);
        assert_eq!(parent.identities, identities);
        assert_eq!(parent.metadata, metadata);
        assert!(parent.parent_header.is_none());
    }

    #[test]
    fn test_unknown_header_message_type_is_a_hard_failure() {
        let result = decode_content_str("frobnicate", "{}");
        assert!(matches!(result, Err(DecodeError::UnknownMessageType(t)) if t == "frobnicate"));
    }

    #[test]
    fn test_garbage_header_is_rejected() {
        let result = decode(Vec::new(), b"not json", b"{}", b"{}", b"{}");
        assert!(matches!(
            result,
            Err(DecodeError::InvalidJson { part: "header", .. })
        ));
    }

    #[test]
    fn test_bad_metadata_falls_back_to_empty_map() {
        let msg = decode(
            Vec::new(),
            &header_bytes("kernel_info_request"),
            b"{}",
            b"[[[",
            b"{}",
        )
        .expect("metadata errors must not fail decoding");

        assert!(msg.header.metadata.is_empty());
    }

    #[test]
    fn test_metadata_is_attached_to_header() {
        let msg = decode(
            Vec::new(),
            &header_bytes("kernel_info_request"),
            b"{}",
            br#"{"cellId":"abc"}"#,
            b"{}",
        )
        .unwrap();

        assert_eq!(msg.header.metadata["cellId"], "abc");
    }

    // ── Content parsers ───────────────────────────────────────────────────────

    #[test]
    fn test_execute_request_applies_defaults() {
        let msg = decode_content_str("execute_request", r#"{"code":"1+1"}"#).unwrap();

        let Content::ExecuteRequest(req) = msg.content else {
            panic!("wrong variant");
        };
        assert_eq!(req.code, "1+1");
        assert!(!req.silent);
        assert!(req.store_history);
        assert!(req.allow_stdin);
    }

    #[test]
    fn test_silent_execute_request_defaults_store_history_off() {
        let msg =
            decode_content_str("execute_request", r#"{"code":"x","silent":true}"#).unwrap();

        let Content::ExecuteRequest(req) = msg.content else {
            panic!("wrong variant");
        };
        assert!(req.silent);
        assert!(!req.store_history);
    }

    #[test]
    fn test_complete_request_without_cursor_pos_is_missing_field() {
        let result = decode_content_str("complete_request", r#"{"code":"pri"}"#);

        assert!(matches!(
            result,
            Err(DecodeError::MissingField {
                msg_type: MessageType::CompleteRequest,
                field: "cursor_pos"
            })
        ));
    }

    #[test]
    fn test_wrongly_typed_field_is_invalid() {
        let result = decode_content_str("execute_request", r#"{"code":42}"#);
        assert!(matches!(
            result,
            Err(DecodeError::InvalidField { field: "code", .. })
        ));
    }

    #[test]
    fn test_content_must_be_an_object() {
        let result = decode_content_str("kernel_info_request", "[]");
        assert!(matches!(
            result,
            Err(DecodeError::NotAnObject { part: "content" })
        ));
    }

    #[test]
    fn test_history_request_accepts_each_access_type() {
        for access in ["range", "tail", "search"] {
            let body = format!(r#"{{"output":false,"raw":true,"hist_access_type":"{access}"}}"#);
            let msg = decode_content_str("history_request", &body).unwrap();
            let Content::HistoryRequest(req) = msg.content else {
                panic!("wrong variant");
            };
            assert_eq!(req.access_type.as_str(), access);
        }
    }

    #[test]
    fn test_history_request_rejects_unknown_access_type() {
        let result = decode_content_str(
            "history_request",
            r#"{"output":false,"raw":true,"hist_access_type":"everything"}"#,
        );
        assert!(matches!(result, Err(DecodeError::InvalidField { .. })));
    }

    #[test]
    fn test_display_data_concatenates_data_and_legacy_text() {
        // Arrange
        let body = r#"{"data":{"text/html":"<b>hi</b>"},"text":"hi","metadata":{}}"#;

        // Act
        let msg = decode_content_str("display_data", body).unwrap();

        // Assert
        let Content::DisplayData(display) = msg.content else {
            panic!("wrong variant");
        };
        assert_eq!(
            display.data,
            vec![
                DisplayData::new(MimeType::Html, "<b>hi</b>"),
                DisplayData::plain("hi"),
            ]
        );
    }

    #[test]
    fn test_display_data_accepts_legacy_text_alone() {
        let msg = decode_content_str("display_data", r#"{"text":"legacy"}"#).unwrap();
        let Content::DisplayData(display) = msg.content else {
            panic!("wrong variant");
        };
        assert_eq!(display.data, vec![DisplayData::plain("legacy")]);
    }

    #[test]
    fn test_plain_data_and_legacy_text_survive_reencoding() {
        // Arrange
        let body = r#"{"data":{"text/plain":"a"},"text":"b","metadata":{}}"#;
        let first = decode_content_str("display_data", body).unwrap();

        // Act
        let encoded = encode_content(&first.content).unwrap();
        let second = decode_content_str("display_data", &encoded.to_string()).unwrap();

        // Assert
        assert_eq!(encoded["data"]["text/plain"], "a");
        assert_eq!(encoded["text"], "b");
        let Content::DisplayData(display) = second.content else {
            panic!("wrong variant");
        };
        assert_eq!(
            display.data,
            vec![DisplayData::plain("a"), DisplayData::plain("b")]
        );
    }

    #[test]
    fn test_encode_keeps_first_rendering_of_a_repeated_mime() {
        let content = Content::ExecuteResult(ExecuteResult {
            execution_count: 1,
            data: vec![
                DisplayData::new(MimeType::Html, "<i>one</i>"),
                DisplayData::new(MimeType::Html, "<i>two</i>"),
            ],
        });

        let value = encode_content(&content).unwrap();

        assert_eq!(value["data"]["text/html"], "<i>one</i>");
        assert!(value.get("text").is_none());
    }

    #[test]
    fn test_json_string_rendering_keeps_its_quotes() {
        // Arrange
        let content = Content::DisplayData(Display {
            data: vec![DisplayData::new(MimeType::Json, r#""hi""#)],
            display_id: None,
        });

        // Act
        let encoded = encode_content(&content).unwrap();
        let decoded = decode_content_str("display_data", &encoded.to_string()).unwrap();

        // Assert
        assert_eq!(encoded["data"]["application/json"], json!("hi"));
        let Content::DisplayData(display) = decoded.content else {
            panic!("wrong variant");
        };
        assert_eq!(display.data, vec![DisplayData::new(MimeType::Json, r#""hi""#)]);
    }

    #[test]
    fn test_display_data_without_payload_is_missing_data() {
        let result = decode_content_str("display_data", r#"{"metadata":{}}"#);
        assert!(matches!(
            result,
            Err(DecodeError::MissingField { field: "data", .. })
        ));
    }

    #[test]
    fn test_unknown_mime_and_image_size_are_decoded() {
        let body = r#"{"data":{"image/png":"AAAA","application/x-foo":{"a":1}},
                       "metadata":{"image/png":{"width":64,"height":32}}}"#;

        let msg = decode_content_str("display_data", body).unwrap();

        let Content::DisplayData(display) = msg.content else {
            panic!("wrong variant");
        };
        assert_eq!(display.data[0].mime, MimeType::Png(ImageSize::new(64, 32)));
        assert_eq!(
            display.data[1].mime,
            MimeType::Unknown("application/x-foo".to_string())
        );
        assert_eq!(display.data[1].content, r#"{"a":1}"#);
    }

    #[test]
    fn test_unknown_reply_status_is_lenient() {
        let msg = decode_content_str(
            "execute_reply",
            r#"{"status":"pending","execution_count":3}"#,
        )
        .unwrap();

        let Content::ExecuteReply(reply) = msg.content else {
            panic!("wrong variant");
        };
        assert_eq!(reply.status, ExecuteStatus::Unknown("pending".to_string()));
    }

    #[test]
    fn test_unknown_execution_state_is_rejected() {
        let result = decode_content_str("status", r#"{"execution_state":"napping"}"#);
        assert!(matches!(result, Err(DecodeError::InvalidField { .. })));
    }

    #[test]
    fn test_try_decode_yields_none_on_failure() {
        let msg = try_decode(
            Vec::new(),
            &header_bytes("complete_request"),
            b"{}",
            b"{}",
            br#"{"code":"x"}"#,
        );
        assert!(msg.is_none());
    }

    // ── Encoding ──────────────────────────────────────────────────────────────

    #[test]
    fn test_encode_receive_only_is_a_contract_error() {
        let session = Session::new("kernel");
        let msg = Message::new(
            Content::ExecuteRequest(ExecuteRequest::new("1+1")),
            &session,
        );

        let result = encode(&msg);

        assert!(matches!(
            result,
            Err(EncodeError::ReceiveOnly(MessageType::ExecuteRequest))
        ));
    }

    #[test]
    fn test_every_receive_only_type_is_refused_by_encode_content() {
        let receive_only = [
            Content::KernelInfoRequest,
            Content::CommInfoRequest(CommInfoRequest { target_name: None }),
            Content::ExecuteRequest(ExecuteRequest::new("")),
            Content::InspectRequest(InspectRequest {
                code: String::new(),
                cursor_pos: 0,
                detail_level: 0,
            }),
            Content::CompleteRequest(CompleteRequest {
                code: String::new(),
                cursor_pos: 0,
            }),
            Content::IsCompleteRequest(IsCompleteRequest {
                code: String::new(),
            }),
            Content::HistoryRequest(HistoryRequest {
                output: false,
                raw: false,
                access_type: HistoryAccessType::Tail,
            }),
            Content::ShutdownRequest(Shutdown { restart: false }),
            Content::InterruptRequest,
            Content::InputReply(InputReply {
                value: String::new(),
            }),
        ];
        for content in receive_only {
            assert!(content.message_type().is_receive_only());
            assert!(encode_content(&content).is_err(), "{:?}", content.message_type());
        }
    }

    #[test]
    fn test_encode_writes_empty_parent_for_root_messages() {
        let session = Session::new("kernel");
        let msg = Message::new(
            Content::Status(Status {
                execution_state: ExecutionState::Starting,
            }),
            &session,
        );

        let parts = encode(&msg).unwrap();

        assert_eq!(parts.parent_header, b"{}");
        assert_eq!(parts.metadata, b"{}");
        let content: Value = serde_json::from_slice(&parts.content).unwrap();
        assert_eq!(content, json!({ "execution_state": "starting" }));
    }

    #[test]
    fn test_encode_display_embeds_json_and_image_metadata() {
        let content = Content::DisplayData(Display {
            data: vec![
                DisplayData::new(MimeType::Json, r#"{"x":1}"#),
                DisplayData::new(MimeType::Png(ImageSize::new(10, 20)), "AAAA"),
            ],
            display_id: Some("d-1".to_string()),
        });

        let value = encode_content(&content).unwrap();

        assert_eq!(value["data"]["application/json"], json!({ "x": 1 }));
        assert_eq!(value["data"]["image/png"], "AAAA");
        assert_eq!(
            value["metadata"]["image/png"],
            json!({ "width": 10, "height": 20 })
        );
        assert_eq!(value["transient"]["display_id"], "d-1");
    }

    #[test]
    fn test_encode_execute_reply_error_fields() {
        let content = Content::ExecuteReply(ExecuteReply {
            status: ExecuteStatus::Error,
            execution_count: 4,
            pager: Vec::new(),
            user_expressions: Map::new(),
            error: Some(ErrorReport {
                ename: "NameError".to_string(),
                evalue: "x".to_string(),
                traceback: vec!["line 1".to_string()],
            }),
        });

        let value = encode_content(&content).unwrap();

        assert_eq!(value["status"], "error");
        assert_eq!(value["ename"], "NameError");
        assert_eq!(value["traceback"], json!(["line 1"]));
    }
}
