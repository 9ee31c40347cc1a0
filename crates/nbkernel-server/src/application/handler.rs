//! Handler registration surface implemented by a language backend.
//!
//! The dispatch loop owns all protocol mechanics (status broadcasts, reply
//! labelling, parent headers, execution counting).  A backend only answers
//! the questions each request asks.  Everything except [`KernelHandler::execute`]
//! and [`KernelHandler::language_info`] has a protocol-conforming default, so a
//! minimal kernel implements two methods.

use async_trait::async_trait;
use nbkernel_core::protocol::header::PROTOCOL_VERSION;
use nbkernel_core::protocol::messages::{
    CodeCompleteness, CommData, CommInfoReply, CommInfoRequest, CommOpen, CompleteReply,
    CompleteRequest, ErrorReport, ExecuteRequest, ExecuteStatus, HistoryReply, HistoryRequest,
    InspectReply, InspectRequest, IsCompleteReply, IsCompleteRequest, KernelInfoReply,
    LanguageInfo,
};
use nbkernel_core::DisplayData;
use serde_json::{Map, Value};

use super::output::OutputHandle;

/// How an execution finished.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteOutcome {
    /// Success.  `result` is published as `execute_result`; `pager` travels in
    /// the reply payload.
    Ok {
        result: Option<Vec<DisplayData>>,
        pager: Vec<DisplayData>,
        user_expressions: Map<String, Value>,
    },
    /// Failure.  Published as `error` and reported in the reply.
    Error(ErrorReport),
    /// Stopped before completion, e.g. after an interrupt.
    Aborted,
}

impl ExecuteOutcome {
    /// Success with nothing to display.
    pub fn ok() -> Self {
        ExecuteOutcome::Ok {
            result: None,
            pager: Vec::new(),
            user_expressions: Map::new(),
        }
    }

    /// Success with an `execute_result`.
    pub fn result(data: Vec<DisplayData>) -> Self {
        ExecuteOutcome::Ok {
            result: Some(data),
            pager: Vec::new(),
            user_expressions: Map::new(),
        }
    }

    pub fn error(
        ename: impl Into<String>,
        evalue: impl Into<String>,
        traceback: Vec<String>,
    ) -> Self {
        ExecuteOutcome::Error(ErrorReport {
            ename: ename.into(),
            evalue: evalue.into(),
            traceback,
        })
    }

    pub fn status(&self) -> ExecuteStatus {
        match self {
            ExecuteOutcome::Ok { .. } => ExecuteStatus::Ok,
            ExecuteOutcome::Error(_) => ExecuteStatus::Error,
            ExecuteOutcome::Aborted => ExecuteStatus::Abort,
        }
    }
}

/// Callbacks invoked by the dispatch loop, one per request kind.
#[async_trait]
pub trait KernelHandler: Send + Sync + 'static {
    /// Language metadata for `kernel_info_reply`.
    fn language_info(&self) -> LanguageInfo;

    /// Runs `request.code`.  `execution_count` is the number assigned to this
    /// execution (unchanged from the previous one for silent requests).
    async fn execute(
        &self,
        request: &ExecuteRequest,
        execution_count: u32,
        output: &OutputHandle,
    ) -> ExecuteOutcome;

    fn kernel_info(&self) -> KernelInfoReply {
        KernelInfoReply {
            protocol_version: PROTOCOL_VERSION.to_string(),
            implementation: env!("CARGO_PKG_NAME").to_string(),
            implementation_version: env!("CARGO_PKG_VERSION").to_string(),
            language_info: self.language_info(),
            banner: String::new(),
            help_links: Vec::new(),
        }
    }

    async fn inspect(&self, _request: &InspectRequest) -> InspectReply {
        InspectReply {
            status: ExecuteStatus::Ok,
            found: false,
            data: Vec::new(),
        }
    }

    async fn complete(&self, request: &CompleteRequest) -> CompleteReply {
        CompleteReply {
            status: ExecuteStatus::Ok,
            matches: Vec::new(),
            cursor_start: request.cursor_pos,
            cursor_end: request.cursor_pos,
            metadata: Map::new(),
        }
    }

    async fn is_complete(&self, _request: &IsCompleteRequest) -> IsCompleteReply {
        IsCompleteReply {
            status: CodeCompleteness::Unknown,
            indent: String::new(),
        }
    }

    async fn history(&self, _request: &HistoryRequest) -> HistoryReply {
        HistoryReply {
            history: Vec::new(),
        }
    }

    async fn comm_info(&self, _request: &CommInfoRequest) -> CommInfoReply {
        CommInfoReply { comms: Vec::new() }
    }

    /// Called for `comm_open`.  The default rejects every target by closing
    /// the comm straight away.
    async fn comm_open(&self, request: &CommOpen, output: &OutputHandle) {
        output.comm_close(request.comm_id.clone(), Value::Object(Map::new()));
    }

    async fn comm_msg(&self, _request: &CommData, _output: &OutputHandle) {}

    async fn comm_close(&self, _request: &CommData, _output: &OutputHandle) {}

    /// Called on `interrupt_request`, after the interrupt flag is raised.
    async fn interrupt(&self) {}

    /// Called on `shutdown_request`, before the reply is sent.
    async fn shutdown(&self, _restart: bool) {}
}
