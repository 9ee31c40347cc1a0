//! A demonstration kernel whose every cell evaluates to its own source.
//!
//! Beyond the echo itself it keeps an in-memory input history (served to
//! `history_request`), completes words seen in earlier cells, and reports a
//! cell ending in a backslash as incomplete.

use std::collections::BTreeSet;

use async_trait::async_trait;
use nbkernel_core::protocol::messages::{
    CodeCompleteness, CompleteReply, CompleteRequest, ExecuteRequest, ExecuteStatus,
    HistoryContent, HistoryReply, HistoryReplyElement, HistoryRequest, IsCompleteReply,
    IsCompleteRequest, KernelInfoReply, LanguageInfo,
};
use nbkernel_core::DisplayData;
use serde_json::Map;
use tokio::sync::Mutex;
use tracing::debug;

use super::handler::{ExecuteOutcome, KernelHandler};
use super::output::OutputHandle;
use crate::infrastructure::config::KernelConfig;

/// Session number reported for entries of the running session.
const CURRENT_SESSION: u32 = 0;

struct HistoryEntry {
    line_number: u32,
    input: String,
}

/// Echoes cell source back as a `text/plain` result.
pub struct EchoHandler {
    config: KernelConfig,
    history: Mutex<Vec<HistoryEntry>>,
}

impl EchoHandler {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            config,
            history: Mutex::new(Vec::new()),
        }
    }
}

/// Splits `code` at `cursor_pos` (counted in characters) and returns the
/// partial word before the cursor with its starting position.
fn word_before_cursor(code: &str, cursor_pos: usize) -> (usize, String) {
    let before: Vec<char> = code.chars().take(cursor_pos).collect();
    let start = before
        .iter()
        .rposition(|c| !(c.is_alphanumeric() || *c == '_'))
        .map_or(0, |i| i + 1);
    (start, before[start..].iter().collect())
}

#[async_trait]
impl KernelHandler for EchoHandler {
    fn language_info(&self) -> LanguageInfo {
        self.config.language.to_language_info()
    }

    fn kernel_info(&self) -> KernelInfoReply {
        KernelInfoReply {
            protocol_version: nbkernel_core::protocol::PROTOCOL_VERSION.to_string(),
            implementation: self.config.kernel.implementation.clone(),
            implementation_version: env!("CARGO_PKG_VERSION").to_string(),
            language_info: self.language_info(),
            banner: self.config.kernel.banner.clone(),
            help_links: Vec::new(),
        }
    }

    async fn execute(
        &self,
        request: &ExecuteRequest,
        execution_count: u32,
        output: &OutputHandle,
    ) -> ExecuteOutcome {
        if output.is_interrupted() {
            return ExecuteOutcome::Aborted;
        }
        if request.store_history && !request.silent {
            self.history.lock().await.push(HistoryEntry {
                line_number: execution_count,
                input: request.code.clone(),
            });
        }
        debug!(execution_count, "echoing {} bytes", request.code.len());
        if request.code.trim().is_empty() {
            return ExecuteOutcome::ok();
        }
        ExecuteOutcome::result(vec![DisplayData::plain(request.code.clone())])
    }

    async fn complete(&self, request: &CompleteRequest) -> CompleteReply {
        let (cursor_start, prefix) = word_before_cursor(&request.code, request.cursor_pos);
        let matches = if prefix.is_empty() {
            Vec::new()
        } else {
            let history = self.history.lock().await;
            history
                .iter()
                .flat_map(|entry| entry.input.split(|c: char| !(c.is_alphanumeric() || c == '_')))
                .filter(|word| word.starts_with(prefix.as_str()) && *word != prefix)
                .map(str::to_string)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        CompleteReply {
            status: ExecuteStatus::Ok,
            matches,
            cursor_start,
            cursor_end: request.cursor_pos,
            metadata: Map::new(),
        }
    }

    async fn is_complete(&self, request: &IsCompleteRequest) -> IsCompleteReply {
        if request.code.trim_end().ends_with('\\') {
            IsCompleteReply {
                status: CodeCompleteness::Incomplete,
                indent: String::new(),
            }
        } else {
            IsCompleteReply {
                status: CodeCompleteness::Complete,
                indent: String::new(),
            }
        }
    }

    async fn history(&self, request: &HistoryRequest) -> HistoryReply {
        // Every access type returns the whole session history.
        let history = self.history.lock().await;
        let history = history
            .iter()
            .map(|entry| HistoryReplyElement {
                session: CURRENT_SESSION,
                line_number: entry.line_number,
                content: if request.output {
                    HistoryContent::InputOutput {
                        input: entry.input.clone(),
                        output: entry.input.clone(),
                    }
                } else {
                    HistoryContent::Input(entry.input.clone())
                },
            })
            .collect();
        HistoryReply { history }
    }
}
