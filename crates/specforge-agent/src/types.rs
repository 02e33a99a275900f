use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// ─── Wire messages ────────────────────────────────────────────────────────

/// The subset of `claude --output-format stream-json` messages the gateway
/// understands. Discriminated by the JSON `"type"` field; any other type
/// (`user`, `stream_event`, `rate_limit_event`, ...) is skipped by the
/// process reader.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    System(SystemMessage),
    Assistant(AssistantMessage),
    Result(ResultMessage),
}

impl Message {
    pub fn session_id(&self) -> &str {
        match self {
            Message::System(m) => &m.session_id,
            Message::Assistant(m) => &m.session_id,
            Message::Result(m) => m.session_id(),
        }
    }
}

/// `type = "system"`. Only `init` carries fields we read; every other
/// subtype is accepted and ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemMessage {
    pub session_id: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantMessage {
    pub message: AssistantContent,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantContent {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        /// Tool inputs vary per tool.
        input: serde_json::Value,
    },
    Thinking {
        thinking: String,
    },
}

/// `type = "result"` — the terminal message of every turn.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ResultMessage {
    Success(ResultSuccess),
    ErrorDuringExecution(ResultError),
    ErrorMaxTurns(ResultError),
    ErrorMaxBudgetUsd(ResultError),
}

impl ResultMessage {
    pub fn session_id(&self) -> &str {
        match self {
            ResultMessage::Success(r) => &r.session_id,
            ResultMessage::ErrorDuringExecution(r)
            | ResultMessage::ErrorMaxTurns(r)
            | ResultMessage::ErrorMaxBudgetUsd(r) => &r.session_id,
        }
    }

    pub fn subtype(&self) -> &'static str {
        match self {
            ResultMessage::Success(_) => "success",
            ResultMessage::ErrorDuringExecution(_) => "error_during_execution",
            ResultMessage::ErrorMaxTurns(_) => "error_max_turns",
            ResultMessage::ErrorMaxBudgetUsd(_) => "error_max_budget_usd",
        }
    }

    /// A success subtype can still carry `is_error: true` (for example when
    /// the API rejected the request); both count as a failed turn.
    pub fn is_error(&self) -> bool {
        match self {
            ResultMessage::Success(r) => r.is_error,
            _ => true,
        }
    }

    pub fn result_text(&self) -> Option<&str> {
        if let ResultMessage::Success(r) = self {
            Some(&r.result)
        } else {
            None
        }
    }

    pub fn errors(&self) -> Vec<String> {
        match self {
            ResultMessage::Success(r) if r.is_error => vec![r.result.clone()],
            ResultMessage::Success(_) => Vec::new(),
            ResultMessage::ErrorDuringExecution(r)
            | ResultMessage::ErrorMaxTurns(r)
            | ResultMessage::ErrorMaxBudgetUsd(r) => r.errors.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultSuccess {
    pub session_id: String,
    pub result: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub total_cost_usd: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultError {
    pub session_id: String,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub errors: Vec<String>,
}

// ─── Gateway events ───────────────────────────────────────────────────────

/// One typed event surfaced to pipeline code while the agent works.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A chunk of assistant prose.
    Text(String),
    /// The agent invoked a tool (file write, shell command, ...).
    ToolUse {
        name: String,
        input: serde_json::Value,
    },
}

impl AgentEvent {
    /// Flatten an assistant message into events, dropping thinking blocks.
    pub fn from_assistant(msg: &AssistantMessage) -> Vec<AgentEvent> {
        msg.message
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(AgentEvent::Text(text.clone())),
                ContentBlock::ToolUse { name, input, .. } => Some(AgentEvent::ToolUse {
                    name: name.clone(),
                    input: input.clone(),
                }),
                ContentBlock::Thinking { .. } => None,
            })
            .collect()
    }
}

// ─── Spawn options ────────────────────────────────────────────────────────

/// Options for one `claude` subprocess.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Claude model name (e.g. `"claude-sonnet-4-6"`).
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub permission_mode: PermissionMode,
    /// Working directory for the subprocess.
    pub cwd: Option<PathBuf>,
    /// Extra readable/writable directories (`--add-dir`).
    pub additional_directories: Vec<PathBuf>,
    pub env: HashMap<String, String>,
    /// Custom path to the `claude` binary (default: `"claude"`).
    pub path_to_executable: Option<String>,
}

/// Controls how tool executions are authorized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PermissionMode {
    #[default]
    Default,
    AcceptEdits,
    BypassPermissions,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Message {
        serde_json::from_str(json).expect("failed to parse message")
    }

    #[test]
    fn parse_system_init() {
        let msg = parse(
            r#"{"type":"system","subtype":"init","session_id":"abc","model":"m","cwd":"/tmp","tools":["Read"]}"#,
        );
        let Message::System(sys) = msg else {
            panic!("expected System")
        };
        assert_eq!(sys.session_id, "abc");
        assert_eq!(sys.model.as_deref(), Some("m"));
    }

    #[test]
    fn parse_assistant_blocks_into_events() {
        let msg = parse(
            r#"{
                "type": "assistant",
                "session_id": "abc",
                "message": {
                    "content": [
                        {"type": "thinking", "thinking": "hmm"},
                        {"type": "text", "text": "Writing spec"},
                        {"type": "tool_use", "id": "t1", "name": "Write", "input": {"file_path": "spec.md"}}
                    ]
                }
            }"#,
        );
        let Message::Assistant(a) = msg else {
            panic!("expected Assistant")
        };
        let events = AgentEvent::from_assistant(&a);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], AgentEvent::Text("Writing spec".into()));
        assert!(matches!(&events[1], AgentEvent::ToolUse { name, .. } if name == "Write"));
    }

    #[test]
    fn result_success_with_is_error_counts_as_error() {
        let msg = parse(
            r#"{"type":"result","subtype":"success","session_id":"s","result":"API Error: 529","is_error":true}"#,
        );
        let Message::Result(r) = msg else {
            panic!("expected Result")
        };
        assert!(r.is_error());
        assert_eq!(r.errors(), vec!["API Error: 529".to_string()]);
    }

    #[test]
    fn result_max_turns_is_error() {
        let msg = parse(
            r#"{"type":"result","subtype":"error_max_turns","session_id":"s","num_turns":30,"errors":[]}"#,
        );
        let Message::Result(r) = msg else {
            panic!("expected Result")
        };
        assert!(r.is_error());
        assert_eq!(r.subtype(), "error_max_turns");
        assert!(r.result_text().is_none());
    }

    #[test]
    fn unknown_message_type_fails_typed_parse() {
        let res = serde_json::from_str::<Message>(r#"{"type":"rate_limit_event","session_id":"s"}"#);
        assert!(res.is_err());
    }
}
