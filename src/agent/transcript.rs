//! Conversation transcript
//!
//! The transcript is append-only during a chat turn. A tool call and its
//! result are always appended together, after the tool has finished, so an
//! interrupted turn can never leave a call without a matching result.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tools::ToolErrorKind;

/// One entry of the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    User {
        text: String,
    },
    Assistant {
        text: String,
    },
    ToolCall {
        call_id: String,
        name: String,
        arguments: Value,
    },
    ToolResult {
        call_id: String,
        name: String,
        outcome: ToolOutcome,
    },
}

impl Turn {
    pub fn role(&self) -> &'static str {
        match self {
            Turn::User { .. } => "user",
            Turn::Assistant { .. } => "assistant",
            Turn::ToolCall { .. } => "tool_call",
            Turn::ToolResult { .. } => "tool_result",
        }
    }
}

/// Result of a tool call as recorded in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { output: Value },
    Failure { kind: ToolErrorKind, message: String },
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }

    /// JSON object handed back to the model as the function response
    pub fn to_response_value(&self) -> Value {
        match self {
            ToolOutcome::Success { output } => json!({ "ok": true, "output": output }),
            ToolOutcome::Failure { kind, message } => json!({
                "ok": false,
                "error": { "kind": kind, "message": message }
            }),
        }
    }
}

/// Ordered conversation history of a session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::User { text: text.into() });
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::Assistant { text: text.into() });
    }

    /// Append a tool call together with its result
    pub fn push_tool_exchange(
        &mut self,
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: Value,
        outcome: ToolOutcome,
    ) {
        let call_id = call_id.into();
        let name = name.into();
        self.turns.push(Turn::ToolCall {
            call_id: call_id.clone(),
            name: name.clone(),
            arguments,
        });
        self.turns.push(Turn::ToolResult {
            call_id,
            name,
            outcome,
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Every tool call is immediately followed by the result with the same id,
    /// and no result appears without its call.
    pub fn is_well_formed(&self) -> bool {
        let mut i = 0;
        while i < self.turns.len() {
            match &self.turns[i] {
                Turn::ToolCall { call_id, .. } => match self.turns.get(i + 1) {
                    Some(Turn::ToolResult { call_id: result_id, .. }) if result_id == call_id => {
                        i += 2;
                    }
                    _ => return false,
                },
                Turn::ToolResult { .. } => return false,
                _ => i += 1,
            }
        }
        true
    }
}
