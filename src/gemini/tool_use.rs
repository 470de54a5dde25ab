//! Gemini `generateContent` wire format with function calling
//!
//! Converts the transcript into Gemini `contents` and a response back into a
//! [`ModelReply`]. Tool calls become `functionCall` parts of a `model` turn,
//! tool results become `functionResponse` parts of a `user` turn, and
//! consecutive turns with the same role are merged into one content block.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::{GatewayError, ModelReply, ToolInvocation, Turn};
use crate::tools::ToolDeclaration;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
}

impl GenerateContentRequest {
    pub fn new(system_prompt: &str, transcript: &[Turn], tools: &[ToolDeclaration]) -> Self {
        let system_instruction = if system_prompt.trim().is_empty() {
            None
        } else {
            Some(Content {
                role: None,
                parts: vec![Part::text(system_prompt)],
            })
        };

        let (tools, tool_config) = if tools.is_empty() {
            (Vec::new(), None)
        } else {
            (
                vec![ToolSet {
                    function_declarations: tools.to_vec(),
                }],
                Some(ToolConfig {
                    function_calling_config: FunctionCallingConfig {
                        mode: "AUTO".to_string(),
                    },
                }),
            )
        };

        Self {
            contents: build_contents(transcript),
            system_instruction,
            tools,
            tool_config,
        }
    }
}

/// One role-tagged block of parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A content part; exactly one field is set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn function_call(name: impl Into<String>, args: Value) -> Self {
        Self {
            function_call: Some(FunctionCall {
                name: name.into(),
                args,
            }),
            ..Default::default()
        }
    }

    pub fn function_response(name: impl Into<String>, response: Value) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                name: name.into(),
                response,
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSet {
    pub function_declarations: Vec<ToolDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    pub function_calling_config: FunctionCallingConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionCallingConfig {
    pub mode: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// Error envelope returned with non-2xx statuses
#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn push_part(contents: &mut Vec<Content>, role: &str, part: Part) {
    match contents.last_mut() {
        Some(last) if last.role.as_deref() == Some(role) => last.parts.push(part),
        _ => contents.push(Content {
            role: Some(role.to_string()),
            parts: vec![part],
        }),
    }
}

/// Serialize the transcript into Gemini `contents`
///
/// A run of tool exchanges is emitted as one `model` block holding every
/// `functionCall` followed by one `user` block holding every
/// `functionResponse`, matching how the model issued them.
pub fn build_contents(transcript: &[Turn]) -> Vec<Content> {
    let mut contents: Vec<Content> = Vec::new();
    let mut i = 0;

    while i < transcript.len() {
        match &transcript[i] {
            Turn::ToolCall { .. } | Turn::ToolResult { .. } => {
                let start = i;
                while i < transcript.len()
                    && matches!(transcript[i], Turn::ToolCall { .. } | Turn::ToolResult { .. })
                {
                    i += 1;
                }
                let run = &transcript[start..i];
                for turn in run {
                    if let Turn::ToolCall { name, arguments, .. } = turn {
                        push_part(&mut contents, "model", Part::function_call(name, arguments.clone()));
                    }
                }
                for turn in run {
                    if let Turn::ToolResult { name, outcome, .. } = turn {
                        push_part(
                            &mut contents,
                            "user",
                            Part::function_response(name, outcome.to_response_value()),
                        );
                    }
                }
            }
            Turn::User { text } => {
                push_part(&mut contents, "user", Part::text(text));
                i += 1;
            }
            Turn::Assistant { text } => {
                push_part(&mut contents, "model", Part::text(text));
                i += 1;
            }
        }
    }

    contents
}

/// Interpret a decoded response as the model's next step
pub fn parse_reply(response: GenerateContentResponse) -> Result<ModelReply, GatewayError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map(|r| format!("prompt was blocked ({})", r))
            .unwrap_or_else(|| "response contained no candidates".to_string());
        return Err(GatewayError::Protocol(reason));
    };

    let finish_reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
    let parts = match candidate.content {
        Some(content) if !content.parts.is_empty() => content.parts,
        _ => {
            return Err(GatewayError::Protocol(format!(
                "candidate had no content (finish reason: {})",
                finish_reason
            )))
        }
    };

    let mut calls = Vec::new();
    let mut text = String::new();
    for part in parts {
        if let Some(call) = part.function_call {
            let arguments = if call.args.is_null() {
                Value::Object(Default::default())
            } else {
                call.args
            };
            calls.push(ToolInvocation {
                call_id: Uuid::now_v7().to_string(),
                name: call.name,
                arguments,
            });
        } else if let Some(t) = part.text {
            text.push_str(&t);
        }
    }

    if !calls.is_empty() {
        let commentary = (!text.trim().is_empty()).then_some(text);
        return Ok(ModelReply::ToolCalls { calls, commentary });
    }
    if text.trim().is_empty() {
        return Err(GatewayError::Protocol(format!(
            "candidate contained neither text nor a function call (finish reason: {})",
            finish_reason
        )));
    }
    Ok(ModelReply::FinalAnswer(text))
}

/// Human-readable message from a non-2xx response body
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .and_then(|wrapper| {
            let msg = wrapper.error.message?;
            Some(match wrapper.error.status {
                Some(status) if !status.is_empty() => format!("{}: {}", status, msg),
                _ => msg,
            })
        })
        .unwrap_or_else(|| body.trim().to_string())
}
