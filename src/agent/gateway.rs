//! Model gateway abstraction
//!
//! The agent loop talks to the language model only through [`ModelGateway`],
//! so tests can drive it with a scripted fake and the Gemini client stays a
//! replaceable detail.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::transcript::Turn;
use crate::tools::ToolDeclaration;

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Locally unique id pairing the call with its result
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

/// The model's next step
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// One or more tool calls to run before asking again
    ToolCalls {
        calls: Vec<ToolInvocation>,
        /// Text the model sent alongside the calls
        commentary: Option<String>,
    },
    /// Plain-text answer that ends the turn
    FinalAnswer(String),
}

impl ModelReply {
    /// Tool calls with no accompanying text
    pub fn tool_calls(calls: Vec<ToolInvocation>) -> Self {
        ModelReply::ToolCalls {
            calls,
            commentary: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network failure, timeout or non-success HTTP status
    #[error("model transport error: {0}")]
    Transport(String),
    /// The provider answered with something that is neither text nor a tool call
    #[error("model protocol error: {0}")]
    Protocol(String),
}

#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Model identifier, used for logging and metrics labels
    fn model(&self) -> &str;

    /// Ask the model for its next step given the full transcript
    async fn next_step(
        &self,
        system_prompt: &str,
        transcript: &[Turn],
        tools: &[ToolDeclaration],
    ) -> Result<ModelReply, GatewayError>;
}
