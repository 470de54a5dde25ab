//! Agent module for LLM-driven code editing
//!
//! This module provides the agent loop that orchestrates:
//! - a tool-calling language model behind [`ModelGateway`]
//! - the tool registry (code execution, file management, web search)
//! - per-user [`Session`] state
//!
//! # Architecture
//!
//! ```text
//! User message → AgentController → ModelGateway::next_step (with tools)
//!                      ↓
//!             ModelReply::ToolCalls
//!                      ↓
//!             ToolRegistry::dispatch → ToolOutput / ToolError
//!                      ↓
//!             Transcript gets call + result, Session gets effects
//!                      ↓
//!             Ask the model again → Loop or FinalAnswer
//! ```

pub mod controller;
pub mod gateway;
pub mod sessions;
pub mod transcript;

pub use controller::{
    AgentConfig, AgentController, AgentError, AgentResult, DEFAULT_AGENT_SYSTEM_PROMPT,
    DEFAULT_MAX_ITERATIONS,
};
pub use gateway::{GatewayError, ModelGateway, ModelReply, ToolInvocation};
pub use sessions::Session;
pub use transcript::{ToolOutcome, Transcript, Turn};
