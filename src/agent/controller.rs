//! Agent Controller - main orchestration loop for LLM-driven editing
//!
//! The AgentController alternates between the model gateway and the tool
//! registry until the model produces a plain-text answer or the iteration
//! cap is hit. Tool failures are fed back to the model as failure results;
//! only gateway failures and cap exhaustion end the loop with an error.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::metrics::{AGENT_ITERATIONS_TOTAL, AGENT_TASKS, AGENT_TOOL_CALLS, LLM_CALL_TIME};
use crate::tools::{ToolContext, ToolRegistry};

use super::gateway::{GatewayError, ModelGateway, ModelReply, ToolInvocation};
use super::sessions::Session;
use super::transcript::ToolOutcome;

/// Default cap on model queries per chat turn
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// System prompt used when [`AgentConfig::system_prompt`] is `None`
pub const DEFAULT_AGENT_SYSTEM_PROMPT: &str = r#"You are a coding assistant inside a terminal code editor.

You have these tools:
- execute_code: run a complete Python, JavaScript, Java or C++ program and see its output
- file_manager: create, read, update, delete and list files and folders in the user's workspace
- web_search: look up current information on the web

Guidelines:
- Run code to verify results rather than guessing
- If code fails, read the error output and fix it
- Java code must declare a public class
- All file paths are relative to the workspace root
- When the task is complete, respond with your final answer in plain text"#;

/// Configuration for the agent controller
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum number of model queries before giving up
    pub max_iterations: usize,
    /// Custom system prompt (uses default if None)
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_prompt: None,
        }
    }
}

/// Result of an agent run
#[derive(Debug, Clone)]
pub struct AgentResult {
    /// Final response from the model
    pub final_response: String,
    /// Number of model queries made
    pub iterations: usize,
    /// Number of tool calls executed
    pub tool_calls_made: usize,
    /// Unique trace ID for this agent run
    pub trace_id: String,
}

/// Error type for agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    /// Maximum iterations reached without a final answer
    #[error("could not complete the request within {iterations} model calls")]
    MaxIterationsReached { iterations: usize },
    #[error("could not complete the request: {0}")]
    Transport(String),
    #[error("could not complete the request: {0}")]
    Protocol(String),
}

impl AgentError {
    fn outcome_label(&self) -> &'static str {
        match self {
            AgentError::MaxIterationsReached { .. } => "max_iterations",
            AgentError::Transport(_) => "transport_error",
            AgentError::Protocol(_) => "protocol_error",
        }
    }
}

impl From<GatewayError> for AgentError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Transport(_) => AgentError::Transport(e.to_string()),
            GatewayError::Protocol(_) => AgentError::Protocol(e.to_string()),
        }
    }
}

/// Agent Controller orchestrating the model and the tools
pub struct AgentController {
    gateway: Arc<dyn ModelGateway>,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl AgentController {
    /// Create a new agent controller
    ///
    /// # Arguments
    /// * `gateway` - Model gateway used for every query
    /// * `tools` - Tools the model may call
    /// * `config` - Agent configuration
    pub fn new(gateway: Arc<dyn ModelGateway>, tools: ToolRegistry, config: AgentConfig) -> Self {
        Self {
            gateway,
            tools,
            config,
        }
    }

    pub fn model(&self) -> &str {
        self.gateway.model()
    }

    /// Run one chat turn for `message` against `session`
    ///
    /// The user message, every tool call/result pair and the final answer are
    /// appended to the session transcript. Tool effects (code buffers and
    /// execution results) are applied to the session as they happen and are
    /// not rolled back if the loop later fails.
    pub async fn run(&self, session: &mut Session, message: &str) -> Result<AgentResult, AgentError> {
        let trace_id = Uuid::now_v7().to_string();
        let model = self.gateway.model().to_string();

        let root_span = info_span!(
            "agent_task",
            trace_id = %trace_id,
            session_id = %session.id,
            model = %model,
        );

        async {
            info!(trace_id = %trace_id, message_len = message.len(), "Starting agent task");

            let system_prompt = self
                .config
                .system_prompt
                .as_deref()
                .unwrap_or(DEFAULT_AGENT_SYSTEM_PROMPT);
            let declarations = self.tools.declarations();

            session.transcript.push_user(message);

            let mut iterations = 0;
            let mut tool_calls_made = 0;

            loop {
                if iterations >= self.config.max_iterations {
                    warn!(trace_id = %trace_id, iterations, "Max iterations reached");
                    let err = AgentError::MaxIterationsReached { iterations };
                    record_task(err.outcome_label(), iterations);
                    return Err(err);
                }
                iterations += 1;

                let llm_span = info_span!(
                    "llm_call",
                    trace_id = %trace_id,
                    iteration = iterations,
                    model = %model,
                );

                let call_start = Instant::now();
                let reply = self
                    .gateway
                    .next_step(system_prompt, session.transcript.turns(), &declarations)
                    .instrument(llm_span)
                    .await;
                let call_duration_secs = call_start.elapsed().as_secs_f64();
                LLM_CALL_TIME.with_label_values(&[&model]).observe(call_duration_secs);

                let reply = match reply {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!(trace_id = %trace_id, iteration = iterations, error = %e, "Model call failed");
                        let err = AgentError::from(e);
                        record_task(err.outcome_label(), iterations);
                        return Err(err);
                    }
                };
                info!(
                    trace_id = %trace_id,
                    iteration = iterations,
                    duration_ms = call_duration_secs * 1000.0,
                    "LLM call completed"
                );

                let calls = match reply {
                    ModelReply::FinalAnswer(text) => {
                        info!(trace_id = %trace_id, iterations, tool_calls = tool_calls_made, "Agent task completed");
                        session.transcript.push_assistant(text.clone());
                        record_task("success", iterations);
                        return Ok(AgentResult {
                            final_response: text,
                            iterations,
                            tool_calls_made,
                            trace_id,
                        });
                    }
                    ModelReply::ToolCalls { calls, .. } if calls.is_empty() => {
                        let err = AgentError::Protocol("model returned an empty tool call list".to_string());
                        record_task(err.outcome_label(), iterations);
                        return Err(err);
                    }
                    ModelReply::ToolCalls { calls, commentary } => {
                        if let Some(text) = commentary {
                            session.transcript.push_assistant(text);
                        }
                        calls
                    }
                };

                for call in calls {
                    tool_calls_made += 1;
                    self.invoke_tool(session, call, &trace_id).await;
                }
            }
        }
        .instrument(root_span)
        .await
    }

    /// Dispatch one tool call and record the call/result pair
    async fn invoke_tool(&self, session: &mut Session, call: ToolInvocation, trace_id: &str) {
        let tool_span = info_span!(
            "tool_call",
            trace_id = %trace_id,
            tool = %call.name,
            call_id = %call.call_id,
        );

        let result = {
            let ctx = ToolContext {
                sandbox: session.sandbox(),
                trace_id,
            };
            self.tools
                .dispatch(&ctx, &call.name, call.arguments.clone())
                .instrument(tool_span)
                .await
        };

        let outcome = match result {
            Ok(output) => {
                info!(trace_id = %trace_id, tool = %call.name, "Tool call succeeded");
                AGENT_TOOL_CALLS.with_label_values(&[&call.name, "success"]).inc();
                if let Some(effect) = output.effect {
                    session.apply_effect(effect);
                }
                ToolOutcome::Success {
                    output: output.payload,
                }
            }
            Err(e) => {
                let kind = e.kind();
                warn!(trace_id = %trace_id, tool = %call.name, kind = %kind, error = %e, "Tool call failed");
                AGENT_TOOL_CALLS.with_label_values(&[&call.name, kind.as_str()]).inc();
                ToolOutcome::Failure {
                    kind,
                    message: e.to_string(),
                }
            }
        };

        session
            .transcript
            .push_tool_exchange(call.call_id, call.name, call.arguments, outcome);
    }
}

fn record_task(outcome: &str, iterations: usize) {
    AGENT_TASKS.with_label_values(&[outcome]).inc();
    AGENT_ITERATIONS_TOTAL.observe(iterations as f64);
}
