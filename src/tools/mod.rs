//! Tool adapters exposed to the model
//!
//! Every capability the model can invoke implements [`ToolAdapter`]: a name,
//! a description, a JSON argument schema and an async `invoke`. Adapters are
//! stateless and shared between sessions; everything session-scoped (the
//! sandbox root, the trace id) travels in a [`ToolContext`].
//!
//! ```text
//! ModelReply::ToolCalls ──► ToolRegistry::dispatch(name, args)
//!                                │
//!          ┌─────────────────────┼──────────────────────┐
//!          ▼                     ▼                      ▼
//!    execute_code          file_manager            web_search
//!   (CodeExecutor)          (Sandbox)           (SearchBackend)
//! ```

pub mod execution;
pub mod files;
pub mod search;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use execution::{
    CodeExecutor, ExecuteCodeTool, ExecutionResult, ExecutionStage, Language, MAX_CAPTURED_OUTPUT,
};
pub use files::{FileManagerTool, Sandbox};
pub use search::{SearchBackend, SearchError, SearchSnippet, TavilyClient, WebSearchTool};

/// Failure of a single tool invocation.
///
/// The orchestration loop never propagates these; each one becomes a failure
/// tool-response turn so the model can see it and adjust.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Network or remote API failure
    #[error("transport error: {0}")]
    Transport(String),
    /// Code execution exceeded its wall-clock budget
    #[error("execution exceeded the {}s time budget", .0.as_secs_f64())]
    Timeout(Duration),
    /// Requested path resolves outside the sandbox root
    #[error("path error: {0}")]
    Path(String),
    /// Arguments failed the adapter's schema, or the tool does not exist
    #[error("validation error: {0}")]
    Validation(String),
    /// Local I/O failure (missing file, interpreter not installed, ...)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::Transport(_) => ToolErrorKind::Transport,
            ToolError::Timeout(_) => ToolErrorKind::Timeout,
            ToolError::Path(_) => ToolErrorKind::Path,
            ToolError::Validation(_) => ToolErrorKind::Validation,
            ToolError::Io(_) => ToolErrorKind::Io,
        }
    }
}

/// Serializable tag for a [`ToolError`], kept in the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    Transport,
    Timeout,
    Path,
    Validation,
    Io,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::Transport => "transport",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::Path => "path",
            ToolErrorKind::Validation => "validation",
            ToolErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session-scoped data an adapter may need for one invocation.
pub struct ToolContext<'a> {
    pub sandbox: &'a Sandbox,
    pub trace_id: &'a str,
}

/// Change to session state implied by a successful tool call.
#[derive(Debug, Clone)]
pub enum SessionEffect {
    /// A file whose extension maps to a language was written
    BufferWritten { language: Language, source: String },
    /// Code was executed; the buffer and its last result are replaced
    Executed {
        source: String,
        result: ExecutionResult,
    },
}

/// Successful tool result.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// JSON payload returned to the model
    pub payload: Value,
    pub effect: Option<SessionEffect>,
}

impl ToolOutput {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            effect: None,
        }
    }

    pub fn with_effect(mut self, effect: SessionEffect) -> Self {
        self.effect = Some(effect);
        self
    }
}

/// Declaration of a tool as sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON Schema (OpenAPI subset) for the arguments object
    pub parameters: Value,
}

/// A capability the model can invoke by name.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// Tool name (used for dispatch)
    fn name(&self) -> &str;

    /// Human-readable description shown to the model
    fn description(&self) -> &str;

    /// JSON Schema of the arguments object
    fn parameters(&self) -> Value;

    /// Validate `args` and run the tool
    async fn invoke(&self, ctx: &ToolContext<'_>, args: Value) -> Result<ToolOutput, ToolError>;

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Deserialize tool arguments into the adapter's typed argument struct.
///
/// A missing arguments object is treated as `{}` so required-field errors
/// name the missing field.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args)
        .map_err(|e| ToolError::Validation(format!("invalid arguments for '{}': {}", tool, e)))
}

/// Name-indexed set of tool adapters.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ToolAdapter>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The three built-in capabilities: code execution, file management, web search
    pub fn standard(
        executor: Arc<CodeExecutor>,
        search: Arc<dyn SearchBackend>,
        search_results: usize,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(ExecuteCodeTool::new(executor));
        registry.register(FileManagerTool);
        registry.register(WebSearchTool::new(search, search_results));
        registry
    }

    /// Add an adapter, replacing any adapter with the same name
    pub fn register(&mut self, tool: impl ToolAdapter + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolAdapter>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.values().map(|t| t.declaration()).collect()
    }

    /// Look up `name` and invoke it. Unknown names fail with a validation error.
    pub async fn dispatch(
        &self,
        ctx: &ToolContext<'_>,
        name: &str,
        args: Value,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self.get(name).ok_or_else(|| {
            ToolError::Validation(format!(
                "unknown tool '{}'; available tools: {}",
                name,
                self.names().join(", ")
            ))
        })?;
        tool.invoke(ctx, args).await
    }
}
