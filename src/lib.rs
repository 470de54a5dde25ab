//! codecanvas - terminal code editor driven by a tool-calling LLM
//!
//! A user chats with a Gemini model that can run code, manage files in a
//! sandboxed workspace and search the web, or edits and runs code buffers
//! directly.
//!
//! # Modules
//!
//! - `agent` - orchestration loop, model gateway trait, session state
//! - `gemini` - Gemini `generateContent` gateway
//! - `tools` - code execution, sandboxed file management, web search
//! - `repl` - terminal front end
//! - `config` - command-line and environment configuration
//! - `metrics` - Prometheus metrics for observability
//! - `telemetry` - tracing subscriber setup
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use codecanvas::{AgentConfig, AgentController, GeminiClient, Sandbox, Session, ToolRegistry};
//!
//! let gateway = Arc::new(GeminiClient::new(api_key, "gemini-2.0-flash", timeout)?);
//! let registry = ToolRegistry::standard(executor, search, 5);
//! let controller = AgentController::new(gateway, registry, AgentConfig::default());
//!
//! let mut session = Session::new(Sandbox::open("./workspace")?);
//! let result = controller.run(&mut session, "print the first 10 primes in Python").await?;
//! ```

pub mod agent;
pub mod config;
pub mod gemini;
pub mod metrics;
pub mod repl;
pub mod telemetry;
pub mod tools;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentConfig, AgentController, AgentError, AgentResult, ModelGateway, Session};
pub use gemini::GeminiClient;
pub use tools::{CodeExecutor, Language, Sandbox, TavilyClient, ToolRegistry};
