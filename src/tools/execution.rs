//! Code execution on the host's interpreters and compilers
//!
//! Each run gets a fresh scratch directory and fresh subprocesses. The whole
//! run (compile + execute) shares one wall-clock deadline.
//!
//! # Process lifecycle
//!
//! ```text
//! spawn (own process group) ──► ProcessGuard
//!        │
//!        ├── exits before deadline ──► reap, SIGKILL leftover group members
//!        ├── deadline passes        ──► SIGKILL group, reap, TimeoutError
//!        └── future dropped         ──► Drop: SIGKILL group, reap on the runtime
//! ```
//!
//! Captured stdout and stderr are capped at [`MAX_CAPTURED_OUTPUT`] bytes per
//! stream. The rest is drained and discarded so the program never blocks on a
//! full pipe.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{parse_args, SessionEffect, ToolAdapter, ToolContext, ToolError, ToolOutput};
use crate::metrics::{CODE_EXECUTIONS, CODE_EXECUTION_DURATION_TOTAL};

/// Default wall-clock budget for one run
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes kept from each of stdout and stderr
pub const MAX_CAPTURED_OUTPUT: usize = 64 * 1024;

lazy_static! {
    static ref JAVA_PUBLIC_CLASS: Regex =
        Regex::new(r"public\s+(?:(?:final|abstract|static)\s+)*class\s+(\w+)")
            .expect("valid regex");
}

/// Languages with an editable code buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[serde(alias = "py")]
    Python,
    #[serde(alias = "js", alias = "node")]
    JavaScript,
    Java,
    #[serde(alias = "c++", alias = "cxx")]
    Cpp,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Python,
        Language::JavaScript,
        Language::Java,
        Language::Cpp,
    ];

    /// Identifier used in tool arguments and REPL commands
    pub fn id(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Java => "java",
            Language::Cpp => "cpp",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::JavaScript => "JavaScript",
            Language::Java => "Java",
            Language::Cpp => "C++",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::JavaScript => "js",
            Language::Java => "java",
            Language::Cpp => "cpp",
        }
    }

    /// Map a file path to a language by extension
    pub fn from_path(path: &Path) -> Option<Language> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "py" => Some(Language::Python),
            "js" | "mjs" | "cjs" => Some(Language::JavaScript),
            "java" => Some(Language::Java),
            "cpp" | "cc" | "cxx" => Some(Language::Cpp),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "java" => Ok(Language::Java),
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            other => Err(format!(
                "unsupported language '{}'. Supported: python, javascript, java, cpp",
                other
            )),
        }
    }
}

/// Which step produced an [`ExecutionResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStage {
    /// Compilation failed; the program never ran
    Compile,
    Run,
}

/// Outcome of running one code buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub language: Language,
    pub stage: ExecutionStage,
    /// Exit code of the last process, `None` if it was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Set when stdout or stderr was cut at [`MAX_CAPTURED_OUTPUT`] bytes
    #[serde(default)]
    pub truncated: bool,
    /// Wall-clock duration of the whole run in milliseconds
    pub duration_ms: f64,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.stage == ExecutionStage::Run && self.exit_code == Some(0)
    }
}

/// Host programs used for each language
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub python: String,
    pub node: String,
    pub javac: String,
    pub java: String,
    pub cxx: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            node: "node".to_string(),
            javac: "javac".to_string(),
            java: "java".to_string(),
            cxx: "g++".to_string(),
        }
    }
}

/// Output of one subprocess
struct StageOutput {
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
    truncated: bool,
}

impl StageOutput {
    fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs source text with the host toolchain under a wall-clock timeout
#[derive(Debug, Clone)]
pub struct CodeExecutor {
    timeout: Duration,
    toolchain: Toolchain,
}

impl Default for CodeExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_EXECUTION_TIMEOUT)
    }
}

impl CodeExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            toolchain: Toolchain::default(),
        }
    }

    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `source` as a program in `language`, feeding `stdin` if given
    ///
    /// # Returns
    /// The [`ExecutionResult`] of the run, or of the compile step if it failed.
    /// Fails with [`ToolError::Timeout`] once the deadline passes; the process
    /// group has been killed and reaped by then.
    pub async fn run(
        &self,
        language: Language,
        source: &str,
        stdin: Option<&str>,
    ) -> Result<ExecutionResult, ToolError> {
        if source.trim().is_empty() {
            return Err(ToolError::Validation(
                "code is empty; provide source code to execute".to_string(),
            ));
        }

        let start = Instant::now();
        let deadline = start + self.timeout;

        let outcome = self.run_in_scratch(language, source, stdin, deadline).await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        let status = match &outcome {
            Ok((ExecutionStage::Compile, _)) => "compile_error",
            Ok((_, out)) if out.succeeded() => "success",
            Ok(_) => "error",
            Err(ToolError::Timeout(_)) => "timeout",
            Err(_) => "failed",
        };
        CODE_EXECUTIONS
            .with_label_values(&[language.id(), status])
            .inc();
        CODE_EXECUTION_DURATION_TOTAL
            .with_label_values(&[language.id()])
            .observe(duration_ms / 1000.0);

        match outcome {
            Ok((stage, out)) => {
                info!(
                    language = language.id(),
                    ?stage,
                    exit_code = ?out.exit_code,
                    duration_ms,
                    "Execution finished"
                );
                Ok(ExecutionResult {
                    language,
                    stage,
                    exit_code: out.exit_code,
                    stdout: out.stdout,
                    stderr: out.stderr,
                    truncated: out.truncated,
                    duration_ms,
                })
            }
            Err(e) => {
                warn!(language = language.id(), error = %e, duration_ms, "Execution failed");
                Err(e)
            }
        }
    }

    async fn run_in_scratch(
        &self,
        language: Language,
        source: &str,
        stdin: Option<&str>,
        deadline: Instant,
    ) -> Result<(ExecutionStage, StageOutput), ToolError> {
        // Validate before touching the filesystem
        let java_class = match language {
            Language::Java => Some(java_class_name(source)?),
            _ => None,
        };

        let scratch = tempfile::Builder::new().prefix("codecanvas-").tempdir()?;
        let dir = scratch.path();
        let tc = &self.toolchain;

        let result = match language {
            Language::Python => {
                let file = write_source(dir, "main.py", source).await?;
                let out = self
                    .stage(&tc.python, &[path_arg(&file)], dir, stdin, deadline)
                    .await?;
                (ExecutionStage::Run, out)
            }
            Language::JavaScript => {
                let file = write_source(dir, "main.js", source).await?;
                let out = self
                    .stage(&tc.node, &[path_arg(&file)], dir, stdin, deadline)
                    .await?;
                (ExecutionStage::Run, out)
            }
            Language::Java => {
                let class = java_class.unwrap_or_default();
                let file = write_source(dir, &format!("{}.java", class), source).await?;
                let compiled = self
                    .stage(
                        &tc.javac,
                        &["-d".to_string(), path_arg(dir), path_arg(&file)],
                        dir,
                        None,
                        deadline,
                    )
                    .await?;
                if !compiled.succeeded() {
                    return Ok((ExecutionStage::Compile, compiled));
                }
                let out = self
                    .stage(
                        &tc.java,
                        &["-cp".to_string(), path_arg(dir), class],
                        dir,
                        stdin,
                        deadline,
                    )
                    .await?;
                (ExecutionStage::Run, out)
            }
            Language::Cpp => {
                let file = write_source(dir, "main.cpp", source).await?;
                let binary = dir.join("main");
                let compiled = self
                    .stage(
                        &tc.cxx,
                        &[path_arg(&file), "-o".to_string(), path_arg(&binary)],
                        dir,
                        None,
                        deadline,
                    )
                    .await?;
                if !compiled.succeeded() {
                    return Ok((ExecutionStage::Compile, compiled));
                }
                let out = self
                    .stage(&path_arg(&binary), &[], dir, stdin, deadline)
                    .await?;
                (ExecutionStage::Run, out)
            }
        };

        Ok(result)
    }

    /// Run one subprocess to completion or until `deadline`
    async fn stage(
        &self,
        program: &str,
        args: &[String],
        dir: &Path,
        stdin: Option<&str>,
        deadline: Instant,
    ) -> Result<StageOutput, ToolError> {
        debug!(program, ?args, "Spawning subprocess");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(dir)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            ToolError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to start '{}': {}", program, e),
            ))
        })?;
        let stdin_pipe = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut guard = ProcessGuard::new(child);

        if let (Some(input), Some(mut pipe)) = (stdin, stdin_pipe) {
            let input = input.to_string();
            // A program that never reads stdin must not block us
            tokio::spawn(async move {
                let _ = pipe.write_all(input.as_bytes()).await;
            });
        }

        let run = async {
            let (status, stdout, stderr) = tokio::join!(
                guard.wait(),
                read_capped(stdout, MAX_CAPTURED_OUTPUT),
                read_capped(stderr, MAX_CAPTURED_OUTPUT)
            );
            Ok::<_, std::io::Error>((status?, stdout?, stderr?))
        };

        let outcome = tokio::time::timeout_at(deadline, run).await;
        match outcome {
            Ok(Ok((status, stdout, stderr))) => {
                if stdout.truncated || stderr.truncated {
                    debug!(program, "Captured output was truncated");
                }
                Ok(StageOutput {
                    exit_code: exit_code(status),
                    truncated: stdout.truncated || stderr.truncated,
                    stdout: stdout.text,
                    stderr: stderr.text,
                })
            }
            Ok(Err(e)) => {
                guard.terminate().await;
                Err(ToolError::Io(e))
            }
            Err(_) => {
                warn!(program, timeout_secs = self.timeout.as_secs_f64(), "Execution timed out");
                guard.terminate().await;
                Err(ToolError::Timeout(self.timeout))
            }
        }
    }
}

/// Owns a spawned child and guarantees it does not outlive its request.
///
/// The child leads its own process group, so descendants it spawned are
/// killed with it.
struct ProcessGuard {
    /// Only `None` once `Drop` has handed the child off for reaping
    child: Option<Child>,
    pgid: Option<i32>,
    /// Set once the child is reaped and its group has been cleaned up
    done: bool,
}

impl ProcessGuard {
    fn new(child: Child) -> Self {
        let pgid = child.id().map(|pid| pid as i32);
        Self {
            child: Some(child),
            pgid,
            done: false,
        }
    }

    /// Wait for the child to exit, then kill anything left in its group
    async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        let Some(child) = self.child.as_mut() else {
            return Err(std::io::Error::other("child already released"));
        };
        let status = child.wait().await?;
        self.kill_group();
        self.done = true;
        Ok(status)
    }

    /// SIGKILL the group and reap the child
    async fn terminate(&mut self) {
        if self.done {
            return;
        }
        self.kill_group();
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill().await;
        }
        self.done = true;
    }

    fn kill_group(&self) {
        if let Some(pgid) = self.pgid {
            kill_process_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: i32) {
    // ESRCH just means the group is already gone
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: i32) {}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.kill_group();
        let Some(mut child) = self.child.take() else {
            return;
        };
        let _ = child.start_kill();
        // Without a runtime, kill_on_drop leaves the child to tokio's orphan reaper
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let pgid = self.pgid;
            handle.spawn(async move {
                if let Err(e) = child.wait().await {
                    warn!(?pgid, error = %e, "Failed to reap killed subprocess");
                }
            });
        }
    }
}

/// Text read from one output pipe
struct Captured {
    text: String,
    truncated: bool,
}

/// Read `pipe` to EOF, keeping at most `limit` bytes
async fn read_capped<R: AsyncRead + Unpin>(pipe: Option<R>, limit: usize) -> std::io::Result<Captured> {
    let mut kept = Vec::new();
    let mut truncated = false;
    if let Some(mut pipe) = pipe {
        let mut chunk = [0u8; 8192];
        loop {
            let n = pipe.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            let room = limit.saturating_sub(kept.len());
            if n > room {
                truncated = true;
            }
            kept.extend_from_slice(&chunk[..n.min(room)]);
        }
    }
    Ok(Captured {
        text: String::from_utf8_lossy(&kept).into_owned(),
        truncated,
    })
}

async fn write_source(dir: &Path, name: &str, source: &str) -> std::io::Result<PathBuf> {
    let path = dir.join(name);
    tokio::fs::write(&path, source).await?;
    Ok(path)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn exit_code(status: ExitStatus) -> Option<i32> {
    status.code()
}

/// Name of the public class a Java source file must be saved as
pub fn java_class_name(source: &str) -> Result<String, ToolError> {
    JAVA_PUBLIC_CLASS
        .captures(source)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            ToolError::Validation(
                "could not find a public class in the Java code; define one, e.g. `public class Main`"
                    .to_string(),
            )
        })
}

/// `execute_code` tool: run source in one of the supported languages
pub struct ExecuteCodeTool {
    executor: Arc<CodeExecutor>,
}

impl ExecuteCodeTool {
    pub fn new(executor: Arc<CodeExecutor>) -> Self {
        Self { executor }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecuteCodeArgs {
    language: Language,
    code: String,
    #[serde(default)]
    stdin: Option<String>,
}

#[async_trait]
impl ToolAdapter for ExecuteCodeTool {
    fn name(&self) -> &str {
        "execute_code"
    }

    fn description(&self) -> &str {
        "Execute a complete program and return its exit code, stdout and stderr. \
         Supported languages: python, javascript, java (must declare a public class), cpp. \
         Runs with a wall-clock timeout; the program is killed if it exceeds it."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "language": {
                    "type": "string",
                    "enum": ["python", "javascript", "java", "cpp"],
                    "description": "The programming language to use"
                },
                "code": {
                    "type": "string",
                    "description": "The complete source code to execute"
                },
                "stdin": {
                    "type": "string",
                    "description": "Optional text fed to the program's standard input"
                }
            },
            "required": ["language", "code"]
        })
    }

    async fn invoke(&self, ctx: &ToolContext<'_>, args: Value) -> Result<ToolOutput, ToolError> {
        let args: ExecuteCodeArgs = parse_args(self.name(), args)?;
        info!(
            trace_id = %ctx.trace_id,
            language = args.language.id(),
            code_len = args.code.len(),
            "Executing code"
        );

        let result = self
            .executor
            .run(args.language, &args.code, args.stdin.as_deref())
            .await?;

        let payload = serde_json::to_value(&result)
            .map_err(|e| ToolError::Validation(format!("unserializable result: {}", e)))?;
        Ok(ToolOutput::new(payload).with_effect(SessionEffect::Executed {
            source: args.code,
            result,
        }))
    }
}
