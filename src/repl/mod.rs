//! Line-oriented terminal front end
//!
//! Reads commands from stdin and prints to stdout. Chat messages and code
//! runs are raced against Ctrl-C; interrupting drops the in-flight future,
//! which kills any running child process and leaves the transcript with only
//! complete tool call/result pairs.

pub mod commands;
pub mod render;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{info, warn};

use crate::agent::{AgentController, Session};
use crate::metrics;
use crate::tools::{CodeExecutor, Language};

use commands::{parse, Command, HELP};

/// Interactive editor bound to one session
pub struct Repl {
    controller: AgentController,
    executor: Arc<CodeExecutor>,
    session: Session,
}

impl Repl {
    pub fn new(controller: AgentController, executor: Arc<CodeExecutor>, session: Session) -> Self {
        Self {
            controller,
            executor,
            session,
        }
    }

    /// Read commands from stdin until `/quit`, EOF or Ctrl-C at the prompt
    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!(
            "codecanvas · model {} · workspace {}",
            self.controller.model(),
            self.session.sandbox().root().display()
        );
        println!("Type /help for commands.");

        loop {
            print!("codecanvas [{}]> ", self.session.active_language.id());
            std::io::stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    None
                }
            };
            let Some(line) = line else {
                break;
            };

            let command = match parse(&line) {
                Ok(command) => command,
                Err(msg) => {
                    println!("{}", msg);
                    continue;
                }
            };

            match command {
                Command::Empty => {}
                Command::Quit => break,
                Command::Help => println!("{}", HELP),
                Command::Chat(text) => self.chat(&text).await,
                Command::Lang(None) => {
                    let lang = self.session.active_language;
                    println!("{}", render::buffer(lang, self.session.buffer(lang)));
                }
                Command::Lang(Some(lang)) => {
                    self.session.active_language = lang;
                    println!("Switched to {}", lang);
                }
                Command::Edit => {
                    if !self.edit(&mut lines).await? {
                        break;
                    }
                }
                Command::Show => {
                    let lang = self.session.active_language;
                    println!("{}", render::buffer(lang, self.session.buffer(lang)));
                }
                Command::Run { stdin } => self.run_buffer(stdin.as_deref()).await,
                Command::Output => {
                    let lang = self.session.active_language;
                    match self.session.last_result(lang) {
                        Some(result) => println!("{}", render::execution_result(result)),
                        None => println!("No output yet for the {} buffer; use /run", lang),
                    }
                }
                Command::Open(path) => self.open(&path).await,
                Command::History => {
                    if self.session.transcript.is_empty() {
                        println!("No conversation yet.");
                    }
                    for turn in self.session.transcript.turns() {
                        println!("{}", render::turn(turn));
                    }
                }
                Command::Reset => {
                    self.session.reset();
                    println!("Conversation cleared.");
                }
                Command::Metrics => print!("{}", metrics::render()),
            }
        }

        info!(session_id = %self.session.id, "Session ended");
        Ok(())
    }

    /// Send `text` to the assistant and print what it did
    async fn chat(&mut self, text: &str) {
        let before = self.session.transcript.len();

        let outcome = tokio::select! {
            result = self.controller.run(&mut self.session, text) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };

        // the user turn itself is already on screen
        for turn in self.session.transcript.turns().iter().skip(before + 1) {
            println!("{}", render::turn(turn));
        }

        match outcome {
            Some(Ok(result)) => {
                info!(
                    trace_id = %result.trace_id,
                    iterations = result.iterations,
                    tool_calls = result.tool_calls_made,
                    "Chat turn finished"
                );
            }
            Some(Err(e)) => {
                warn!(error = %e, "Chat turn failed");
                println!("[ERROR] {}", e);
            }
            None => println!("[INTERRUPTED] Request cancelled."),
        }
    }

    /// Replace the active buffer with lines up to a lone `.`
    ///
    /// Returns `false` if stdin closed before the terminator.
    async fn edit<R>(&mut self, lines: &mut Lines<R>) -> std::io::Result<bool>
    where
        R: AsyncBufRead + Unpin,
    {
        let lang = self.session.active_language;
        println!("Editing {} buffer. End with a line containing only '.'", lang);

        let mut source = Vec::new();
        loop {
            match lines.next_line().await? {
                Some(line) if line.trim_end() == "." => break,
                Some(line) => source.push(line),
                None => return Ok(false),
            }
        }

        let mut text = source.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        self.session.set_buffer(lang, text);
        println!("{} buffer updated ({} lines)", lang, source.len());
        Ok(true)
    }

    /// Execute the active buffer directly, bypassing the assistant
    async fn run_buffer(&mut self, stdin: Option<&str>) {
        let lang = self.session.active_language;
        let source = self.session.buffer(lang).to_string();
        if source.trim().is_empty() {
            println!("The {} buffer is empty; use /edit first", lang);
            return;
        }

        println!("[AGENT] Executing {} code...", lang);
        let outcome = tokio::select! {
            result = self.executor.run(lang, &source, stdin) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };

        match outcome {
            Some(Ok(result)) => {
                println!("{}", render::execution_result(&result));
                self.session.record_execution(result);
            }
            Some(Err(e)) => println!("[ERROR] {}", e),
            None => println!("[INTERRUPTED] Run cancelled; process killed."),
        }
    }

    /// Load a sandbox file into the buffer of the language its extension names
    async fn open(&mut self, path: &str) {
        let Some(lang) = Language::from_path(Path::new(path)) else {
            println!("'{}' does not have a .py, .js, .java or .cpp extension", path);
            return;
        };
        match self.session.sandbox().read_file(path).await {
            Ok(content) => {
                self.session.set_buffer(lang, content);
                self.session.active_language = lang;
                println!("Loaded {} into the {} buffer", path, lang);
            }
            Err(e) => println!("[ERROR] {}", e),
        }
    }
}
