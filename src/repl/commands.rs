//! REPL input parsing

use crate::tools::Language;

/// One line of user input, interpreted
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Plain text sent to the assistant
    Chat(String),
    /// Switch the active buffer, or show it when no language is given
    Lang(Option<Language>),
    /// Replace the active buffer with multi-line input ending in a lone `.`
    Edit,
    Show,
    /// Run the active buffer, optionally feeding `stdin`
    Run { stdin: Option<String> },
    Output,
    /// Load a sandbox file into the buffer of its language
    Open(String),
    History,
    Reset,
    Metrics,
    Help,
    Quit,
    Empty,
}

pub const HELP: &str = "\
Commands:
  <text>              ask the assistant
  /lang [language]    switch buffer (python, javascript, java, cpp)
  /edit               replace the buffer; finish with a line containing only '.'
  /show               print the buffer
  /run [stdin]        run the buffer; '\\n' in stdin becomes a newline
  /output             show the last run of the buffer
  /open <path>        load a workspace file into its language's buffer
  /history            print the conversation
  /reset              clear the conversation (buffers and files are kept)
  /metrics            print Prometheus metrics
  /help               show this help
  /quit               exit";

/// Parse one input line
pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }
    if !line.starts_with('/') {
        return Ok(Command::Chat(line.to_string()));
    }

    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };

    let no_args = |cmd: Command| {
        if rest.is_empty() {
            Ok(cmd)
        } else {
            Err(format!("{} takes no arguments", name))
        }
    };

    match name {
        "/lang" => {
            if rest.is_empty() {
                Ok(Command::Lang(None))
            } else {
                rest.parse::<Language>().map(|l| Command::Lang(Some(l)))
            }
        }
        "/edit" => no_args(Command::Edit),
        "/show" => no_args(Command::Show),
        "/run" => Ok(Command::Run {
            stdin: if rest.is_empty() {
                None
            } else {
                Some(unescape_newlines(rest))
            },
        }),
        "/output" => no_args(Command::Output),
        "/open" => {
            if rest.is_empty() {
                Err("usage: /open <path>".to_string())
            } else {
                Ok(Command::Open(rest.to_string()))
            }
        }
        "/history" => no_args(Command::History),
        "/reset" => no_args(Command::Reset),
        "/metrics" => no_args(Command::Metrics),
        "/help" | "/?" => Ok(Command::Help),
        "/quit" | "/exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{}'; type /help", other)),
    }
}

fn unescape_newlines(s: &str) -> String {
    let mut out = s.replace("\\n", "\n");
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
