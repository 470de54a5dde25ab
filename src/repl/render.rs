//! Text rendering for the terminal

use serde_json::Value;

use crate::agent::{ToolOutcome, Turn};
use crate::tools::{ExecutionResult, ExecutionStage, Language, MAX_CAPTURED_OUTPUT};

const RULE: &str = "─────────────────────────────────────────";

/// Longest argument/result preview shown for a tool turn
const PREVIEW_CHARS: usize = 160;

/// Truncate to at most `max_chars` characters, adding an ellipsis if cut
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", kept)
}

/// Frame `body` in a box with an optional title
pub fn boxed(title: &str, body: &str) -> String {
    let mut out = if title.is_empty() {
        format!("┌{}\n", RULE)
    } else {
        format!("┌─ {} {}\n", title, RULE)
    };
    for line in body.lines() {
        out.push_str("│ ");
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&format!("└{}", RULE));
    out
}

/// Code buffer with line numbers
pub fn buffer(language: Language, source: &str) -> String {
    if source.is_empty() {
        return format!("[{}] buffer is empty; use /edit or ask the assistant", language);
    }
    let width = source.lines().count().to_string().len();
    let numbered: Vec<String> = source
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:>width$}  {}", i + 1, line, width = width))
        .collect();
    boxed(language.display_name(), &numbered.join("\n"))
}

/// Output pane for one run
pub fn execution_result(result: &ExecutionResult) -> String {
    let mut out = format!("[OUTPUT] {}\n", RULE);
    for line in result.stdout.lines() {
        out.push_str(&format!("[stdout] {}\n", line));
    }
    for line in result.stderr.lines() {
        out.push_str(&format!("[stderr] {}\n", line));
    }
    if result.truncated {
        out.push_str(&format!(
            "[OUTPUT] (output cut at {} KiB per stream)\n",
            MAX_CAPTURED_OUTPUT / 1024
        ));
    }
    out.push_str(&format!("[OUTPUT] {}\n", RULE));

    let status = match (result.stage, result.exit_code) {
        (ExecutionStage::Compile, code) => format!(
            "Compilation failed (exit: {})",
            code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string())
        ),
        (ExecutionStage::Run, Some(code)) => format!("Completed (exit: {})", code),
        (ExecutionStage::Run, None) => "Killed by signal".to_string(),
    };
    out.push_str(&format!(
        "[OUTPUT] {} {} in {:.2}ms",
        result.language, status, result.duration_ms
    ));
    out
}

fn compact(value: &Value) -> String {
    truncate(&value.to_string(), PREVIEW_CHARS)
}

/// One-line (or boxed, for text turns) rendering of a transcript entry
pub fn turn(turn: &Turn) -> String {
    match turn {
        Turn::User { text } => format!("you> {}", text),
        Turn::Assistant { text } => boxed("assistant", text),
        Turn::ToolCall { name, arguments, .. } => {
            format!("[TOOL] → {} {}", name, compact(arguments))
        }
        Turn::ToolResult { name, outcome, .. } => match outcome {
            ToolOutcome::Success { output } => format!("[TOOL] ✅ {} {}", name, compact(output)),
            ToolOutcome::Failure { kind, message } => {
                format!("[TOOL] ❌ {} {} error: {}", name, kind, truncate(message, PREVIEW_CHARS))
            }
        },
    }
}
