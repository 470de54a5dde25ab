//! Per-user session state
//!
//! A [`Session`] owns everything that belongs to one user: the transcript,
//! one code buffer per language, the last execution result of each buffer
//! and the sandbox the file tools operate in. It is handed by `&mut` to the
//! agent loop and the REPL; nothing about it is global.

use std::collections::BTreeMap;

use crate::tools::{ExecutionResult, Language, Sandbox, SessionEffect};

use super::transcript::Transcript;

/// One user's editor state
#[derive(Debug)]
pub struct Session {
    /// Unique session ID (UUIDv7)
    pub id: String,
    /// Conversation history
    pub transcript: Transcript,
    /// Language currently selected in the editor
    pub active_language: Language,
    sandbox: Sandbox,
    buffers: BTreeMap<Language, String>,
    results: BTreeMap<Language, ExecutionResult>,
}

impl Session {
    /// Create a new session rooted at `sandbox`
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            transcript: Transcript::new(),
            active_language: Language::Python,
            sandbox,
            buffers: BTreeMap::new(),
            results: BTreeMap::new(),
        }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Current source of `language`'s buffer (empty if never set)
    pub fn buffer(&self, language: Language) -> &str {
        self.buffers.get(&language).map(String::as_str).unwrap_or("")
    }

    pub fn set_buffer(&mut self, language: Language, source: impl Into<String>) {
        self.buffers.insert(language, source.into());
    }

    /// Most recent execution result of `language`'s buffer
    pub fn last_result(&self, language: Language) -> Option<&ExecutionResult> {
        self.results.get(&language)
    }

    /// Store a run of `language`'s buffer, replacing the previous result
    pub fn record_execution(&mut self, result: ExecutionResult) {
        self.results.insert(result.language, result);
    }

    /// Apply the state change implied by a successful tool call
    pub fn apply_effect(&mut self, effect: SessionEffect) {
        match effect {
            SessionEffect::BufferWritten { language, source } => {
                self.set_buffer(language, source);
            }
            SessionEffect::Executed { source, result } => {
                self.set_buffer(result.language, source);
                self.record_execution(result);
            }
        }
    }

    /// Clear the conversation. Buffers, results and sandbox files are kept.
    pub fn reset(&mut self) {
        self.transcript.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ExecutionStage;

    fn session() -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::open(dir.path()).unwrap();
        (dir, Session::new(sandbox))
    }

    fn result(language: Language, stdout: &str) -> ExecutionResult {
        ExecutionResult {
            language,
            stage: ExecutionStage::Run,
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
            truncated: false,
            duration_ms: 1.0,
        }
    }

    #[test]
    fn test_session_creation() {
        let (_dir, session) = session();
        assert!(!session.id.is_empty());
        assert!(session.transcript.is_empty());
        assert_eq!(session.active_language, Language::Python);
        assert_eq!(session.buffer(Language::Java), "");
        assert!(session.last_result(Language::Python).is_none());
    }

    #[test]
    fn test_buffers_are_independent() {
        let (_dir, mut session) = session();
        session.set_buffer(Language::Python, "print(1)");
        session.set_buffer(Language::Cpp, "int main(){}");
        assert_eq!(session.buffer(Language::Python), "print(1)");
        assert_eq!(session.buffer(Language::Cpp), "int main(){}");
        assert_eq!(session.buffer(Language::JavaScript), "");
    }

    #[test]
    fn test_executed_effect_updates_buffer_and_result() {
        let (_dir, mut session) = session();
        session.apply_effect(SessionEffect::Executed {
            source: "print(2)".into(),
            result: result(Language::Python, "2\n"),
        });
        assert_eq!(session.buffer(Language::Python), "print(2)");
        assert_eq!(session.last_result(Language::Python).unwrap().stdout, "2\n");

        session.record_execution(result(Language::Python, "3\n"));
        assert_eq!(session.last_result(Language::Python).unwrap().stdout, "3\n");
    }

    #[test]
    fn test_reset_keeps_buffers() {
        let (_dir, mut session) = session();
        session.transcript.push_user("Hello");
        session.set_buffer(Language::Java, "class A {}");
        session.reset();
        assert!(session.transcript.is_empty());
        assert_eq!(session.buffer(Language::Java), "class A {}");
    }
}
