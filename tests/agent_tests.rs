//! Integration tests for the agent system
//!
//! These tests drive the orchestration loop with a scripted model gateway and
//! a fake search backend, so they need no network access. The code execution
//! scenario needs `python3` and skips itself without it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use codecanvas::agent::{
    AgentConfig, AgentController, AgentError, GatewayError, ModelGateway, ModelReply, Session,
    ToolInvocation, ToolOutcome, Turn,
};
use codecanvas::tools::{
    SearchBackend, SearchError, SearchSnippet, ToolDeclaration, ToolErrorKind, ToolRegistry,
};
use codecanvas::{CodeExecutor, Language, Sandbox};

/// Replays a fixed list of replies and records every transcript it was shown
struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<ModelReply, GatewayError>>>,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedGateway {
    fn new(replies: Vec<Result<ModelReply, GatewayError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn last_seen(&self) -> Vec<Turn> {
        self.seen.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn next_step(
        &self,
        _system_prompt: &str,
        transcript: &[Turn],
        _tools: &[ToolDeclaration],
    ) -> Result<ModelReply, GatewayError> {
        self.seen.lock().unwrap().push(transcript.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Protocol("script exhausted".to_string())))
    }
}

/// Always asks for the same tool call, never answers
struct LoopingGateway {
    calls: Mutex<usize>,
}

#[async_trait]
impl ModelGateway for LoopingGateway {
    fn model(&self) -> &str {
        "looping"
    }

    async fn next_step(
        &self,
        _system_prompt: &str,
        _transcript: &[Turn],
        _tools: &[ToolDeclaration],
    ) -> Result<ModelReply, GatewayError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        Ok(ModelReply::tool_calls(vec![call(
            &format!("loop-{}", *calls),
            "file_manager",
            json!({ "action": "list" }),
        )]))
    }
}

/// Returns three canned hits and remembers every query it was asked
#[derive(Default)]
struct FakeSearch {
    queries: Mutex<Vec<String>>,
}

#[async_trait]
impl SearchBackend for FakeSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchSnippet>, SearchError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok((1..=max_results.min(3))
            .map(|i| SearchSnippet {
                title: format!("{} result {}", query, i),
                url: format!("https://example.com/{}", i),
                excerpt: format!("excerpt {}", i),
            })
            .collect())
    }
}

/// Search provider that is down
struct UnavailableSearch;

#[async_trait]
impl SearchBackend for UnavailableSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchSnippet>, SearchError> {
        Err(SearchError::Api {
            status: 503,
            message: "service unavailable".to_string(),
        })
    }
}

fn call(id: &str, name: &str, arguments: Value) -> ToolInvocation {
    ToolInvocation {
        call_id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

fn registry() -> ToolRegistry {
    ToolRegistry::standard(Arc::new(CodeExecutor::default()), Arc::new(FakeSearch::default()), 5)
}

fn has_python() -> bool {
    let found = std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !found {
        eprintln!("skipping: python3 is not installed");
    }
    found
}

fn session() -> (tempfile::TempDir, Session) {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::open(dir.path()).unwrap();
    (dir, Session::new(sandbox))
}

fn tool_results(session: &Session) -> Vec<&ToolOutcome> {
    session
        .transcript
        .turns()
        .iter()
        .filter_map(|t| match t {
            Turn::ToolResult { outcome, .. } => Some(outcome),
            _ => None,
        })
        .collect()
}

/// Test that AgentConfig has sensible defaults
#[test]
fn test_agent_config_defaults() {
    let config = AgentConfig::default();
    assert_eq!(config.max_iterations, 10);
    assert!(config.system_prompt.is_none());
}

#[test]
fn test_standard_registry_declarations() {
    let names: Vec<String> = registry().declarations().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["execute_code", "file_manager", "web_search"]);
}

#[tokio::test]
async fn test_file_creation_updates_buffer() {
    let gateway = ScriptedGateway::new(vec![
        Ok(ModelReply::tool_calls(vec![call(
            "c1",
            "file_manager",
            json!({ "action": "create_file", "path": "main.py", "content": "print(1)" }),
        )])),
        Ok(ModelReply::FinalAnswer("Created main.py".to_string())),
    ]);
    let controller = AgentController::new(gateway.clone(), registry(), AgentConfig::default());
    let (_dir, mut session) = session();

    let result = controller
        .run(&mut session, "create main.py with print(1)")
        .await
        .unwrap();

    assert_eq!(result.final_response, "Created main.py");
    assert_eq!(result.iterations, 2);
    assert_eq!(result.tool_calls_made, 1);
    assert!(!result.trace_id.is_empty());

    let on_disk = std::fs::read_to_string(session.sandbox().root().join("main.py")).unwrap();
    assert_eq!(on_disk, "print(1)");
    assert_eq!(session.buffer(Language::Python), "print(1)");

    assert_eq!(session.transcript.len(), 4);
    assert!(session.transcript.is_well_formed());

    // the second model call sees the tool result
    assert!(matches!(gateway.last_seen().last(), Some(Turn::ToolResult { .. })));
}

#[tokio::test]
async fn test_web_search_results_reach_the_model() {
    let gateway = ScriptedGateway::new(vec![
        Ok(ModelReply::tool_calls(vec![call(
            "s1",
            "web_search",
            json!({ "query": "latest tokio version" }),
        )])),
        Ok(ModelReply::FinalAnswer("Tokio 1.x".to_string())),
    ]);
    let search = Arc::new(FakeSearch::default());
    let tools = ToolRegistry::standard(Arc::new(CodeExecutor::default()), search.clone(), 5);
    let controller = AgentController::new(gateway.clone(), tools, AgentConfig::default());
    let (_dir, mut session) = session();

    let result = controller.run(&mut session, "what is the latest tokio?").await.unwrap();
    assert_eq!(result.final_response, "Tokio 1.x");
    assert_eq!(*search.queries.lock().unwrap(), vec!["latest tokio version".to_string()]);

    let results = tool_results(&session);
    assert_eq!(results.len(), 1);
    match results[0] {
        ToolOutcome::Success { output } => {
            let hits = output["results"].as_array().unwrap();
            assert_eq!(hits.len(), 3);
            assert_eq!(hits[0]["url"], "https://example.com/1");
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_tool_failures_are_fed_back_not_raised() {
    let gateway = ScriptedGateway::new(vec![
        Ok(ModelReply::tool_calls(vec![
            call(
                "bad-path",
                "file_manager",
                json!({ "action": "create_file", "path": "../outside.txt", "content": "x" }),
            ),
            call("bad-tool", "format_disk", json!({})),
            call("bad-args", "web_search", json!({ "q": "typo" })),
        ])),
        Ok(ModelReply::FinalAnswer("Sorry, that path is not allowed.".to_string())),
    ]);
    let controller = AgentController::new(gateway.clone(), registry(), AgentConfig::default());
    let (dir, mut session) = session();

    let result = controller.run(&mut session, "write outside").await.unwrap();
    assert_eq!(result.tool_calls_made, 3);

    let kinds: Vec<ToolErrorKind> = tool_results(&session)
        .into_iter()
        .map(|o| match o {
            ToolOutcome::Failure { kind, .. } => *kind,
            other => panic!("expected failure, got {:?}", other),
        })
        .collect();
    assert_eq!(
        kinds,
        vec![ToolErrorKind::Path, ToolErrorKind::Validation, ToolErrorKind::Validation]
    );
    assert!(!dir.path().parent().unwrap().join("outside.txt").exists());
    assert!(session.transcript.is_well_formed());
}

#[tokio::test]
async fn test_search_outage_is_fed_back() {
    let gateway = ScriptedGateway::new(vec![
        Ok(ModelReply::tool_calls(vec![call(
            "s1",
            "web_search",
            json!({ "query": "rust release date" }),
        )])),
        Ok(ModelReply::FinalAnswer("Search is unavailable right now.".to_string())),
    ]);
    let tools = ToolRegistry::standard(Arc::new(CodeExecutor::default()), Arc::new(UnavailableSearch), 5);
    let controller = AgentController::new(gateway.clone(), tools, AgentConfig::default());
    let (_dir, mut session) = session();

    let result = controller.run(&mut session, "when was rust released?").await.unwrap();
    assert_eq!(result.final_response, "Search is unavailable right now.");
    assert_eq!(gateway.calls(), 2);

    let results = tool_results(&session);
    assert_eq!(results.len(), 1);
    match results[0] {
        ToolOutcome::Failure { kind, message } => {
            assert_eq!(*kind, ToolErrorKind::Transport);
            assert!(message.contains("503"), "{}", message);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(session.transcript.is_well_formed());
}

#[tokio::test]
async fn test_execution_timeout_is_fed_back() {
    if !has_python() {
        return;
    }
    let gateway = ScriptedGateway::new(vec![
        Ok(ModelReply::tool_calls(vec![call(
            "e1",
            "execute_code",
            json!({ "language": "python", "code": "while True:\n    pass\n" }),
        )])),
        Ok(ModelReply::FinalAnswer("The program never terminates.".to_string())),
    ]);
    let executor = Arc::new(CodeExecutor::new(Duration::from_secs(1)));
    let tools = ToolRegistry::standard(executor, Arc::new(FakeSearch::default()), 5);
    let controller = AgentController::new(gateway.clone(), tools, AgentConfig::default());
    let (_dir, mut session) = session();

    let result = controller.run(&mut session, "run an infinite loop").await.unwrap();
    assert_eq!(result.final_response, "The program never terminates.");

    let results = tool_results(&session);
    assert_eq!(results.len(), 1);
    assert!(matches!(
        results[0],
        ToolOutcome::Failure { kind: ToolErrorKind::Timeout, .. }
    ));
    assert!(session.transcript.is_well_formed());
    assert!(matches!(gateway.last_seen().last(), Some(Turn::ToolResult { .. })));
}

#[tokio::test]
async fn test_text_next_to_tool_calls_is_kept() {
    let gateway = ScriptedGateway::new(vec![
        Ok(ModelReply::ToolCalls {
            calls: vec![call("l1", "file_manager", json!({ "action": "list" }))],
            commentary: Some("Let me look at the workspace.".to_string()),
        }),
        Ok(ModelReply::FinalAnswer("The workspace is empty.".to_string())),
    ]);
    let controller = AgentController::new(gateway.clone(), registry(), AgentConfig::default());
    let (_dir, mut session) = session();

    controller.run(&mut session, "what is in the workspace?").await.unwrap();

    let roles: Vec<&str> = session.transcript.turns().iter().map(|t| t.role()).collect();
    assert_eq!(roles, vec!["user", "assistant", "tool_call", "tool_result", "assistant"]);
    assert!(session.transcript.is_well_formed());
}

#[tokio::test]
async fn test_iteration_cap_stops_the_loop() {
    let gateway = Arc::new(LoopingGateway { calls: Mutex::new(0) });
    let config = AgentConfig {
        max_iterations: 3,
        system_prompt: Some("You are a test.".to_string()),
    };
    let controller = AgentController::new(gateway.clone(), registry(), config);
    let (_dir, mut session) = session();

    let err = controller.run(&mut session, "never finish").await.unwrap_err();
    assert!(matches!(err, AgentError::MaxIterationsReached { iterations: 3 }));
    assert!(err.to_string().contains("could not complete"));
    assert_eq!(*gateway.calls.lock().unwrap(), 3);

    // user turn plus three call/result pairs, all paired
    assert_eq!(session.transcript.len(), 7);
    assert!(session.transcript.is_well_formed());
}

#[tokio::test]
async fn test_gateway_errors_end_the_turn() {
    let gateway = ScriptedGateway::new(vec![Err(GatewayError::Protocol(
        "candidate had no content".to_string(),
    ))]);
    let controller = AgentController::new(gateway.clone(), registry(), AgentConfig::default());
    let (_dir, mut session) = session();

    let err = controller.run(&mut session, "hello").await.unwrap_err();
    assert!(matches!(err, AgentError::Protocol(_)));
    assert_eq!(gateway.calls(), 1);
    assert_eq!(session.transcript.len(), 1);

    let gateway = ScriptedGateway::new(vec![Err(GatewayError::Transport(
        "Gemini API returned 503: UNAVAILABLE".to_string(),
    ))]);
    let controller = AgentController::new(gateway, registry(), AgentConfig::default());
    let err = controller.run(&mut session, "hello again").await.unwrap_err();
    assert!(matches!(err, AgentError::Transport(ref m) if m.contains("503")));
}

#[tokio::test]
async fn test_transcript_accumulates_across_turns() {
    let gateway = ScriptedGateway::new(vec![
        Ok(ModelReply::FinalAnswer("Hi!".to_string())),
        Ok(ModelReply::FinalAnswer("Still here.".to_string())),
    ]);
    let controller = AgentController::new(gateway.clone(), registry(), AgentConfig::default());
    let (_dir, mut session) = session();

    controller.run(&mut session, "hello").await.unwrap();
    controller.run(&mut session, "are you there?").await.unwrap();

    assert_eq!(gateway.last_seen().len(), 3);
    assert_eq!(session.transcript.len(), 4);

    session.reset();
    assert!(session.transcript.is_empty());
}

#[tokio::test]
async fn test_code_execution_updates_session() {
    if !has_python() {
        return;
    }

    let gateway = ScriptedGateway::new(vec![
        Ok(ModelReply::tool_calls(vec![call(
            "e1",
            "execute_code",
            json!({ "language": "python", "code": "print(1+1)" }),
        )])),
        Ok(ModelReply::FinalAnswer("It prints 2.".to_string())),
    ]);
    let controller = AgentController::new(gateway, registry(), AgentConfig::default());
    let (_dir, mut session) = session();

    controller.run(&mut session, "run print(1+1)").await.unwrap();

    assert_eq!(session.buffer(Language::Python), "print(1+1)");
    let last = session.last_result(Language::Python).unwrap();
    assert_eq!(last.stdout, "2\n");
    assert_eq!(last.exit_code, Some(0));
}
