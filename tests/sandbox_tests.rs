//! Integration tests for the sandboxed file tool

use std::path::Path;

use serde_json::json;

use codecanvas::tools::{FileManagerTool, Sandbox, SessionEffect, ToolAdapter, ToolContext, ToolError};
use codecanvas::Language;

struct Fixture {
    outer: tempfile::TempDir,
    sandbox: Sandbox,
}

impl Fixture {
    fn new() -> Self {
        let outer = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::open(outer.path().join("workspace")).unwrap();
        Self { outer, sandbox }
    }

    fn outside(&self) -> &Path {
        self.outer.path()
    }

    fn ctx(&self) -> ToolContext<'_> {
        ToolContext {
            sandbox: &self.sandbox,
            trace_id: "test",
        }
    }
}

fn snapshot(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = walk(dir)
        .into_iter()
        .map(|p| p.strip_prefix(dir).unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn walk(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let is_dir = std::fs::symlink_metadata(&path).unwrap().is_dir();
        out.push(path.clone());
        if is_dir {
            out.extend(walk(&path));
        }
    }
    out
}

#[tokio::test]
async fn test_escapes_are_rejected_without_mutation() {
    let fx = Fixture::new();
    std::fs::write(fx.outside().join("secret.txt"), "keep").unwrap();
    let before = snapshot(fx.outside());

    let attempts = [
        json!({ "action": "create_file", "path": "../escape.txt", "content": "x" }),
        json!({ "action": "create_file", "path": "a/../../escape.txt", "content": "x" }),
        json!({ "action": "create_folder", "path": "../newdir" }),
        json!({ "action": "write_file", "path": "../secret.txt", "content": "overwritten" }),
        json!({ "action": "append_to_file", "path": "../secret.txt", "content": "more" }),
        json!({ "action": "delete", "path": "../secret.txt" }),
        json!({ "action": "read_file", "path": "../secret.txt" }),
        json!({ "action": "list", "path": ".." }),
    ];
    for args in attempts {
        let err = FileManagerTool.invoke(&fx.ctx(), args.clone()).await.unwrap_err();
        assert!(matches!(err, ToolError::Path(_)), "{} gave {:?}", args, err);
    }

    let absolute = fx.outside().join("abs.txt");
    let err = FileManagerTool
        .invoke(
            &fx.ctx(),
            json!({ "action": "create_file", "path": absolute.to_string_lossy(), "content": "x" }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Path(_)));

    assert_eq!(snapshot(fx.outside()), before);
    assert_eq!(std::fs::read_to_string(fx.outside().join("secret.txt")).unwrap(), "keep");
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_escapes_are_rejected() {
    let fx = Fixture::new();
    let target_dir = fx.outside().join("target");
    std::fs::create_dir(&target_dir).unwrap();
    std::os::unix::fs::symlink(&target_dir, fx.sandbox.root().join("link")).unwrap();
    std::os::unix::fs::symlink(
        fx.outside().join("does-not-exist"),
        fx.sandbox.root().join("dangling"),
    )
    .unwrap();

    let err = FileManagerTool
        .invoke(&fx.ctx(), json!({ "action": "create_file", "path": "link/evil.txt", "content": "x" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Path(_)));

    let err = FileManagerTool
        .invoke(&fx.ctx(), json!({ "action": "create_file", "path": "dangling", "content": "x" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Path(_)));

    assert!(std::fs::read_dir(&target_dir).unwrap().next().is_none());
    assert!(!fx.outside().join("does-not-exist").exists());
}

#[tokio::test]
async fn test_create_read_append_list_delete() {
    let fx = Fixture::new();
    let ctx = fx.ctx();

    let out = FileManagerTool
        .invoke(&ctx, json!({ "action": "create_file", "path": "src/app.js", "content": "let a = 1;" }))
        .await
        .unwrap();
    match out.effect {
        Some(SessionEffect::BufferWritten { language, ref source }) => {
            assert_eq!(language, Language::JavaScript);
            assert_eq!(source, "let a = 1;");
        }
        ref other => panic!("expected buffer effect, got {:?}", other),
    }

    FileManagerTool
        .invoke(&ctx, json!({ "action": "append_to_file", "path": "src/app.js", "content": "let b = 2;" }))
        .await
        .unwrap();

    // reads are idempotent
    let first = FileManagerTool
        .invoke(&ctx, json!({ "action": "read_file", "path": "src/app.js" }))
        .await
        .unwrap();
    let second = FileManagerTool
        .invoke(&ctx, json!({ "action": "read_file", "path": "src/app.js" }))
        .await
        .unwrap();
    assert_eq!(first.payload, second.payload);
    assert_eq!(first.payload["content"], "let a = 1;\nlet b = 2;");

    FileManagerTool
        .invoke(&ctx, json!({ "action": "create_folder", "path": "docs" }))
        .await
        .unwrap();
    let listing = FileManagerTool
        .invoke(&ctx, json!({ "action": "list" }))
        .await
        .unwrap();
    let names: Vec<_> = listing.payload["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["docs", "src"]);

    FileManagerTool
        .invoke(&ctx, json!({ "action": "delete", "path": "src" }))
        .await
        .unwrap();
    assert!(!fx.sandbox.root().join("src").exists());

    let err = FileManagerTool
        .invoke(&ctx, json!({ "action": "read_file", "path": "src/app.js" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Io(_)));
}
