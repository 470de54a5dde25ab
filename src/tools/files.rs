//! Sandboxed file and folder management
//!
//! All paths are interpreted relative to a single sandbox root. A path is
//! accepted only if, after resolving symlinks and `..`, it still lies inside
//! the canonical root. Resolution happens before any mutation, so a rejected
//! request leaves the filesystem untouched.

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{parse_args, Language, SessionEffect, ToolAdapter, ToolContext, ToolError, ToolOutput};

/// Directory all file operations are confined to
#[derive(Debug, Clone)]
pub struct Sandbox {
    /// Canonical absolute root
    root: PathBuf,
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

impl Sandbox {
    /// Open (creating if needed) the sandbox rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        let root = root.as_ref().canonicalize()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `requested` to an absolute path inside the sandbox
    ///
    /// The deepest existing ancestor is canonicalized (following symlinks and
    /// `..`). In the not-yet-existing remainder, `..` is folded lexically and
    /// the folded path is resolved once more, since it may now name existing
    /// entries. Containment is checked per path component, not by string prefix.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, ToolError> {
        let trimmed = requested.trim();
        if trimmed.is_empty() {
            return Err(ToolError::Validation("path is empty".to_string()));
        }
        self.resolve_candidate(&self.root.join(trimmed), requested, true)
    }

    fn resolve_candidate(
        &self,
        candidate: &Path,
        requested: &str,
        fold_parents: bool,
    ) -> Result<PathBuf, ToolError> {
        let outside = || ToolError::Path(format!("'{}' resolves outside the sandbox", requested));
        let components: Vec<Component> = candidate.components().collect();

        let mut split = components.len();
        let mut base = loop {
            let prefix: PathBuf = components[..split].iter().collect();
            match prefix.canonicalize() {
                Ok(canonical) => break canonical,
                Err(_) if split > 0 => split -= 1,
                Err(e) => return Err(ToolError::Io(e)),
            }
        };

        let mut tail: Vec<OsString> = Vec::new();
        let mut folded = false;
        for component in &components[split..] {
            match component {
                Component::Normal(name) => tail.push(name.to_os_string()),
                Component::CurDir => {}
                Component::ParentDir if fold_parents => {
                    if tail.pop().is_none() {
                        base.pop();
                    }
                    folded = true;
                }
                _ => return Err(outside()),
            }
        }

        if folded {
            let folded_path = tail.iter().fold(base, |acc, name| acc.join(name));
            return self.resolve_candidate(&folded_path, requested, false);
        }

        // A first missing component that still has metadata is a dangling
        // symlink; writing through it would land wherever it points.
        if let Some(first) = tail.first() {
            if std::fs::symlink_metadata(base.join(first)).is_ok() {
                return Err(ToolError::Path(format!(
                    "'{}' goes through a dangling symlink",
                    requested
                )));
            }
        }

        let resolved = tail.iter().fold(base, |acc, name| acc.join(name));
        if !resolved.starts_with(&self.root) {
            return Err(outside());
        }
        Ok(resolved)
    }

    /// Path relative to the root, for display
    pub fn display(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel.to_string_lossy().into_owned(),
            Err(_) => path.to_string_lossy().into_owned(),
        }
    }

    fn resolve_non_root(&self, requested: &str) -> Result<PathBuf, ToolError> {
        let path = self.resolve(requested)?;
        if path == self.root {
            return Err(ToolError::Validation(
                "operation not allowed on the sandbox root itself".to_string(),
            ));
        }
        Ok(path)
    }

    /// Create (or overwrite) a file, creating parent folders
    pub async fn create_file(&self, requested: &str, content: &str) -> Result<PathBuf, ToolError> {
        let path = self.resolve_non_root(requested)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }

    pub async fn create_folder(&self, requested: &str) -> Result<PathBuf, ToolError> {
        let path = self.resolve(requested)?;
        tokio::fs::create_dir_all(&path).await?;
        Ok(path)
    }

    pub async fn read_file(&self, requested: &str) -> Result<String, ToolError> {
        let path = self.resolve(requested)?;
        Ok(tokio::fs::read_to_string(&path).await?)
    }

    /// Replace the contents of an existing file
    pub async fn write_file(&self, requested: &str, content: &str) -> Result<PathBuf, ToolError> {
        let path = self.resolve_non_root(requested)?;
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(ToolError::Validation(format!(
                "'{}' is not a file",
                requested
            )));
        }
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }

    /// Append to a file (created if missing), separated by a newline when the
    /// file already has content. Returns the path and the full new contents.
    pub async fn append_to_file(
        &self,
        requested: &str,
        content: &str,
    ) -> Result<(PathBuf, String), ToolError> {
        let path = self.resolve_non_root(requested)?;
        let mut existing = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        if !existing.is_empty() {
            existing.push('\n');
        }
        existing.push_str(content);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &existing).await?;
        Ok((path, existing))
    }

    /// Delete a file, or a folder and everything in it
    pub async fn delete(&self, requested: &str) -> Result<PathBuf, ToolError> {
        let path = self.resolve_non_root(requested)?;
        let meta = tokio::fs::symlink_metadata(&path).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(path)
    }

    /// List a folder's entries sorted by name
    pub async fn list(&self, requested: &str) -> Result<Vec<DirEntry>, ToolError> {
        let path = self.resolve(requested)?;
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let meta = tokio::fs::symlink_metadata(entry.path()).await?;
            let kind = if meta.file_type().is_symlink() {
                EntryKind::Symlink
            } else if meta.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
                size: if kind == EntryKind::File { meta.len() } else { 0 },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FileAction {
    CreateFile,
    CreateFolder,
    ReadFile,
    WriteFile,
    AppendToFile,
    Delete,
    List,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileManagerArgs {
    action: FileAction,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl FileManagerArgs {
    fn path(&self) -> Result<&str, ToolError> {
        match self.path.as_deref() {
            Some(p) if !p.trim().is_empty() => Ok(p),
            _ => Err(ToolError::Validation(format!(
                "'path' is required for {:?}",
                self.action
            ))),
        }
    }

    fn content(&self) -> Result<&str, ToolError> {
        self.content.as_deref().ok_or_else(|| {
            ToolError::Validation(format!("'content' is required for {:?}", self.action))
        })
    }
}

/// `file_manager` tool: create, read, update, delete and list inside the sandbox
pub struct FileManagerTool;

fn buffer_effect(path: &Path, source: String) -> Option<SessionEffect> {
    Language::from_path(path).map(|language| SessionEffect::BufferWritten { language, source })
}

#[async_trait]
impl ToolAdapter for FileManagerTool {
    fn name(&self) -> &str {
        "file_manager"
    }

    fn description(&self) -> &str {
        "Manage files and folders in the user's workspace. Paths are relative to the workspace \
         root and cannot leave it. Actions: create_file (path, optional content), create_folder \
         (path), read_file (path), write_file (path, content; file must exist), append_to_file \
         (path, content), delete (path), list (optional path, defaults to the root)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": [
                        "create_file", "create_folder", "read_file", "write_file",
                        "append_to_file", "delete", "list"
                    ],
                    "description": "Operation to perform"
                },
                "path": {
                    "type": "string",
                    "description": "Path relative to the workspace root"
                },
                "content": {
                    "type": "string",
                    "description": "File content for create_file, write_file and append_to_file"
                }
            },
            "required": ["action"]
        })
    }

    async fn invoke(&self, ctx: &ToolContext<'_>, args: Value) -> Result<ToolOutput, ToolError> {
        let args: FileManagerArgs = parse_args(self.name(), args)?;
        let sandbox = ctx.sandbox;
        info!(trace_id = %ctx.trace_id, action = ?args.action, path = ?args.path, "File operation");

        let output = match args.action {
            FileAction::CreateFile => {
                let content = args.content.as_deref().unwrap_or("");
                let path = sandbox.create_file(args.path()?, content).await?;
                let out = ToolOutput::new(json!({
                    "created": sandbox.display(&path),
                    "bytes": content.len(),
                }));
                match buffer_effect(&path, content.to_string()) {
                    Some(effect) => out.with_effect(effect),
                    None => out,
                }
            }
            FileAction::CreateFolder => {
                let path = sandbox.create_folder(args.path()?).await?;
                ToolOutput::new(json!({ "created": sandbox.display(&path) }))
            }
            FileAction::ReadFile => {
                let path = args.path()?;
                let content = sandbox.read_file(path).await?;
                ToolOutput::new(json!({ "path": path, "content": content }))
            }
            FileAction::WriteFile => {
                let content = args.content()?;
                let path = sandbox.write_file(args.path()?, content).await?;
                let out = ToolOutput::new(json!({
                    "updated": sandbox.display(&path),
                    "bytes": content.len(),
                }));
                match buffer_effect(&path, content.to_string()) {
                    Some(effect) => out.with_effect(effect),
                    None => out,
                }
            }
            FileAction::AppendToFile => {
                let (path, full) = sandbox.append_to_file(args.path()?, args.content()?).await?;
                let out = ToolOutput::new(json!({
                    "appended": sandbox.display(&path),
                    "bytes": full.len(),
                }));
                match buffer_effect(&path, full) {
                    Some(effect) => out.with_effect(effect),
                    None => out,
                }
            }
            FileAction::Delete => {
                let path = sandbox.delete(args.path()?).await?;
                ToolOutput::new(json!({ "deleted": sandbox.display(&path) }))
            }
            FileAction::List => {
                let path = args.path.as_deref().unwrap_or(".");
                let entries = sandbox.list(path).await?;
                ToolOutput::new(json!({ "path": path, "entries": entries }))
            }
        };
        Ok(output)
    }
}
