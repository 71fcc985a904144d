//! I/O boundary traits for testability
//!
//! These traits abstract external I/O operations, allowing services
//! to be tested with mock implementations.

use std::io;
use std::path::Path;
use std::process::Output;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::infrastructure::{InfraError, InfraResult};

/// Filesystem abstraction for testability.
pub trait FileSystem: Send + Sync {
    /// Read file contents to string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Write string content to file.
    fn write(&self, path: &Path, content: &str) -> io::Result<()>;

    /// Check if path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Check if path is a file.
    fn is_file(&self, path: &Path) -> bool;

    /// Create directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Create parent directories if needed.
    fn ensure_parent(&self, path: &Path) -> io::Result<()>;
}

/// External command runner abstraction.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command with arguments, feeding `stdin`, and capture output.
    ///
    /// Dropping the returned future before it completes must not leave
    /// the child running.
    async fn run_with_stdin(&self, cmd: &str, args: &[&str], stdin: &str) -> io::Result<Output>;
}

/// Item for FZF-style selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionItem {
    /// Display text shown in selector
    pub display: String,
    /// Actual value (e.g., dotted field path)
    pub value: String,
}

/// Interactive FZF-style selector abstraction.
pub trait Selector: Send + Sync {
    /// Present items to user and return selected one.
    /// Returns None if user cancels (Esc/Ctrl-C).
    fn select_one(
        &self,
        items: &[SelectionItem],
        prompt: &str,
    ) -> Result<Option<SelectionItem>, String>;
}

/// What the impact estimator is asked.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactRequest {
    pub logic: Value,
    pub scope_id: String,
    /// Hash of logic + scope, used to skip identical re-estimates
    #[serde(skip)]
    pub fingerprint: String,
}

/// Advisory answer from the impact estimator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactEstimate {
    /// Records the logic would match
    pub matched: u64,
    /// Records in scope, when the estimator knows
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub note: Option<String>,
}

/// External collaborator that previews how many records a rule touches.
#[async_trait]
pub trait ImpactEstimator: Send + Sync {
    async fn estimate(&self, request: &ImpactRequest) -> InfraResult<ImpactEstimate>;
}

// ============================================================
// REAL IMPLEMENTATIONS
// ============================================================

/// Real filesystem implementation.
#[derive(Debug, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        std::fs::write(path, content)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn ensure_parent(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                self.create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// Real command runner implementation.
#[derive(Debug, Default)]
pub struct RealCommandRunner;

#[async_trait]
impl CommandRunner for RealCommandRunner {
    async fn run_with_stdin(&self, cmd: &str, args: &[&str], stdin: &str) -> io::Result<Output> {
        use std::process::Stdio;
        use tokio::io::AsyncWriteExt;
        use tokio::process::Command;

        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut child_stdin) = child.stdin.take() {
            child_stdin.write_all(stdin.as_bytes()).await?;
        }

        child.wait_with_output().await
    }
}

/// Real selector implementation using skim (FZF-like).
#[derive(Debug, Default)]
pub struct SkimSelector;

impl Selector for SkimSelector {
    fn select_one(
        &self,
        items: &[SelectionItem],
        prompt: &str,
    ) -> Result<Option<SelectionItem>, String> {
        use skim::prelude::*;
        use std::io::Cursor;

        if items.is_empty() {
            return Ok(None);
        }

        let input = items
            .iter()
            .map(|i| i.display.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let options = SkimOptionsBuilder::default()
            .prompt(Some(prompt))
            .height(Some("50%"))
            .multi(false)
            .build()
            .map_err(|e| format!("failed to build skim options: {e}"))?;

        let item_reader = SkimItemReader::default();
        let items_arc = item_reader.of_bufread(Cursor::new(input));

        match Skim::run_with(&options, Some(items_arc)) {
            Some(out) if out.is_abort => Ok(None),
            Some(out) => Ok(out.selected_items.first().and_then(|selected| {
                let display = selected.output().to_string();
                items.iter().find(|i| i.display == display).cloned()
            })),
            None => Ok(None),
        }
    }
}

/// Estimator backed by an external command.
///
/// The request `{"logic": .., "scopeId": ..}` goes to the command's stdin;
/// the command prints `{"matched": n, "total": m}` on stdout.
pub struct CommandEstimator {
    runner: Arc<dyn CommandRunner>,
    command: String,
    args: Vec<String>,
}

impl CommandEstimator {
    pub fn new(runner: Arc<dyn CommandRunner>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            runner,
            command: command.into(),
            args,
        }
    }
}

#[async_trait]
impl ImpactEstimator for CommandEstimator {
    #[instrument(level = "debug", skip(self, request), fields(command = %self.command, scope = %request.scope_id))]
    async fn estimate(&self, request: &ImpactRequest) -> InfraResult<ImpactEstimate> {
        let payload = json!({ "logic": request.logic, "scopeId": request.scope_id }).to_string();
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();

        // a timed-out or superseded estimate drops this future, which kills the child
        let output = self
            .runner
            .run_with_stdin(&self.command, &args, &payload)
            .await
            .map_err(|e| InfraError::io(format!("run estimator '{}'", self.command), e))?;

        if !output.status.success() {
            return Err(InfraError::Estimator {
                message: format!(
                    "'{}' exited with {}: {}",
                    self.command,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(bytes = stdout.len(), "estimator replied");
        serde_json::from_str(stdout.trim()).map_err(|e| InfraError::Estimator {
            message: format!("unreadable estimator reply: {e}"),
        })
    }
}
