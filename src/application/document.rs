//! Rule documents: a saved editor snapshot
//!
//! The CLI keeps the token forest between invocations in a small JSON file.
//! It is a convenience snapshot, not a versioned interchange format; the
//! compiled logic object is the portable artifact.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::application::services::{EditorService, Theme};
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::{Token, TokenId};
use crate::infrastructure::traits::FileSystem;

/// Serialized editor state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDocument {
    /// Opaque context passed to the impact estimator
    pub scope_id: String,
    /// Selected token, if any
    #[serde(default)]
    pub cursor: Option<TokenId>,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub tokens: Vec<Token>,
    /// Id counter at save time; deleted ids stay retired across sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_id: Option<TokenId>,
}

impl RuleDocument {
    pub fn new(scope_id: impl Into<String>, tokens: Vec<Token>, cursor: Option<TokenId>) -> Self {
        Self {
            scope_id: scope_id.into(),
            cursor,
            theme: Theme::default(),
            tokens,
            next_id: None,
        }
    }

    /// Everything needed to resume `editor` later, id counter included.
    pub fn snapshot(editor: &EditorService) -> Self {
        Self {
            scope_id: editor.scope_id().to_string(),
            cursor: editor.cursor(),
            theme: editor.theme(),
            tokens: editor.tokens().to_vec(),
            next_id: Some(editor.forest().next_id()),
        }
    }

    #[instrument(level = "debug", skip(fs))]
    pub fn load(fs: &dyn FileSystem, path: &Path) -> ApplicationResult<Self> {
        let content = fs
            .read_to_string(path)
            .with_path_context("read rule document", path)?;
        let document: Self = serde_json::from_str(&content).map_err(|e| ApplicationError::Document {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        debug!(roots = document.tokens.len(), "loaded rule document");
        Ok(document)
    }

    #[instrument(level = "debug", skip(self, fs))]
    pub fn save(&self, fs: &dyn FileSystem, path: &Path) -> ApplicationResult<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| ApplicationError::Document {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        fs.ensure_parent(path).with_path_context("create parent directory", path)?;
        fs.write(path, &(content + "\n"))
            .with_path_context("write rule document", path)
    }
}
