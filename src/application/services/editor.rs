//! The rule editor: owns the token forest and announces every change
//!
//! All tree edits go through [`EditorService`]. Each one that changes the
//! tree re-derives the views, emits `TokensChanged` then `LogicExported`,
//! and schedules an impact estimate. Edits that change nothing emit
//! nothing.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::application::RuleDocument;
use crate::application::services::impact::{GatewayOptions, ImpactGateway, ImpactState};
use crate::domain::{
    flatten, render_expression, AstCompiler, FieldDescriptor, OperatorDescriptor, Token,
    TokenForest, TokenId,
};
use crate::infrastructure::traits::{ImpactEstimator, ImpactRequest};

/// Cosmetic preference carried alongside the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme '{other}' (expected light or dark)")),
        }
    }
}

/// Inbound requests.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorCommand {
    /// Replace the whole tree, e.g. when reopening a saved rule
    Load {
        tokens: Vec<Token>,
        cursor: Option<TokenId>,
    },
    /// Back to the canonical single `if` root
    Clear,
    SetTheme(Theme),
    AddToken {
        operator: OperatorDescriptor,
        target: Option<TokenId>,
    },
    SelectField(FieldDescriptor),
    AddValue(String),
    DeleteToken(TokenId),
    MoveToken {
        from: usize,
        to: usize,
    },
    UpdateValue {
        id: TokenId,
        text: String,
    },
    Select(Option<TokenId>),
}

/// Outbound notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// The whole tree, after a mutation
    TokensChanged(Vec<Token>),
    /// The compiled logic, after a mutation
    LogicExported(Value),
    /// Logic and scope handed to the impact estimator, after the debounce
    ImpactRequested(ImpactRequest),
}

/// Everything derived from the tree, recomputed once per mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedViews {
    pub tokens: Vec<Token>,
    pub logic: Value,
    pub expression: String,
    pub flat: Vec<Token>,
}

impl DerivedViews {
    fn derive(forest: &TokenForest, compiler: &AstCompiler) -> Self {
        let tokens = forest.to_tokens();
        Self {
            logic: compiler.compile(&tokens),
            expression: render_expression(&tokens),
            flat: flatten(&tokens),
            tokens,
        }
    }
}

pub struct EditorService {
    forest: TokenForest,
    compiler: AstCompiler,
    views: DerivedViews,
    gateway: ImpactGateway,
    events: mpsc::UnboundedSender<EditorEvent>,
    scope_id: String,
    theme: Theme,
}

impl EditorService {
    /// Editor in the canonical state, plus the receiving end of its events.
    pub fn new(
        compiler: AstCompiler,
        estimator: Option<Arc<dyn ImpactEstimator>>,
        options: GatewayOptions,
        scope_id: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<EditorEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let forest = TokenForest::canonical();
        let editor = Self {
            views: DerivedViews::derive(&forest, &compiler),
            forest,
            compiler,
            gateway: ImpactGateway::new(estimator, options, events.clone()),
            events,
            scope_id: scope_id.into(),
            theme: Theme::default(),
        };
        (editor, receiver)
    }

    // ============================================================
    // Inbound
    // ============================================================

    /// Replace the tree. A cursor that names no loaded token is dropped.
    #[instrument(level = "debug", skip(self, tokens), fields(roots = tokens.len()))]
    pub fn load(&mut self, tokens: &[Token], cursor: Option<TokenId>) {
        let mut forest = TokenForest::from_tokens(tokens);
        forest.inherit_counter(&self.forest);
        forest.select(cursor);
        self.forest = forest;
        info!(tokens = self.forest.len(), "rule loaded");
        self.commit();
    }

    /// Resume a saved document: scope, theme, tree, cursor and id counter.
    #[instrument(level = "debug", skip(self, document), fields(scope = %document.scope_id))]
    pub fn restore(&mut self, document: &RuleDocument) {
        self.scope_id = document.scope_id.clone();
        self.theme = document.theme;
        let mut forest = TokenForest::from_tokens(&document.tokens);
        if let Some(next) = document.next_id {
            if next.0 > 0 {
                forest.reserve_ids_through(TokenId(next.0 - 1));
            }
        }
        forest.select(document.cursor);
        self.forest = forest;
        info!(tokens = self.forest.len(), next_id = %self.forest.next_id(), "rule restored");
        self.commit();
    }

    #[instrument(level = "debug", skip(self))]
    pub fn clear(&mut self) {
        self.forest.reset();
        self.commit();
    }

    /// Cosmetic only; emits no tree events.
    pub fn set_theme(&mut self, theme: Theme) {
        debug!(%theme, "theme changed");
        self.theme = theme;
    }

    pub fn set_scope_id(&mut self, scope_id: impl Into<String>) {
        self.scope_id = scope_id.into();
    }

    // ============================================================
    // User actions
    // ============================================================

    pub fn add_token(&mut self, operator: &OperatorDescriptor, target: Option<TokenId>) -> TokenId {
        let id = self.forest.add_token(operator, target);
        self.commit();
        id
    }

    pub fn select_field(&mut self, field: &FieldDescriptor) -> TokenId {
        let id = self.forest.select_field(field);
        self.commit();
        id
    }

    pub fn add_value(&mut self, text: &str) -> Option<TokenId> {
        let id = self.forest.add_value(text)?;
        self.commit();
        Some(id)
    }

    pub fn delete_token(&mut self, id: TokenId) -> bool {
        self.commit_if(|forest| forest.delete_token(id))
    }

    pub fn move_token(&mut self, from: usize, to: usize) -> bool {
        self.commit_if(|forest| forest.move_token(from, to))
    }

    pub fn update_value(&mut self, id: TokenId, text: &str) -> bool {
        self.commit_if(|forest| forest.update_value(id, text))
    }

    /// Move the cursor. Not a tree change.
    pub fn select(&mut self, id: Option<TokenId>) -> bool {
        self.forest.select(id)
    }

    /// Handle one inbound command. Returns whether the tree changed.
    pub fn apply(&mut self, command: EditorCommand) -> bool {
        match command {
            EditorCommand::Load { tokens, cursor } => {
                self.load(&tokens, cursor);
                true
            }
            EditorCommand::Clear => {
                self.clear();
                true
            }
            EditorCommand::SetTheme(theme) => {
                self.set_theme(theme);
                false
            }
            EditorCommand::AddToken { operator, target } => {
                self.add_token(&operator, target);
                true
            }
            EditorCommand::SelectField(field) => {
                self.select_field(&field);
                true
            }
            EditorCommand::AddValue(text) => self.add_value(&text).is_some(),
            EditorCommand::DeleteToken(id) => self.delete_token(id),
            EditorCommand::MoveToken { from, to } => self.move_token(from, to),
            EditorCommand::UpdateValue { id, text } => self.update_value(id, &text),
            EditorCommand::Select(id) => {
                self.select(id);
                false
            }
        }
    }

    /// Apply commands until the sending side closes.
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<EditorCommand>) {
        while let Some(command) = commands.recv().await {
            self.apply(command);
        }
        debug!("command channel closed");
    }

    // ============================================================
    // Accessors
    // ============================================================

    pub fn forest(&self) -> &TokenForest {
        &self.forest
    }

    pub fn views(&self) -> &DerivedViews {
        &self.views
    }

    pub fn tokens(&self) -> &[Token] {
        &self.views.tokens
    }

    pub fn logic(&self) -> &Value {
        &self.views.logic
    }

    pub fn expression(&self) -> &str {
        &self.views.expression
    }

    pub fn cursor(&self) -> Option<TokenId> {
        self.forest.cursor()
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    pub fn impact(&self) -> ImpactState {
        self.gateway.state()
    }

    pub fn subscribe_impact(&self) -> tokio::sync::watch::Receiver<ImpactState> {
        self.gateway.subscribe()
    }

    // ============================================================
    // Internals
    // ============================================================

    fn commit_if(&mut self, edit: impl FnOnce(&mut TokenForest) -> bool) -> bool {
        let changed = edit(&mut self.forest);
        if changed {
            self.commit();
        }
        changed
    }

    /// Re-derive views, announce the new tree and schedule an estimate.
    fn commit(&mut self) {
        self.views = DerivedViews::derive(&self.forest, &self.compiler);
        debug!(tokens = self.forest.len(), "tree changed");
        let sent = self
            .events
            .send(EditorEvent::TokensChanged(self.views.tokens.clone()))
            .and_then(|_| {
                self.events
                    .send(EditorEvent::LogicExported(self.views.logic.clone()))
            });
        if sent.is_err() {
            debug!("event receiver dropped");
        }
        self.gateway.schedule(self.views.logic.clone(), &self.scope_id);
    }
}
