//! Command dispatch: each subcommand loads the rule document, drives the
//! editor and writes the document back when the tree changed.

use std::path::{Path, PathBuf};

use colored::Colorize;
use itertools::Itertools;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::application::services::{
    EditorEvent, EditorService, ImpactState, ImpactStatus, Theme,
};
use crate::application::RuleDocument;
use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::{OperatorDescriptor, ToDisplayTree, Token, TokenId};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::traits::SelectionItem;
use crate::infrastructure::InfraError;

/// Resolved invocation context.
struct Session {
    container: ServiceContainer,
    project_dir: PathBuf,
    document: PathBuf,
}

impl Session {
    fn open(cli: &Cli) -> CliResult<Self> {
        let project_dir = match &cli.project_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .map_err(|e| InfraError::io("resolve current directory", e))?,
        };
        let settings = Settings::load(Some(&project_dir))?;
        let document = if cli.file.is_absolute() {
            cli.file.clone()
        } else {
            project_dir.join(&cli.file)
        };
        Ok(Self {
            container: ServiceContainer::new(settings),
            project_dir,
            document,
        })
    }

    /// Editor restored from the rule document.
    fn editor(&self) -> CliResult<(EditorService, mpsc::UnboundedReceiver<EditorEvent>)> {
        if !self.container.fs.exists(&self.document) {
            return Err(CliError::Usage(format!(
                "no rule document at {} (create one with `ruleforge new`)",
                self.document.display()
            )));
        }
        let document = RuleDocument::load(self.container.fs.as_ref(), &self.document)?;
        let (mut editor, events) = self.container.editor();
        editor.restore(&document);
        Ok((editor, events))
    }

    fn save(&self, editor: &EditorService) -> CliResult<()> {
        RuleDocument::snapshot(editor).save(self.container.fs.as_ref(), &self.document)?;
        Ok(())
    }

    /// Apply `edit`; save and show the result if the tree (or cursor/theme) changed.
    fn edit(&self, edit: impl FnOnce(&mut EditorService) -> CliResult<bool>) -> CliResult<()> {
        let (mut editor, mut events) = self.editor()?;
        // events from restoring the document
        while events.try_recv().is_ok() {}

        let changed = edit(&mut editor)?;
        let emitted = std::iter::from_fn(|| events.try_recv().ok()).count();
        debug!(changed, emitted, "edit applied");

        if changed {
            self.save(&editor)?;
            output::detail(editor.expression().replace('\n', "\n  "));
        }
        Ok(())
    }
}

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        return Ok(());
    };
    let session = Session::open(cli)?;

    match command {
        Commands::New { scope, force } => _new(&session, scope.as_deref(), *force),
        Commands::Load { tokens } => _load(&session, tokens),
        Commands::Clear => session.edit(|editor| {
            editor.clear();
            output::action("Cleared", "reset to IF");
            Ok(true)
        }),
        Commands::Add { operator, target } => {
            let descriptor = OperatorDescriptor::lookup(operator)?;
            session.edit(|editor| {
                let id = editor.add_token(&descriptor, *target);
                output::action("Added", format!("#{id} {}", descriptor.label));
                Ok(true)
            })
        }
        Commands::Field { path } => _field(&session, path.as_deref()),
        Commands::Value { text } => session.edit(|editor| match editor.add_value(text) {
            Some(id) => {
                output::action("Added", format!("#{id} value {}", text.trim()));
                Ok(true)
            }
            None => Err(CliError::InvalidArgs("value must not be blank".into())),
        }),
        Commands::Delete { id } => session.edit(|editor| {
            if !editor.delete_token(*id) {
                output::warning(format!("no token #{id}"));
                return Ok(false);
            }
            output::action("Deleted", format!("#{id}"));
            Ok(true)
        }),
        Commands::Move { from, to } => session.edit(|editor| {
            if !editor.move_token(*from, *to) {
                output::warning(format!("nothing to move ({from} -> {to})"));
                return Ok(false);
            }
            output::action("Moved", format!("{from} -> {to}"));
            Ok(true)
        }),
        Commands::Edit { id, text } => session.edit(|editor| {
            if !editor.update_value(*id, text) {
                output::warning(format!("no token #{id}, or blank text"));
                return Ok(false);
            }
            output::action("Updated", format!("#{id} {}", text.trim()));
            Ok(true)
        }),
        Commands::Select { id } => _select(&session, *id),
        Commands::Theme { theme } => _theme(&session, theme),
        Commands::Compile { compact } => _compile(&session, *compact),
        Commands::Render => {
            let (editor, _) = session.editor()?;
            output::info(editor.expression());
            Ok(())
        }
        Commands::Tree => {
            let (editor, _) = session.editor()?;
            output::info(editor.forest().to_display_tree());
            Ok(())
        }
        Commands::Flat => _flat(&session),
        Commands::Fields { query } => _fields(&session, query.as_deref().unwrap_or("")),
        Commands::Operators => _operators(),
        Commands::Estimate => _estimate(&session),
        Commands::Config { command } => _config(&session, command),
        // handled in main before dispatch
        Commands::Completion { .. } => Ok(()),
    }
}

#[instrument(skip(session))]
fn _new(session: &Session, scope: Option<&str>, force: bool) -> CliResult<()> {
    if session.container.fs.exists(&session.document) && !force {
        return Err(CliError::Usage(format!(
            "{} already exists (use --force to overwrite)",
            session.document.display()
        )));
    }
    let (mut editor, _) = session.container.editor();
    if let Some(scope) = scope {
        editor.set_scope_id(scope);
    }
    session.save(&editor)?;
    output::success(format!("created {}", session.document.display()));
    Ok(())
}

#[instrument(skip(session))]
fn _load(session: &Session, tokens: &Path) -> CliResult<()> {
    let content = session
        .container
        .fs
        .read_to_string(tokens)
        .map_err(|e| InfraError::io(format!("read tokens {}", tokens.display()), e))?;
    let tokens: Vec<Token> = serde_json::from_str(&content)
        .map_err(|e| CliError::InvalidArgs(format!("{}: {e}", tokens.display())))?;
    session.edit(|editor| {
        editor.load(&tokens, None);
        output::action("Loaded", format!("{} tokens", editor.forest().len()));
        Ok(true)
    })
}

#[instrument(skip(session))]
fn _field(session: &Session, path: Option<&str>) -> CliResult<()> {
    let catalog = session.container.catalog.load()?;
    let field = match path {
        Some(path) => catalog.lookup(path)?,
        None => {
            let fields = catalog.fields();
            let items: Vec<SelectionItem> = fields
                .iter()
                .map(|f| SelectionItem {
                    display: format!("{} ({})", f.data_path, f.field_type),
                    value: f.data_path.clone(),
                })
                .collect();
            let picked = session
                .container
                .selector
                .select_one(&items, "field> ")
                .map_err(|message| InfraError::Selector { message })?;
            let Some(picked) = picked else {
                output::warning("no field selected");
                return Ok(());
            };
            catalog.lookup(&picked.value)?
        }
    };
    session.edit(|editor| {
        let id = editor.select_field(&field);
        output::action("Added", format!("#{id} field {}", field.data_path));
        Ok(true)
    })
}

fn _select(session: &Session, id: Option<TokenId>) -> CliResult<()> {
    let (mut editor, _) = session.editor()?;
    let selected = editor.select(id);
    match (id, selected) {
        (Some(id), false) => {
            return Err(CliError::InvalidArgs(format!("no token #{id}")));
        }
        (Some(id), true) => output::action("Selected", format!("#{id}")),
        (None, _) => output::action("Selected", "nothing"),
    }
    session.save(&editor)
}

fn _theme(session: &Session, theme: &str) -> CliResult<()> {
    let theme: Theme = theme.parse().map_err(CliError::InvalidArgs)?;
    let (mut editor, _) = session.editor()?;
    editor.set_theme(theme);
    session.save(&editor)?;
    output::action("Theme", theme);
    Ok(())
}

fn _compile(session: &Session, compact: bool) -> CliResult<()> {
    let (editor, _) = session.editor()?;
    if compact {
        output::info(editor.logic());
    } else {
        output::info(format!("{:#}", editor.logic()));
    }
    Ok(())
}

fn _flat(session: &Session) -> CliResult<()> {
    let (editor, _) = session.editor()?;
    for (index, token) in editor.views().flat.iter().enumerate() {
        let marker = if Some(token.id) == editor.cursor() { " <" } else { "" };
        output::info(format!(
            "{index:>3}  {}{} #{} {}{}",
            "  ".repeat(token.depth),
            token.token_type.to_string().cyan(),
            token.id,
            token.value,
            marker
        ));
    }
    Ok(())
}

fn _fields(session: &Session, query: &str) -> CliResult<()> {
    let catalog = session.container.catalog.load()?;
    let fields = catalog.filter(query);
    if fields.is_empty() {
        output::warning(format!("no fields match '{query}'"));
        return Ok(());
    }
    for (model, group) in &fields.iter().chunk_by(|f| f.model.clone()) {
        output::header(&model);
        for field in group {
            let unit = field
                .unit
                .as_deref()
                .map(|u| format!(" [{u}]"))
                .unwrap_or_default();
            output::detail(format!(
                "{:<28} {}{}",
                field.data_path,
                field.field_type.dimmed(),
                unit
            ));
        }
    }
    Ok(())
}

fn _operators() -> CliResult<()> {
    let palette = OperatorDescriptor::palette();
    for (category, group) in &palette.iter().chunk_by(|d| d.category) {
        output::header(&format!("{category:?}").to_lowercase());
        output::detail(group.map(|d| d.label.as_str()).join("  "));
    }
    Ok(())
}

#[instrument(skip(session))]
fn _estimate(session: &Session) -> CliResult<()> {
    if session.container.estimator.is_none() {
        output::warning("impact preview unavailable: no [estimator] command configured");
        return Ok(());
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| InfraError::io("start async runtime", e))?;

    let state = runtime.block_on(async {
        // scheduling needs the runtime, so the editor is restored inside it
        let (editor, _events) = session.editor()?;
        let mut updates = editor.subscribe_impact();
        let settled = updates
            .wait_for(|s| {
                matches!(
                    s.status,
                    ImpactStatus::Success | ImpactStatus::Error | ImpactStatus::Unavailable
                )
            })
            .await
            .map(|s| (*s).clone())
            .map_err(|e| InfraError::Estimator {
                message: e.to_string(),
            })?;
        Ok::<ImpactState, CliError>(settled)
    })?;

    match state.status {
        ImpactStatus::Success => {
            if let Some(estimate) = &state.estimate {
                let total = estimate
                    .total
                    .map(|t| format!(" of {t}"))
                    .unwrap_or_default();
                output::success(format!("{} records match{total}", estimate.matched));
                if let Some(note) = &estimate.note {
                    output::detail(note);
                }
            }
            Ok(())
        }
        _ => Err(CliError::Infra(InfraError::Estimator {
            message: state
                .message
                .unwrap_or_else(|| format!("status {}", state.status)),
        })),
    }
}

fn _config(session: &Session, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            output::info(session.container.settings.to_toml()?);
        }
        ConfigCommands::Template => {
            output::info(Settings::template());
        }
        ConfigCommands::Path => {
            let global = global_config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(unavailable)".to_string());
            output::action("global", global);
            output::action(
                "local",
                local_config_path(&session.project_dir).display(),
            );
            output::action("document", session.document.display());
        }
    }
    Ok(())
}
