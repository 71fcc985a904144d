//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/ruleforge/ruleforge.toml`
//! 3. Local config: `<project_dir>/.ruleforge.toml`
//! 4. Environment variables: `RULEFORGE_*` prefix

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::services::Theme;
use crate::application::ApplicationError;

/// Compiler switches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompilerConfig {
    /// Wrap a lone scalar root result as `{"var": "<scalar>"}`
    pub legacy_scalar_root_wrap: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            legacy_scalar_root_wrap: true,
        }
    }
}

/// External impact estimator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Command receiving `{"logic", "scopeId"}` on stdin; None disables previews
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Quiet period before a request is sent
    pub debounce_ms: u64,
    pub timeout_ms: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: vec![],
            debounce_ms: 300,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawCompilerConfig {
    pub legacy_scalar_root_wrap: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawEstimatorConfig {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub debounce_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
}

/// Raw settings for intermediate parsing.
///
/// `None` means "not specified in this file, inherit from the layer below".
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub catalog_path: Option<PathBuf>,
    pub scope_id: Option<String>,
    pub theme: Option<Theme>,
    pub compiler: RawCompilerConfig,
    pub estimator: RawEstimatorConfig,
}

/// Unified configuration for ruleforge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Field catalog (JSON or TOML); None uses the built-in sample
    pub catalog_path: Option<PathBuf>,
    /// Opaque context handed to the impact estimator
    pub scope_id: String,
    pub theme: Theme,
    pub compiler: CompilerConfig,
    pub estimator: EstimatorConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog_path: None,
            scope_id: "default".to_string(),
            theme: Theme::default(),
            compiler: CompilerConfig::default(),
            estimator: EstimatorConfig::default(),
        }
    }
}

/// Get the XDG config directory for ruleforge.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "ruleforge").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("ruleforge.toml"))
}

/// Get the path to the local config file in a project directory.
pub fn local_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(".ruleforge.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

fn expand(value: &str) -> String {
    shellexpand::full(value)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

impl Settings {
    /// Expand shell variables and tilde in path-like fields.
    ///
    /// Handles `~`, `$VAR`, and `${VAR}` syntax.
    fn expand_paths(&mut self) {
        if let Some(path) = &self.catalog_path {
            self.catalog_path = Some(PathBuf::from(expand(&path.to_string_lossy())));
        }
        if let Some(command) = &self.estimator.command {
            self.estimator.command = Some(expand(command));
        }
    }

    /// Overlay a config file onto self. Specified values win, lists replace.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            catalog_path: overlay
                .catalog_path
                .clone()
                .or_else(|| self.catalog_path.clone()),
            scope_id: overlay
                .scope_id
                .clone()
                .unwrap_or_else(|| self.scope_id.clone()),
            theme: overlay.theme.unwrap_or(self.theme),
            compiler: CompilerConfig {
                legacy_scalar_root_wrap: overlay
                    .compiler
                    .legacy_scalar_root_wrap
                    .unwrap_or(self.compiler.legacy_scalar_root_wrap),
            },
            estimator: EstimatorConfig {
                command: overlay
                    .estimator
                    .command
                    .clone()
                    .or_else(|| self.estimator.command.clone()),
                args: overlay
                    .estimator
                    .args
                    .clone()
                    .unwrap_or_else(|| self.estimator.args.clone()),
                debounce_ms: overlay
                    .estimator
                    .debounce_ms
                    .unwrap_or(self.estimator.debounce_ms),
                timeout_ms: overlay
                    .estimator
                    .timeout_ms
                    .unwrap_or(self.estimator.timeout_ms),
            },
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `project_dir` - Optional directory holding a local `.ruleforge.toml`
    pub fn load(project_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        Self::load_layers(global_config_path().as_deref(), project_dir)
    }

    /// Load with an explicit global config path (tests, `--config`).
    pub fn load_layers(
        global_path: Option<&Path>,
        project_dir: Option<&Path>,
    ) -> Result<Self, ApplicationError> {
        // 1. Start with defaults
        let mut current = Self::default();

        // 2. Global config
        if let Some(global_path) = global_path {
            if global_path.exists() {
                let raw = load_raw_settings(global_path)?;
                current = current.merge_with(&raw);
            }
        }

        // 3. Project-local config
        if let Some(dir) = project_dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                let raw = load_raw_settings(&local_path)?;
                current = current.merge_with(&raw);
            }
        }

        // 4. Environment variables
        current = Self::apply_env_overrides(current)?;

        current.expand_paths();
        Ok(current)
    }

    /// Apply RULEFORGE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let builder = Config::builder().add_source(
            Environment::with_prefix("RULEFORGE")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("estimator.args"),
        );

        let config = builder.build().map_err(config_err)?;

        if let Ok(val) = config.get_string("catalog_path") {
            settings.catalog_path = Some(PathBuf::from(val));
        }
        if let Ok(val) = config.get_string("scope_id") {
            settings.scope_id = val;
        }
        if let Ok(val) = config.get_string("theme") {
            settings.theme = val
                .parse()
                .map_err(|message| ApplicationError::Config { message })?;
        }
        if let Ok(val) = config.get_bool("compiler.legacy_scalar_root_wrap") {
            settings.compiler.legacy_scalar_root_wrap = val;
        }
        if let Ok(val) = config.get_string("estimator.command") {
            settings.estimator.command = Some(val);
        }
        if let Ok(val) = config.get::<Vec<String>>("estimator.args") {
            settings.estimator.args = val;
        }
        if let Ok(val) = config.get::<u64>("estimator.debounce_ms") {
            settings.estimator.debounce_ms = val;
        }
        if let Ok(val) = config.get::<u64>("estimator.timeout_ms") {
            settings.estimator.timeout_ms = val;
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# ruleforge configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/ruleforge/ruleforge.toml
#   Local:  <project>/.ruleforge.toml
#   Env:    RULEFORGE_* environment variables (e.g. RULEFORGE_ESTIMATOR__TIMEOUT_MS)

# Field catalog, JSON or TOML: { Model = { field = { scalarType, dottedPath } } }
# catalog_path = "~/rules/catalog.toml"

# Opaque scope passed to the impact estimator
# scope_id = "default"

# theme = "light"

[compiler]
# Emit a lone scalar root result as {"var": "<scalar>"} (compatibility)
# legacy_scalar_root_wrap = true

[estimator]
# Reads {"logic": .., "scopeId": ..} on stdin, prints {"matched": n, "total": m}
# command = "rule-impact"
# args = ["--json"]
# debounce_ms = 300
# timeout_ms = 10000
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
