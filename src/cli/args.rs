//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueHint};

use crate::domain::TokenId;

/// Structural rule editor: build boolean/conditional token trees and compile them to JSON logic
#[derive(Parser, Debug)]
#[command(name = "ruleforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output: -d info, -dd debug, -ddd trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Project directory (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub project_dir: Option<PathBuf>,

    /// Rule document, relative to the project directory
    #[arg(
        short,
        long,
        global = true,
        default_value = "rule.json",
        env = "RULEFORGE_FILE",
        value_hint = ValueHint::FilePath
    )]
    pub file: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a new rule document (single IF root)
    New {
        /// Scope passed to the impact estimator (default: configured scope_id)
        #[arg(short, long)]
        scope: Option<String>,
        /// Overwrite an existing document
        #[arg(long)]
        force: bool,
    },

    /// Replace the tree with tokens from a JSON file
    Load {
        /// JSON array of tokens
        #[arg(value_hint = ValueHint::FilePath)]
        tokens: PathBuf,
    },

    /// Reset to the canonical single IF root
    Clear,

    /// Insert an operator, keyword or modifier (wraps or nests at the cursor)
    Add {
        /// Palette name: and, or, not, if, >=, between, is_blank, mod:in, ...
        operator: String,
        /// Token to wrap or nest under (default: cursor)
        #[arg(short, long)]
        target: Option<TokenId>,
    },

    /// Insert a field reference under the cursor (interactive pick without PATH)
    Field {
        /// Dotted path or Model.field
        path: Option<String>,
    },

    /// Insert a literal value at the cursor
    Value {
        /// Literal text: 18, true, null, "quoted", plain text
        #[arg(allow_hyphen_values = true)]
        text: String,
    },

    /// Delete a token and its subtree
    Delete {
        /// Token id
        id: TokenId,
    },

    /// Drag-reorder: move the flat-list entry at FROM to TO
    Move { from: usize, to: usize },

    /// Change a token's label or literal text
    Edit {
        /// Token id
        id: TokenId,
        #[arg(allow_hyphen_values = true)]
        text: String,
    },

    /// Move the cursor (no id clears it)
    Select {
        /// Token id
        id: Option<TokenId>,
    },

    /// Set the cosmetic theme flag
    Theme {
        /// light or dark
        theme: String,
    },

    /// Print the compiled logic object
    Compile {
        /// Single-line JSON
        #[arg(long)]
        compact: bool,
    },

    /// Print the human-readable expression
    Render,

    /// Show the token tree
    Tree,

    /// Show the flat preorder list used by `move`
    Flat,

    /// List catalog fields, optionally filtered
    Fields {
        /// Substring or fuzzy query
        query: Option<String>,
    },

    /// List the operator palette
    Operators,

    /// Ask the impact estimator how many records the rule matches
    Estimate,

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Print config template
    Template,

    /// Show config paths
    Path,
}
