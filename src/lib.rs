//! ruleforge: a structural rule editor
//!
//! Rules are edited as a forest of typed tokens and compiled into a JSON
//! logic object for an external rule engine.
//!
//! Layers, innermost first:
//! - [`domain`]: token model, tree mutations, reconciler, compiler, renderer
//! - [`application`]: the editor, the impact gateway, rule documents
//! - [`infrastructure`]: I/O traits, real implementations, service wiring
//! - [`cli`]: argument parsing and command dispatch

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
