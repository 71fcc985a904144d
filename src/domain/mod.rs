//! Domain layer: the token model and everything that is a pure function of it
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod catalog;
pub mod compiler;
pub mod error;
pub mod literal;
pub mod mutator;
pub mod reconciler;
pub mod render;
pub mod token;

pub use arena::{TokenForest, TokenNode};
pub use catalog::{FieldCatalog, FieldDescriptor, FieldSpec};
pub use compiler::{compile, AstCompiler};
pub use error::DomainError;
pub use literal::{parse_literal, Literal};
pub use reconciler::{flatten, move_entry, rebuild};
pub use render::{render_expression, ToDisplayTree, EMPTY_EXPRESSION};
pub use token::{OperatorCategory, OperatorDescriptor, Token, TokenId, TokenMetadata, TokenType};
