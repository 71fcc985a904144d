//! Application layer: the editor, its gateway and supporting services
//!
//! This layer orchestrates domain logic and depends on I/O boundary traits.

pub mod document;
pub mod error;
pub mod error_ext;
pub mod hash;
pub mod services;

pub use document::RuleDocument;
pub use error::{ApplicationError, ApplicationResult};
pub use error_ext::IoResultExt;
