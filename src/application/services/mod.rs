//! Application services
//!
//! Services orchestrate domain logic and use infrastructure traits for I/O.

pub mod catalog;
pub mod editor;
pub mod impact;

pub use catalog::CatalogService;
pub use editor::{DerivedViews, EditorCommand, EditorEvent, EditorService, Theme};
pub use impact::{GatewayOptions, ImpactGateway, ImpactState, ImpactStatus};
