//! Field catalog loading
//!
//! The catalog is supplied from outside (a JSON or TOML file); without one
//! the built-in sample catalog is used.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::config::Settings;
use crate::domain::FieldCatalog;
use crate::infrastructure::traits::FileSystem;

/// Loads and validates the field catalog.
pub struct CatalogService {
    fs: Arc<dyn FileSystem>,
    settings: Arc<Settings>,
}

impl CatalogService {
    pub fn new(fs: Arc<dyn FileSystem>, settings: Arc<Settings>) -> Self {
        Self { fs, settings }
    }

    /// Configured catalog, or the sample catalog if none is configured.
    #[instrument(level = "debug", skip(self))]
    pub fn load(&self) -> ApplicationResult<FieldCatalog> {
        match &self.settings.catalog_path {
            Some(path) => self.load_file(path),
            None => {
                debug!("no catalog configured, using sample catalog");
                Ok(FieldCatalog::sample())
            }
        }
    }

    /// Load a catalog file. Format is chosen by extension: `.toml` or JSON.
    #[instrument(level = "debug", skip(self))]
    pub fn load_file(&self, path: &Path) -> ApplicationResult<FieldCatalog> {
        if !self.fs.is_file(path) {
            return Err(catalog_err(path, "file not found"));
        }
        let content = self
            .fs
            .read_to_string(path)
            .with_path_context("read field catalog", path)?;

        let catalog: FieldCatalog = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content).map_err(|e| catalog_err(path, e))?,
            _ => serde_json::from_str(&content).map_err(|e| catalog_err(path, e))?,
        };
        catalog.validate().map_err(|e| catalog_err(path, e))?;

        info!(fields = catalog.len(), path = %path.display(), "loaded field catalog");
        Ok(catalog)
    }
}

fn catalog_err(path: &Path, e: impl std::fmt::Display) -> ApplicationError {
    ApplicationError::Catalog {
        path: PathBuf::from(path),
        message: e.to_string(),
    }
}
