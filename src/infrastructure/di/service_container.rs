//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::application::services::{
    CatalogService, EditorEvent, EditorService, GatewayOptions,
};
use crate::config::Settings;
use crate::domain::AstCompiler;
use crate::infrastructure::traits::{
    CommandEstimator, CommandRunner, FileSystem, ImpactEstimator, RealCommandRunner,
    RealFileSystem, Selector, SkimSelector,
};

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// Command runner abstraction
    pub cmd: Arc<dyn CommandRunner>,

    /// Interactive picker
    pub selector: Arc<dyn Selector>,

    pub catalog: CatalogService,

    /// None when no estimator command is configured
    pub estimator: Option<Arc<dyn ImpactEstimator>>,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> Self {
        Self::with_deps(
            settings,
            Arc::new(RealFileSystem),
            Arc::new(RealCommandRunner),
            Arc::new(SkimSelector),
        )
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        fs: Arc<dyn FileSystem>,
        cmd: Arc<dyn CommandRunner>,
        selector: Arc<dyn Selector>,
    ) -> Self {
        let settings = Arc::new(settings);
        let catalog = CatalogService::new(Arc::clone(&fs), Arc::clone(&settings));
        let estimator = settings.estimator.command.as_ref().map(|command| {
            Arc::new(CommandEstimator::new(
                Arc::clone(&cmd),
                command.clone(),
                settings.estimator.args.clone(),
            )) as Arc<dyn ImpactEstimator>
        });

        Self {
            settings,
            fs,
            cmd,
            selector,
            catalog,
            estimator,
        }
    }

    pub fn compiler(&self) -> AstCompiler {
        AstCompiler::new(self.settings.compiler.legacy_scalar_root_wrap)
    }

    /// A fresh editor wired to the configured estimator.
    pub fn editor(&self) -> (EditorService, mpsc::UnboundedReceiver<EditorEvent>) {
        let (mut editor, events) = EditorService::new(
            self.compiler(),
            self.estimator.clone(),
            GatewayOptions::from(&self.settings.estimator),
            self.settings.scope_id.clone(),
        );
        editor.set_theme(self.settings.theme);
        (editor, events)
    }
}
