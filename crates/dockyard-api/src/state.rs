//! Application state.

use dockyard_config::SystemConfig;
use dockyard_core::SourceControlFactory;
use dockyard_db::{BuildRepo, HookRepo, LogRepo, PgBuildRepo, PgHookRepo, PgLogRepo};
use dockyard_executor::RuntimePool;
use dockyard_github::GitHubClientFactory;
use dockyard_scheduler::{BuildOrchestrator, RegisterFactory};
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub builds: Arc<dyn BuildRepo>,
    pub logs: Arc<dyn LogRepo>,
    pub hooks: Arc<dyn HookRepo>,
    pub source_control: Arc<dyn SourceControlFactory>,
    pub orchestrator: Arc<BuildOrchestrator>,
    /// Inbound events must be signed with this secret when set.
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(pool: PgPool, config: &SystemConfig) -> dockyard_core::Result<Self> {
        let runtimes = RuntimePool::from_config(&config.docker)?;
        Ok(Self::from_parts(
            Arc::new(PgBuildRepo::new(pool.clone())),
            Arc::new(PgLogRepo::new(pool.clone())),
            Arc::new(PgHookRepo::new(pool)),
            Arc::new(GitHubClientFactory::new(&config.github)),
            Arc::new(runtimes),
            config.docker.memory_limit,
            config.github.webhook_secret.clone(),
        ))
    }

    pub fn from_parts(
        builds: Arc<dyn BuildRepo>,
        logs: Arc<dyn LogRepo>,
        hooks: Arc<dyn HookRepo>,
        source_control: Arc<dyn SourceControlFactory>,
        runtimes: Arc<RuntimePool>,
        memory_limit: i64,
        webhook_secret: Option<String>,
    ) -> Self {
        let orchestrator = Arc::new(BuildOrchestrator::new(
            Arc::clone(&hooks),
            Arc::clone(&source_control),
            runtimes,
            RegisterFactory::new(Arc::clone(&builds), Arc::clone(&logs)),
            memory_limit,
        ));

        Self {
            builds,
            logs,
            hooks,
            source_control,
            orchestrator,
            webhook_secret,
        }
    }
}
