//! Entry point for building one event.

use dockyard_config::{BUILD_SPEC_PATH, parse_spec};
use dockyard_core::{
    BuildSpec, ContainerConfig, Error, Event, Result, SourceControl, SourceControlFactory,
};
use dockyard_db::HookRepo;
use dockyard_executor::RuntimePool;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

use crate::{
    Container, ImageCache, PipelineExecutor, RegisterFactory, resolve_pipeline, resolve_trigger,
};

/// Wires the collaborators a build needs. Builds share nothing mutable
/// beyond the runtime pool, so any number may run at once.
pub struct BuildOrchestrator {
    hooks: Arc<dyn HookRepo>,
    source_control: Arc<dyn SourceControlFactory>,
    images: ImageCache,
    registers: RegisterFactory,
    memory_limit: i64,
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl BuildOrchestrator {
    pub fn new(
        hooks: Arc<dyn HookRepo>,
        source_control: Arc<dyn SourceControlFactory>,
        pool: Arc<RuntimePool>,
        registers: RegisterFactory,
        memory_limit: i64,
    ) -> Self {
        Self {
            hooks,
            source_control,
            images: ImageCache::new(pool),
            registers,
            memory_limit,
        }
    }

    async fn fetch_spec(&self, source_control: &dyn SourceControl, event: &Event) -> Result<BuildSpec> {
        let content = source_control
            .get_file_content(
                &event.organization,
                &event.repository,
                BUILD_SPEC_PATH,
                &event.revision,
            )
            .await?;
        let yaml = String::from_utf8(content)
            .map_err(|e| Error::InvalidSpec(format!("{} is not UTF-8: {}", BUILD_SPEC_PATH, e)))?;
        Ok(parse_spec(&yaml)?)
    }

    /// Run the whole build for `event`.
    ///
    /// Errors before the build record is opened (unregistered repository,
    /// spec, trigger or pipeline resolution, image preparation) leave no
    /// record. Once opened, the record is always finalized and the container
    /// always removed.
    pub async fn build(&self, event: &Event) -> Result<()> {
        let hook = self
            .hooks
            .get_hook(&event.organization, &event.repository)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no hook registered for {}", event.full_name())))?;
        let source_control = self.source_control.client(&hook.access_token);

        let spec = self.fetch_spec(source_control.as_ref(), event).await?;
        let trigger = resolve_trigger(&spec, event)?;
        let pipeline = resolve_pipeline(&spec, trigger)?;
        info!(pipeline = %pipeline.name, trigger = %trigger.name, "Pipeline to be executed");

        let prepared = self
            .images
            .ensure_image(
                source_control.as_ref(),
                &event.organization,
                &event.repository,
                &spec.docker,
                &event.revision,
            )
            .await?;

        let mut register = self
            .registers
            .open(event, trigger, Arc::clone(&source_control))
            .await?;
        let build_id = register.build_id();

        let config = ContainerConfig {
            image: prepared.image,
            user: spec.docker.user.clone(),
            working_dir: spec.docker.working_dir.clone(),
            env: trigger.env_list(),
            memory_limit: self.memory_limit,
        };
        let container = match Container::create_and_start(prepared.runtime, &config).await {
            Ok(container) => container,
            Err(e) => {
                error!(build_id = %build_id, error = %e, "Failed to create and start the container");
                if let Err(end_err) = register.end(Some(&e)).await {
                    warn!(build_id = %build_id, error = %end_err, "Failed to end build");
                }
                return Err(e);
            }
        };

        let run = PipelineExecutor::new(&container, &mut register, &spec, pipeline, event).run();
        let outcome = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic);
                error!(build_id = %build_id, panic = %message, "Pipeline panicked");
                Err(Error::Internal(format!("pipeline panicked: {}", message)))
            }
        };

        let container_id = container.id().to_string();
        if let Err(e) = container.remove().await {
            warn!(build_id = %build_id, container = %container_id, error = %e, "Failed to remove container");
        }
        if let Err(e) = register.end(outcome.as_ref().err()).await {
            warn!(build_id = %build_id, error = %e, "Failed to end build");
        }
        outcome
    }

    /// Start `event`'s build in the background. The outcome is only logged.
    pub fn dispatch(self: &Arc<Self>, event: Event) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let span = info_span!(
            "build",
            org = %event.organization,
            repo = %event.repository,
            event = %event.event_type,
            branch = %event.branch
        );
        tokio::spawn(
            async move {
                info!(revision = %event.revision, "Starting build");
                match orchestrator.build(&event).await {
                    Ok(()) => info!("Build succeeded"),
                    Err(e) if e.is_resolution() => info!(reason = %e, "Event did not start a build"),
                    Err(e) if e.is_execution() => {
                        warn!(error = %e, exit_code = ?e.exit_code(), "Build failed")
                    }
                    Err(e) => error!(error = %e, "Build errored"),
                }
            }
            .instrument(span),
        )
    }
}
