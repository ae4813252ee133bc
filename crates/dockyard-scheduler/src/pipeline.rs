//! Clone the revision and run the pipeline's jobs in order.

use dockyard_core::{BuildSpec, Error, Event, PipelineSpec, Result};
use tracing::{debug, error, info};

use crate::{Container, Register};

/// Where a pipeline run is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Cloning,
    /// Index into the pipeline's jobs.
    RunningJob(usize),
    Completed { success: bool },
}

/// Shell commands that check out the event's revision in the working directory.
pub fn clone_commands(event: &Event) -> Vec<String> {
    let mut commands = vec![format!("git clone {} .", event.clone_url)];
    if event.is_pull_request() {
        commands.push(format!("git fetch origin {}:pr/merge", event.revision));
        commands.push("git checkout pr/merge".to_string());
    } else {
        commands.push(format!("git checkout {}", event.revision));
    }
    commands
}

/// Runs one resolved pipeline inside a started container. Stops at the first
/// failing job.
pub struct PipelineExecutor<'a> {
    container: &'a Container,
    register: &'a mut Register,
    spec: &'a BuildSpec,
    pipeline: &'a PipelineSpec,
    event: &'a Event,
    state: PipelineState,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(
        container: &'a Container,
        register: &'a mut Register,
        spec: &'a BuildSpec,
        pipeline: &'a PipelineSpec,
        event: &'a Event,
    ) -> Self {
        Self {
            container,
            register,
            spec,
            pipeline,
            event,
            state: PipelineState::Created,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(build_id = %self.register.build_id(), from = ?self.state, to = ?next, "Pipeline transition");
        self.state = next;
    }

    /// Run to completion, returning the build outcome.
    pub async fn run(mut self) -> Result<()> {
        let outcome = self.run_inner().await;
        self.transition(PipelineState::Completed {
            success: outcome.is_ok(),
        });
        outcome
    }

    async fn run_inner(&mut self) -> Result<()> {
        self.transition(PipelineState::Cloning);
        self.checkout().await.map_err(|e| {
            error!(build_id = %self.register.build_id(), error = %e, "Clone failed");
            Error::CloneFailed(Box::new(e))
        })?;

        let pipeline = self.pipeline;
        for (index, job) in pipeline.jobs.iter().enumerate() {
            self.transition(PipelineState::RunningJob(index));
            self.run_job(job).await.map_err(|e| Error::JobFailed {
                job: job.clone(),
                source: Box::new(e),
            })?;
        }

        info!(build_id = %self.register.build_id(), pipeline = %pipeline.name, "Pipeline completed successfully");
        Ok(())
    }

    async fn checkout(&self) -> Result<()> {
        for command in clone_commands(self.event) {
            info!(build_id = %self.register.build_id(), command = %command, "Executing clone command");
            self.container
                .exec(&command, self.register.output())
                .await?;
        }
        Ok(())
    }

    /// Record and run one job. A job missing from the job map is recorded as
    /// a failed task.
    async fn run_job(&mut self, job: &str) -> Result<()> {
        let spec = self.spec;
        let command = spec.job_command(job);
        let task = self
            .register
            .start_task(job, command.unwrap_or_default())
            .await?;

        let outcome = match command {
            Some(command) => {
                info!(build_id = %self.register.build_id(), job = %job, command = %command, "Executing job");
                self.container.exec(command, self.register.output()).await
            }
            None => Err(Error::UnknownJob(job.to_string())),
        };

        if let Err(e) = &outcome {
            error!(build_id = %self.register.build_id(), job = %job, error = %e, "Job failed");
        }

        let recorded = self.register.end_task(task, outcome.as_ref().err()).await;
        match (outcome, recorded) {
            (Err(e), Err(record_err)) => {
                error!(job = %job, error = %record_err, "Failed to record task end");
                Err(e)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}
