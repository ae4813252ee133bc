//! Persisted build lifecycle, live log and pull-request statuses.

use bytes::Bytes;
use dockyard_core::{
    Build, BuildId, BuildStatus, CommitState, CommitStatus, Error, Event, OutputSink, Result,
    SourceControl, Task, TriggerSpec,
};
use dockyard_db::{BuildRepo, LogRepo};
use std::sync::Arc;
use tracing::{info, warn};

use crate::output::{LogSink, MultiSink, TraceSink};

/// Error text for a task or build cut short without an outcome.
const ABORTED: &str = "build aborted before completion";

/// Opens a [`Register`] per build.
pub struct RegisterFactory {
    builds: Arc<dyn BuildRepo>,
    logs: Arc<dyn LogRepo>,
}

impl RegisterFactory {
    pub fn new(builds: Arc<dyn BuildRepo>, logs: Arc<dyn LogRepo>) -> Self {
        Self { builds, logs }
    }

    /// Create the `running` build record and its log.
    ///
    /// If the log cannot be created the build is closed as an error and the
    /// failure returned.
    pub async fn open(
        &self,
        event: &Event,
        trigger: &TriggerSpec,
        source_control: Arc<dyn SourceControl>,
    ) -> Result<Register> {
        let build = Build::start(
            &event.organization,
            &event.repository,
            event.event_type.as_str(),
            &event.branch,
            &trigger.pipeline,
            trigger.env_vars.clone(),
        );
        self.builds.create_build(&build).await?;

        let log_path = build.log_path();
        if let Err(e) = self.logs.create_log(&log_path).await {
            let err: Error = e.into();
            let message = format!("Error creating build log {}: {}", log_path, err);
            if let Err(end_err) = self
                .builds
                .end_build(build.id, BuildStatus::Error, Some(&message))
                .await
            {
                warn!(build_id = %build.id, error = %end_err, "Failed to close build");
            }
            return Err(err);
        }

        info!(
            build_id = %build.id,
            org = %build.organization,
            repo = %build.repository,
            pipeline = %build.pipeline,
            "Build started"
        );

        let trace = Arc::new(TraceSink::new(build.id));
        let output = MultiSink::new(vec![
            Arc::new(LogSink::new(Arc::clone(&self.logs), log_path.clone())) as Arc<dyn OutputSink>,
            trace.clone() as Arc<dyn OutputSink>,
        ]);

        Ok(Register {
            builds: Arc::clone(&self.builds),
            logs: Arc::clone(&self.logs),
            source_control,
            event: event.clone(),
            build_id: build.id,
            log_path,
            output,
            trace,
            next_position: 0,
            open_task: None,
            ended: false,
        })
    }
}

/// Proof that a task was started and not yet ended. Only
/// [`Register::start_task`] creates one and [`Register::end_task`] consumes it.
#[derive(Debug)]
pub struct TaskHandle {
    position: usize,
    name: String,
    command: String,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Single writer of one build's record.
///
/// Tasks are started and ended strictly in pairs. [`Register::end`] consumes
/// the register, so a build is finalized at most once; a register dropped
/// without `end` finalizes the build as aborted in the background.
pub struct Register {
    builds: Arc<dyn BuildRepo>,
    logs: Arc<dyn LogRepo>,
    source_control: Arc<dyn SourceControl>,
    event: Event,
    build_id: BuildId,
    log_path: String,
    output: MultiSink,
    trace: Arc<TraceSink>,
    next_position: usize,
    open_task: Option<usize>,
    ended: bool,
}

impl Register {
    pub fn build_id(&self) -> BuildId {
        self.build_id
    }

    pub fn log_path(&self) -> &str {
        &self.log_path
    }

    /// Writer fanning out to the persisted log and process logs.
    pub fn output(&self) -> &dyn OutputSink {
        &self.output
    }

    async fn write_marker(&self, line: String) -> Result<()> {
        self.output.write(Bytes::from(line)).await
    }

    /// Post a commit status on the pull request head. Failures are logged only.
    async fn post_status(&self, context: &str, description: &str, state: CommitState) {
        let Some(sha) = self.event.status_sha() else {
            return;
        };
        let status = CommitStatus {
            context: context.to_string(),
            description: description.to_string(),
            state,
        };
        if let Err(e) = self
            .source_control
            .create_status(&self.event.organization, &self.event.repository, sha, &status)
            .await
        {
            warn!(
                build_id = %self.build_id,
                sha = %sha,
                context = %context,
                error = %e,
                "Failed to post commit status"
            );
        }
    }

    /// Append a `running` task for `name`.
    pub async fn start_task(&mut self, name: &str, command: &str) -> Result<TaskHandle> {
        if let Some(open) = self.open_task {
            return Err(Error::Internal(format!(
                "task {} of build {} is still running",
                open, self.build_id
            )));
        }

        let position = self.next_position;
        self.builds
            .add_task(self.build_id, position, &Task::start(name, command))
            .await?;
        self.next_position += 1;
        self.open_task = Some(position);

        self.write_marker(format!(
            "Starting task '{}' with command '{}'\n",
            name, command
        ))
        .await?;
        self.post_status(name, command, CommitState::Pending).await;

        Ok(TaskHandle {
            position,
            name: name.to_string(),
            command: command.to_string(),
        })
    }

    /// Close the task with `success`, or `error` and the error text.
    pub async fn end_task(&mut self, task: TaskHandle, outcome: Option<&Error>) -> Result<()> {
        if self.open_task != Some(task.position) {
            return Err(Error::Internal(format!(
                "task {} of build {} is not the open task",
                task.position, self.build_id
            )));
        }
        self.open_task = None;

        let status = BuildStatus::from_outcome(outcome);
        let error = outcome.map(|e| e.to_string());
        self.builds
            .end_task(self.build_id, task.position, status, error.as_deref())
            .await?;

        self.write_marker(format!(
            "Ended task '{}' with status '{}'. {}\n",
            task.name,
            status,
            error.as_deref().unwrap_or("")
        ))
        .await?;

        let (state, description) = match &error {
            None => (CommitState::Success, task.command.as_str()),
            Some(message) => (CommitState::Failure, message.as_str()),
        };
        self.post_status(&task.name, description, state).await;
        Ok(())
    }

    /// Set the terminal status (`success` when `outcome` is `None`) and close
    /// the log. A task left open is closed as an error first.
    ///
    /// Every step runs even when an earlier one fails; the first failure is
    /// returned.
    pub async fn end(mut self, outcome: Option<&Error>) -> Result<()> {
        self.ended = true;
        self.trace.flush();
        let mut first_err: Option<Error> = None;

        if let Some(position) = self.open_task.take() {
            if let Err(e) = self
                .builds
                .end_task(self.build_id, position, BuildStatus::Error, Some(ABORTED))
                .await
            {
                warn!(build_id = %self.build_id, error = %e, "Failed to close open task");
                first_err.get_or_insert(e.into());
            }
        }

        let status = BuildStatus::from_outcome(outcome);
        let error = outcome.map(|e| e.to_string());
        if let Err(e) = self
            .builds
            .end_build(self.build_id, status, error.as_deref())
            .await
        {
            warn!(build_id = %self.build_id, error = %e, "Failed to close build");
            first_err.get_or_insert(e.into());
        }
        if let Err(e) = self.logs.close_log(&self.log_path).await {
            warn!(build_id = %self.build_id, error = %e, "Failed to close build log");
            first_err.get_or_insert(e.into());
        }

        match first_err {
            Some(err) => Err(err),
            None => {
                info!(build_id = %self.build_id, status = %status, "Build ended");
                Ok(())
            }
        }
    }
}

impl Drop for Register {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        warn!(build_id = %self.build_id, "Build register dropped without ending the build");
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let builds = Arc::clone(&self.builds);
        let logs = Arc::clone(&self.logs);
        let build_id = self.build_id;
        let log_path = std::mem::take(&mut self.log_path);
        let open_task = self.open_task.take();
        handle.spawn(async move {
            if let Some(position) = open_task {
                if let Err(e) = builds
                    .end_task(build_id, position, BuildStatus::Error, Some(ABORTED))
                    .await
                {
                    warn!(build_id = %build_id, error = %e, "Failed to close aborted task");
                }
            }
            if let Err(e) = builds
                .end_build(build_id, BuildStatus::Error, Some(ABORTED))
                .await
            {
                warn!(build_id = %build_id, error = %e, "Failed to close aborted build");
            }
            if let Err(e) = logs.close_log(&log_path).await {
                warn!(build_id = %build_id, error = %e, "Failed to close aborted build log");
            }
        });
    }
}
