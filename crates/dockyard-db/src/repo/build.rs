//! Build and task records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dockyard_core::{Build, BuildId, BuildStatus, Task};
use sqlx::PgPool;
use sqlx::types::Json;
use std::collections::BTreeMap;

use crate::{DbError, DbResult};

/// A build row; tasks live in `build_tasks`.
#[derive(Debug, Clone, sqlx::FromRow)]
struct BuildRow {
    id: uuid::Uuid,
    organization: String,
    repository: String,
    event: String,
    branch: String,
    pipeline: String,
    status: String,
    error: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    env_vars: Json<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TaskRow {
    build_id: uuid::Uuid,
    position: i32,
    name: String,
    command: String,
    status: String,
    error: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

fn parse_status(status: &str) -> DbResult<BuildStatus> {
    status.parse().map_err(DbError::Corrupt)
}

impl TaskRow {
    fn into_task(self) -> DbResult<Task> {
        Ok(Task {
            name: self.name,
            command: self.command,
            status: parse_status(&self.status)?,
            error: self.error,
            started_at: self.started_at,
            finished_at: self.finished_at,
        })
    }
}

impl BuildRow {
    fn into_build(self, tasks: Vec<Task>) -> DbResult<Build> {
        Ok(Build {
            id: BuildId::from(self.id),
            organization: self.organization,
            repository: self.repository,
            event: self.event,
            branch: self.branch,
            pipeline: self.pipeline,
            status: parse_status(&self.status)?,
            error: self.error,
            started_at: self.started_at,
            finished_at: self.finished_at,
            env_vars: self.env_vars.0,
            tasks,
        })
    }
}

/// Group task rows (ordered by build, then position) per build. Positions
/// must run 0, 1, 2, ... without gaps.
fn group_tasks(rows: Vec<TaskRow>) -> DbResult<BTreeMap<uuid::Uuid, Vec<Task>>> {
    let mut tasks_by_build: BTreeMap<uuid::Uuid, Vec<Task>> = BTreeMap::new();
    for row in rows {
        let tasks = tasks_by_build.entry(row.build_id).or_default();
        if usize::try_from(row.position).ok() != Some(tasks.len()) {
            return Err(DbError::Corrupt(format!(
                "task {} of build {} is out of sequence",
                row.position, row.build_id
            )));
        }
        tasks.push(row.into_task()?);
    }
    Ok(tasks_by_build)
}

fn position_param(position: usize) -> DbResult<i32> {
    i32::try_from(position).map_err(|_| DbError::Corrupt(format!("task position {}", position)))
}

/// Write and read access to build records.
///
/// Each build is written by exactly one orchestration run, so implementations
/// need no cross-build locking.
#[async_trait]
pub trait BuildRepo: Send + Sync {
    /// Insert a new build (normally `running`, no tasks).
    async fn create_build(&self, build: &Build) -> DbResult<()>;

    /// Append a task at `position`.
    async fn add_task(&self, build_id: BuildId, position: usize, task: &Task) -> DbResult<()>;

    /// Close the task at `position` with a terminal status.
    async fn end_task(
        &self,
        build_id: BuildId,
        position: usize,
        status: BuildStatus,
        error: Option<&str>,
    ) -> DbResult<()>;

    /// Close the build with a terminal status.
    async fn end_build(
        &self,
        build_id: BuildId,
        status: BuildStatus,
        error: Option<&str>,
    ) -> DbResult<()>;

    async fn get_build(&self, id: BuildId) -> DbResult<Build>;

    /// Most recent builds across all repositories.
    async fn list_recent(&self, limit: i64) -> DbResult<Vec<Build>>;

    /// Most recent builds of one repository.
    async fn list_by_repository(
        &self,
        organization: &str,
        repository: &str,
        limit: i64,
    ) -> DbResult<Vec<Build>>;
}

/// PostgreSQL implementation of BuildRepo.
pub struct PgBuildRepo {
    pool: PgPool,
}

impl PgBuildRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn attach_tasks(&self, rows: Vec<BuildRow>) -> DbResult<Vec<Build>> {
        let ids: Vec<uuid::Uuid> = rows.iter().map(|r| r.id).collect();

        let task_rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT build_id, position, name, command, status, error, started_at, finished_at
            FROM build_tasks
            WHERE build_id = ANY($1)
            ORDER BY build_id, position ASC
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await?;

        let mut tasks_by_build = group_tasks(task_rows)?;

        rows.into_iter()
            .map(|row| {
                let tasks = tasks_by_build.remove(&row.id).unwrap_or_default();
                row.into_build(tasks)
            })
            .collect()
    }
}

const BUILD_COLUMNS: &str = "id, organization, repository, event, branch, pipeline, status, error, started_at, finished_at, env_vars";

#[async_trait]
impl BuildRepo for PgBuildRepo {
    async fn create_build(&self, build: &Build) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO builds (id, organization, repository, event, branch, pipeline, status, error, started_at, finished_at, env_vars)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(build.id.as_uuid())
        .bind(&build.organization)
        .bind(&build.repository)
        .bind(&build.event)
        .bind(&build.branch)
        .bind(&build.pipeline)
        .bind(build.status.as_str())
        .bind(&build.error)
        .bind(build.started_at)
        .bind(build.finished_at)
        .bind(Json(build.env_vars.clone()))
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::on_insert(e, format!("build {}", build.id)))?;
        Ok(())
    }

    async fn add_task(&self, build_id: BuildId, position: usize, task: &Task) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO build_tasks (build_id, position, name, command, status, error, started_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(build_id.as_uuid())
        .bind(position_param(position)?)
        .bind(&task.name)
        .bind(&task.command)
        .bind(task.status.as_str())
        .bind(&task.error)
        .bind(task.started_at)
        .bind(task.finished_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::on_insert(e, format!("task {} of build {}", position, build_id)))?;
        Ok(())
    }

    async fn end_task(
        &self,
        build_id: BuildId,
        position: usize,
        status: BuildStatus,
        error: Option<&str>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE build_tasks SET status = $3, error = $4, finished_at = NOW()
            WHERE build_id = $1 AND position = $2
            "#,
        )
        .bind(build_id.as_uuid())
        .bind(position_param(position)?)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!(
                "task {} of build {}",
                position, build_id
            )));
        }
        Ok(())
    }

    async fn end_build(
        &self,
        build_id: BuildId,
        status: BuildStatus,
        error: Option<&str>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE builds SET status = $2, error = $3, finished_at = NOW() WHERE id = $1",
        )
        .bind(build_id.as_uuid())
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("build {}", build_id)));
        }
        Ok(())
    }

    async fn get_build(&self, id: BuildId) -> DbResult<Build> {
        let row = sqlx::query_as::<_, BuildRow>(&format!(
            "SELECT {} FROM builds WHERE id = $1",
            BUILD_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("build {}", id)))?;

        let mut builds = self.attach_tasks(vec![row]).await?;
        builds
            .pop()
            .ok_or_else(|| DbError::NotFound(format!("build {}", id)))
    }

    async fn list_recent(&self, limit: i64) -> DbResult<Vec<Build>> {
        let rows = sqlx::query_as::<_, BuildRow>(&format!(
            "SELECT {} FROM builds ORDER BY started_at DESC LIMIT $1",
            BUILD_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        self.attach_tasks(rows).await
    }

    async fn list_by_repository(
        &self,
        organization: &str,
        repository: &str,
        limit: i64,
    ) -> DbResult<Vec<Build>> {
        let rows = sqlx::query_as::<_, BuildRow>(&format!(
            r#"
            SELECT {} FROM builds
            WHERE organization = $1 AND repository = $2
            ORDER BY started_at DESC
            LIMIT $3
            "#,
            BUILD_COLUMNS
        ))
        .bind(organization)
        .bind(repository)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        self.attach_tasks(rows).await
    }
}
