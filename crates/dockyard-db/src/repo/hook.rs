//! Registered webhooks and the access tokens builds authenticate with.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::{DbError, DbResult};

/// A webhook registered on one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HookRecord {
    /// Hook id assigned by the source-control host.
    pub id: i64,
    pub organization: String,
    pub repository: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait HookRepo: Send + Sync {
    /// Hook for a repository, if one is registered.
    async fn get_hook(&self, organization: &str, repository: &str)
    -> DbResult<Option<HookRecord>>;

    async fn list_hooks(&self, organization: &str) -> DbResult<Vec<HookRecord>>;

    async fn create_hook(&self, hook: &HookRecord) -> DbResult<()>;

    async fn delete_hook(&self, id: i64) -> DbResult<()>;
}

/// PostgreSQL implementation of HookRepo.
pub struct PgHookRepo {
    pool: PgPool,
}

impl PgHookRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HookRepo for PgHookRepo {
    async fn get_hook(
        &self,
        organization: &str,
        repository: &str,
    ) -> DbResult<Option<HookRecord>> {
        let hook = sqlx::query_as::<_, HookRecord>(
            r#"
            SELECT id, organization, repository, access_token, created_at
            FROM hooks
            WHERE organization = $1 AND repository = $2
            "#,
        )
        .bind(organization)
        .bind(repository)
        .fetch_optional(&self.pool)
        .await?;
        Ok(hook)
    }

    async fn list_hooks(&self, organization: &str) -> DbResult<Vec<HookRecord>> {
        let hooks = sqlx::query_as::<_, HookRecord>(
            r#"
            SELECT id, organization, repository, access_token, created_at
            FROM hooks
            WHERE organization = $1
            ORDER BY repository ASC
            "#,
        )
        .bind(organization)
        .fetch_all(&self.pool)
        .await?;
        Ok(hooks)
    }

    async fn create_hook(&self, hook: &HookRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO hooks (id, organization, repository, access_token, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(hook.id)
        .bind(&hook.organization)
        .bind(&hook.repository)
        .bind(&hook.access_token)
        .bind(hook.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DbError::on_insert(
                e,
                format!("hook for {}/{}", hook.organization, hook.repository),
            )
        })?;
        Ok(())
    }

    async fn delete_hook(&self, id: i64) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM hooks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("hook {}", id)));
        }
        Ok(())
    }
}
