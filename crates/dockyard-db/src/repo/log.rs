//! Build log blobs, addressed by path and stored as ordered chunks.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{DbError, DbResult};

#[async_trait]
pub trait LogRepo: Send + Sync {
    /// Create an empty, open log at `path`.
    async fn create_log(&self, path: &str) -> DbResult<()>;

    /// Append bytes to an open log.
    async fn append_log(&self, path: &str, data: &[u8]) -> DbResult<()>;

    /// Close the log; later appends fail.
    async fn close_log(&self, path: &str) -> DbResult<()>;

    /// Full log content in write order.
    async fn read_log(&self, path: &str) -> DbResult<Vec<u8>>;
}

/// PostgreSQL implementation of LogRepo.
pub struct PgLogRepo {
    pool: PgPool,
}

impl PgLogRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogRepo for PgLogRepo {
    async fn create_log(&self, path: &str) -> DbResult<()> {
        sqlx::query("INSERT INTO build_logs (path, created_at) VALUES ($1, NOW())")
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::on_insert(e, format!("log {}", path)))?;
        Ok(())
    }

    async fn append_log(&self, path: &str, data: &[u8]) -> DbResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        // A log has a single writer, so MAX(seq) + 1 cannot race.
        let result = sqlx::query(
            r#"
            INSERT INTO build_log_chunks (path, seq, data)
            SELECT l.path,
                   COALESCE((SELECT MAX(c.seq) FROM build_log_chunks c WHERE c.path = l.path), 0) + 1,
                   $2
            FROM build_logs l
            WHERE l.path = $1 AND l.closed_at IS NULL
            "#,
        )
        .bind(path)
        .bind(data)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("open log {}", path)));
        }
        Ok(())
    }

    async fn close_log(&self, path: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE build_logs SET closed_at = COALESCE(closed_at, NOW()) WHERE path = $1",
        )
        .bind(path)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("log {}", path)));
        }
        Ok(())
    }

    async fn read_log(&self, path: &str) -> DbResult<Vec<u8>> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM build_logs WHERE path = $1)")
                .bind(path)
                .fetch_one(&self.pool)
                .await?;
        if !exists {
            return Err(DbError::NotFound(format!("log {}", path)));
        }

        let chunks: Vec<Vec<u8>> = sqlx::query_scalar(
            "SELECT data FROM build_log_chunks WHERE path = $1 ORDER BY seq ASC",
        )
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        Ok(chunks.concat())
    }
}
