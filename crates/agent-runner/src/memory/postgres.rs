//! Postgres-backed memory and session tables
//!
//! Tables are created on first use. Timestamps are epoch seconds; list-valued
//! columns are JSONB.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tokio::sync::OnceCell;
use tracing::debug;

use super::store::{MemoryDb, SessionStorage};
use super::types::{RunRecord, SessionRecord, UserMemory};
use crate::error::{AgentError, Result};

pub const MEMORY_TABLE: &str = "user_memories";
pub const SESSION_TABLE: &str = "agent_sessions";

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && name.len() <= 63 {
        Ok(())
    } else {
        Err(AgentError::Config(format!("Invalid table name: {:?}", name)))
    }
}

pub struct PostgresMemoryDb {
    pool: PgPool,
    table: String,
    ready: OnceCell<()>,
}

impl PostgresMemoryDb {
    pub fn new(pool: PgPool, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self {
            pool,
            table,
            ready: OnceCell::new(),
        })
    }

    async fn ensure_table(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| async {
                debug!("Ensuring table {}", self.table);
                sqlx::query(&format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        memory_id TEXT PRIMARY KEY,
                        user_id TEXT NOT NULL,
                        memory TEXT NOT NULL,
                        topics JSONB NOT NULL DEFAULT '[]'::jsonb,
                        created_at BIGINT NOT NULL,
                        updated_at BIGINT NOT NULL
                    )",
                    table = self.table
                ))
                .execute(&self.pool)
                .await?;
                sqlx::query(&format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_user_id ON {table} (user_id)",
                    table = self.table
                ))
                .execute(&self.pool)
                .await?;
                Ok::<_, AgentError>(())
            })
            .await?;
        Ok(())
    }
}

fn build_memory(row: &PgRow) -> Result<UserMemory> {
    let Json(topics): Json<Vec<String>> = row.try_get("topics")?;
    Ok(UserMemory {
        memory_id: row.try_get("memory_id")?,
        user_id: row.try_get("user_id")?,
        memory: row.try_get("memory")?,
        topics,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl MemoryDb for PostgresMemoryDb {
    async fn list_memories(&self, user_id: &str) -> Result<Vec<UserMemory>> {
        self.ensure_table().await?;
        let rows = sqlx::query(&format!(
            "SELECT memory_id, user_id, memory, topics, created_at, updated_at
             FROM {} WHERE user_id = $1 ORDER BY created_at, memory_id",
            self.table
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(build_memory).collect()
    }

    async fn upsert_memory(&self, memory: &UserMemory) -> Result<()> {
        self.ensure_table().await?;
        sqlx::query(&format!(
            "INSERT INTO {} (memory_id, user_id, memory, topics, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (memory_id) DO UPDATE SET
                memory = EXCLUDED.memory,
                topics = EXCLUDED.topics,
                updated_at = EXCLUDED.updated_at",
            self.table
        ))
        .bind(&memory.memory_id)
        .bind(&memory.user_id)
        .bind(&memory.memory)
        .bind(Json(&memory.topics))
        .bind(memory.created_at)
        .bind(memory.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_memory(&self, user_id: &str, memory_id: &str) -> Result<bool> {
        self.ensure_table().await?;
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE user_id = $1 AND memory_id = $2",
            self.table
        ))
        .bind(user_id)
        .bind(memory_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct PostgresStorage {
    pool: PgPool,
    table: String,
    ready: OnceCell<()>,
}

impl PostgresStorage {
    pub fn new(pool: PgPool, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self {
            pool,
            table,
            ready: OnceCell::new(),
        })
    }

    async fn ensure_table(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| async {
                debug!("Ensuring table {}", self.table);
                sqlx::query(&format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        session_id TEXT PRIMARY KEY,
                        user_id TEXT NOT NULL,
                        agent_id TEXT NOT NULL,
                        runs JSONB NOT NULL DEFAULT '[]'::jsonb,
                        created_at BIGINT NOT NULL,
                        updated_at BIGINT NOT NULL
                    )",
                    self.table
                ))
                .execute(&self.pool)
                .await?;
                Ok::<_, AgentError>(())
            })
            .await?;
        Ok(())
    }
}

fn build_session(row: &PgRow) -> Result<SessionRecord> {
    let Json(runs): Json<Vec<RunRecord>> = row.try_get("runs")?;
    Ok(SessionRecord {
        session_id: row.try_get("session_id")?,
        user_id: row.try_get("user_id")?,
        agent_id: row.try_get("agent_id")?,
        runs,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl SessionStorage for PostgresStorage {
    async fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.ensure_table().await?;
        let row = sqlx::query(&format!(
            "SELECT session_id, user_id, agent_id, runs, created_at, updated_at
             FROM {} WHERE session_id = $1",
            self.table
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(build_session).transpose()
    }

    async fn save_session(&self, session: &SessionRecord) -> Result<()> {
        self.ensure_table().await?;
        sqlx::query(&format!(
            "INSERT INTO {} (session_id, user_id, agent_id, runs, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (session_id) DO UPDATE SET
                runs = EXCLUDED.runs,
                updated_at = EXCLUDED.updated_at",
            self.table
        ))
        .bind(&session.session_id)
        .bind(&session.user_id)
        .bind(&session.agent_id)
        .bind(Json(&session.runs))
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    #[test]
    fn table_names_must_be_identifiers() {
        assert!(validate_table_name("user_memories").is_ok());
        assert!(validate_table_name("_t1").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("1table").is_err());
        assert!(validate_table_name("users; DROP TABLE x").is_err());
        assert!(validate_table_name("schema.table").is_err());
    }

    #[tokio::test]
    async fn constructors_reject_bad_names_without_connecting() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgresql://postgres@localhost:5432/dsa_agent")
            .unwrap();
        assert!(PostgresMemoryDb::new(pool.clone(), MEMORY_TABLE).is_ok());
        assert!(PostgresStorage::new(pool.clone(), SESSION_TABLE).is_ok());
        let err = PostgresStorage::new(pool, "bad-name").err().unwrap();
        assert!(err.is_configuration());
    }
}
