use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::types::Oid;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{ResourceEntry, ResourceId, ResourceReader, ResourceStore, ResourceWriter, User, UserId, UserStore};
use crate::error::{Result, ServerError};

/// Create a PostgreSQL connection pool with sensible defaults.
pub async fn create_pool(dsn: &str) -> Result<PgPool> {
    let pool: PgPool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(dsn)
        .await
        .map_err(|e| ServerError::Database(format!("failed to connect to database: {e}")))?;

    tracing::info!("database connection pool created");
    Ok(pool)
}

/// Run the initial schema migration (idempotent, uses IF NOT EXISTS).
///
/// Each statement must be executed separately because PostgreSQL's prepared
/// statements do not support multiple commands.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            login TEXT UNIQUE NOT NULL,
            key_salt BYTEA NOT NULL,
            auth_salt BYTEA NOT NULL,
            auth_verifier BYTEA NOT NULL,
            is_deleted BOOL NOT NULL DEFAULT FALSE
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| ServerError::Database(format!("migration (users) failed: {e}")))?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_data (
            user_id UUID NOT NULL,
            resource_id UUID NOT NULL,
            data_id BIGINT NOT NULL,
            blob_salt BYTEA NOT NULL,
            is_deleted BOOL NOT NULL DEFAULT FALSE,
            PRIMARY KEY (user_id, resource_id)
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| ServerError::Database(format!("migration (user_data) failed: {e}")))?;

    tracing::info!("database migrations applied");
    Ok(())
}

/// Postgres-backed user and resource storage.
///
/// Blob payloads live in large objects addressed by `data_id`; row plus
/// payload are written inside one transaction so a failed upload commits
/// nothing.
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
    op_timeout: Duration,
}

impl PgStorage {
    pub fn new(pool: PgPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        timed(self.op_timeout, fut).await
    }
}

async fn timed<T, F>(op_timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(op_timeout, fut).await {
        Ok(res) => res.map_err(|e| ServerError::Database(e.to_string())),
        Err(_) => Err(ServerError::DeadlineExceeded),
    }
}

#[async_trait]
impl UserStore for PgStorage {
    async fn add(
        &self,
        login: &str,
        key_salt: &[u8],
        auth_salt: &[u8],
        verifier: &[u8],
    ) -> Result<UserId> {
        let id = Uuid::new_v4();

        let insert = sqlx::query(
            "INSERT INTO users (id, login, key_salt, auth_salt, auth_verifier) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(login)
        .bind(key_salt)
        .bind(auth_salt)
        .bind(verifier)
        .execute(&self.pool);

        match tokio::time::timeout(self.op_timeout, insert).await {
            Ok(Ok(_)) => Ok(UserId(id)),
            Ok(Err(e)) => {
                let msg = e.to_string();
                if msg.contains("duplicate key") || msg.contains("unique") {
                    Err(ServerError::UserAlreadyExists(login.to_string()))
                } else {
                    Err(ServerError::Database(format!("add user failed: {e}")))
                }
            }
            Err(_) => Err(ServerError::DeadlineExceeded),
        }
    }

    async fn get_by_login(&self, login: &str) -> Result<User> {
        let row: Option<(Uuid, String, Vec<u8>, Vec<u8>, Vec<u8>)> = self
            .timed(
                sqlx::query_as(
                    "SELECT id, login, key_salt, auth_salt, auth_verifier \
                     FROM users WHERE is_deleted = FALSE AND login = $1",
                )
                .bind(login)
                .fetch_optional(&self.pool),
            )
            .await?;

        row.map(into_user).ok_or(ServerError::NotFound)
    }

    async fn get_by_id(&self, id: UserId) -> Result<User> {
        let row: Option<(Uuid, String, Vec<u8>, Vec<u8>, Vec<u8>)> = self
            .timed(
                sqlx::query_as(
                    "SELECT id, login, key_salt, auth_salt, auth_verifier \
                     FROM users WHERE is_deleted = FALSE AND id = $1",
                )
                .bind(id.0)
                .fetch_optional(&self.pool),
            )
            .await?;

        row.map(into_user).ok_or(ServerError::NotFound)
    }
}

fn into_user(row: (Uuid, String, Vec<u8>, Vec<u8>, Vec<u8>)) -> User {
    User {
        id: UserId(row.0),
        login: row.1,
        key_salt: row.2,
        auth_salt: row.3,
        verifier: row.4,
        is_deleted: false,
    }
}

#[async_trait]
impl ResourceStore for PgStorage {
    async fn create(&self, user: UserId, salt: &[u8]) -> Result<Box<dyn ResourceWriter>> {
        let id = ResourceId(Uuid::new_v4());

        let mut tx: Transaction<'static, Postgres> = self
            .timed(self.pool.begin())
            .await?;

        let (oid,): (Oid,) = timed(
            self.op_timeout,
            sqlx::query_as("SELECT lo_creat(-1)").fetch_one(&mut *tx),
        )
        .await?;

        timed(
            self.op_timeout,
            sqlx::query(
                "INSERT INTO user_data (user_id, resource_id, data_id, blob_salt) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(user.0)
            .bind(id.0)
            .bind(oid.0 as i64)
            .bind(salt)
            .execute(&mut *tx),
        )
        .await?;

        Ok(Box::new(PgResourceWriter {
            tx,
            id,
            oid,
            offset: 0,
            op_timeout: self.op_timeout,
        }))
    }

    async fn open(&self, user: UserId, id: ResourceId) -> Result<Box<dyn ResourceReader>> {
        let mut tx: Transaction<'static, Postgres> = self
            .timed(self.pool.begin())
            .await?;

        let row: Option<(i64, Vec<u8>)> = timed(
            self.op_timeout,
            sqlx::query_as(
                "SELECT data_id, blob_salt FROM user_data \
                 WHERE resource_id = $1 AND user_id = $2 AND is_deleted = FALSE",
            )
            .bind(id.0)
            .bind(user.0)
            .fetch_optional(&mut *tx),
        )
        .await?;

        // Missing, foreign, and soft-deleted rows are indistinguishable here:
        // the query is scoped by owner, so all three collapse to NotFound.
        let (data_id, salt) = row.ok_or(ServerError::NotFound)?;

        Ok(Box::new(PgResourceReader {
            tx,
            id,
            oid: Oid(data_id as u32),
            salt,
            offset: 0,
            op_timeout: self.op_timeout,
        }))
    }

    async fn list(&self, user: UserId) -> Result<Vec<ResourceEntry>> {
        let rows: Vec<(Uuid, Vec<u8>)> = self
            .timed(
                sqlx::query_as(
                    "SELECT resource_id, blob_salt FROM user_data \
                     WHERE user_id = $1 AND is_deleted = FALSE",
                )
                .bind(user.0)
                .fetch_all(&self.pool),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, salt)| ResourceEntry {
                id: ResourceId(id),
                salt,
            })
            .collect())
    }

    async fn delete(&self, user: UserId, id: ResourceId) -> Result<()> {
        self.timed(
            sqlx::query(
                "UPDATE user_data SET is_deleted = TRUE \
                 WHERE user_id = $1 AND resource_id = $2",
            )
            .bind(user.0)
            .bind(id.0)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }
}

struct PgResourceWriter {
    tx: Transaction<'static, Postgres>,
    id: ResourceId,
    oid: Oid,
    offset: i64,
    op_timeout: Duration,
}

#[async_trait]
impl ResourceWriter for PgResourceWriter {
    fn id(&self) -> ResourceId {
        self.id
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        timed(
            self.op_timeout,
            sqlx::query("SELECT lo_put($1, $2, $3)")
                .bind(self.oid)
                .bind(self.offset)
                .bind(chunk)
                .execute(&mut *self.tx),
        )
        .await?;

        self.offset += chunk.len() as i64;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        timed(self.op_timeout, self.tx.commit())
            .await
            .map_err(|e| match e {
                ServerError::DeadlineExceeded => e,
                other => ServerError::Database(format!("commit failed: {other}")),
            })
    }
}

struct PgResourceReader {
    tx: Transaction<'static, Postgres>,
    id: ResourceId,
    oid: Oid,
    salt: Vec<u8>,
    offset: i64,
    op_timeout: Duration,
}

impl std::fmt::Debug for PgResourceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgResourceReader")
            .field("id", &self.id)
            .field("oid", &self.oid)
            .field("offset", &self.offset)
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}

#[async_trait]
impl ResourceReader for PgResourceReader {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn salt(&self) -> &[u8] {
        &self.salt
    }

    async fn read(&mut self, max: usize) -> Result<Option<Vec<u8>>> {
        let (data,): (Vec<u8>,) = timed(
            self.op_timeout,
            sqlx::query_as("SELECT lo_get($1, $2, $3)")
                .bind(self.oid)
                .bind(self.offset)
                .bind(max as i32)
                .fetch_one(&mut *self.tx),
        )
        .await?;

        if data.is_empty() {
            return Ok(None);
        }

        self.offset += data.len() as i64;
        Ok(Some(data))
    }
}
