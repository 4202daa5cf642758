//! Persistence for users and sessions.
//!
//! Handlers depend on the repository traits; [`PgUserRepository`] and
//! [`PgSessionRepository`] back them with Postgres, and the in-memory versions
//! in [`super::memory`] back tests and `--memory` mode.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, types::ipnetwork::IpNetwork, PgPool, Row};
use std::net::IpAddr;
use tracing::Instrument;
use uuid::Uuid;

use super::utils::is_unique_violation;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub status: String,
}

/// A user together with the stored password digest.
#[derive(Clone, Debug)]
pub struct UserCredentials {
    pub user: User,
    pub password_digest: String,
}

/// Values for a new `users` row; `email` must already be normalized.
#[derive(Clone, Debug)]
pub struct NewUserRecord {
    pub email: String,
    pub username: String,
    pub password_digest: String,
}

#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(User),
    /// Email or username is already taken.
    Conflict,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_agent: Option<String>,
    pub ip_address: Option<IpAddr>,
    pub created_at_unix: i64,
    pub updated_at_unix: i64,
}

/// Values for a new `sessions` row. Only the token hash is stored.
#[derive(Clone, Debug)]
pub struct NewSession {
    pub user_id: Uuid,
    pub token_hash: Vec<u8>,
    pub user_agent: Option<String>,
    pub ip_address: Option<IpAddr>,
}

#[derive(Debug)]
pub enum InsertSessionOutcome {
    Inserted(Session),
    /// Another session already uses this token hash.
    DuplicateToken,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, record: &NewUserRecord) -> Result<CreateUserOutcome>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_credentials_by_email(&self, email: &str) -> Result<Option<UserCredentials>>;
    async fn count(&self) -> Result<i64>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert_session(&self, session: &NewSession) -> Result<InsertSessionOutcome>;
    async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Option<Session>>;
    /// Record activity on a session.
    async fn touch(&self, id: Uuid) -> Result<()>;
    /// Delete the session; `false` when no row matched.
    async fn delete_by_token_hash(&self, token_hash: &[u8]) -> Result<bool>;
    async fn count(&self) -> Result<i64>;
}

#[derive(Clone, Debug)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        status: row.get("status"),
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create_user(&self, record: &NewUserRecord) -> Result<CreateUserOutcome> {
        let query = r"
            INSERT INTO users (email, username, password_digest)
            VALUES ($1, $2, $3)
            RETURNING id, email, username, status
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&record.email)
            .bind(&record.username)
            .bind(&record.password_digest)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(CreateUserOutcome::Created(user_from_row(&row))),
            Err(err) if is_unique_violation(&err) => Ok(CreateUserOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = "SELECT id, email, username, status FROM users WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_credentials_by_email(&self, email: &str) -> Result<Option<UserCredentials>> {
        let query = r"
            SELECT id, email, username, status, password_digest
            FROM users
            WHERE email = $1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user credentials")?;
        Ok(row.map(|row| UserCredentials {
            user: user_from_row(&row),
            password_digest: row.get("password_digest"),
        }))
    }

    async fn count(&self) -> Result<i64> {
        let query = "SELECT COUNT(*) AS count FROM users";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count users")?;
        Ok(row.get("count"))
    }
}

#[derive(Clone, Debug)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SESSION_COLUMNS: &str = r"
    id, user_id, user_agent, ip_address,
    EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix,
    EXTRACT(EPOCH FROM updated_at)::BIGINT AS updated_at_unix
";

fn session_from_row(row: &PgRow) -> Session {
    let ip_address: Option<IpNetwork> = row.get("ip_address");
    Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        user_agent: row.get("user_agent"),
        ip_address: ip_address.map(|network| network.ip()),
        created_at_unix: row.get("created_at_unix"),
        updated_at_unix: row.get("updated_at_unix"),
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn insert_session(&self, session: &NewSession) -> Result<InsertSessionOutcome> {
        let query = format!(
            r"
            INSERT INTO sessions (user_id, token_hash, user_agent, ip_address)
            VALUES ($1, $2, $3, $4)
            RETURNING {SESSION_COLUMNS}
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(session.user_id)
            .bind(&session.token_hash)
            .bind(&session.user_agent)
            .bind(session.ip_address.map(IpNetwork::from))
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(InsertSessionOutcome::Inserted(session_from_row(&row))),
            Err(err) if is_unique_violation(&err) => Ok(InsertSessionOutcome::DuplicateToken),
            Err(err) => Err(err).context("failed to insert session"),
        }
    }

    async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Option<Session>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE token_hash = $1 LIMIT 1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn touch(&self, id: Uuid) -> Result<()> {
        let query = "UPDATE sessions SET updated_at = NOW() WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update session updated_at")?;
        Ok(())
    }

    async fn delete_by_token_hash(&self, token_hash: &[u8]) -> Result<bool> {
        let query = "DELETE FROM sessions WHERE token_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session")?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64> {
        let query = "SELECT COUNT(*) AS count FROM sessions";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count sessions")?;
        Ok(row.get("count"))
    }
}
