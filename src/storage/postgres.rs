//! Postgres-backed storage over a caller-supplied connection pool.
//!
//! Connection bootstrapping is the caller's job; this module only runs
//! queries. The schema lives in `sql/schema.sql`: unique constraints carry
//! the email, refresh-token and `(provider, subject)` invariants, and
//! `ON DELETE CASCADE` removes a user's sessions and identities with the
//! user.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::{IdentityStorage, SessionStorage, UserStorage};
use crate::domain::{Identity, Role, Session, User};
use crate::error::{Error, Result};

#[derive(Clone)]
pub struct Postgres {
    pool: PgPool,
}

impl Postgres {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        name: row.get("name"),
        role: Role::from(row.get::<String, _>("role")),
        verified: row.get("verified"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn session_from_row(row: &PgRow) -> Session {
    Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        refresh_token: row.get("refresh_token"),
        user_agent: row.get("user_agent"),
        client_ip: row.get("client_ip"),
        blocked: row.get("blocked"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }
}

fn identity_from_row(row: &PgRow) -> Identity {
    Identity {
        id: row.get("id"),
        user_id: row.get("user_id"),
        provider: row.get("provider"),
        subject: row.get("subject"),
        created_at: row.get("created_at"),
        last_login: row.get("last_login"),
    }
}

#[async_trait]
impl UserStorage for Postgres {
    async fn create_user(&self, user: &User) -> Result<()> {
        let query = r"
        INSERT INTO users (id, email, password_hash, name, role, verified, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.name)
            .bind(user.role.as_str())
            .bind(user.verified)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(Error::AlreadyExists),
            Err(err) => Err(Error::Internal(
                anyhow::Error::new(err).context("failed to insert user"),
            )),
        }
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = r"
        SELECT id, email, password_hash, name, role, verified, created_at, updated_at
        FROM users
        WHERE email = $1
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
            .context("failed to lookup user by email")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let query = r"
        SELECT id, email, password_hash, name, role, verified, created_at, updated_at
        FROM users
        WHERE id = $1
    ";
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
            .context("failed to lookup user by id")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let query = r"
        UPDATE users
        SET email = $2, password_hash = $3, name = $4, role = $5, verified = $6, updated_at = $7
        WHERE id = $1
    ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.name)
            .bind(user.role.as_str())
            .bind(user.verified)
            .bind(user.updated_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update user")?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        // Sessions and identities cascade with the row.
        let query = "DELETE FROM users WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete user")?;
        Ok(())
    }
}

#[async_trait]
impl SessionStorage for Postgres {
    async fn create_session(&self, session: &Session) -> Result<()> {
        let query = r"
        INSERT INTO sessions
            (id, user_id, refresh_token, user_agent, client_ip, blocked, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(&session.id)
            .bind(&session.user_id)
            .bind(&session.refresh_token)
            .bind(&session.user_agent)
            .bind(&session.client_ip)
            .bind(session.blocked)
            .bind(session.expires_at)
            .bind(session.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(Error::AlreadyExists),
            Err(err) => Err(Error::Internal(
                anyhow::Error::new(err).context("failed to insert session"),
            )),
        }
    }

    async fn get_session_by_refresh_token(&self, refresh_token: &str) -> Result<Option<Session>> {
        let query = r"
        SELECT id, user_id, refresh_token, user_agent, client_ip, blocked, expires_at, created_at
        FROM sessions
        WHERE refresh_token = $1
    ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(refresh_token)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session by refresh token")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn rotate_refresh_token(
        &self,
        session_id: &str,
        current: &str,
        next: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        // Single-statement compare-and-swap: the WHERE clause pins the value
        // being rotated away, so only one of two racing refreshes matches.
        let query = r"
        UPDATE sessions
        SET refresh_token = $3, expires_at = $4
        WHERE id = $1 AND refresh_token = $2
        RETURNING id, user_id, refresh_token, user_agent, client_ip, blocked, expires_at, created_at
    ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(session_id)
            .bind(current)
            .bind(next)
            .bind(expires_at)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to rotate refresh token")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn set_session_blocked(&self, session_id: &str, blocked: bool) -> Result<()> {
        let query = "UPDATE sessions SET blocked = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(session_id)
            .bind(blocked)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update session blocked flag")?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        // Revocation is idempotent; it's fine if no rows are deleted.
        let query = "DELETE FROM sessions WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session")?;
        Ok(())
    }

    async fn delete_sessions_for_user(&self, user_id: &str) -> Result<u64> {
        let query = "DELETE FROM sessions WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete sessions for user")?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let query = "DELETE FROM sessions WHERE expires_at <= $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete expired sessions")?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl IdentityStorage for Postgres {
    async fn create_identity(&self, identity: &Identity) -> Result<()> {
        let query = r"
        INSERT INTO identities (id, user_id, provider, subject, created_at, last_login)
        VALUES ($1, $2, $3, $4, $5, $6)
    ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(&identity.id)
            .bind(&identity.user_id)
            .bind(&identity.provider)
            .bind(&identity.subject)
            .bind(identity.created_at)
            .bind(identity.last_login)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(Error::AlreadyExists),
            Err(err) => Err(Error::Internal(
                anyhow::Error::new(err).context("failed to insert identity"),
            )),
        }
    }

    async fn get_identity_by_provider(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<Identity>> {
        let query = r"
        SELECT id, user_id, provider, subject, created_at, last_login
        FROM identities
        WHERE provider = $1 AND subject = $2
    ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(provider)
            .bind(subject)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup identity by provider")?;
        Ok(row.as_ref().map(identity_from_row))
    }

    async fn touch_identity_last_login(&self, identity_id: &str, at: DateTime<Utc>) -> Result<()> {
        let query = "UPDATE identities SET last_login = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(identity_id)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to touch identity last login")?;
        Ok(())
    }
}
