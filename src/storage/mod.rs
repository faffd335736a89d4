//! Storage capabilities the engine is handed at construction.
//!
//! Uniqueness invariants (email, `(provider, subject)`, refresh-token value)
//! are enforced by the implementation, typically as unique constraints;
//! violations surface as [`Error::AlreadyExists`](crate::Error::AlreadyExists)
//! so callers can map them to the matching domain error instead of treating
//! them as fatal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Identity, Session, User};
use crate::error::Result;

mod memory;
mod postgres;

pub use memory::Memory;
pub use postgres::Postgres;

#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Persist a new user.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyExists`](crate::Error::AlreadyExists) when the email
    /// is already taken.
    async fn create_user(&self, user: &User) -> Result<()>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>>;

    /// # Errors
    ///
    /// [`Error::NotFound`](crate::Error::NotFound) when the user is gone.
    async fn update_user(&self, user: &User) -> Result<()>;

    /// Hard delete. Dependent sessions and identities go with the user.
    async fn delete_user(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Persist a new session.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyExists`](crate::Error::AlreadyExists) on a
    /// refresh-token value collision; the caller re-rolls and retries.
    async fn create_session(&self, session: &Session) -> Result<()>;

    async fn get_session_by_refresh_token(&self, refresh_token: &str) -> Result<Option<Session>>;

    /// Atomically replace the refresh-token value and extend expiry, keyed on
    /// the value being rotated away. Returns the updated session, or `None`
    /// when the session is gone or the value has already been rotated, so
    /// exactly one of two racing rotations can win.
    async fn rotate_refresh_token(
        &self,
        session_id: &str,
        current: &str,
        next: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Session>>;

    /// # Errors
    ///
    /// [`Error::NotFound`](crate::Error::NotFound) when the session is gone.
    async fn set_session_blocked(&self, session_id: &str, blocked: bool) -> Result<()>;

    /// Idempotent; deleting an absent session is not an error.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Returns the number of sessions deleted.
    async fn delete_sessions_for_user(&self, user_id: &str) -> Result<u64>;

    /// Returns the number of sessions deleted.
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait IdentityStorage: Send + Sync {
    /// Persist a new identity.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyExists`](crate::Error::AlreadyExists) when the
    /// `(provider, subject)` pair is already linked.
    async fn create_identity(&self, identity: &Identity) -> Result<()>;

    async fn get_identity_by_provider(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<Identity>>;

    /// Best effort; touching an identity that disappeared is a no-op.
    async fn touch_identity_last_login(&self, identity_id: &str, at: DateTime<Utc>) -> Result<()>;
}
