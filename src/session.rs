//! Refresh-token session ledger: creation, lookup, rotation, revocation.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use tracing::debug;

use crate::domain::{self, Session};
use crate::error::{Error, Result};
use crate::storage::SessionStorage;

const REFRESH_TOKEN_BYTES: usize = 32;
const CREATE_ATTEMPTS: usize = 3;

/// Tracks refresh-token-backed sessions. The token value is the only
/// credential the holder ever sees; it is replaced in place on rotation so a
/// consumed value can never be replayed.
pub struct SessionLedger {
    sessions: Arc<dyn SessionStorage>,
    refresh_ttl: Duration,
}

impl SessionLedger {
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStorage>, refresh_ttl: Duration) -> Self {
        Self {
            sessions,
            refresh_ttl,
        }
    }

    /// Create a new active session for `user_id`.
    ///
    /// # Errors
    ///
    /// Propagates storage failures; a refresh-token value collision is
    /// re-rolled a few times before giving up.
    pub async fn create(&self, user_id: &str, user_agent: &str, client_ip: &str) -> Result<Session> {
        self.create_at(user_id, user_agent, client_ip, Utc::now())
            .await
    }

    pub(crate) async fn create_at(
        &self,
        user_id: &str,
        user_agent: &str,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        for _ in 0..CREATE_ATTEMPTS {
            let session = Session {
                id: domain::new_id(),
                user_id: user_id.to_string(),
                refresh_token: generate_refresh_token()?,
                user_agent: user_agent.to_string(),
                client_ip: client_ip.to_string(),
                blocked: false,
                expires_at: now + self.refresh_ttl,
                created_at: now,
            };
            match self.sessions.create_session(&session).await {
                Ok(()) => return Ok(session),
                // Token value collision; roll a fresh one.
                Err(Error::AlreadyExists) => {}
                Err(err) => return Err(err),
            }
        }
        Err(Error::Internal(anyhow::anyhow!(
            "failed to generate a unique refresh token"
        )))
    }

    /// Look up a session by its refresh-token value.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the value is unknown or the session has
    /// expired; expired rows are deleted on the way out.
    pub async fn lookup(&self, refresh_token: &str) -> Result<Session> {
        self.lookup_at(refresh_token, Utc::now()).await
    }

    pub(crate) async fn lookup_at(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let Some(session) = self
            .sessions
            .get_session_by_refresh_token(refresh_token)
            .await?
        else {
            return Err(Error::NotFound);
        };
        if session.expires_at <= now {
            self.sessions.delete_session(&session.id).await?;
            return Err(Error::NotFound);
        }
        Ok(session)
    }

    /// Replace the session's refresh-token value and extend its expiry, in a
    /// single storage operation keyed on the value being consumed.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the session is gone or a concurrent rotation
    /// already consumed the value; exactly one of two racing callers wins.
    pub async fn rotate(&self, session: &Session) -> Result<Session> {
        self.rotate_at(session, Utc::now()).await
    }

    pub(crate) async fn rotate_at(
        &self,
        session: &Session,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let next = generate_refresh_token()?;
        let rotated = self
            .sessions
            .rotate_refresh_token(
                &session.id,
                &session.refresh_token,
                &next,
                now + self.refresh_ttl,
            )
            .await?;
        rotated.ok_or(Error::NotFound)
    }

    /// Idempotent: revoking an absent or already-revoked session succeeds.
    ///
    /// # Errors
    ///
    /// Propagates storage failures only.
    pub async fn revoke(&self, session_id: &str) -> Result<()> {
        self.sessions.delete_session(session_id).await
    }

    /// Revoke every session belonging to `user_id`, returning the count.
    ///
    /// # Errors
    ///
    /// Propagates storage failures only.
    pub async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64> {
        let revoked = self.sessions.delete_sessions_for_user(user_id).await?;
        debug!(user_id, revoked, "revoked user sessions");
        Ok(revoked)
    }

    /// Quarantine a session without deleting it; a blocked session fails
    /// refresh with [`Error::SessionBlocked`](crate::Error::SessionBlocked).
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the session is gone.
    pub async fn block(&self, session_id: &str) -> Result<()> {
        self.sessions.set_session_blocked(session_id, true).await
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] when the session is gone.
    pub async fn unblock(&self, session_id: &str) -> Result<()> {
        self.sessions.set_session_blocked(session_id, false).await
    }

    /// Delete every expired session, returning the count. The engine never
    /// schedules this itself; callers run it on their own cadence.
    ///
    /// # Errors
    ///
    /// Propagates storage failures only.
    pub async fn sweep_expired(&self) -> Result<u64> {
        self.sessions.delete_expired_sessions(Utc::now()).await
    }
}

fn generate_refresh_token() -> Result<String> {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut bytes).map_err(|err| {
        Error::Internal(anyhow::Error::new(err).context("failed to generate refresh token"))
    })?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}
