//! In-process storage for tests and single-node embedding.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{IdentityStorage, SessionStorage, UserStorage};
use crate::domain::{Identity, Session, User};
use crate::error::{Error, Result};

/// `HashMap`-backed implementation of all three storage traits. Every map is
/// keyed by record id; each operation holds the relevant mutex for its whole
/// critical section, which makes the rotation compare-and-swap atomic.
#[derive(Default)]
pub struct Memory {
    users: Mutex<HashMap<String, User>>,
    sessions: Mutex<HashMap<String, Session>>,
    identities: Mutex<HashMap<String, Identity>>,
}

impl Memory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStorage for Memory {
    async fn create_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.lock().await;
        if users.values().any(|existing| existing.email == user.email) {
            return Err(Error::AlreadyExists);
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.get(id).cloned())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.lock().await;
        match users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(Error::NotFound),
        }
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        let mut users = self.users.lock().await;
        let mut sessions = self.sessions.lock().await;
        let mut identities = self.identities.lock().await;
        users.remove(id);
        sessions.retain(|_, session| session.user_id != id);
        identities.retain(|_, identity| identity.user_id != id);
        Ok(())
    }
}

#[async_trait]
impl SessionStorage for Memory {
    async fn create_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if sessions
            .values()
            .any(|existing| existing.refresh_token == session.refresh_token)
        {
            return Err(Error::AlreadyExists);
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session_by_refresh_token(&self, refresh_token: &str) -> Result<Option<Session>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .values()
            .find(|session| session.refresh_token == refresh_token)
            .cloned())
    }

    async fn rotate_refresh_token(
        &self,
        session_id: &str,
        current: &str,
        next: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(session_id) {
            Some(session) if session.refresh_token == current => {
                session.refresh_token = next.to_string();
                session.expires_at = expires_at;
                Ok(Some(session.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_session_blocked(&self, session_id: &str, blocked: bool) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(session_id) {
            Some(session) => {
                session.blocked = blocked;
                Ok(())
            }
            None => Err(Error::NotFound),
        }
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(session_id);
        Ok(())
    }

    async fn delete_sessions_for_user(&self, user_id: &str) -> Result<u64> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}

#[async_trait]
impl IdentityStorage for Memory {
    async fn create_identity(&self, identity: &Identity) -> Result<()> {
        let mut identities = self.identities.lock().await;
        if identities.values().any(|existing| {
            existing.provider == identity.provider && existing.subject == identity.subject
        }) {
            return Err(Error::AlreadyExists);
        }
        identities.insert(identity.id.clone(), identity.clone());
        Ok(())
    }

    async fn get_identity_by_provider(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<Identity>> {
        let identities = self.identities.lock().await;
        Ok(identities
            .values()
            .find(|identity| identity.provider == provider && identity.subject == subject)
            .cloned())
    }

    async fn touch_identity_last_login(&self, identity_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut identities = self.identities.lock().await;
        if let Some(identity) = identities.get_mut(identity_id) {
            identity.last_login = at;
        }
        Ok(())
    }
}
