//! The orchestrator facade: composes the credential verifier, token engine,
//! session ledger and identity resolver into the public operation set.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use crate::config::AuthConfig;
use crate::domain::{self, Role, User};
use crate::error::{Error, Result};
use crate::identity::IdentityResolver;
use crate::password::Hasher;
use crate::provider::Provider;
use crate::session::SessionLedger;
use crate::storage::{IdentityStorage, SessionStorage, UserStorage};
use crate::token::{Claims, SecretResolver, TokenEngine};

/// A short-lived signed access token plus the opaque, revocable refresh
/// token backing its session. The split is deliberate: stateless access
/// tokens cannot be revoked, so the long-lived half must live server-side.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Identity & session lifecycle engine. Holds no mutable state of its own;
/// everything shared lives behind the injected storage capabilities, so the
/// service is freely shared across concurrent requests.
pub struct AuthService {
    users: Arc<dyn UserStorage>,
    hasher: Hasher,
    tokens: TokenEngine,
    sessions: SessionLedger,
    resolver: IdentityResolver,
    providers: HashMap<String, Arc<dyn Provider>>,
    access_ttl: Duration,
}

impl AuthService {
    /// Wire the engine. The provider map is an explicit dependency; there
    /// is no process-wide registry to mutate.
    ///
    /// # Errors
    ///
    /// Invalid configuration (hash cost, signing secret) fails here, never
    /// per-request.
    pub fn new(
        users: Arc<dyn UserStorage>,
        sessions: Arc<dyn SessionStorage>,
        identities: Arc<dyn IdentityStorage>,
        providers: HashMap<String, Arc<dyn Provider>>,
        secrets: Arc<dyn SecretResolver>,
        config: AuthConfig,
    ) -> Result<Self> {
        let hasher = Hasher::new(config.hash_cost())?;
        let tokens = TokenEngine::new(secrets, config.issuer(), config.audience())
            .with_leeway_seconds(config.clock_leeway_seconds());
        let ledger = SessionLedger::new(
            sessions,
            Duration::seconds(config.refresh_token_ttl_seconds()),
        );
        let resolver =
            IdentityResolver::new(Arc::clone(&users), identities, config.link_policy());
        Ok(Self {
            users,
            hasher,
            tokens,
            sessions: ledger,
            resolver,
            providers,
            access_ttl: Duration::seconds(config.access_token_ttl_seconds()),
        })
    }

    /// The session ledger, for operational levers the request flow does not
    /// need (blocking a session, sweeping expired rows).
    #[must_use]
    pub fn sessions(&self) -> &SessionLedger {
        &self.sessions
    }

    /// Validate an access token and return its claims. This is how callers
    /// authenticate bearer requests.
    ///
    /// # Errors
    ///
    /// See [`TokenEngine::parse`].
    pub fn parse_token(&self, token: &str) -> Result<Claims> {
        self.tokens.parse(token)
    }

    /// Create a password-backed account.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidEmail`] for an unusable address, [`Error::UserExists`]
    /// when the email is taken.
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<()> {
        let email = domain::normalize_email(email);
        if !domain::valid_email(&email) {
            return Err(Error::InvalidEmail);
        }
        let now = Utc::now();
        let user = User {
            id: domain::new_id(),
            email,
            password_hash: Some(self.hasher.hash(password)?),
            name: name.to_string(),
            role: Role::User,
            verified: false,
            created_at: now,
            updated_at: now,
        };
        match self.users.create_user(&user).await {
            Ok(()) => {
                info!(user_id = %user.id, "user registered");
                Ok(())
            }
            Err(Error::AlreadyExists) => Err(Error::UserExists),
            Err(err) => Err(err),
        }
    }

    /// Authenticate with email and password.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCredentials`] uniformly for unknown email,
    /// passwordless account, or wrong password.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        user_agent: &str,
        client_ip: &str,
    ) -> Result<TokenPair> {
        let email = domain::normalize_email(email);
        let user = self.users.get_user_by_email(&email).await?;

        // The unknown-email and passwordless paths burn a full verification
        // against a decoy hash so response time does not reveal which case
        // was hit.
        let Some(user) = user else {
            self.hasher.verify_dummy(password);
            return Err(Error::InvalidCredentials);
        };
        let Some(hash) = user.password_hash.as_deref() else {
            self.hasher.verify_dummy(password);
            return Err(Error::InvalidCredentials);
        };
        if !self.hasher.verify(hash, password)? {
            return Err(Error::InvalidCredentials);
        }

        self.issue_pair(&user, user_agent, client_ip).await
    }

    /// Exchange a refresh token for a fresh pair, rotating the session. The
    /// replacement inherits the session's original user-agent/IP metadata.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidToken`] for an unknown, expired, or already-rotated
    /// value; [`Error::SessionBlocked`] for a quarantined session.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let session = match self.sessions.lookup(refresh_token).await {
            Ok(session) => session,
            Err(Error::NotFound) => return Err(Error::InvalidToken),
            Err(err) => return Err(err),
        };
        if session.blocked {
            return Err(Error::SessionBlocked);
        }
        let rotated = match self.sessions.rotate(&session).await {
            Ok(rotated) => rotated,
            // A concurrent refresh consumed the value first.
            Err(Error::NotFound) => return Err(Error::InvalidToken),
            Err(err) => return Err(err),
        };

        // A session row can only outlive its user if the storage cascade was
        // bypassed; answer as if the token were simply gone.
        let Some(user) = self.users.get_user_by_id(&rotated.user_id).await? else {
            return Err(Error::InvalidToken);
        };
        let access_token = self.tokens.issue(&user.id, &user.role, self.access_ttl)?;
        Ok(TokenPair {
            access_token,
            refresh_token: rotated.refresh_token,
        })
    }

    /// Authenticate via a third-party provider's authorization code.
    ///
    /// # Errors
    ///
    /// [`Error::ProviderNotSupported`] for an unknown provider name;
    /// resolver and transport errors pass through.
    pub async fn social_login(
        &self,
        provider: &str,
        code: &str,
        user_agent: &str,
        client_ip: &str,
    ) -> Result<TokenPair> {
        let Some(p) = self.providers.get(provider) else {
            return Err(Error::ProviderNotSupported(provider.to_string()));
        };
        let info = p.fetch_user(code).await?;
        let user = self.resolver.resolve(provider, &info).await?;
        self.issue_pair(&user, user_agent, client_ip).await
    }

    /// Authorization URL to send the end user to for `provider`.
    ///
    /// # Errors
    ///
    /// [`Error::ProviderNotSupported`] for an unknown provider name.
    pub fn auth_url(&self, provider: &str, state: &str) -> Result<Url> {
        self.providers
            .get(provider)
            .map(|p| p.auth_url(state))
            .ok_or_else(|| Error::ProviderNotSupported(provider.to_string()))
    }

    /// Best-effort session revocation; an unknown token is already logged
    /// out, which is not an error.
    ///
    /// # Errors
    ///
    /// Propagates storage failures only.
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        match self.sessions.lookup(refresh_token).await {
            Ok(session) => self.sessions.revoke(&session.id).await,
            Err(Error::NotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] when the user does not exist.
    pub async fn get_profile(&self, user_id: &str) -> Result<User> {
        self.users
            .get_user_by_id(user_id)
            .await?
            .ok_or(Error::NotFound)
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] when the user does not exist.
    pub async fn update_profile(&self, user_id: &str, name: &str) -> Result<()> {
        let mut user = self.get_profile(user_id).await?;
        user.name = name.to_string();
        user.updated_at = Utc::now();
        self.users.update_user(&user).await
    }

    /// Change the password after re-verifying the old one, then revoke every
    /// outstanding session: a stolen refresh token must not survive a
    /// password reset.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown user, [`Error::InvalidCredentials`]
    /// when the old password does not verify (including accounts that have
    /// no password to change).
    pub async fn change_password(
        &self,
        user_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let mut user = self.get_profile(user_id).await?;
        let Some(hash) = user.password_hash.as_deref() else {
            self.hasher.verify_dummy(old_password);
            return Err(Error::InvalidCredentials);
        };
        if !self.hasher.verify(hash, old_password)? {
            return Err(Error::InvalidCredentials);
        }

        user.password_hash = Some(self.hasher.hash(new_password)?);
        user.updated_at = Utc::now();
        self.users.update_user(&user).await?;

        let revoked = self.sessions.revoke_all_for_user(user_id).await?;
        debug!(user_id, revoked, "sessions revoked after password change");
        Ok(())
    }

    /// Hard delete; dependent sessions and identities go with the account.
    ///
    /// # Errors
    ///
    /// Propagates storage failures only.
    pub async fn delete_account(&self, user_id: &str) -> Result<()> {
        self.users.delete_user(user_id).await
    }

    async fn issue_pair(
        &self,
        user: &User,
        user_agent: &str,
        client_ip: &str,
    ) -> Result<TokenPair> {
        let access_token = self.tokens.issue(&user.id, &user.role, self.access_ttl)?;
        let session = self.sessions.create(&user.id, user_agent, client_ip).await?;
        Ok(TokenPair {
            access_token,
            refresh_token: session.refresh_token,
        })
    }
}
