//! Reconciles a provider-asserted identity with a local user account.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{self, Identity, Role, User};
use crate::error::{Error, Result};
use crate::provider::ProviderInfo;
use crate::storage::{IdentityStorage, UserStorage};

/// Policy for attaching a provider identity to an existing local account
/// whose email matches the provider-asserted one. Linking by email is a
/// trust decision with account-takeover implications, so it is explicit
/// configuration rather than hardwired behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkPolicy {
    /// Link whenever the emails match, trusting the provider's assertion.
    AlwaysLink,
    /// Link only when the provider marks the email as verified.
    #[default]
    RequireVerifiedEmail,
}

/// Resolves `(provider, subject)` pairs to local users, linking providers to
/// one account and creating accounts for unseen identities. Never deletes or
/// merges users.
pub struct IdentityResolver {
    users: Arc<dyn UserStorage>,
    identities: Arc<dyn IdentityStorage>,
    link_policy: LinkPolicy,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStorage>,
        identities: Arc<dyn IdentityStorage>,
        link_policy: LinkPolicy,
    ) -> Self {
        Self {
            users,
            identities,
            link_policy,
        }
    }

    /// Resolve a provider identity to a local user. Precedence, first match
    /// wins: exact `(provider, subject)` identity, then email match on an
    /// existing user (governed by the link policy), then a fresh account.
    /// Every path refreshes the identity's last login.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCredentials`] when the link policy refuses an
    /// unverified email; storage failures pass through.
    pub async fn resolve(&self, provider: &str, info: &ProviderInfo) -> Result<User> {
        self.resolve_at(provider, info, Utc::now()).await
    }

    pub(crate) async fn resolve_at(
        &self,
        provider: &str,
        info: &ProviderInfo,
        now: DateTime<Utc>,
    ) -> Result<User> {
        if let Some(identity) = self
            .identities
            .get_identity_by_provider(provider, &info.subject)
            .await?
        {
            let user = self
                .users
                .get_user_by_id(&identity.user_id)
                .await?
                .ok_or_else(|| {
                    Error::Internal(anyhow::anyhow!(
                        "identity {} points at a missing user",
                        identity.id
                    ))
                })?;
            self.identities
                .touch_identity_last_login(&identity.id, now)
                .await?;
            return Ok(user);
        }

        let email = domain::normalize_email(&info.email);
        let user = match self.users.get_user_by_email(&email).await? {
            Some(user) => {
                if self.link_policy == LinkPolicy::RequireVerifiedEmail && !info.email_verified {
                    // Refuse quietly: confirming that the address has a local
                    // account would hand the unverified claimant an oracle.
                    return Err(Error::InvalidCredentials);
                }
                debug!(user_id = %user.id, provider, "linking provider identity to existing user");
                user
            }
            None => {
                let user = User {
                    id: domain::new_id(),
                    email,
                    password_hash: None,
                    name: info.name.clone(),
                    role: Role::User,
                    verified: true,
                    created_at: now,
                    updated_at: now,
                };
                match self.users.create_user(&user).await {
                    Ok(()) => {
                        debug!(user_id = %user.id, provider, "created user for provider identity");
                        user
                    }
                    // The email was taken between lookup and insert; link to
                    // the account that won.
                    Err(Error::AlreadyExists) => self
                        .users
                        .get_user_by_email(&user.email)
                        .await?
                        .ok_or(Error::NotFound)?,
                    Err(err) => return Err(err),
                }
            }
        };

        let identity = Identity {
            id: domain::new_id(),
            user_id: user.id.clone(),
            provider: provider.to_string(),
            subject: info.subject.clone(),
            created_at: now,
            last_login: now,
        };
        match self.identities.create_identity(&identity).await {
            Ok(()) => Ok(user),
            // A concurrent login created the same (provider, subject) first;
            // resolve to whatever it linked.
            Err(Error::AlreadyExists) => {
                let identity = self
                    .identities
                    .get_identity_by_provider(provider, &info.subject)
                    .await?
                    .ok_or(Error::NotFound)?;
                self.identities
                    .touch_identity_last_login(&identity.id, now)
                    .await?;
                self.users
                    .get_user_by_id(&identity.user_id)
                    .await?
                    .ok_or(Error::NotFound)
            }
            Err(err) => Err(err),
        }
    }
}
