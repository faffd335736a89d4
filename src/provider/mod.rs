//! Third-party OAuth2 identity sources.
//!
//! Providers own all network transport (code exchange, userinfo calls); the
//! engine only consumes the [`ProviderInfo`] they report. One instance per
//! provider name is injected into the orchestrator at construction.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::error::Result;

mod github;
mod google;

pub use github::GitHub;
pub use google::Google;

pub(crate) static APP_USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Identity attributes asserted by a provider after a successful code
/// exchange. `email_verified` feeds the account-linking policy; a provider
/// that cannot vouch for the address must report `false`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderInfo {
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub name: String,
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Authorization URL to redirect the end user to. `state` is supplied
    /// and later validated by the caller; nothing is stored here.
    fn auth_url(&self, state: &str) -> Url;

    /// Exchange an authorization code and fetch the user's identity.
    ///
    /// # Errors
    ///
    /// Transport and decoding failures, wrapped as
    /// [`Error::Internal`](crate::Error::Internal).
    async fn fetch_user(&self, code: &str) -> Result<ProviderInfo>;
}
