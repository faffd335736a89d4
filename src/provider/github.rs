//! GitHub OAuth2 provider. GitHub may omit the email on `/user` when the
//! profile email is private, so this provider falls back to `/user/emails`
//! and picks the primary verified address.

use anyhow::Context;
use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{Provider, ProviderInfo, APP_USER_AGENT};
use crate::error::{Error, Result};

const AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    #[serde(default)]
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

pub struct GitHub {
    client_id: ClientId,
    client_secret: ClientSecret,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    redirect_url: RedirectUrl,
    http: Client,
}

impl GitHub {
    /// # Errors
    ///
    /// Returns an error when the redirect URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Result<Self> {
        // GitHub's API rejects requests without a User-Agent.
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client_id: ClientId::new(client_id.into()),
            client_secret: ClientSecret::new(client_secret.into()),
            auth_url: AuthUrl::new(AUTH_URL.to_string()).context("invalid github auth url")?,
            token_url: TokenUrl::new(TOKEN_URL.to_string()).context("invalid github token url")?,
            redirect_url: RedirectUrl::new(redirect_url.into())
                .context("invalid github redirect url")?,
            http,
        })
    }

    fn oauth_client(&self) -> ConfiguredClient {
        BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_auth_uri(self.auth_url.clone())
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(self.redirect_url.clone())
    }

    async fn primary_verified_email(&self, access_token: &str) -> Result<Option<String>> {
        let emails: Vec<GitHubEmail> = self
            .http
            .get(EMAILS_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .context("github emails request failed")?
            .error_for_status()
            .context("github emails request rejected")?
            .json()
            .await
            .context("failed to decode github emails")?;

        Ok(emails
            .into_iter()
            .find(|email| email.primary && email.verified)
            .map(|email| email.email))
    }
}

#[async_trait]
impl Provider for GitHub {
    fn name(&self) -> &str {
        "github"
    }

    fn auth_url(&self, state: &str) -> Url {
        let state = CsrfToken::new(state.to_string());
        let (url, _state) = self
            .oauth_client()
            .authorize_url(move || state)
            .add_scope(Scope::new("read:user".to_string()))
            .add_scope(Scope::new("user:email".to_string()))
            .url();
        url
    }

    async fn fetch_user(&self, code: &str) -> Result<ProviderInfo> {
        let token = self
            .oauth_client()
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .context("github code exchange failed")?;
        let access_token = token.access_token().secret();

        let user: GitHubUser = self
            .http
            .get(USER_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .context("github user request failed")?
            .error_for_status()
            .context("github user request rejected")?
            .json()
            .await
            .context("failed to decode github user")?;

        // A public profile email is always a verified one; only the private
        // case needs the emails endpoint.
        let email = match user.email {
            Some(email) => email,
            None => self
                .primary_verified_email(access_token)
                .await?
                .ok_or_else(|| {
                    Error::Internal(anyhow::anyhow!(
                        "github account has no verified primary email"
                    ))
                })?,
        };

        Ok(ProviderInfo {
            subject: user.id.to_string(),
            email,
            email_verified: true,
            name: user.name.unwrap_or(user.login),
            avatar_url: user.avatar_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider() -> GitHub {
        GitHub::new("client-id", "client-secret", "https://app.example.test/callback")
            .expect("valid provider config")
    }

    #[test]
    fn name_is_stable() {
        assert_eq!(test_provider().name(), "github");
    }

    #[test]
    fn auth_url_carries_state_and_scopes() {
        let url = test_provider().auth_url("state-456");
        assert!(url.as_str().starts_with(AUTH_URL));
        assert!(url.as_str().contains("state=state-456"));
        assert!(url.as_str().contains("read%3Auser"));
        assert!(url.as_str().contains("user%3Aemail"));
    }

    #[test]
    fn emails_decode_and_filter() {
        let emails: Vec<GitHubEmail> = serde_json::from_str(
            r#"[
                {"email":"old@example.com","primary":false,"verified":true},
                {"email":"ann@example.com","primary":true,"verified":true},
                {"email":"spam@example.com","primary":false,"verified":false}
            ]"#,
        )
        .expect("decode emails");
        let primary = emails
            .into_iter()
            .find(|email| email.primary && email.verified)
            .map(|email| email.email);
        assert_eq!(primary.as_deref(), Some("ann@example.com"));
    }

    #[test]
    fn numeric_subject_becomes_text() {
        let user: GitHubUser = serde_json::from_str(
            r#"{"id":583231,"login":"ann","name":null,"email":null,"avatar_url":null}"#,
        )
        .expect("decode user");
        assert_eq!(user.id.to_string(), "583231");
        assert_eq!(user.login, "ann");
        assert!(user.name.is_none());
    }
}
