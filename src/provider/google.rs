//! Google OAuth2 provider: authorization-code flow against the v2 userinfo
//! endpoint.

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
use crate::error::Result;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Userinfo response fields this provider consumes.
#[derive(Debug, Deserialize)]
struct GoogleUser {
    id: String,
    email: String,
    #[serde(default)]
    verified_email: bool,
    #[serde(default)]
    name: String,
    picture: Option<String>,
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

pub struct Google {
    client_id: ClientId,
    client_secret: ClientSecret,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    redirect_url: RedirectUrl,
    http: Client,
}

impl Google {
    /// # Errors
    ///
    /// Returns an error when the redirect URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client_id: ClientId::new(client_id.into()),
            client_secret: ClientSecret::new(client_secret.into()),
            auth_url: AuthUrl::new(AUTH_URL.to_string()).context("invalid google auth url")?,
            token_url: TokenUrl::new(TOKEN_URL.to_string()).context("invalid google token url")?,
            redirect_url: RedirectUrl::new(redirect_url.into())
                .context("invalid google redirect url")?,
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
}

#[async_trait]
impl Provider for Google {
    fn name(&self) -> &str {
        "google"
    }

    fn auth_url(&self, state: &str) -> Url {
        let state = CsrfToken::new(state.to_string());
        let (url, _state) = self
            .oauth_client()
            .authorize_url(move || state)
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .url();
        url
    }

    async fn fetch_user(&self, code: &str) -> Result<ProviderInfo> {
        let token = self
            .oauth_client()
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .context("google code exchange failed")?;

        let user: GoogleUser = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(token.access_token().secret())
            .send()
            .await
            .context("google userinfo request failed")?
            .error_for_status()
            .context("google userinfo request rejected")?
            .json()
            .await
            .context("failed to decode google userinfo")?;

        Ok(ProviderInfo {
            subject: user.id,
            email: user.email,
            email_verified: user.verified_email,
            name: user.name,
            avatar_url: user.picture,
        })
    }
}
