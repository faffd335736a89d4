//! End-to-end lifecycle flows over the in-memory storage and a scripted
//! provider: register/login, refresh rotation, identity linking, logout and
//! password-change semantics.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use identeco::{
    AuthConfig, AuthService, Error, HashCost, Memory, Provider, ProviderInfo, StaticSecret,
};
use url::Url;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

/// Provider double that skips transport and returns a fixed identity.
struct FakeProvider {
    name: &'static str,
    info: ProviderInfo,
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn auth_url(&self, state: &str) -> Url {
        format!("https://{}.example.test/authorize?state={state}", self.name)
            .parse()
            .expect("valid authorize url")
    }

    async fn fetch_user(&self, _code: &str) -> identeco::Result<ProviderInfo> {
        Ok(self.info.clone())
    }
}

fn provider_info(subject: &str, email: &str, verified: bool) -> ProviderInfo {
    ProviderInfo {
        subject: subject.to_string(),
        email: email.to_string(),
        email_verified: verified,
        name: "Ann".to_string(),
        avatar_url: None,
    }
}

fn fake_provider(name: &'static str, info: ProviderInfo) -> (String, Arc<dyn Provider>) {
    (name.to_string(), Arc::new(FakeProvider { name, info }))
}

fn test_config() -> AuthConfig {
    // Minimal hash cost keeps the suite fast.
    AuthConfig::new("https://auth.example.test", "example").with_hash_cost(HashCost {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    })
}

fn service_with(
    providers: HashMap<String, Arc<dyn Provider>>,
    config: AuthConfig,
) -> Result<AuthService> {
    let storage = Arc::new(Memory::new());
    let secrets = Arc::new(StaticSecret::new(SECRET)?);
    let service = AuthService::new(
        storage.clone(),
        storage.clone(),
        storage,
        providers,
        secrets,
        config,
    )?;
    Ok(service)
}

fn service() -> Result<AuthService> {
    service_with(HashMap::new(), test_config())
}

#[tokio::test]
async fn register_then_login_yields_a_parseable_token() -> Result<()> {
    let auth = service()?;
    auth.register("a@x.com", "pw123", "Ann").await?;

    let pair = auth.login("a@x.com", "pw123", "test-agent", "127.0.0.1").await?;
    let claims = auth.parse_token(&pair.access_token)?;

    let user = auth.get_profile(&claims.sub).await?;
    assert_eq!(user.email, "a@x.com");
    assert_eq!(user.name, "Ann");
    assert_eq!(claims.role, identeco::Role::User);
    Ok(())
}

#[tokio::test]
async fn duplicate_registration_is_refused() -> Result<()> {
    let auth = service()?;
    auth.register("a@x.com", "pw123", "Ann").await?;
    let result = auth.register("A@X.com", "other", "Impostor").await;
    assert!(matches!(result, Err(Error::UserExists)));
    Ok(())
}

#[tokio::test]
async fn unusable_email_is_refused() -> Result<()> {
    let auth = service()?;
    let result = auth.register("not-an-email", "pw123", "Ann").await;
    assert!(matches!(result, Err(Error::InvalidEmail)));
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_email_fail_alike() -> Result<()> {
    let auth = service()?;
    auth.register("a@x.com", "pw123", "Ann").await?;

    let wrong_password = auth.login("a@x.com", "pw124", "agent", "::1").await;
    let unknown_email = auth.login("b@x.com", "pw123", "agent", "::1").await;
    assert!(matches!(wrong_password, Err(Error::InvalidCredentials)));
    assert!(matches!(unknown_email, Err(Error::InvalidCredentials)));
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_and_consumes_the_old_value() -> Result<()> {
    let auth = service()?;
    auth.register("a@x.com", "pw123", "Ann").await?;
    let pair = auth.login("a@x.com", "pw123", "agent", "::1").await?;

    let rotated = auth.refresh(&pair.refresh_token).await?;
    assert_ne!(rotated.refresh_token, pair.refresh_token);

    // The consumed value must never work again.
    let replay = auth.refresh(&pair.refresh_token).await;
    assert!(matches!(replay, Err(Error::InvalidToken)));

    // The rotated value keeps the session alive.
    assert!(auth.refresh(&rotated.refresh_token).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn concurrent_refreshes_have_exactly_one_winner() -> Result<()> {
    let auth = service()?;
    auth.register("a@x.com", "pw123", "Ann").await?;
    let pair = auth.login("a@x.com", "pw123", "agent", "::1").await?;

    let (first, second) = tokio::join!(
        auth.refresh(&pair.refresh_token),
        auth.refresh(&pair.refresh_token)
    );
    let successes = [&first, &second]
        .iter()
        .filter(|result| result.is_ok())
        .count();
    assert_eq!(successes, 1);

    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(loser, Err(Error::InvalidToken)));
    Ok(())
}

#[tokio::test]
async fn expired_refresh_token_is_invalid() -> Result<()> {
    let auth = service_with(
        HashMap::new(),
        test_config().with_refresh_token_ttl_seconds(-1),
    )?;
    auth.register("a@x.com", "pw123", "Ann").await?;
    let pair = auth.login("a@x.com", "pw123", "agent", "::1").await?;

    let result = auth.refresh(&pair.refresh_token).await;
    assert!(matches!(result, Err(Error::InvalidToken)));
    Ok(())
}

#[tokio::test]
async fn blocked_session_refuses_refresh() -> Result<()> {
    let auth = service()?;
    auth.register("a@x.com", "pw123", "Ann").await?;
    let pair = auth.login("a@x.com", "pw123", "agent", "::1").await?;

    let session = auth.sessions().lookup(&pair.refresh_token).await?;
    auth.sessions().block(&session.id).await?;

    let result = auth.refresh(&pair.refresh_token).await;
    assert!(matches!(result, Err(Error::SessionBlocked)));

    auth.sessions().unblock(&session.id).await?;
    assert!(auth.refresh(&pair.refresh_token).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn logout_is_idempotent() -> Result<()> {
    let auth = service()?;
    auth.register("a@x.com", "pw123", "Ann").await?;
    let pair = auth.login("a@x.com", "pw123", "agent", "::1").await?;

    auth.logout(&pair.refresh_token).await?;
    auth.logout(&pair.refresh_token).await?;

    let result = auth.refresh(&pair.refresh_token).await;
    assert!(matches!(result, Err(Error::InvalidToken)));
    Ok(())
}

#[tokio::test]
async fn social_login_links_to_the_existing_account_by_email() -> Result<()> {
    let providers: HashMap<_, _> = [fake_provider(
        "google",
        provider_info("sub-1", "a@x.com", true),
    )]
    .into_iter()
    .collect();
    let auth = service_with(providers, test_config())?;

    auth.register("a@x.com", "pw123", "Ann").await?;
    let password_pair = auth.login("a@x.com", "pw123", "agent", "::1").await?;
    let password_claims = auth.parse_token(&password_pair.access_token)?;

    let social_pair = auth.social_login("google", "code", "agent", "::1").await?;
    let social_claims = auth.parse_token(&social_pair.access_token)?;

    // Linked, not duplicated.
    assert_eq!(social_claims.sub, password_claims.sub);

    // A repeat social login resolves to the same account.
    let repeat = auth.social_login("google", "code", "agent", "::1").await?;
    let repeat_claims = auth.parse_token(&repeat.access_token)?;
    assert_eq!(repeat_claims.sub, password_claims.sub);
    Ok(())
}

#[tokio::test]
async fn social_login_creates_an_account_for_unseen_identities() -> Result<()> {
    let providers: HashMap<_, _> = [fake_provider(
        "google",
        provider_info("sub-9", "new@x.com", true),
    )]
    .into_iter()
    .collect();
    let auth = service_with(providers, test_config())?;

    let pair = auth.social_login("google", "code", "agent", "::1").await?;
    let claims = auth.parse_token(&pair.access_token)?;

    let user = auth.get_profile(&claims.sub).await?;
    assert_eq!(user.email, "new@x.com");
    assert!(user.verified);
    assert!(user.password_hash.is_none());

    // A social-only account cannot log in with a password.
    let result = auth.login("new@x.com", "anything", "agent", "::1").await;
    assert!(matches!(result, Err(Error::InvalidCredentials)));
    Ok(())
}

#[tokio::test]
async fn social_login_refuses_unverified_email_linking() -> Result<()> {
    let providers: HashMap<_, _> = [fake_provider(
        "google",
        provider_info("sub-1", "a@x.com", false),
    )]
    .into_iter()
    .collect();
    let auth = service_with(providers, test_config())?;

    auth.register("a@x.com", "pw123", "Ann").await?;
    let result = auth.social_login("google", "code", "agent", "::1").await;
    assert!(matches!(result, Err(Error::InvalidCredentials)));
    Ok(())
}

#[tokio::test]
async fn unknown_provider_is_reported_as_unsupported() -> Result<()> {
    let auth = service()?;
    let login = auth.social_login("myspace", "code", "agent", "::1").await;
    assert!(matches!(login, Err(Error::ProviderNotSupported(_))));

    let url = auth.auth_url("myspace", "state");
    assert!(matches!(url, Err(Error::ProviderNotSupported(_))));
    Ok(())
}

#[tokio::test]
async fn auth_url_delegates_to_the_provider() -> Result<()> {
    let providers: HashMap<_, _> = [fake_provider(
        "google",
        provider_info("sub-1", "a@x.com", true),
    )]
    .into_iter()
    .collect();
    let auth = service_with(providers, test_config())?;

    let url = auth.auth_url("google", "state-123")?;
    assert!(url.as_str().contains("state=state-123"));
    Ok(())
}

#[tokio::test]
async fn change_password_revokes_every_session() -> Result<()> {
    let auth = service()?;
    auth.register("a@x.com", "pw123", "Ann").await?;
    let first = auth.login("a@x.com", "pw123", "laptop", "::1").await?;
    let second = auth.login("a@x.com", "pw123", "phone", "::2").await?;

    let claims = auth.parse_token(&first.access_token)?;
    auth.change_password(&claims.sub, "pw123", "pw456").await?;

    // Both outstanding refresh tokens are dead.
    assert!(matches!(
        auth.refresh(&first.refresh_token).await,
        Err(Error::InvalidToken)
    ));
    assert!(matches!(
        auth.refresh(&second.refresh_token).await,
        Err(Error::InvalidToken)
    ));

    // Only the new password works from here on.
    assert!(matches!(
        auth.login("a@x.com", "pw123", "laptop", "::1").await,
        Err(Error::InvalidCredentials)
    ));
    assert!(auth.login("a@x.com", "pw456", "laptop", "::1").await.is_ok());
    Ok(())
}

#[tokio::test]
async fn change_password_requires_the_old_one() -> Result<()> {
    let auth = service()?;
    auth.register("a@x.com", "pw123", "Ann").await?;
    let pair = auth.login("a@x.com", "pw123", "agent", "::1").await?;
    let claims = auth.parse_token(&pair.access_token)?;

    let result = auth.change_password(&claims.sub, "wrong", "pw456").await;
    assert!(matches!(result, Err(Error::InvalidCredentials)));
    Ok(())
}

#[tokio::test]
async fn update_profile_changes_the_name() -> Result<()> {
    let auth = service()?;
    auth.register("a@x.com", "pw123", "Ann").await?;
    let pair = auth.login("a@x.com", "pw123", "agent", "::1").await?;
    let claims = auth.parse_token(&pair.access_token)?;

    auth.update_profile(&claims.sub, "Ann Example").await?;
    assert_eq!(auth.get_profile(&claims.sub).await?.name, "Ann Example");
    Ok(())
}

#[tokio::test]
async fn delete_account_invalidates_its_sessions() -> Result<()> {
    let auth = service()?;
    auth.register("a@x.com", "pw123", "Ann").await?;
    let pair = auth.login("a@x.com", "pw123", "agent", "::1").await?;
    let claims = auth.parse_token(&pair.access_token)?;

    auth.delete_account(&claims.sub).await?;
    assert!(matches!(
        auth.get_profile(&claims.sub).await,
        Err(Error::NotFound)
    ));
    assert!(matches!(
        auth.refresh(&pair.refresh_token).await,
        Err(Error::InvalidToken)
    ));
    Ok(())
}

#[tokio::test]
async fn register_login_refresh_scenario() -> Result<()> {
    let auth = service()?;
    auth.register("a@x.com", "pw123", "Ann").await?;

    let pair = auth.login("a@x.com", "pw123", "agent", "::1").await?;
    let rotated = auth.refresh(&pair.refresh_token).await?;
    assert_ne!(rotated.refresh_token, pair.refresh_token);

    let replay = auth.refresh(&pair.refresh_token).await;
    assert!(matches!(replay, Err(Error::InvalidToken)));
    Ok(())
}
