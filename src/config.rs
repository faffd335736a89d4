//! Engine configuration, fixed at construction time.

use crate::identity::LinkPolicy;
use crate::password::HashCost;

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_CLOCK_LEEWAY_SECONDS: i64 = 0;

/// Configuration for [`AuthService`](crate::service::AuthService). Immutable
/// once the service is built; per-request code never consults anything else.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    issuer: String,
    audience: String,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    clock_leeway_seconds: i64,
    hash_cost: HashCost,
    link_policy: LinkPolicy,
}

impl AuthConfig {
    #[must_use]
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            clock_leeway_seconds: DEFAULT_CLOCK_LEEWAY_SECONDS,
            hash_cost: HashCost::default(),
            link_policy: LinkPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_clock_leeway_seconds(mut self, seconds: i64) -> Self {
        self.clock_leeway_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_hash_cost(mut self, cost: HashCost) -> Self {
        self.hash_cost = cost;
        self
    }

    #[must_use]
    pub fn with_link_policy(mut self, policy: LinkPolicy) -> Self {
        self.link_policy = policy;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    #[must_use]
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }

    #[must_use]
    pub fn clock_leeway_seconds(&self) -> i64 {
        self.clock_leeway_seconds
    }

    #[must_use]
    pub fn hash_cost(&self) -> HashCost {
        self.hash_cost
    }

    #[must_use]
    pub fn link_policy(&self) -> LinkPolicy {
        self.link_policy
    }
}
