//! Access-token issuance and validation: HS256-signed JWTs.
//!
//! Refresh tokens are deliberately NOT issued here: they are opaque random
//! values held by the session ledger so they can be revoked; see
//! [`crate::session`].

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::domain::Role;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Claims carried by an access token. Never persisted; validity is proven by
/// signature and expiry alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Pluggable signing-secret lookup keyed by user id, enabling per-tenant or
/// rotating secrets. Resolution failures surface as they are; the engine
/// never falls back to a default secret.
pub trait SecretResolver: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when no secret can be resolved for `user_id`.
    fn secret(&self, user_id: &str) -> Result<SecretString>;
}

/// Single shared secret for every user. The constructor rejects an empty
/// secret: an unset secret is a configuration error, not something to paper
/// over with a built-in constant.
pub struct StaticSecret {
    secret: SecretString,
}

impl StaticSecret {
    /// # Errors
    ///
    /// Returns an error if `secret` is empty.
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(Error::Internal(anyhow::anyhow!(
                "signing secret must not be empty"
            )));
        }
        Ok(Self {
            secret: SecretString::from(secret),
        })
    }
}

impl SecretResolver for StaticSecret {
    fn secret(&self, _user_id: &str) -> Result<SecretString> {
        Ok(SecretString::from(self.secret.expose_secret().to_string()))
    }
}

/// Signs and parses access tokens.
pub struct TokenEngine {
    secrets: Arc<dyn SecretResolver>,
    issuer: String,
    audience: String,
    leeway_seconds: i64,
}

impl TokenEngine {
    #[must_use]
    pub fn new(
        secrets: Arc<dyn SecretResolver>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            secrets,
            issuer: issuer.into(),
            audience: audience.into(),
            leeway_seconds: 0,
        }
    }

    /// Clock-skew tolerance applied to expiry checks.
    #[must_use]
    pub fn with_leeway_seconds(mut self, seconds: i64) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    /// Create a signed access token for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the secret cannot be resolved or the claims
    /// cannot be encoded.
    pub fn issue(&self, user_id: &str, role: &Role, ttl: Duration) -> Result<String> {
        self.issue_at(user_id, role, ttl, Utc::now().timestamp())
    }

    pub(crate) fn issue_at(
        &self,
        user_id: &str,
        role: &Role,
        ttl: Duration,
        now_unix_seconds: i64,
    ) -> Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.clone(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now_unix_seconds,
            exp: now_unix_seconds + ttl.num_seconds(),
        };

        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let secret = self.secrets.secret(user_id)?;
        let mut mac = mac_for(&secret)?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Verify a token and return its decoded claims.
    ///
    /// # Errors
    ///
    /// - [`Error::Malformed`]: not three dot-separated parts, invalid
    ///   base64/JSON, or claims that do not belong to this engine's
    ///   issuer/audience,
    /// - [`Error::InvalidSignature`]: wrong algorithm or MAC mismatch,
    /// - [`Error::Expired`]: `exp` (plus leeway) has passed.
    pub fn parse(&self, token: &str) -> Result<Claims> {
        self.parse_at(token, Utc::now().timestamp())
    }

    pub(crate) fn parse_at(&self, token: &str, now_unix_seconds: i64) -> Result<Claims> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(Error::Malformed)?;
        let claims_b64 = parts.next().ok_or(Error::Malformed)?;
        let sig_b64 = parts.next().ok_or(Error::Malformed)?;
        if parts.next().is_some() {
            return Err(Error::Malformed);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != "HS256" {
            return Err(Error::InvalidSignature);
        }

        // Claims are decoded before the signature check: the subject selects
        // which secret signs for this user. The claims stay untrusted until
        // the MAC verifies below.
        let claims: Claims = b64d_json(claims_b64)?;
        let secret = self.secrets.secret(&claims.sub)?;

        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Malformed)?;
        let mut mac = mac_for(&secret)?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| Error::InvalidSignature)?;

        if claims.iss != self.issuer || claims.aud != self.audience {
            return Err(Error::Malformed);
        }
        if claims.exp + self.leeway_seconds <= now_unix_seconds {
            return Err(Error::Expired);
        }

        Ok(claims)
    }
}

fn mac_for(secret: &SecretString) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|err| Error::Internal(anyhow::Error::new(err).context("invalid hmac key")))
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)
        .map_err(|err| Error::Internal(anyhow::Error::new(err).context("failed to encode token")))?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| Error::Malformed)
}
