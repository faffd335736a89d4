//! Core records: users, linked provider identities, refresh-token sessions.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Role attached to a user and carried inside access-token claims.
///
/// Serialized as its lowercase string form so storage and tokens stay
/// readable and new roles need no schema change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Role {
    User,
    Admin,
    Custom(String),
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Custom(role) => role,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => Role::User,
            "admin" => Role::Admin,
            _ => Role::Custom(value),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

/// A local account. `password_hash` is `None` for pure social accounts;
/// such a user is only valid while at least one [`Identity`] points at it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password_hash: Option<String>,
    pub name: String,
    pub role: Role,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Link between a local user and one `(provider, subject)` pair. The pair is
/// globally unique; the only mutation after creation is the last-login touch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub subject: String,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

/// A refresh-token-backed session. The token value is opaque to its holder
/// and replaced in place on every rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub refresh_token: String,
    pub user_agent: String,
    pub client_ip: String,
    pub blocked: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Fresh identifier for any of the records above.
#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_strings() {
        assert_eq!(Role::from("user".to_string()), Role::User);
        assert_eq!(Role::from("admin".to_string()), Role::Admin);
        assert_eq!(
            Role::from("auditor".to_string()),
            Role::Custom("auditor".to_string())
        );
        assert_eq!(String::from(Role::User), "user");
        assert_eq!(String::from(Role::Custom("auditor".to_string())), "auditor");
    }

    #[test]
    fn role_serde_uses_string_form() {
        let json = serde_json::to_string(&Role::Admin).expect("serialize role");
        assert_eq!(json, "\"admin\"");
        let role: Role = serde_json::from_str("\"auditor\"").expect("deserialize role");
        assert_eq!(role, Role::Custom("auditor".to_string()));
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn user_serialization_skips_password_hash() {
        let user = User {
            id: new_id(),
            email: "a@example.com".to_string(),
            password_hash: Some("$argon2id$v=19$m=8,t=1,p=1$c2FsdA$aGFzaA".to_string()),
            name: "Ann".to_string(),
            role: Role::User,
            verified: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).expect("serialize user");
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("argon2id"));
    }
}
