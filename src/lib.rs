//! Identity and session lifecycle engine.
//!
//! `identeco` issues, validates and rotates the credentials of a
//! multi-tenant web service: password and third-party (OAuth2) login,
//! short-lived HS256 access tokens, opaque rotating refresh tokens, and
//! cross-provider identity linking.
//!
//! The engine performs no transport and holds no connections. Callers hand
//! it storage capabilities ([`storage::UserStorage`],
//! [`storage::SessionStorage`], [`storage::IdentityStorage`]), one
//! [`provider::Provider`] per third-party identity source, and a
//! [`token::SecretResolver`]; everything after that is policy:
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use identeco::{AuthConfig, AuthService, Memory, StaticSecret};
//!
//! # async fn run() -> identeco::Result<()> {
//! let storage = Arc::new(Memory::new());
//! let secrets = Arc::new(StaticSecret::new("a-long-random-secret")?);
//! let auth = AuthService::new(
//!     storage.clone(),
//!     storage.clone(),
//!     storage,
//!     HashMap::new(),
//!     secrets,
//!     AuthConfig::new("https://auth.example.com", "example"),
//! )?;
//!
//! auth.register("ann@example.com", "pw123", "Ann").await?;
//! let pair = auth.login("ann@example.com", "pw123", "cli", "127.0.0.1").await?;
//! let claims = auth.parse_token(&pair.access_token)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod identity;
pub mod password;
pub mod provider;
pub mod service;
pub mod session;
pub mod storage;
pub mod token;

pub use config::AuthConfig;
pub use domain::{Identity, Role, Session, User};
pub use error::{Error, Result};
pub use identity::{IdentityResolver, LinkPolicy};
pub use password::{HashCost, Hasher};
pub use provider::{GitHub, Google, Provider, ProviderInfo};
pub use service::{AuthService, TokenPair};
pub use session::SessionLedger;
pub use storage::{IdentityStorage, Memory, Postgres, SessionStorage, UserStorage};
pub use token::{Claims, SecretResolver, StaticSecret, TokenEngine};
