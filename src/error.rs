use thiserror::Error;

/// Error taxonomy of the engine.
///
/// Credential and token failures are reported by kind only; callers never
/// learn whether an email was unknown or a password wrong. Storage and
/// provider transport failures are wrapped as [`Error::Internal`] and are
/// never retried here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("user already exists")]
    UserExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid email")]
    InvalidEmail,
    #[error("invalid refresh token")]
    InvalidToken,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
    #[error("session blocked")]
    SessionBlocked,
    #[error("provider not supported: {0}")]
    ProviderNotSupported(String),
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("hashing failed")]
    Hashing,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
