//! Password hashing and verification, Argon2id with configurable cost.

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::{Error, Result};

/// Fixed input for the precomputed decoy hash; see [`Hasher::verify_dummy`].
const DUMMY_PASSWORD: &str = "identeco-decoy-password";

/// Cost parameters for the adaptive hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// Hashes and verifies passwords. Construction validates the cost parameters
/// once so per-request calls cannot hit a configuration error.
pub struct Hasher {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl Hasher {
    /// # Errors
    ///
    /// Returns [`Error::Hashing`] if the cost parameters are rejected by the
    /// primitive.
    pub fn new(cost: HashCost) -> Result<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|_| Error::Hashing)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy_hash = hash_with(&argon2, DUMMY_PASSWORD)?;
        Ok(Self { argon2, dummy_hash })
    }

    /// Hash a plaintext password into a PHC-format string with a fresh salt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hashing`] on primitive-level failure.
    pub fn hash(&self, plaintext: &str) -> Result<String> {
        hash_with(&self.argon2, plaintext)
    }

    /// Verify a plaintext against a stored PHC-format hash.
    ///
    /// A wrong password is `Ok(false)`, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hashing`] only when the stored hash is malformed or
    /// the primitive itself fails.
    pub fn verify(&self, hash: &str, plaintext: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|_| Error::Hashing)?;
        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(_) => Err(Error::Hashing),
        }
    }

    /// Run a full verification against the precomputed decoy hash and discard
    /// the result. Callers on the unknown-email and passwordless paths burn
    /// the same work as a real mismatch, keeping response times uniform.
    pub fn verify_dummy(&self, plaintext: &str) {
        let _ = self.verify(&self.dummy_hash, plaintext);
    }
}

fn hash_with(argon2: &Argon2<'_>, plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| Error::Hashing)
}
