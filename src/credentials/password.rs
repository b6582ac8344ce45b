//! Adaptive password hashing.
//!
//! Passwords and one-time codes are hashed with Argon2id into PHC strings.
//! The cost is chosen once at startup and carried in [`HashingCost`].

use argon2::{
    password_hash::SaltString, Algorithm, Argon2, Params, PasswordHash, PasswordHasher,
    PasswordVerifier, Version,
};
use rand::rngs::OsRng;

use super::CryptoError;

/// Longest secret accepted for hashing.
pub const MAX_SECRET_BYTES: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashingCost {
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
}

impl Default for HashingCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashingCost {
    #[must_use]
    pub const fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            parallelism,
        }
    }

    #[must_use]
    pub const fn memory_kib(&self) -> u32 {
        self.memory_kib
    }

    #[must_use]
    pub const fn iterations(&self) -> u32 {
        self.iterations
    }

    #[must_use]
    pub const fn parallelism(&self) -> u32 {
        self.parallelism
    }

    fn hasher(&self) -> Result<Argon2<'static>, CryptoError> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|_| CryptoError::Hashing)?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash `secret` into a PHC string.
    ///
    /// # Errors
    /// Returns `InputTooLong` when `secret` exceeds [`MAX_SECRET_BYTES`], or
    /// `Hashing` if the parameters are rejected.
    pub fn hash(&self, secret: &str) -> Result<String, CryptoError> {
        if secret.len() > MAX_SECRET_BYTES {
            return Err(CryptoError::InputTooLong {
                max: MAX_SECRET_BYTES,
            });
        }
        let salt = SaltString::generate(&mut OsRng);
        self.hasher()?
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| CryptoError::Hashing)
    }
}

/// Hash with the default cost.
///
/// # Errors
/// See [`HashingCost::hash`].
pub fn hash_password(secret: &str) -> Result<String, CryptoError> {
    HashingCost::default().hash(secret)
}

/// Check `secret` against a stored PHC hash.
///
/// The parameters embedded in the hash are used, so hashes created under an
/// older cost keep verifying.
///
/// # Errors
/// Returns `MalformedHash` only when `hash` cannot be parsed.
pub fn verify_password(hash: &str, secret: &str) -> Result<bool, CryptoError> {
    let parsed = PasswordHash::new(hash).map_err(|_| CryptoError::MalformedHash)?;
    if secret.len() > MAX_SECRET_BYTES {
        return Ok(false);
    }
    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok())
}
