//! Credential primitives.
//!
//! Leaf module: hashing, one-time codes, authenticated encryption, RS256
//! claims, HMAC URL signatures and TOTP. All functions are synchronous and
//! touch no shared mutable state.

mod aead;
mod claims;
mod code;
mod error;
mod password;
mod totp;
mod url_signature;

pub use aead::{decrypt, decrypt_string, encrypt, SymmetricKey, KEY_LEN};
pub use claims::{sign_claims, verify_claims, ClaimSigner, ClaimValidation, ClaimVerifier};
pub use code::{generate_one_time_code, DEFAULT_CODE_LENGTH};
pub use error::{CryptoError, TokenInvalid};
pub use password::{hash_password, verify_password, HashingCost, MAX_SECRET_BYTES};
pub use totp::{generate_totp, validate_totp};
pub use url_signature::{sign_url, verify_url_signature, UrlSigningKey};

#[cfg(test)]
pub(crate) use claims::tests::{SIGNING_PEM as TEST_SIGNING_PEM, VERIFY_PEM as TEST_VERIFY_PEM};
