//! Sealed completion blob for a verified recovery.
//!
//! Payload is form-urlencoded (`id`, `email`, `password`, `ref`, `exp`) and
//! sealed with AES-256-GCM. `password` is already a hash of the new password;
//! `ref` fingerprints the password hash at issuance so the blob stops working
//! once any rotation has happened.

use sha2::{Digest, Sha256};
use url::form_urlencoded;

use crate::challenge::ChallengeError;
use crate::credentials::{decrypt_string, encrypt, CryptoError, SymmetricKey, TokenInvalid};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionPayload {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub password_ref: String,
    pub expires_at: i64,
}

/// Hex SHA-256 of a stored password hash.
#[must_use]
pub fn password_ref(password_hash: &str) -> String {
    hex::encode(Sha256::digest(password_hash.as_bytes()))
}

/// # Errors
/// Returns the underlying `CryptoError` if encryption fails.
pub fn issue(payload: &CompletionPayload, key: &SymmetricKey) -> Result<String, CryptoError> {
    let encoded = form_urlencoded::Serializer::new(String::new())
        .append_pair("id", &payload.id)
        .append_pair("email", &payload.email)
        .append_pair("password", &payload.password_hash)
        .append_pair("ref", &payload.password_ref)
        .append_pair("exp", &payload.expires_at.to_string())
        .finish();
    encrypt(encoded.as_bytes(), key)
}

/// Open the blob and check its lifetime. Checking the embedded email and
/// `ref` against the current identity is left to the caller.
///
/// # Errors
/// `Invalid(BadSignature)` on a failed tag check, `Invalid(Malformed)` on a
/// damaged or incomplete payload, `Invalid(Expired)` past `exp`.
pub fn verify(blob: &str, key: &SymmetricKey, now: i64) -> Result<CompletionPayload, ChallengeError> {
    let plaintext = decrypt_string(blob, key).map_err(|err| match err {
        CryptoError::Decrypt => TokenInvalid::BadSignature,
        _ => TokenInvalid::Malformed,
    })?;

    let mut id = None;
    let mut email = None;
    let mut password_hash = None;
    let mut password_ref = None;
    let mut expires_at = None;
    for (name, value) in form_urlencoded::parse(plaintext.as_bytes()) {
        let value = value.into_owned();
        match name.as_ref() {
            "id" => id = Some(value),
            "email" => email = Some(value),
            "password" => password_hash = Some(value),
            "ref" => password_ref = Some(value),
            "exp" => expires_at = value.parse::<i64>().ok(),
            _ => {}
        }
    }

    let payload = match (id, email, password_hash, password_ref, expires_at) {
        (Some(id), Some(email), Some(password_hash), Some(password_ref), Some(expires_at))
            if !id.is_empty() && !password_hash.is_empty() =>
        {
            CompletionPayload {
                id,
                email,
                password_hash,
                password_ref,
                expires_at,
            }
        }
        _ => return Err(TokenInvalid::Malformed.into()),
    };

    if payload.expires_at <= now {
        return Err(TokenInvalid::Expired.into());
    }
    Ok(payload)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn key() -> SymmetricKey {
        SymmetricKey::from_bytes(&[5u8; 32]).unwrap()
    }

    fn payload() -> CompletionPayload {
        CompletionPayload {
            id: "u1".to_string(),
            email: "ada+test@example.com".to_string(),
            password_hash: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdA$aGFzaA".to_string(),
            password_ref: password_ref("old-hash"),
            expires_at: 500,
        }
    }

    #[test]
    fn issue_then_verify() {
        let blob = issue(&payload(), &key()).unwrap();
        assert_eq!(verify(&blob, &key(), 100).unwrap(), payload());
    }

    #[test]
    fn expired_blob_is_rejected() {
        let blob = issue(&payload(), &key()).unwrap();
        assert!(matches!(
            verify(&blob, &key(), 500),
            Err(ChallengeError::Invalid(TokenInvalid::Expired))
        ));
    }

    #[test]
    fn wrong_key_fails_closed() {
        let blob = issue(&payload(), &key()).unwrap();
        let other = SymmetricKey::from_bytes(&[6u8; 32]).unwrap();
        assert!(matches!(
            verify(&blob, &other, 100),
            Err(ChallengeError::Invalid(TokenInvalid::BadSignature))
        ));
        assert!(matches!(
            verify("not a blob", &key(), 100),
            Err(ChallengeError::Invalid(TokenInvalid::Malformed))
        ));
    }

    #[test]
    fn incomplete_payload_is_malformed() {
        let blob = encrypt(b"id=u1&email=a@b.c", &key()).unwrap();
        assert!(matches!(
            verify(&blob, &key(), 100),
            Err(ChallengeError::Invalid(TokenInvalid::Malformed))
        ));
    }

    #[test]
    fn password_ref_is_stable_hex() {
        assert_eq!(password_ref("x"), password_ref("x"));
        assert_ne!(password_ref("x"), password_ref("y"));
        assert_eq!(password_ref("x").len(), 64);
    }
}
