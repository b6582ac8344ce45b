//! AES-256-GCM sealing for small payloads.
//!
//! Output layout is `nonce (12 bytes) || ciphertext || tag`, transported as
//! standard base64.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64ct::{Base64, Encoding};
use rand::{rngs::OsRng, RngCore};
use std::fmt;

use super::CryptoError;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// A 256-bit symmetric key.
#[derive(Clone)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

impl SymmetricKey {
    /// Build a key from raw bytes.
    ///
    /// # Errors
    /// Returns `InvalidKeyLength` unless `bytes` is exactly 32 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_LEN] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: KEY_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(key))
    }

    /// Build a key from its standard base64 form.
    ///
    /// # Errors
    /// Returns `Base64` on bad encoding or `InvalidKeyLength` when it does not
    /// decode to 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = Base64::decode_vec(encoded.trim()).map_err(|_| CryptoError::Base64)?;
        Self::from_bytes(&bytes)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

/// Encrypt `plaintext` under a fresh random nonce.
///
/// # Errors
/// Returns `Random` if no nonce can be drawn, or `Encrypt` on cipher failure.
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> Result<String, CryptoError> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|_| CryptoError::Random)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = key
        .cipher()
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::Encrypt)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);

    Ok(Base64::encode_string(&sealed))
}

/// Decrypt a value produced by [`encrypt`].
///
/// Fails closed: a wrong key, a flipped bit or a short input is an error,
/// never a partial plaintext.
///
/// # Errors
/// Returns `Base64`, `Truncated` or `Decrypt`.
pub fn decrypt(sealed: &str, key: &SymmetricKey) -> Result<Vec<u8>, CryptoError> {
    let data = Base64::decode_vec(sealed.trim()).map_err(|_| CryptoError::Base64)?;
    if data.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Truncated);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
    key.cipher()
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

/// [`decrypt`] for payloads known to be UTF-8 text.
///
/// # Errors
/// As [`decrypt`], plus `Utf8`.
pub fn decrypt_string(sealed: &str, key: &SymmetricKey) -> Result<String, CryptoError> {
    String::from_utf8(decrypt(sealed, key)?).map_err(|_| CryptoError::Utf8)
}
