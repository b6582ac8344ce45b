use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

use super::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Server-held HMAC key for capability URLs.
#[derive(Clone)]
pub struct UrlSigningKey(Vec<u8>);

impl fmt::Debug for UrlSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UrlSigningKey(..)")
    }
}

impl UrlSigningKey {
    /// # Errors
    /// Returns `InvalidKeyLength` for an empty key.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, CryptoError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(CryptoError::InvalidKeyLength {
                expected: 1,
                actual: 0,
            });
        }
        Ok(Self(bytes))
    }

    fn mac(&self) -> HmacSha256 {
        match HmacSha256::new_from_slice(&self.0) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC accepts keys of any length"),
        }
    }
}

/// Hex-encoded HMAC-SHA256 over the canonical URL string.
#[must_use]
pub fn sign_url(url: &str, key: &UrlSigningKey) -> String {
    let mut mac = key.mac();
    mac.update(url.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Recompute the MAC over `url` and compare it to `signature` in constant time.
#[must_use]
pub fn verify_url_signature(url: &str, signature: &str, key: &UrlSigningKey) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let mut mac = key.mac();
    mac.update(url.as_bytes());
    mac.verify_slice(&expected).is_ok()
}
