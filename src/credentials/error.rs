use thiserror::Error;

/// Primitive-level failures. Always fatal to the current operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("input exceeds {max} bytes")]
    InputTooLong { max: usize },
    #[error("malformed password hash")]
    MalformedHash,
    #[error("password hashing failed")]
    Hashing,
    #[error("secure random source failed")]
    Random,
    #[error("key must be {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("invalid base64 encoding")]
    Base64,
    #[error("ciphertext is truncated")]
    Truncated,
    #[error("decryption failed")]
    Decrypt,
    #[error("encryption failed")]
    Encrypt,
    #[error("plaintext is not valid utf-8")]
    Utf8,
    #[error("failed to parse RSA key")]
    KeyParse,
    #[error("signing failed")]
    Signing,
    #[error("invalid TOTP secret")]
    TotpSecret,
}

/// Reasons a signed claim or capability URL failed verification.
///
/// These are verification denials, never internal errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenInvalid {
    #[error("token expired")]
    Expired,
    #[error("invalid signature")]
    BadSignature,
    #[error("issuer or audience mismatch")]
    BadAudience,
    #[error("malformed token")]
    Malformed,
}
