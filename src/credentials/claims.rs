//! RS256 compact JWS for self-contained claims.
//!
//! Only `RS256` is accepted on verification; `none` and every other `alg`
//! value are rejected before the signature is looked at.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

use super::{CryptoError, TokenInvalid};

const ALG: &str = "RS256";

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Registered claims every token must carry.
#[derive(Debug, Deserialize)]
struct RegisteredClaims {
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<String>,
    exp: i64,
}

#[derive(Clone)]
pub struct ClaimSigner {
    key: SigningKey<Sha256>,
    public: RsaPublicKey,
}

impl fmt::Debug for ClaimSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClaimSigner(..)")
    }
}

impl ClaimSigner {
    /// Parse a PKCS#8 or PKCS#1 PEM RSA private key.
    ///
    /// # Errors
    /// Returns `KeyParse` if neither encoding matches.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|_| CryptoError::KeyParse)?;
        let public = private.to_public_key();
        Ok(Self {
            key: SigningKey::<Sha256>::new(private),
            public,
        })
    }

    /// The verifier matching this private key.
    #[must_use]
    pub fn verifier(&self) -> ClaimVerifier {
        ClaimVerifier {
            key: VerifyingKey::<Sha256>::new(self.public.clone()),
        }
    }
}

#[derive(Clone)]
pub struct ClaimVerifier {
    key: VerifyingKey<Sha256>,
}

impl fmt::Debug for ClaimVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClaimVerifier(..)")
    }
}

impl ClaimVerifier {
    /// Parse an SPKI or PKCS#1 PEM RSA public key.
    ///
    /// # Errors
    /// Returns `KeyParse` if neither encoding matches.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let public = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|_| CryptoError::KeyParse)?;
        Ok(Self {
            key: VerifyingKey::<Sha256>::new(public),
        })
    }
}

/// What a verifier checks beyond the signature.
#[derive(Clone, Debug, Default)]
pub struct ClaimValidation {
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub now: i64,
}

impl ClaimValidation {
    #[must_use]
    pub fn at(now: i64) -> Self {
        Self {
            now,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }
}

fn encode_json<T: Serialize>(value: &T) -> Result<String, CryptoError> {
    let json = serde_json::to_vec(value).map_err(|_| CryptoError::Signing)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn decode_json<T: DeserializeOwned>(segment: &str) -> Result<T, TokenInvalid> {
    let bytes = Base64UrlUnpadded::decode_vec(segment).map_err(|_| TokenInvalid::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenInvalid::Malformed)
}

/// Sign `claims` as an RS256 compact JWS.
///
/// # Errors
/// Returns `Signing` if the claims cannot be serialized.
pub fn sign_claims<T: Serialize>(claims: &T, signer: &ClaimSigner) -> Result<String, CryptoError> {
    let header = Header {
        alg: ALG.to_string(),
        typ: "JWT".to_string(),
    };
    let signing_input = format!("{}.{}", encode_json(&header)?, encode_json(claims)?);
    let signature: Signature = signer.key.sign(signing_input.as_bytes());
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature.to_vec());
    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Verify a compact JWS and decode its claims.
///
/// Order: structure, `alg`, signature, then `exp`, `iss`, `aud`.
///
/// # Errors
/// `Malformed` for structural problems, `BadSignature` for a foreign key or
/// a disallowed algorithm, `Expired` when `exp <= now`, `BadAudience` for an
/// issuer or audience mismatch.
pub fn verify_claims<T: DeserializeOwned>(
    token: &str,
    verifier: &ClaimVerifier,
    validation: &ClaimValidation,
) -> Result<T, TokenInvalid> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(TokenInvalid::Malformed)?;
    let claims_b64 = parts.next().ok_or(TokenInvalid::Malformed)?;
    let sig_b64 = parts.next().ok_or(TokenInvalid::Malformed)?;
    if parts.next().is_some() {
        return Err(TokenInvalid::Malformed);
    }

    let header: Header = decode_json(header_b64)?;
    if header.alg != ALG {
        return Err(TokenInvalid::BadSignature);
    }

    let signature_bytes =
        Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenInvalid::Malformed)?;
    let signature =
        Signature::try_from(signature_bytes.as_slice()).map_err(|_| TokenInvalid::BadSignature)?;
    let signing_input = format!("{header_b64}.{claims_b64}");
    verifier
        .key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| TokenInvalid::BadSignature)?;

    let registered: RegisteredClaims = decode_json(claims_b64)?;
    if registered.exp <= validation.now {
        return Err(TokenInvalid::Expired);
    }
    if let Some(expected) = &validation.issuer {
        if registered.iss.as_deref() != Some(expected.as_str()) {
            return Err(TokenInvalid::BadAudience);
        }
    }
    if let Some(expected) = &validation.audience {
        if registered.aud.as_deref() != Some(expected.as_str()) {
            return Err(TokenInvalid::BadAudience);
        }
    }

    decode_json(claims_b64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SIGNING_PEM: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/recover_signing_key.pem"
    ));
    pub(crate) const VERIFY_PEM: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/recover_verify_key.pem"
    ));
    const FOREIGN_VERIFY_PEM: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/foreign_verify_key.pem"
    ));

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        sub: String,
        iss: String,
        aud: String,
        iat: i64,
        exp: i64,
    }

    fn sample(exp: i64) -> Sample {
        Sample {
            sub: "u1".to_string(),
            iss: "https://idp.test".to_string(),
            aud: "idp".to_string(),
            iat: 1_000,
            exp,
        }
    }

    fn validation(now: i64) -> ClaimValidation {
        ClaimValidation::at(now)
            .with_issuer("https://idp.test")
            .with_audience("idp")
    }

    #[test]
    fn sign_and_verify() {
        let signer = ClaimSigner::from_pem(SIGNING_PEM).unwrap();
        let verifier = ClaimVerifier::from_pem(VERIFY_PEM).unwrap();
        let token = sign_claims(&sample(2_000), &signer).unwrap();
        assert_eq!(token.split('.').count(), 3);
        let decoded: Sample = verify_claims(&token, &verifier, &validation(1_500)).unwrap();
        assert_eq!(decoded, sample(2_000));
    }

    #[test]
    fn expired_claim_is_rejected() {
        let signer = ClaimSigner::from_pem(SIGNING_PEM).unwrap();
        let token = sign_claims(&sample(2_000), &signer).unwrap();
        let result: Result<Sample, _> = verify_claims(&token, &signer.verifier(), &validation(2_000));
        assert_eq!(result, Err(TokenInvalid::Expired));
    }

    #[test]
    fn foreign_key_is_bad_signature() {
        let signer = ClaimSigner::from_pem(SIGNING_PEM).unwrap();
        let foreign = ClaimVerifier::from_pem(FOREIGN_VERIFY_PEM).unwrap();
        let token = sign_claims(&sample(2_000), &signer).unwrap();
        let result: Result<Sample, _> = verify_claims(&token, &foreign, &validation(1_500));
        assert_eq!(result, Err(TokenInvalid::BadSignature));
    }

    #[test]
    fn audience_and_issuer_are_checked() {
        let signer = ClaimSigner::from_pem(SIGNING_PEM).unwrap();
        let token = sign_claims(&sample(2_000), &signer).unwrap();
        let wrong_aud = ClaimValidation::at(1_500).with_audience("other");
        let result: Result<Sample, _> = verify_claims(&token, &signer.verifier(), &wrong_aud);
        assert_eq!(result, Err(TokenInvalid::BadAudience));

        let wrong_iss = ClaimValidation::at(1_500).with_issuer("https://evil.test");
        let result: Result<Sample, _> = verify_claims(&token, &signer.verifier(), &wrong_iss);
        assert_eq!(result, Err(TokenInvalid::BadAudience));
    }

    #[test]
    fn alg_none_is_rejected() {
        let header = Base64UrlUnpadded::encode_string(br#"{"alg":"none","typ":"JWT"}"#);
        let claims = Base64UrlUnpadded::encode_string(
            &serde_json::to_vec(&sample(2_000)).unwrap(),
        );
        let token = format!("{header}.{claims}.");
        let verifier = ClaimVerifier::from_pem(VERIFY_PEM).unwrap();
        let result: Result<Sample, _> = verify_claims(&token, &verifier, &validation(1_500));
        assert_eq!(result, Err(TokenInvalid::BadSignature));
    }

    #[test]
    fn tampered_payload_is_bad_signature() {
        let signer = ClaimSigner::from_pem(SIGNING_PEM).unwrap();
        let token = sign_claims(&sample(2_000), &signer).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let mut forged = sample(9_999);
        forged.sub = "admin".to_string();
        let forged_b64 =
            Base64UrlUnpadded::encode_string(&serde_json::to_vec(&forged).unwrap());
        let tampered = format!("{}.{}.{}", parts[0], forged_b64, parts[2]);
        let result: Result<Sample, _> =
            verify_claims(&tampered, &signer.verifier(), &validation(1_500));
        assert_eq!(result, Err(TokenInvalid::BadSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let verifier = ClaimVerifier::from_pem(VERIFY_PEM).unwrap();
        for token in ["", "abc", "a.b", "a.b.c.d", "!!.??.##"] {
            let result: Result<Sample, _> = verify_claims(token, &verifier, &validation(0));
            assert_eq!(result, Err(TokenInvalid::Malformed), "token {token:?}");
        }
    }

    #[test]
    fn bad_pem_is_key_parse() {
        assert_eq!(
            ClaimSigner::from_pem("nope").map(|_| ()),
            Err(CryptoError::KeyParse)
        );
        assert_eq!(
            ClaimVerifier::from_pem("nope").map(|_| ()),
            Err(CryptoError::KeyParse)
        );
    }
}
