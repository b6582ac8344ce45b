//! Stateless signed claim carrying the hash of a one-time code.
//!
//! The token goes into a link; the plaintext code goes into the mail body.
//! Holding only one of them is not enough to pass verification.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::challenge::{ChallengeError, ChallengeKind};
use crate::credentials::{
    generate_one_time_code, sign_claims, verify_claims, verify_password, ClaimSigner,
    ClaimValidation, ClaimVerifier, CryptoError, HashingCost, TokenInvalid,
};

#[derive(Debug, Serialize, Deserialize)]
struct ChallengeClaims {
    code: String,
    typ: ChallengeKind,
    iss: String,
    aud: String,
    sub: String,
    iat: i64,
    exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
}

#[derive(Debug)]
pub struct ClaimRequest<'a> {
    pub kind: ChallengeKind,
    pub subject: &'a str,
    /// Address to commit on success (email intents only).
    pub email: Option<&'a str>,
    pub timeout_seconds: i64,
    pub issuer: &'a str,
    pub audience: &'a str,
    pub code_length: usize,
}

#[derive(Debug)]
pub struct IssuedClaim {
    pub token: String,
    pub code: SecretString,
    pub code_hash: String,
    pub expires_at: i64,
}

#[derive(Debug, PartialEq, Eq)]
pub struct VerifiedClaim {
    pub subject: String,
    pub email: Option<String>,
    pub code_hash: String,
}

/// Generate a code, hash it and sign a claim around the hash.
///
/// # Errors
/// Any primitive failure (RNG, hashing, signing).
pub fn issue(
    request: &ClaimRequest<'_>,
    signer: &ClaimSigner,
    cost: HashingCost,
    now: i64,
) -> Result<IssuedClaim, CryptoError> {
    let code = generate_one_time_code(request.code_length)?;
    let code_hash = cost.hash(&code)?;
    let expires_at = now.saturating_add(request.timeout_seconds);

    let claims = ChallengeClaims {
        code: code_hash.clone(),
        typ: request.kind,
        iss: request.issuer.to_string(),
        aud: request.audience.to_string(),
        sub: request.subject.to_string(),
        iat: now,
        exp: expires_at,
        email: request.email.map(str::to_string),
    };
    let token = sign_claims(&claims, signer)?;

    Ok(IssuedClaim {
        token,
        code: SecretString::from(code),
        code_hash,
        expires_at,
    })
}

/// Verify the token, then the supplied code against the embedded hash.
///
/// # Errors
/// `Invalid` for signature, expiry, audience or purpose failures; `Denied`
/// when the code does not match.
pub fn verify(
    token: &str,
    kind: ChallengeKind,
    supplied_code: &str,
    verifier: &ClaimVerifier,
    validation: &ClaimValidation,
) -> Result<VerifiedClaim, ChallengeError> {
    let claims: ChallengeClaims = verify_claims(token, verifier, validation)?;
    if claims.typ != kind {
        return Err(TokenInvalid::BadAudience.into());
    }
    if claims.sub.is_empty() {
        return Err(TokenInvalid::Malformed.into());
    }

    match verify_password(&claims.code, supplied_code.trim()) {
        Ok(true) => Ok(VerifiedClaim {
            subject: claims.sub,
            email: claims.email,
            code_hash: claims.code,
        }),
        Ok(false) => Err(ChallengeError::Denied),
        Err(CryptoError::MalformedHash) => Err(TokenInvalid::Malformed.into()),
        Err(err) => Err(err.into()),
    }
}
