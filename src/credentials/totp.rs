//! RFC 6238 time-based one-time passwords.
//!
//! Fixed parameters: SHA-1, 6 digits, 30 second step, one step of skew in
//! either direction. Secrets are base32 and must carry at least 128 bits.

use totp_rs::{Algorithm, Secret, TOTP};

use super::CryptoError;

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECONDS: u64 = 30;

fn totp(secret_base32: &str) -> Result<TOTP, CryptoError> {
    let bytes = Secret::Encoded(secret_base32.trim().to_uppercase())
        .to_bytes()
        .map_err(|_| CryptoError::TotpSecret)?;
    TOTP::new(Algorithm::SHA1, DIGITS, SKEW, STEP_SECONDS, bytes)
        .map_err(|_| CryptoError::TotpSecret)
}

fn unix_seconds(now: i64) -> u64 {
    u64::try_from(now).unwrap_or(0)
}

/// Check `passcode` against the shared secret at time `now` (unix seconds).
///
/// # Errors
/// Returns `TotpSecret` when the secret is not valid base32 or too short.
pub fn validate_totp(passcode: &str, secret_base32: &str, now: i64) -> Result<bool, CryptoError> {
    let totp = totp(secret_base32)?;
    Ok(totp.check(passcode.trim(), unix_seconds(now)))
}

/// The passcode expected at time `now`.
///
/// # Errors
/// Returns `TotpSecret` when the secret is not valid base32 or too short.
pub fn generate_totp(secret_base32: &str, now: i64) -> Result<String, CryptoError> {
    Ok(totp(secret_base32)?.generate(unix_seconds(now)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP";
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn current_code_validates() {
        let code = generate_totp(SECRET, NOW).unwrap();
        assert_eq!(code.len(), 6);
        assert!(validate_totp(&code, SECRET, NOW).unwrap());
    }

    #[test]
    fn one_step_of_skew_is_allowed() {
        let previous = generate_totp(SECRET, NOW - 30).unwrap();
        assert!(validate_totp(&previous, SECRET, NOW).unwrap());

        let stale = generate_totp(SECRET, NOW - 120).unwrap();
        let current = generate_totp(SECRET, NOW).unwrap();
        if stale != current {
            assert!(!validate_totp(&stale, SECRET, NOW).unwrap());
        }
    }

    #[test]
    fn wrong_code_fails() {
        let code = generate_totp(SECRET, NOW).unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };
        let accepted = validate_totp(wrong, SECRET, NOW).unwrap();
        let window: Vec<String> = [NOW - 30, NOW, NOW + 30]
            .iter()
            .map(|t| generate_totp(SECRET, *t).unwrap())
            .collect();
        assert_eq!(accepted, window.iter().any(|c| c == wrong));
    }

    #[test]
    fn invalid_secret_is_an_error() {
        assert_eq!(
            validate_totp("123456", "not base32!", NOW),
            Err(CryptoError::TotpSecret)
        );
        assert_eq!(
            validate_totp("123456", "JBSWY3DP", NOW),
            Err(CryptoError::TotpSecret)
        );
    }
}
