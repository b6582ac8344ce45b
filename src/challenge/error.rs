use thiserror::Error;

use crate::credentials::{CryptoError, TokenInvalid};
use crate::identity::StoreError;

const NOT_VERIFIED: &str = "not verified";

#[derive(Debug, Error)]
pub enum ChallengeError {
    /// Structure, signature, audience or expiry check failed.
    #[error("challenge invalid: {0}")]
    Invalid(#[from] TokenInvalid),
    /// The supplied secret did not match.
    #[error("challenge denied")]
    Denied,
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ChallengeError {
    /// Invalid and Denied are verification outcomes, not failures.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Invalid(_) | Self::Denied)
    }

    /// Message safe to return to the caller. Rejections all read the same so
    /// the response never tells which check failed.
    #[must_use]
    pub const fn client_message(&self) -> &'static str {
        match self {
            Self::Invalid(_) | Self::Denied => NOT_VERIFIED,
            Self::InvalidInput(reason) => *reason,
            Self::Crypto(_) | Self::Store(_) => "internal error",
        }
    }
}

/// Missing identities behind a presented token are a denial, not an error.
pub(crate) fn deny_missing(err: StoreError) -> ChallengeError {
    if err.is_not_found() {
        ChallengeError::Denied
    } else {
        ChallengeError::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_share_one_message() {
        let expired = ChallengeError::Invalid(TokenInvalid::Expired);
        let forged = ChallengeError::Invalid(TokenInvalid::BadSignature);
        let denied = ChallengeError::Denied;
        assert!(expired.is_rejection() && forged.is_rejection() && denied.is_rejection());
        assert_eq!(expired.client_message(), denied.client_message());
        assert_eq!(forged.client_message(), "not verified");
    }

    #[test]
    fn internal_errors_are_not_rejections() {
        let err = ChallengeError::Crypto(CryptoError::Random);
        assert!(!err.is_rejection());
        assert_eq!(err.client_message(), "internal error");
        assert!(matches!(
            deny_missing(StoreError::NotFound),
            ChallengeError::Denied
        ));
        assert!(matches!(
            deny_missing(StoreError::Conflict),
            ChallengeError::Store(_)
        ));
    }
}
