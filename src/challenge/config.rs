//! Immutable engine configuration, built once at startup.

use url::Url;

use crate::credentials::{
    ClaimSigner, ClaimVerifier, HashingCost, SymmetricKey, UrlSigningKey, DEFAULT_CODE_LENGTH,
};

const DEFAULT_RECOVER_TIMEOUT_SECONDS: i64 = 600;
const DEFAULT_DELETE_TIMEOUT_SECONDS: i64 = 600;
const DEFAULT_EMAIL_TIMEOUT_SECONDS: i64 = 3600;
const DEFAULT_COMPLETION_TIMEOUT_SECONDS: i64 = 300;

/// Key material. The URL key, the claim keypair and the two AES keys are
/// separate secrets and share nothing.
#[derive(Clone, Debug)]
pub struct ChallengeKeys {
    pub claim_signer: ClaimSigner,
    pub claim_verifier: ClaimVerifier,
    pub url_key: UrlSigningKey,
    pub completion_key: SymmetricKey,
    pub totp_key: SymmetricKey,
}

#[derive(Clone, Debug)]
pub struct ChallengeConfig {
    issuer: String,
    audience: String,
    keys: ChallengeKeys,
    code_length: usize,
    recover_timeout_seconds: i64,
    delete_timeout_seconds: i64,
    email_timeout_seconds: i64,
    completion_timeout_seconds: i64,
    hashing_cost: HashingCost,
    passcode_url: Url,
    recover_url: Url,
    recover_completion_url: Url,
    email_url: Url,
}

fn page(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!("{}/{path}", base.path().trim_end_matches('/'));
    url.set_path(&joined);
    url.set_query(None);
    url.set_fragment(None);
    url
}

impl ChallengeConfig {
    /// Links default to pages under `public_base_url`.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        public_base_url: &Url,
        keys: ChallengeKeys,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            keys,
            code_length: DEFAULT_CODE_LENGTH,
            recover_timeout_seconds: DEFAULT_RECOVER_TIMEOUT_SECONDS,
            delete_timeout_seconds: DEFAULT_DELETE_TIMEOUT_SECONDS,
            email_timeout_seconds: DEFAULT_EMAIL_TIMEOUT_SECONDS,
            completion_timeout_seconds: DEFAULT_COMPLETION_TIMEOUT_SECONDS,
            hashing_cost: HashingCost::default(),
            passcode_url: page(public_base_url, "passcode"),
            recover_url: page(public_base_url, "recover"),
            recover_completion_url: page(public_base_url, "recover/complete"),
            email_url: page(public_base_url, "email/verify"),
        }
    }

    #[must_use]
    pub fn with_code_length(mut self, length: usize) -> Self {
        self.code_length = length.max(1);
        self
    }

    #[must_use]
    pub const fn with_recover_timeout_seconds(mut self, seconds: i64) -> Self {
        self.recover_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_delete_timeout_seconds(mut self, seconds: i64) -> Self {
        self.delete_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_email_timeout_seconds(mut self, seconds: i64) -> Self {
        self.email_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_completion_timeout_seconds(mut self, seconds: i64) -> Self {
        self.completion_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_hashing_cost(mut self, cost: HashingCost) -> Self {
        self.hashing_cost = cost;
        self
    }

    #[must_use]
    pub fn with_passcode_url(mut self, url: Url) -> Self {
        self.passcode_url = url;
        self
    }

    #[must_use]
    pub fn with_recover_url(mut self, url: Url) -> Self {
        self.recover_url = url;
        self
    }

    #[must_use]
    pub fn with_recover_completion_url(mut self, url: Url) -> Self {
        self.recover_completion_url = url;
        self
    }

    #[must_use]
    pub fn with_email_url(mut self, url: Url) -> Self {
        self.email_url = url;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub const fn keys(&self) -> &ChallengeKeys {
        &self.keys
    }

    #[must_use]
    pub const fn code_length(&self) -> usize {
        self.code_length
    }

    #[must_use]
    pub const fn recover_timeout_seconds(&self) -> i64 {
        self.recover_timeout_seconds
    }

    #[must_use]
    pub const fn delete_timeout_seconds(&self) -> i64 {
        self.delete_timeout_seconds
    }

    #[must_use]
    pub const fn email_timeout_seconds(&self) -> i64 {
        self.email_timeout_seconds
    }

    #[must_use]
    pub const fn completion_timeout_seconds(&self) -> i64 {
        self.completion_timeout_seconds
    }

    #[must_use]
    pub const fn hashing_cost(&self) -> HashingCost {
        self.hashing_cost
    }

    #[must_use]
    pub const fn passcode_url(&self) -> &Url {
        &self.passcode_url
    }

    #[must_use]
    pub const fn recover_url(&self) -> &Url {
        &self.recover_url
    }

    #[must_use]
    pub const fn recover_completion_url(&self) -> &Url {
        &self.recover_completion_url
    }

    #[must_use]
    pub const fn email_url(&self) -> &Url {
        &self.email_url
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::credentials::{TEST_SIGNING_PEM, TEST_VERIFY_PEM};

    pub(crate) fn test_keys() -> ChallengeKeys {
        ChallengeKeys {
            claim_signer: ClaimSigner::from_pem(TEST_SIGNING_PEM).unwrap(),
            claim_verifier: ClaimVerifier::from_pem(TEST_VERIFY_PEM).unwrap(),
            url_key: UrlSigningKey::new(b"test-url-key".to_vec()).unwrap(),
            completion_key: SymmetricKey::from_bytes(&[7u8; 32]).unwrap(),
            totp_key: SymmetricKey::from_bytes(&[9u8; 32]).unwrap(),
        }
    }

    pub(crate) fn test_config() -> ChallengeConfig {
        let base = Url::parse("https://id.example.com/app/").unwrap();
        ChallengeConfig::new("https://id.example.com", "idp", &base, test_keys())
            .with_hashing_cost(HashingCost::new(1024, 1, 1))
    }

    #[test]
    fn pages_are_derived_from_base() {
        let config = test_config();
        assert_eq!(
            config.passcode_url().as_str(),
            "https://id.example.com/app/passcode"
        );
        assert_eq!(
            config.recover_completion_url().as_str(),
            "https://id.example.com/app/recover/complete"
        );
        assert_eq!(config.code_length(), DEFAULT_CODE_LENGTH);
    }

    #[test]
    fn builders_override_defaults() {
        let config = test_config()
            .with_code_length(0)
            .with_recover_timeout_seconds(120)
            .with_email_url(Url::parse("https://mail.example.com/confirm").unwrap());
        assert_eq!(config.code_length(), 1);
        assert_eq!(config.recover_timeout_seconds(), 120);
        assert_eq!(config.email_url().host_str(), Some("mail.example.com"));
    }
}
