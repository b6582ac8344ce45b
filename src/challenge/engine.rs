//! Challenge lifecycle: `Issued -> PresentedForVerification -> Accepted | Rejected`.
//!
//! Terminal states are never stored. An accepted verification performs its
//! side effect through the identity store; a rejected one mutates nothing.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use url::Url;
use uuid::Uuid;

use super::formats::{capability, claim, sealed};
use super::{
    deny_missing, ChallengeArtifact, ChallengeConfig, ChallengeError, ChallengeIntent,
    ChallengeKind, Clock, IssuedChallenge, PresentedChallenge, SystemClock, VerifiedChallenge,
};
use crate::credentials::{
    decrypt_string, encrypt, generate_one_time_code, generate_totp, validate_totp,
    verify_password, ClaimValidation, CryptoError, TokenInvalid, MAX_SECRET_BYTES,
};
use crate::identity::{
    normalize_email, valid_email, CodeKind, Identity, IdentityStore, OutstandingCode,
};

/// Registration input. The password is hashed before it reaches the store.
#[derive(Debug)]
pub struct NewIdentity {
    pub name: String,
    pub email: String,
    pub password: SecretString,
}

fn link_with(base: &Url, param: &str, value: &str) -> String {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair(param, value);
    url.to_string()
}

fn check_new_password(password: &str) -> Result<(), ChallengeError> {
    if password.is_empty() {
        return Err(ChallengeError::InvalidInput("password must not be empty"));
    }
    if password.len() > MAX_SECRET_BYTES {
        return Err(ChallengeError::InvalidInput("password is too long"));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ChallengeEngine {
    config: Arc<ChallengeConfig>,
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for ChallengeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeEngine")
            .field("issuer", &self.config.issuer())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl ChallengeEngine {
    #[must_use]
    pub fn new(config: Arc<ChallengeConfig>, store: Arc<dyn IdentityStore>) -> Self {
        Self {
            config,
            store,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ChallengeConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    #[must_use]
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    fn validation(&self) -> ClaimValidation {
        ClaimValidation::at(self.now())
            .with_issuer(self.config.issuer())
            .with_audience(self.config.audience())
    }

    fn claim_request<'a>(
        &'a self,
        kind: ChallengeKind,
        subject: &'a str,
        email: Option<&'a str>,
        timeout_seconds: i64,
    ) -> claim::ClaimRequest<'a> {
        claim::ClaimRequest {
            kind,
            subject,
            email,
            timeout_seconds,
            issuer: self.config.issuer(),
            audience: self.config.audience(),
            code_length: self.config.code_length(),
        }
    }

    /// Produce the artifact for `intent` plus any out-of-band code.
    ///
    /// `Recover` and `Delete` overwrite the subject's outstanding code of the
    /// same kind, so only the most recent issue can be verified.
    ///
    /// # Errors
    /// `Store(NotFound)` for an unknown subject, `InvalidInput` for a bad new
    /// email, `Crypto`/`Store` for internal failures.
    #[instrument(skip_all, fields(kind = %intent.kind()))]
    pub async fn issue_challenge(
        &self,
        intent: ChallengeIntent,
    ) -> Result<IssuedChallenge, ChallengeError> {
        let now = self.now();
        let keys = self.config.keys();

        let issued = match intent {
            ChallengeIntent::Authenticate {
                login_challenge,
                subject,
            } => {
                let url = capability::issue(
                    self.config.passcode_url(),
                    &login_challenge,
                    &subject,
                    &keys.url_key,
                );
                IssuedChallenge {
                    kind: ChallengeKind::Authenticate,
                    subject,
                    artifact: ChallengeArtifact::CapabilityUrl(url),
                    code: None,
                    deliver_to: None,
                    recipient_name: None,
                    expires_at: None,
                }
            }

            ChallengeIntent::Recover { subject } => {
                let identity = self
                    .store
                    .fetch_identity_by_email_or_id(subject.trim())
                    .await?;
                let request = self.claim_request(
                    ChallengeKind::Recover,
                    &identity.id,
                    None,
                    self.config.recover_timeout_seconds(),
                );
                let issued = claim::issue(
                    &request,
                    &keys.claim_signer,
                    self.config.hashing_cost(),
                    now,
                )?;
                self.store
                    .update_outstanding_code(
                        &identity.id,
                        CodeKind::Recover,
                        OutstandingCode {
                            hash: issued.code_hash,
                            expires_at: issued.expires_at,
                        },
                    )
                    .await?;
                let link = link_with(self.config.recover_url(), "recover_challenge", &issued.token);
                IssuedChallenge {
                    kind: ChallengeKind::Recover,
                    subject: identity.id,
                    artifact: ChallengeArtifact::SignedClaim {
                        token: issued.token,
                        link,
                    },
                    code: Some(issued.code),
                    deliver_to: Some(identity.email),
                    recipient_name: Some(identity.name),
                    expires_at: Some(issued.expires_at),
                }
            }

            ChallengeIntent::Delete { subject } => {
                let identity = self.store.fetch_identity(&subject).await?;
                let code = generate_one_time_code(self.config.code_length())?;
                let expires_at = now.saturating_add(self.config.delete_timeout_seconds());
                self.store
                    .update_outstanding_code(
                        &identity.id,
                        CodeKind::Delete,
                        OutstandingCode {
                            hash: self.config.hashing_cost().hash(&code)?,
                            expires_at,
                        },
                    )
                    .await?;
                IssuedChallenge {
                    kind: ChallengeKind::Delete,
                    subject: identity.id,
                    artifact: ChallengeArtifact::StoredCode,
                    code: Some(SecretString::from(code)),
                    deliver_to: Some(identity.email),
                    recipient_name: Some(identity.name),
                    expires_at: Some(expires_at),
                }
            }

            ChallengeIntent::EmailConfirm { subject } => {
                let identity = self.store.fetch_identity(&subject).await?;
                self.issue_email_claim(ChallengeKind::EmailConfirm, identity, None, now)
                    .await?
            }

            ChallengeIntent::EmailChange { subject, new_email } => {
                let new_email = normalize_email(&new_email);
                if !valid_email(&new_email) {
                    return Err(ChallengeError::InvalidInput("invalid email address"));
                }
                let identity = self.store.fetch_identity(&subject).await?;
                self.issue_email_claim(ChallengeKind::EmailChange, identity, Some(new_email), now)
                    .await?
            }
        };

        info!(subject = %issued.subject, "challenge issued");
        Ok(issued)
    }

    /// Both email kinds share one outstanding code slot, so a newer
    /// EmailConfirm or EmailChange issue supersedes any older one.
    async fn issue_email_claim(
        &self,
        kind: ChallengeKind,
        identity: Identity,
        new_email: Option<String>,
        now: i64,
    ) -> Result<IssuedChallenge, ChallengeError> {
        let keys = self.config.keys();
        let subject = identity.id;
        let email = new_email.unwrap_or(identity.email);
        let request = self.claim_request(
            kind,
            &subject,
            Some(&email),
            self.config.email_timeout_seconds(),
        );
        let issued = claim::issue(
            &request,
            &keys.claim_signer,
            self.config.hashing_cost(),
            now,
        )?;
        self.store
            .update_outstanding_code(
                &subject,
                CodeKind::Email,
                OutstandingCode {
                    hash: issued.code_hash,
                    expires_at: issued.expires_at,
                },
            )
            .await?;
        let link = link_with(self.config.email_url(), "email_challenge", &issued.token);
        Ok(IssuedChallenge {
            kind,
            subject,
            artifact: ChallengeArtifact::SignedClaim {
                token: issued.token,
                link,
            },
            code: Some(issued.code),
            deliver_to: Some(email),
            recipient_name: Some(identity.name),
            expires_at: Some(issued.expires_at),
        })
    }

    /// Verify a presented challenge and perform its side effect.
    ///
    /// # Errors
    /// `Invalid` and `Denied` are rejections; callers should render both with
    /// [`ChallengeError::client_message`]. Anything else is internal.
    #[instrument(skip_all, fields(kind = %presented.kind()))]
    pub async fn verify_challenge(
        &self,
        presented: PresentedChallenge,
    ) -> Result<VerifiedChallenge, ChallengeError> {
        let outcome = match presented {
            PresentedChallenge::Passcode { url, passcode } => {
                self.verify_passcode(&url, &passcode).await
            }
            PresentedChallenge::Recover {
                token,
                code,
                new_password,
            } => self.verify_recover(&token, &code, &new_password).await,
            PresentedChallenge::RecoverCompletion { blob } => self.complete_recover(&blob).await,
            PresentedChallenge::Delete { subject, code } => {
                self.verify_delete(&subject, &code).await
            }
            PresentedChallenge::EmailConfirm { token, code } => {
                self.verify_email(ChallengeKind::EmailConfirm, &token, &code)
                    .await
            }
            PresentedChallenge::EmailChange { token, code } => {
                self.verify_email(ChallengeKind::EmailChange, &token, &code)
                    .await
            }
        };

        match &outcome {
            Ok(verified) => info!(subject = %verified.subject(), "challenge accepted"),
            Err(err) if err.is_rejection() => debug!(reason = %err, "challenge rejected"),
            Err(err) => error!("challenge verification failed: {err}"),
        }
        outcome
    }

    async fn verify_passcode(
        &self,
        url: &str,
        passcode: &str,
    ) -> Result<VerifiedChallenge, ChallengeError> {
        let keys = self.config.keys();
        let (login_challenge, subject) = capability::verify(url, &keys.url_key)?;
        let identity = self
            .store
            .fetch_identity(&subject)
            .await
            .map_err(deny_missing)?;

        let sealed_secret = match (&identity.totp_secret, identity.totp_required) {
            (Some(secret), true) => secret,
            _ => return Err(ChallengeError::Denied),
        };
        let secret = decrypt_string(sealed_secret, &keys.totp_key)?;
        if !validate_totp(passcode, &secret, self.now())? {
            return Err(ChallengeError::Denied);
        }

        Ok(VerifiedChallenge::Passcode {
            subject: identity.id,
            login_challenge,
        })
    }

    async fn verify_recover(
        &self,
        token: &str,
        code: &str,
        new_password: &SecretString,
    ) -> Result<VerifiedChallenge, ChallengeError> {
        let keys = self.config.keys();
        let verified = claim::verify(
            token,
            ChallengeKind::Recover,
            code,
            &keys.claim_verifier,
            &self.validation(),
        )?;
        let identity = self
            .store
            .fetch_identity(&verified.subject)
            .await
            .map_err(deny_missing)?;

        // Only the most recently issued recover claim is honoured.
        let current = identity
            .outstanding_code(CodeKind::Recover)
            .is_some_and(|outstanding| outstanding.hash == verified.code_hash);
        if !current {
            return Err(ChallengeError::Denied);
        }

        let new_password = new_password.expose_secret();
        check_new_password(new_password)?;
        let new_hash = self.config.hashing_cost().hash(new_password)?;

        if !self
            .store
            .clear_outstanding_code(&identity.id, CodeKind::Recover, &verified.code_hash)
            .await?
        {
            return Err(ChallengeError::Denied);
        }

        let now = self.now();
        let payload = sealed::CompletionPayload {
            id: identity.id.clone(),
            email: identity.email.clone(),
            password_hash: new_hash,
            password_ref: sealed::password_ref(&identity.password_hash),
            expires_at: now.saturating_add(self.config.completion_timeout_seconds()),
        };
        let completion = sealed::issue(&payload, &keys.completion_key)?;
        let redirect_to = link_with(
            self.config.recover_completion_url(),
            "recover_completion",
            &completion,
        );

        Ok(VerifiedChallenge::Recovered {
            subject: identity.id,
            completion,
            redirect_to,
        })
    }

    async fn complete_recover(&self, blob: &str) -> Result<VerifiedChallenge, ChallengeError> {
        let keys = self.config.keys();
        let payload = sealed::verify(blob, &keys.completion_key, self.now())?;
        let identity = self
            .store
            .fetch_identity(&payload.id)
            .await
            .map_err(deny_missing)?;

        if !identity.email.eq_ignore_ascii_case(&payload.email) {
            debug!(subject = %identity.id, "email changed since recovery was verified");
            return Err(ChallengeError::Denied);
        }
        if sealed::password_ref(&identity.password_hash) != payload.password_ref {
            debug!(subject = %identity.id, "password rotated since recovery was verified");
            return Err(ChallengeError::Denied);
        }

        let updated = self
            .store
            .update_password(&identity.id, &payload.password_hash)
            .await?;
        Ok(VerifiedChallenge::PasswordRotated {
            subject: updated.id,
        })
    }

    async fn verify_delete(
        &self,
        subject: &str,
        code: &str,
    ) -> Result<VerifiedChallenge, ChallengeError> {
        let identity = self
            .store
            .fetch_identity(subject)
            .await
            .map_err(deny_missing)?;
        let outstanding = identity
            .outstanding_code(CodeKind::Delete)
            .ok_or(ChallengeError::Denied)?;
        if outstanding.is_expired(self.now()) {
            return Err(TokenInvalid::Expired.into());
        }
        if !verify_password(&outstanding.hash, code.trim())? {
            return Err(ChallengeError::Denied);
        }

        if !self
            .store
            .delete_identity(&identity.id, &outstanding.hash)
            .await?
        {
            return Err(ChallengeError::Denied);
        }

        Ok(VerifiedChallenge::Deleted {
            subject: identity.id,
        })
    }

    async fn verify_email(
        &self,
        kind: ChallengeKind,
        token: &str,
        code: &str,
    ) -> Result<VerifiedChallenge, ChallengeError> {
        let keys = self.config.keys();
        let verified = claim::verify(token, kind, code, &keys.claim_verifier, &self.validation())?;
        let email = verified.email.ok_or(TokenInvalid::Malformed)?;
        let identity = self
            .store
            .fetch_identity(&verified.subject)
            .await
            .map_err(deny_missing)?;

        // A used or superseded claim no longer matches the stored code.
        let current = identity
            .outstanding_code(CodeKind::Email)
            .is_some_and(|outstanding| outstanding.hash == verified.code_hash);
        if !current {
            return Err(ChallengeError::Denied);
        }
        if kind == ChallengeKind::EmailConfirm && !identity.email.eq_ignore_ascii_case(&email) {
            return Err(ChallengeError::Denied);
        }

        let updated = self
            .store
            .update_email(&identity.id, &email, &verified.code_hash)
            .await
            .map_err(|err| match err {
                crate::identity::StoreError::Conflict => {
                    ChallengeError::InvalidInput("email address already in use")
                }
                other => ChallengeError::Store(other),
            })?
            .ok_or(ChallengeError::Denied)?;

        Ok(VerifiedChallenge::EmailCommitted {
            subject: updated.id,
            email: updated.email,
        })
    }

    /// Create an identity with a fresh subject id.
    ///
    /// # Errors
    /// `InvalidInput` for a bad email or password, `Store(Conflict)` when the
    /// email is taken.
    #[instrument(skip_all)]
    pub async fn register(&self, new: NewIdentity) -> Result<Identity, ChallengeError> {
        let email = normalize_email(&new.email);
        if !valid_email(&email) {
            return Err(ChallengeError::InvalidInput("invalid email address"));
        }
        let password = new.password.expose_secret();
        check_new_password(password)?;

        let identity = Identity {
            id: Uuid::new_v4().to_string(),
            name: new.name.trim().to_string(),
            email,
            email_confirmed: false,
            password_hash: self.config.hashing_cost().hash(password)?,
            totp_required: false,
            totp_secret: None,
            recover_code: None,
            delete_code: None,
            email_code: None,
        };
        let created = self.store.create_identity(identity).await?;
        info!(subject = %created.id, "identity registered");
        Ok(created)
    }

    /// Deny-by-default password check. `None` for an unknown subject or a
    /// wrong password.
    ///
    /// # Errors
    /// `Crypto` when the stored hash is malformed, `Store` on store failure.
    #[instrument(skip(self, password))]
    pub async fn authenticate_password(
        &self,
        subject: &str,
        password: &str,
    ) -> Result<Option<Identity>, ChallengeError> {
        let identity = match self.store.fetch_identity(subject).await {
            Ok(identity) => identity,
            Err(err) if err.is_not_found() => {
                debug!("no identity for subject");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        if verify_password(&identity.password_hash, password)? {
            Ok(Some(identity))
        } else {
            Ok(None)
        }
    }

    /// Rotate the password of a caller-authorized subject. Presenting the
    /// current password changes nothing.
    ///
    /// # Errors
    /// `InvalidInput` for an empty or oversized password, `Store(NotFound)`
    /// for an unknown subject.
    #[instrument(skip(self, new_password))]
    pub async fn change_password(
        &self,
        subject: &str,
        new_password: &SecretString,
    ) -> Result<Identity, ChallengeError> {
        let new_password = new_password.expose_secret();
        check_new_password(new_password)?;
        let identity = self.store.fetch_identity(subject).await?;

        if verify_password(&identity.password_hash, new_password)? {
            debug!("new password equals the current one");
            return Ok(identity);
        }

        let new_hash = self.config.hashing_cost().hash(new_password)?;
        let updated = self.store.update_password(&identity.id, &new_hash).await?;
        info!(subject = %updated.id, "password changed");
        Ok(updated)
    }

    /// Set or clear the TOTP secret. The secret is sealed with the TOTP key
    /// before it is stored.
    ///
    /// # Errors
    /// `InvalidInput` when the secret is unusable or `required` is set
    /// without one.
    #[instrument(skip(self, secret))]
    pub async fn update_totp(
        &self,
        subject: &str,
        secret: Option<&str>,
        required: bool,
    ) -> Result<Identity, ChallengeError> {
        let sealed = match secret.map(str::trim).filter(|s| !s.is_empty()) {
            Some(secret) => {
                generate_totp(secret, self.now()).map_err(|err| match err {
                    CryptoError::TotpSecret => ChallengeError::InvalidInput("invalid TOTP secret"),
                    other => ChallengeError::Crypto(other),
                })?;
                Some(encrypt(secret.as_bytes(), &self.config.keys().totp_key)?)
            }
            None if required => {
                return Err(ChallengeError::InvalidInput(
                    "TOTP cannot be required without a secret",
                ))
            }
            None => None,
        };
        Ok(self.store.update_totp(subject, sealed, required).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::challenge::config::tests::test_config;
    use crate::challenge::ManualClock;
    use crate::identity::{MemoryIdentityStore, StoreError};

    const T0: i64 = 1_700_000_000;
    const TOTP_SECRET: &str = "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP";

    struct Fixture {
        engine: ChallengeEngine,
        store: Arc<MemoryIdentityStore>,
        clock: Arc<ManualClock>,
    }

    async fn fixture(config: ChallengeConfig) -> Fixture {
        let store = Arc::new(MemoryIdentityStore::new());
        let clock = Arc::new(ManualClock::new(T0));
        let engine = ChallengeEngine::new(Arc::new(config), store.clone())
            .with_clock(clock.clone());
        store
            .create_identity(Identity {
                id: "u1".to_string(),
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                email_confirmed: false,
                password_hash: engine.config().hashing_cost().hash("old password").unwrap(),
                totp_required: false,
                totp_secret: None,
                recover_code: None,
                delete_code: None,
                email_code: None,
            })
            .await
            .unwrap();
        Fixture {
            engine,
            store,
            clock,
        }
    }

    fn token_of(issued: &IssuedChallenge) -> String {
        match &issued.artifact {
            ChallengeArtifact::SignedClaim { token, .. } => token.clone(),
            other => panic!("expected signed claim, got {other:?}"),
        }
    }

    fn code_of(issued: &IssuedChallenge) -> String {
        issued.code.as_ref().unwrap().expose_secret().to_string()
    }

    fn wrong(code: &str) -> &'static str {
        if code == "000000" {
            "111111"
        } else {
            "000000"
        }
    }

    fn recover(token: &str, code: &str) -> PresentedChallenge {
        PresentedChallenge::Recover {
            token: token.to_string(),
            code: code.to_string(),
            new_password: SecretString::from("new password"),
        }
    }

    #[tokio::test]
    async fn recover_scenario_with_two_minute_timeout() {
        let f = fixture(test_config().with_recover_timeout_seconds(120)).await;
        let issued = f
            .engine
            .issue_challenge(ChallengeIntent::Recover {
                subject: "u1".to_string(),
            })
            .await
            .unwrap();
        let token = token_of(&issued);
        let code = code_of(&issued);
        assert_eq!(issued.deliver_to.as_deref(), Some("ada@example.com"));
        assert!(issued.link().unwrap().contains("recover_challenge="));

        let denied = f.engine.verify_challenge(recover(&token, wrong(&code))).await;
        assert!(matches!(denied, Err(ChallengeError::Denied)));

        f.clock.advance(60);
        let verified = f.engine.verify_challenge(recover(&token, &code)).await.unwrap();
        assert_eq!(verified.subject(), "u1");

        f.clock.set(T0 + 121);
        let expired = f.engine.verify_challenge(recover(&token, &code)).await;
        assert!(matches!(
            expired,
            Err(ChallengeError::Invalid(TokenInvalid::Expired))
        ));
    }

    #[tokio::test]
    async fn recover_code_is_single_use() {
        let f = fixture(test_config()).await;
        let issued = f
            .engine
            .issue_challenge(ChallengeIntent::Recover {
                subject: "ada@example.com".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(issued.subject, "u1");
        let (token, code) = (token_of(&issued), code_of(&issued));
        f.engine.verify_challenge(recover(&token, &code)).await.unwrap();
        let replay = f.engine.verify_challenge(recover(&token, &code)).await;
        assert!(matches!(replay, Err(ChallengeError::Denied)));
    }

    #[tokio::test]
    async fn newer_recover_claim_supersedes_older() {
        let f = fixture(test_config()).await;
        let intent = ChallengeIntent::Recover {
            subject: "u1".to_string(),
        };
        let first = f.engine.issue_challenge(intent.clone()).await.unwrap();
        let _second = f.engine.issue_challenge(intent).await.unwrap();
        let result = f
            .engine
            .verify_challenge(recover(&token_of(&first), &code_of(&first)))
            .await;
        assert!(matches!(result, Err(ChallengeError::Denied)));
    }

    #[tokio::test]
    async fn recovery_completion_rotates_password_once() {
        let f = fixture(test_config()).await;
        let issued = f
            .engine
            .issue_challenge(ChallengeIntent::Recover {
                subject: "u1".to_string(),
            })
            .await
            .unwrap();
        let verified = f
            .engine
            .verify_challenge(recover(&token_of(&issued), &code_of(&issued)))
            .await
            .unwrap();
        let VerifiedChallenge::Recovered {
            completion,
            redirect_to,
            ..
        } = verified
        else {
            panic!("expected recovered");
        };
        assert!(redirect_to.contains("recover_completion="));

        let rotated = f
            .engine
            .verify_challenge(PresentedChallenge::RecoverCompletion {
                blob: completion.clone(),
            })
            .await
            .unwrap();
        assert_eq!(rotated, VerifiedChallenge::PasswordRotated {
            subject: "u1".to_string()
        });
        assert!(f
            .engine
            .authenticate_password("u1", "new password")
            .await
            .unwrap()
            .is_some());

        let replay = f
            .engine
            .verify_challenge(PresentedChallenge::RecoverCompletion { blob: completion })
            .await;
        assert!(matches!(replay, Err(ChallengeError::Denied)));
    }

    #[tokio::test]
    async fn completion_rejected_after_email_change() {
        let f = fixture(test_config()).await;
        let issued = f
            .engine
            .issue_challenge(ChallengeIntent::Recover {
                subject: "u1".to_string(),
            })
            .await
            .unwrap();
        let VerifiedChallenge::Recovered { completion, .. } = f
            .engine
            .verify_challenge(recover(&token_of(&issued), &code_of(&issued)))
            .await
            .unwrap()
        else {
            panic!("expected recovered");
        };

        let change = f
            .engine
            .issue_challenge(ChallengeIntent::EmailChange {
                subject: "u1".to_string(),
                new_email: "other@example.com".to_string(),
            })
            .await
            .unwrap();
        f.engine
            .verify_challenge(PresentedChallenge::EmailChange {
                token: token_of(&change),
                code: code_of(&change),
            })
            .await
            .unwrap();
        let result = f
            .engine
            .verify_challenge(PresentedChallenge::RecoverCompletion { blob: completion })
            .await;
        assert!(matches!(result, Err(ChallengeError::Denied)));
        assert!(f
            .engine
            .authenticate_password("u1", "old password")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn second_delete_issue_invalidates_first_code() {
        let f = fixture(test_config()).await;
        let intent = ChallengeIntent::Delete {
            subject: "u1".to_string(),
        };
        let first = f.engine.issue_challenge(intent.clone()).await.unwrap();
        let second = f.engine.issue_challenge(intent).await.unwrap();
        assert_eq!(first.artifact, ChallengeArtifact::StoredCode);

        let second_code = code_of(&second);
        let stored = f.store.fetch_identity("u1").await.unwrap().delete_code.unwrap();
        assert!(verify_password(&stored.hash, &second_code).unwrap());
        assert_eq!(Some(stored.expires_at), second.expires_at);
        assert!(first.code.is_some());

        let stale = f
            .engine
            .verify_challenge(PresentedChallenge::Delete {
                subject: "u1".to_string(),
                code: wrong(&second_code).to_string(),
            })
            .await;
        assert!(matches!(stale, Err(ChallengeError::Denied)));

        let deleted = f
            .engine
            .verify_challenge(PresentedChallenge::Delete {
                subject: "u1".to_string(),
                code: second_code,
            })
            .await
            .unwrap();
        assert_eq!(deleted.subject(), "u1");
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn expired_delete_code_is_invalid() {
        let f = fixture(test_config().with_delete_timeout_seconds(30)).await;
        let issued = f
            .engine
            .issue_challenge(ChallengeIntent::Delete {
                subject: "u1".to_string(),
            })
            .await
            .unwrap();
        f.clock.advance(30);
        let result = f
            .engine
            .verify_challenge(PresentedChallenge::Delete {
                subject: "u1".to_string(),
                code: code_of(&issued),
            })
            .await;
        assert!(matches!(
            result,
            Err(ChallengeError::Invalid(TokenInvalid::Expired))
        ));
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn email_change_commits_new_address() {
        let f = fixture(test_config()).await;
        let issued = f
            .engine
            .issue_challenge(ChallengeIntent::EmailChange {
                subject: "u1".to_string(),
                new_email: " New@Example.com ".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(issued.deliver_to.as_deref(), Some("new@example.com"));

        let verified = f
            .engine
            .verify_challenge(PresentedChallenge::EmailChange {
                token: token_of(&issued),
                code: code_of(&issued),
            })
            .await
            .unwrap();
        assert_eq!(verified, VerifiedChallenge::EmailCommitted {
            subject: "u1".to_string(),
            email: "new@example.com".to_string(),
        });
        let identity = f.store.fetch_identity("u1").await.unwrap();
        assert!(identity.email_confirmed);
    }

    #[tokio::test]
    async fn email_claims_are_not_interchangeable() {
        let f = fixture(test_config()).await;
        let issued = f
            .engine
            .issue_challenge(ChallengeIntent::EmailConfirm {
                subject: "u1".to_string(),
            })
            .await
            .unwrap();
        let result = f
            .engine
            .verify_challenge(PresentedChallenge::EmailChange {
                token: token_of(&issued),
                code: code_of(&issued),
            })
            .await;
        assert!(matches!(result, Err(ChallengeError::Invalid(_))));

        let confirmed = f
            .engine
            .verify_challenge(PresentedChallenge::EmailConfirm {
                token: token_of(&issued),
                code: code_of(&issued),
            })
            .await
            .unwrap();
        assert_eq!(confirmed.subject(), "u1");
    }

    fn email_change(issued: &IssuedChallenge) -> PresentedChallenge {
        PresentedChallenge::EmailChange {
            token: token_of(issued),
            code: code_of(issued),
        }
    }

    async fn issue_email_change(f: &Fixture, new_email: &str) -> IssuedChallenge {
        f.engine
            .issue_challenge(ChallengeIntent::EmailChange {
                subject: "u1".to_string(),
                new_email: new_email.to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn used_email_change_cannot_be_replayed() {
        let f = fixture(test_config()).await;
        let to_b = issue_email_change(&f, "b@example.com").await;
        f.engine.verify_challenge(email_change(&to_b)).await.unwrap();
        let to_c = issue_email_change(&f, "c@example.com").await;
        f.engine.verify_challenge(email_change(&to_c)).await.unwrap();

        f.clock.advance(60);
        let replay = f.engine.verify_challenge(email_change(&to_b)).await;
        assert!(matches!(replay, Err(ChallengeError::Denied)));
        let identity = f.store.fetch_identity("u1").await.unwrap();
        assert_eq!(identity.email, "c@example.com");
        assert!(identity.email_code.is_none());
    }

    #[tokio::test]
    async fn newer_email_claim_supersedes_older() {
        let f = fixture(test_config()).await;
        let first = issue_email_change(&f, "b@example.com").await;
        let second = issue_email_change(&f, "c@example.com").await;

        let stale = f.engine.verify_challenge(email_change(&first)).await;
        assert!(matches!(stale, Err(ChallengeError::Denied)));
        f.engine.verify_challenge(email_change(&second)).await.unwrap();
        assert_eq!(
            f.store.fetch_identity("u1").await.unwrap().email,
            "c@example.com"
        );
    }

    #[tokio::test]
    async fn change_password_with_current_password_is_a_no_op() {
        let f = fixture(test_config()).await;
        let before = f.store.fetch_identity("u1").await.unwrap();
        let after = f
            .engine
            .change_password("u1", &SecretString::from("old password"))
            .await
            .unwrap();
        assert_eq!(after.password_hash, before.password_hash);
    }

    #[tokio::test]
    async fn change_password_rotates_and_drops_recover_code() {
        let f = fixture(test_config()).await;
        f.engine
            .issue_challenge(ChallengeIntent::Recover {
                subject: "u1".to_string(),
            })
            .await
            .unwrap();
        let updated = f
            .engine
            .change_password("u1", &SecretString::from("brand new"))
            .await
            .unwrap();
        assert!(updated.recover_code.is_none());
        assert!(f
            .engine
            .authenticate_password("u1", "brand new")
            .await
            .unwrap()
            .is_some());
        assert!(f
            .engine
            .authenticate_password("u1", "old password")
            .await
            .unwrap()
            .is_none());

        let empty = f.engine.change_password("u1", &SecretString::from("")).await;
        assert!(matches!(empty, Err(ChallengeError::InvalidInput(_))));
        let ghost = f
            .engine
            .change_password("ghost", &SecretString::from("x"))
            .await;
        assert!(matches!(ghost, Err(ChallengeError::Store(StoreError::NotFound))));
    }

    #[tokio::test]
    async fn invalid_new_email_is_refused() {
        let f = fixture(test_config()).await;
        let result = f
            .engine
            .issue_challenge(ChallengeIntent::EmailChange {
                subject: "u1".to_string(),
                new_email: "nope".to_string(),
            })
            .await;
        assert!(matches!(result, Err(ChallengeError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn unknown_subject_cannot_be_issued() {
        let f = fixture(test_config()).await;
        let result = f
            .engine
            .issue_challenge(ChallengeIntent::Delete {
                subject: "ghost".to_string(),
            })
            .await;
        assert!(matches!(
            result,
            Err(ChallengeError::Store(StoreError::NotFound))
        ));
    }

    #[tokio::test]
    async fn passcode_requires_valid_url_and_totp() {
        let f = fixture(test_config()).await;
        f.engine
            .update_totp("u1", Some(TOTP_SECRET), true)
            .await
            .unwrap();
        let stored = f.store.fetch_identity("u1").await.unwrap();
        assert_ne!(stored.totp_secret.as_deref(), Some(TOTP_SECRET));

        let issued = f
            .engine
            .issue_challenge(ChallengeIntent::Authenticate {
                login_challenge: "lc-1".to_string(),
                subject: "u1".to_string(),
            })
            .await
            .unwrap();
        let url = issued.link().unwrap().to_string();
        let passcode = generate_totp(TOTP_SECRET, T0).unwrap();

        let verified = f
            .engine
            .verify_challenge(PresentedChallenge::Passcode {
                url: url.clone(),
                passcode: passcode.clone(),
            })
            .await
            .unwrap();
        assert_eq!(verified, VerifiedChallenge::Passcode {
            subject: "u1".to_string(),
            login_challenge: "lc-1".to_string(),
        });

        let forged = f
            .engine
            .verify_challenge(PresentedChallenge::Passcode {
                url: url.replace("id=u1", "id=u2"),
                passcode,
            })
            .await;
        assert!(matches!(
            forged,
            Err(ChallengeError::Invalid(TokenInvalid::BadSignature))
        ));
    }

    #[tokio::test]
    async fn totp_cannot_be_required_without_secret() {
        let f = fixture(test_config()).await;
        let result = f.engine.update_totp("u1", None, true).await;
        assert!(matches!(result, Err(ChallengeError::InvalidInput(_))));
        let result = f.engine.update_totp("u1", Some("short"), false).await;
        assert!(matches!(result, Err(ChallengeError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn register_and_authenticate() {
        let f = fixture(test_config()).await;
        let created = f
            .engine
            .register(NewIdentity {
                name: " Grace ".to_string(),
                email: "Grace@Example.com".to_string(),
                password: SecretString::from("hopper"),
            })
            .await
            .unwrap();
        assert_eq!(created.email, "grace@example.com");
        assert_eq!(created.name, "Grace");
        assert!(f
            .engine
            .authenticate_password(&created.id, "hopper")
            .await
            .unwrap()
            .is_some());
        assert!(f
            .engine
            .authenticate_password(&created.id, "wrong")
            .await
            .unwrap()
            .is_none());
        assert!(f
            .engine
            .authenticate_password("ghost", "hopper")
            .await
            .unwrap()
            .is_none());

        let duplicate = f
            .engine
            .register(NewIdentity {
                name: "Other".to_string(),
                email: "grace@example.com".to_string(),
                password: SecretString::from("x"),
            })
            .await;
        assert!(matches!(
            duplicate,
            Err(ChallengeError::Store(StoreError::Conflict))
        ));
    }
}
