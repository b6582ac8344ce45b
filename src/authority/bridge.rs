use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use super::{AcceptLogin, AuthorityError, LoginAuthority, RejectLogin};
use crate::challenge::{
    ChallengeEngine, ChallengeError, ChallengeIntent, PresentedChallenge, VerifiedChallenge,
};

/// Seconds the authority keeps the login session.
pub const DEFAULT_REMEMBER_FOR: u64 = 120;

#[derive(Debug)]
pub struct AuthenticateRequest {
    pub challenge: String,
    pub id: String,
    pub password: SecretString,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct AuthenticateResponse {
    pub id: String,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub totp_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

impl AuthenticateResponse {
    fn denied(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    fn accepted(id: impl Into<String>, redirect_to: String) -> Self {
        Self {
            id: id.into(),
            authenticated: true,
            totp_required: false,
            redirect_to: Some(redirect_to),
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Challenge(#[from] ChallengeError),
    #[error(transparent)]
    Authority(#[from] AuthorityError),
}

/// Turns local login decisions into calls on the [`LoginAuthority`].
#[derive(Clone)]
pub struct AuthorizationBridge {
    engine: ChallengeEngine,
    authority: Arc<dyn LoginAuthority>,
    remember_for: u64,
}

impl std::fmt::Debug for AuthorizationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationBridge")
            .field("engine", &self.engine)
            .field("remember_for", &self.remember_for)
            .finish_non_exhaustive()
    }
}

impl AuthorizationBridge {
    #[must_use]
    pub fn new(engine: ChallengeEngine, authority: Arc<dyn LoginAuthority>) -> Self {
        Self {
            engine,
            authority,
            remember_for: DEFAULT_REMEMBER_FOR,
        }
    }

    #[must_use]
    pub const fn with_remember_for(mut self, seconds: u64) -> Self {
        self.remember_for = seconds;
        self
    }

    #[must_use]
    pub const fn engine(&self) -> &ChallengeEngine {
        &self.engine
    }

    async fn accept(&self, challenge: &str, subject: &str) -> Result<String, AuthorityError> {
        let accept = AcceptLogin {
            subject: subject.to_string(),
            remember: true,
            remember_for: self.remember_for,
        };
        self.authority.accept_login(challenge, &accept).await
    }

    /// Password step of a browser login.
    ///
    /// An unknown id or a wrong password yields `authenticated: false`
    /// without touching the authority, so the user can try again on the same
    /// login challenge.
    ///
    /// # Errors
    /// Authority failures and internal engine errors.
    #[instrument(skip_all, fields(id = %request.id))]
    pub async fn authenticate(
        &self,
        request: AuthenticateRequest,
    ) -> Result<AuthenticateResponse, BridgeError> {
        let context = self.authority.fetch_login(&request.challenge).await?;

        if context.skip {
            let redirect_to = self.accept(&request.challenge, &context.subject).await?;
            debug!(subject = %context.subject, "authority session reused");
            return Ok(AuthenticateResponse::accepted(context.subject, redirect_to));
        }

        if request.id.trim().is_empty() {
            return Ok(AuthenticateResponse::denied(request.id));
        }

        let Some(identity) = self
            .engine
            .authenticate_password(&request.id, request.password.expose_secret())
            .await?
        else {
            debug!("authenticated: false");
            return Ok(AuthenticateResponse::denied(request.id));
        };

        if identity.totp_required {
            let issued = self
                .engine
                .issue_challenge(ChallengeIntent::Authenticate {
                    login_challenge: request.challenge,
                    subject: identity.id.clone(),
                })
                .await?;
            debug!("password accepted, passcode required");
            return Ok(AuthenticateResponse {
                id: identity.id,
                authenticated: false,
                totp_required: true,
                redirect_to: issued.link().map(str::to_string),
            });
        }

        let redirect_to = self.accept(&request.challenge, &identity.id).await?;
        debug!(redirect_to = %redirect_to, "authenticated: true");
        Ok(AuthenticateResponse::accepted(identity.id, redirect_to))
    }

    /// Second factor step: the capability URL from [`Self::authenticate`]
    /// plus a TOTP passcode.
    ///
    /// # Errors
    /// Authority failures and internal engine errors. Rejections are
    /// reported as `authenticated: false`.
    #[instrument(skip_all)]
    pub async fn verify_passcode(
        &self,
        url: String,
        passcode: String,
    ) -> Result<AuthenticateResponse, BridgeError> {
        let verified = match self
            .engine
            .verify_challenge(PresentedChallenge::Passcode { url, passcode })
            .await
        {
            Ok(verified) => verified,
            Err(err) if err.is_rejection() => return Ok(AuthenticateResponse::denied("")),
            Err(err) => return Err(err.into()),
        };

        match verified {
            VerifiedChallenge::Passcode {
                subject,
                login_challenge,
            } => {
                let redirect_to = self.accept(&login_challenge, &subject).await?;
                Ok(AuthenticateResponse::accepted(subject, redirect_to))
            }
            _ => Ok(AuthenticateResponse::denied("")),
        }
    }

    /// Explicitly refuse a login challenge.
    ///
    /// # Errors
    /// Authority failures.
    #[instrument(skip(self))]
    pub async fn reject(
        &self,
        challenge: &str,
        reason: &str,
    ) -> Result<AuthenticateResponse, BridgeError> {
        let reject = RejectLogin {
            error: "access_denied".to_string(),
            error_description: reason.to_string(),
        };
        let redirect_to = self.authority.reject_login(challenge, &reject).await?;
        Ok(AuthenticateResponse {
            redirect_to: Some(redirect_to),
            ..AuthenticateResponse::default()
        })
    }
}
