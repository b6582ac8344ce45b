//! Login and consent authority port.
//!
//! Browser logins are owned by an external OAuth2/OIDC authority. Locally we
//! only decide whether a login challenge is accepted or rejected and report
//! that decision back over the authority's admin API. The same authority
//! introspects the access tokens API callers present.

mod bridge;
mod hydra;

pub use bridge::{
    AuthenticateRequest, AuthenticateResponse, AuthorizationBridge, BridgeError, DEFAULT_REMEMBER_FOR,
};
pub use hydra::{HydraClient, HydraEndpoints};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the authority knows about a pending login.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct LoginContext {
    /// The authority already has a session for `subject`.
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub subject: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AcceptLogin {
    pub subject: String,
    pub remember: bool,
    pub remember_for: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RejectLogin {
    pub error: String,
    pub error_description: String,
}

/// RFC 7662 introspection answer, reduced to what authorization needs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Introspection {
    #[serde(default)]
    pub active: bool,
    /// Space separated.
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub client_id: String,
}

impl Introspection {
    /// Inactive tokens grant nothing.
    #[must_use]
    pub fn grants(&self, scope: &str) -> bool {
        self.active && self.scope.split_whitespace().any(|granted| granted == scope)
    }
}

#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("authority request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("authority returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("authority response has no redirect_to")]
    MissingRedirect,
}

#[async_trait]
pub trait LoginAuthority: Send + Sync {
    async fn fetch_login(&self, challenge: &str) -> Result<LoginContext, AuthorityError>;

    /// Returns the URL the browser must be sent to next.
    async fn accept_login(
        &self,
        challenge: &str,
        accept: &AcceptLogin,
    ) -> Result<String, AuthorityError>;

    /// Returns the URL the browser must be sent to next.
    async fn reject_login(
        &self,
        challenge: &str,
        reject: &RejectLogin,
    ) -> Result<String, AuthorityError>;
}

#[async_trait]
pub trait TokenIntrospector: Send + Sync {
    async fn introspect(&self, token: &str) -> Result<Introspection, AuthorityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_needs_an_active_token_and_an_exact_scope() {
        let introspection = Introspection {
            active: true,
            scope: "openid idp:update:humans:totp".to_string(),
            ..Introspection::default()
        };
        assert!(introspection.grants("idp:update:humans:totp"));
        assert!(!introspection.grants("idp:update:humans"));
        assert!(!Introspection {
            active: false,
            ..introspection
        }
        .grants("idp:update:humans:totp"));
    }
}
