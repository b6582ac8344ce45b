//! Identity records and the store port the engine reads and writes through.
//!
//! Every write is one short transaction and returns the post-mutation
//! entity. Password and TOTP secret only ever reach the store hashed or
//! encrypted.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

mod memory;
mod postgres;

pub use memory::MemoryIdentityStore;
pub use postgres::PgIdentityStore;

static EMAIL_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    EMAIL_RE
        .as_ref()
        .is_some_and(|regex| regex.is_match(email_normalized))
}

/// Opaque, stable subject identifier.
pub type SubjectId = String;

/// A hashed one-time code awaiting verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutstandingCode {
    pub hash: String,
    /// Unix seconds.
    pub expires_at: i64,
}

impl OutstandingCode {
    #[must_use]
    pub const fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Which outstanding code slot a write targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeKind {
    Recover,
    Delete,
    Email,
}

impl CodeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Recover => "recover",
            Self::Delete => "delete",
            Self::Email => "email",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: SubjectId,
    pub name: String,
    pub email: String,
    pub email_confirmed: bool,
    pub password_hash: String,
    pub totp_required: bool,
    /// AES-256-GCM ciphertext of the base32 secret.
    pub totp_secret: Option<String>,
    pub recover_code: Option<OutstandingCode>,
    pub delete_code: Option<OutstandingCode>,
    /// Code of the latest EmailConfirm or EmailChange issue.
    pub email_code: Option<OutstandingCode>,
}

impl Identity {
    #[must_use]
    pub const fn outstanding_code(&self, kind: CodeKind) -> Option<&OutstandingCode> {
        match kind {
            CodeKind::Recover => self.recover_code.as_ref(),
            CodeKind::Delete => self.delete_code.as_ref(),
            CodeKind::Email => self.email_code.as_ref(),
        }
    }

    pub(crate) fn outstanding_code_mut(&mut self, kind: CodeKind) -> &mut Option<OutstandingCode> {
        match kind {
            CodeKind::Recover => &mut self.recover_code,
            CodeKind::Delete => &mut self.delete_code,
            CodeKind::Email => &mut self.email_code,
        }
    }

    #[must_use]
    pub fn public_view(&self) -> IdentityView {
        IdentityView {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            email_confirmed: self.email_confirmed,
            totp_required: self.totp_required,
        }
    }
}

/// The fields of an identity safe to return to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct IdentityView {
    pub id: SubjectId,
    pub name: String,
    pub email: String,
    pub email_confirmed: bool,
    pub totp_required: bool,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("identity not found")]
    NotFound,
    #[error("identity already exists")]
    Conflict,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to decode identity row: {0}")]
    Decode(String),
}

impl StoreError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn fetch_identity(&self, id: &str) -> Result<Identity, StoreError>;

    /// Lookup by subject id, or by email when no id matches.
    async fn fetch_identity_by_email_or_id(&self, key: &str) -> Result<Identity, StoreError>;

    /// Fails with `Conflict` when the id or email is taken.
    async fn create_identity(&self, identity: Identity) -> Result<Identity, StoreError>;

    /// Rotate the password hash. Clears any outstanding recover code.
    async fn update_password(&self, id: &str, password_hash: &str) -> Result<Identity, StoreError>;

    async fn update_totp(
        &self,
        id: &str,
        encrypted_secret: Option<String>,
        required: bool,
    ) -> Result<Identity, StoreError>;

    /// Overwrite the outstanding code of `kind` (last write wins).
    async fn update_outstanding_code(
        &self,
        id: &str,
        kind: CodeKind,
        code: OutstandingCode,
    ) -> Result<Identity, StoreError>;

    /// Clear the outstanding code of `kind` only if it still holds
    /// `expected_hash`. Returns whether a code was consumed.
    async fn clear_outstanding_code(
        &self,
        id: &str,
        kind: CodeKind,
        expected_hash: &str,
    ) -> Result<bool, StoreError>;

    /// Delete the identity only if its outstanding delete code still holds
    /// `expected_hash`. Returns whether a row was deleted.
    async fn delete_identity(&self, id: &str, expected_hash: &str) -> Result<bool, StoreError>;

    /// Commit `email`, mark it confirmed and clear the email code, only if
    /// the outstanding email code still holds `expected_hash`. `None` when it
    /// no longer does.
    async fn update_email(
        &self,
        id: &str,
        email: &str,
        expected_hash: &str,
    ) -> Result<Option<Identity>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization_and_format() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
        assert!(valid_email("a@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn outstanding_code_expiry_is_inclusive() {
        let code = OutstandingCode {
            hash: "h".to_string(),
            expires_at: 100,
        };
        assert!(!code.is_expired(99));
        assert!(code.is_expired(100));
    }

    #[test]
    fn code_slots_are_independent() {
        let mut identity = Identity {
            id: "u1".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            email_confirmed: false,
            password_hash: String::new(),
            totp_required: false,
            totp_secret: None,
            recover_code: None,
            delete_code: None,
            email_code: None,
        };
        *identity.outstanding_code_mut(CodeKind::Delete) = Some(OutstandingCode {
            hash: "d".to_string(),
            expires_at: 1,
        });
        assert!(identity.outstanding_code(CodeKind::Recover).is_none());
        assert_eq!(
            identity.outstanding_code(CodeKind::Delete).map(|c| c.hash.as_str()),
            Some("d")
        );
        assert!(identity.outstanding_code(CodeKind::Email).is_none());
        assert_eq!(CodeKind::Recover.as_str(), "recover");
        assert_eq!(CodeKind::Email.as_str(), "email");
    }
}
