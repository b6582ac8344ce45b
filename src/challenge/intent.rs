use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::identity::SubjectId;

/// Field-less discriminant of [`ChallengeIntent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeKind {
    Authenticate,
    Recover,
    Delete,
    EmailConfirm,
    EmailChange,
}

impl ChallengeKind {
    pub const ALL: [Self; 5] = [
        Self::Authenticate,
        Self::Recover,
        Self::Delete,
        Self::EmailConfirm,
        Self::EmailChange,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authenticate => "authenticate",
            Self::Recover => "recover",
            Self::Delete => "delete",
            Self::EmailConfirm => "emailconfirm",
            Self::EmailChange => "emailchange",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| format!("unknown challenge kind: {value}"))
    }
}

/// A request to open a challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChallengeIntent {
    /// Second factor step of a login: a capability URL bound to the
    /// authority's login challenge.
    Authenticate {
        login_challenge: String,
        subject: SubjectId,
    },
    /// `subject` may be an id or an email address.
    Recover { subject: SubjectId },
    Delete { subject: SubjectId },
    EmailConfirm { subject: SubjectId },
    EmailChange {
        subject: SubjectId,
        new_email: String,
    },
}

impl ChallengeIntent {
    #[must_use]
    pub const fn kind(&self) -> ChallengeKind {
        match self {
            Self::Authenticate { .. } => ChallengeKind::Authenticate,
            Self::Recover { .. } => ChallengeKind::Recover,
            Self::Delete { .. } => ChallengeKind::Delete,
            Self::EmailConfirm { .. } => ChallengeKind::EmailConfirm,
            Self::EmailChange { .. } => ChallengeKind::EmailChange,
        }
    }
}

/// What a caller hands back to complete a challenge.
#[derive(Debug)]
pub enum PresentedChallenge {
    /// Capability URL from the login step plus a TOTP passcode.
    Passcode { url: String, passcode: String },
    /// Signed recover claim, mailed code and the new password.
    Recover {
        token: String,
        code: String,
        new_password: SecretString,
    },
    /// Sealed blob returned by a successful `Recover` verification.
    RecoverCompletion { blob: String },
    Delete { subject: SubjectId, code: String },
    EmailConfirm { token: String, code: String },
    EmailChange { token: String, code: String },
}

impl PresentedChallenge {
    #[must_use]
    pub const fn kind(&self) -> ChallengeKind {
        match self {
            Self::Passcode { .. } => ChallengeKind::Authenticate,
            Self::Recover { .. } | Self::RecoverCompletion { .. } => ChallengeKind::Recover,
            Self::Delete { .. } => ChallengeKind::Delete,
            Self::EmailConfirm { .. } => ChallengeKind::EmailConfirm,
            Self::EmailChange { .. } => ChallengeKind::EmailChange,
        }
    }
}

/// The artifact produced for an intent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChallengeArtifact {
    CapabilityUrl(String),
    /// Signed claim and the link that carries it.
    SignedClaim { token: String, link: String },
    /// Only a hashed code was stored; nothing travels but the code itself.
    StoredCode,
}

#[derive(Debug)]
pub struct IssuedChallenge {
    pub kind: ChallengeKind,
    pub subject: SubjectId,
    pub artifact: ChallengeArtifact,
    /// Plaintext one-time code for out-of-band delivery.
    pub code: Option<SecretString>,
    pub deliver_to: Option<String>,
    /// Display name of the recipient, for mail templates.
    pub recipient_name: Option<String>,
    pub expires_at: Option<i64>,
}

impl IssuedChallenge {
    /// The link to put in front of the user, if the artifact has one.
    #[must_use]
    pub fn link(&self) -> Option<&str> {
        match &self.artifact {
            ChallengeArtifact::CapabilityUrl(url) => Some(url),
            ChallengeArtifact::SignedClaim { link, .. } => Some(link),
            ChallengeArtifact::StoredCode => None,
        }
    }
}

/// Outcome of an accepted verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifiedChallenge {
    Passcode {
        subject: SubjectId,
        login_challenge: String,
    },
    Recovered {
        subject: SubjectId,
        completion: String,
        redirect_to: String,
    },
    PasswordRotated { subject: SubjectId },
    Deleted { subject: SubjectId },
    EmailCommitted { subject: SubjectId, email: String },
}

impl VerifiedChallenge {
    #[must_use]
    pub fn subject(&self) -> &str {
        match self {
            Self::Passcode { subject, .. }
            | Self::Recovered { subject, .. }
            | Self::PasswordRotated { subject }
            | Self::Deleted { subject }
            | Self::EmailCommitted { subject, .. } => subject,
        }
    }
}
