//! Challenge lifecycle engine.
//!
//! A challenge is issued for an intent, travels to the user as a capability
//! URL, a signed claim or a stored code, and is later presented back for
//! verification. Only outstanding codes are persisted.

mod clock;
mod config;
mod engine;
mod error;
pub mod formats;
mod intent;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ChallengeConfig, ChallengeKeys};
pub use engine::{ChallengeEngine, NewIdentity};
pub(crate) use error::deny_missing;
pub use error::ChallengeError;
pub use intent::{
    ChallengeArtifact, ChallengeIntent, ChallengeKind, IssuedChallenge, PresentedChallenge,
    VerifiedChallenge,
};
