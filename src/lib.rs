//! # idp (Challenge & Credential Token Engine)
//!
//! `idp` is an identity provider backend. It owns identity records, checks
//! credentials and issues short-lived challenge tokens that gate sensitive
//! state transitions: login, password recovery, account deletion, email
//! confirmation and email change.
//!
//! ## Token formats
//!
//! Three schemes with different trust models are used and never mixed:
//!
//! - **Capability URL:** a redirect URL whose query (`challenge`, `id`) is
//!   covered by an HMAC-SHA256 `sig` parameter. Integrity only.
//! - **Signed claim:** an RS256 compact JWS carrying the hash of a one-time
//!   code. The plaintext code travels on a separate channel (email).
//! - **Sealed blob:** an AES-256-GCM encrypted completion payload used to
//!   finish a password recovery.
//!
//! ## Login authority
//!
//! Browser logins are completed against an external OAuth2/OIDC login and
//! consent authority (Hydra admin API). The [`authority::AuthorizationBridge`]
//! translates a local authenticate/deny decision into that protocol.
//!
//! Every verification path is deny-by-default: anything that does not
//! explicitly reach an accept branch resolves to a rejection.

pub mod api;
pub mod authority;
pub mod challenge;
pub mod cli;
pub mod credentials;
pub mod identity;
pub mod mail;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
