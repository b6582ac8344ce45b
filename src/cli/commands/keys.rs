use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_SIGNING_KEY_PATH: &str = "signing-key-path";
pub const ARG_VERIFY_KEY_PATH: &str = "verify-key-path";
pub const ARG_URL_SIGNING_KEY: &str = "url-signing-key";
pub const ARG_COMPLETION_KEY: &str = "completion-key";
pub const ARG_TOTP_KEY: &str = "totp-key";

/// Key material locations and secrets. Secrets stay wrapped until the keys
/// are built.
#[derive(Debug, Clone)]
pub struct Options {
    pub signing_key_path: String,
    pub verify_key_path: Option<String>,
    pub url_signing_key: SecretString,
    pub completion_key: SecretString,
    pub totp_key: SecretString,
}

impl Options {
    /// Parse key arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a required key argument is missing or empty.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let required = |id: &str| -> Result<String> {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("missing required argument: --{id}"))
        };

        Ok(Self {
            signing_key_path: required(ARG_SIGNING_KEY_PATH)?,
            verify_key_path: matches
                .get_one::<String>(ARG_VERIFY_KEY_PATH)
                .cloned()
                .filter(|v| !v.trim().is_empty()),
            url_signing_key: SecretString::from(required(ARG_URL_SIGNING_KEY)?),
            completion_key: SecretString::from(required(ARG_COMPLETION_KEY)?),
            totp_key: SecretString::from(required(ARG_TOTP_KEY)?),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SIGNING_KEY_PATH)
                .long(ARG_SIGNING_KEY_PATH)
                .help("PEM file with the RSA private key used to sign challenge claims")
                .env("IDP_SIGNING_KEY_PATH")
                .required(true),
        )
        .arg(
            Arg::new(ARG_VERIFY_KEY_PATH)
                .long(ARG_VERIFY_KEY_PATH)
                .help("PEM file with the RSA public key; derived from the signing key if omitted")
                .env("IDP_VERIFY_KEY_PATH"),
        )
        .arg(
            Arg::new(ARG_URL_SIGNING_KEY)
                .long(ARG_URL_SIGNING_KEY)
                .help("HMAC key for capability URLs")
                .env("IDP_URL_SIGNING_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_COMPLETION_KEY)
                .long(ARG_COMPLETION_KEY)
                .help("Base64 AES-256 key sealing recovery completion blobs")
                .env("IDP_COMPLETION_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOTP_KEY)
                .long(ARG_TOTP_KEY)
                .help("Base64 AES-256 key encrypting stored TOTP secrets")
                .env("IDP_TOTP_KEY")
                .hide_env_values(true)
                .required(true),
        )
}
