use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{fs, sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    api::{self, ApiState, BulkLimit},
    authority::{AuthorizationBridge, HydraClient},
    challenge::{ChallengeConfig, ChallengeEngine, ChallengeKeys},
    cli::commands::{authority, challenge, keys, mail},
    credentials::{ClaimSigner, ClaimVerifier, HashingCost, SymmetricKey, UrlSigningKey},
    identity::{IdentityStore, MemoryIdentityStore, PgIdentityStore},
    mail::{LogMailSender, MailSender, Mailer, Provider, SmtpMailSender, TemplateMap},
};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub bulk_max_requests: usize,
    pub authority: authority::Options,
    pub keys: keys::Options,
    pub challenge: challenge::Options,
    pub mail: mail::Options,
}

/// Build the key set from PEM files and base64 secrets.
///
/// # Errors
/// Returns an error if a key file cannot be read or a key does not parse.
pub fn load_keys(options: &keys::Options) -> Result<ChallengeKeys> {
    let signing_pem = fs::read_to_string(&options.signing_key_path)
        .with_context(|| format!("Failed to read signing key: {}", options.signing_key_path))?;
    let claim_signer = ClaimSigner::from_pem(&signing_pem).context("Invalid signing key")?;

    let claim_verifier = match &options.verify_key_path {
        Some(path) => {
            let pem = fs::read_to_string(path)
                .with_context(|| format!("Failed to read verify key: {path}"))?;
            ClaimVerifier::from_pem(&pem).context("Invalid verify key")?
        }
        None => claim_signer.verifier(),
    };

    Ok(ChallengeKeys {
        claim_signer,
        claim_verifier,
        url_key: UrlSigningKey::new(options.url_signing_key.expose_secret().as_bytes())
            .context("Invalid URL signing key")?,
        completion_key: SymmetricKey::from_base64(options.completion_key.expose_secret())
            .context("Invalid completion key")?,
        totp_key: SymmetricKey::from_base64(options.totp_key.expose_secret())
            .context("Invalid TOTP key")?,
    })
}

/// Apply parsed challenge options on top of the defaults.
#[must_use]
pub fn build_config(options: challenge::Options, keys: ChallengeKeys) -> ChallengeConfig {
    let challenge::Options {
        issuer,
        audience,
        public_base_url,
        pages,
        code_length,
        timeouts,
        hashing,
    } = options;

    let mut config = ChallengeConfig::new(issuer, audience, &public_base_url, keys)
        .with_code_length(code_length)
        .with_recover_timeout_seconds(timeouts.recover_seconds)
        .with_delete_timeout_seconds(timeouts.delete_seconds)
        .with_email_timeout_seconds(timeouts.email_seconds)
        .with_completion_timeout_seconds(timeouts.completion_seconds)
        .with_hashing_cost(HashingCost::new(
            hashing.memory_kib,
            hashing.iterations,
            hashing.parallelism,
        ));

    if let Some(url) = pages.passcode {
        config = config.with_passcode_url(url);
    }
    if let Some(url) = pages.recover {
        config = config.with_recover_url(url);
    }
    if let Some(url) = pages.recover_completion {
        config = config.with_recover_completion_url(url);
    }
    if let Some(url) = pages.email {
        config = config.with_email_url(url);
    }
    config
}

/// Connect the identity store. With a DSN the schema is applied before the
/// pool is handed out; without one identities live in memory.
async fn identity_store(dsn: Option<&str>) -> Result<(Arc<dyn IdentityStore>, Option<PgPool>)> {
    match dsn {
        Some(dsn) => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(dsn)
                .await
                .context("Failed to connect to database")?;
            let store = PgIdentityStore::new(pool.clone());
            store
                .migrate()
                .await
                .context("Failed to apply database schema")?;
            info!("Database schema applied");
            Ok((Arc::new(store), Some(pool)))
        }
        None => {
            warn!("No database configured, identities are kept in memory");
            Ok((Arc::new(MemoryIdentityStore::new()), None))
        }
    }
}

fn mail_sender(options: &mail::Options) -> Result<Arc<dyn MailSender>> {
    match &options.smtp {
        Some(smtp) => {
            info!(host = %smtp.host, port = smtp.port, "Sending mail through SMTP relay");
            Ok(Arc::new(
                SmtpMailSender::new(smtp.clone()).context("Failed to build SMTP transport")?,
            ))
        }
        None => {
            warn!("No SMTP relay configured, mails are only logged");
            Ok(Arc::new(LogMailSender))
        }
    }
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if keys or templates fail to load, the database is
/// unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let keys = load_keys(&args.keys)?;
    let config = build_config(args.challenge, keys);
    info!(
        issuer = config.issuer(),
        audience = config.audience(),
        "Challenge configuration loaded"
    );

    let (store, database) = identity_store(args.dsn.as_deref()).await?;
    let engine = ChallengeEngine::new(Arc::new(config), store);

    let authority = Arc::new(
        HydraClient::new(args.authority.admin_url, args.authority.endpoints)
            .context("Failed to build login authority client")?,
    );
    let bridge = AuthorizationBridge::new(engine.clone(), authority.clone())
        .with_remember_for(args.authority.remember_for);

    let templates = match &args.mail.template_dir {
        Some(dir) => TemplateMap::from_dir(dir)?,
        None => TemplateMap::default(),
    };
    let mailer = Mailer::new(
        Arc::new(templates),
        mail_sender(&args.mail)?,
        Provider {
            name: args.mail.provider_name,
            email: args.mail.provider_email,
        },
    );

    api::new(
        args.port,
        ApiState {
            engine,
            bridge,
            mailer,
            bulk_limit: BulkLimit(args.bulk_max_requests),
            introspector: authority,
            database,
        },
    )
    .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::commands::challenge::{Hashing, Pages, Timeouts};
    use secrecy::SecretString;
    use url::Url;

    const AES_KEY_B64: &str = "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=";

    fn fixture(name: &str) -> String {
        format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
    }

    fn key_options(verify_key_path: Option<String>) -> keys::Options {
        keys::Options {
            signing_key_path: fixture("recover_signing_key.pem"),
            verify_key_path,
            url_signing_key: SecretString::from("url-secret"),
            completion_key: SecretString::from(AES_KEY_B64),
            totp_key: SecretString::from(AES_KEY_B64),
        }
    }

    #[test]
    fn keys_from_fixtures() {
        assert!(load_keys(&key_options(None)).is_ok());
        assert!(load_keys(&key_options(Some(fixture("recover_verify_key.pem")))).is_ok());
    }

    #[test]
    fn missing_key_file() {
        let mut options = key_options(None);
        options.signing_key_path = fixture("missing.pem");
        let err = load_keys(&options).unwrap_err();
        assert!(err.to_string().contains("Failed to read signing key"));
    }

    #[test]
    fn short_aes_key_is_rejected() {
        let mut options = key_options(None);
        options.totp_key = SecretString::from("c2hvcnQ=");
        let err = load_keys(&options).unwrap_err();
        assert!(err.to_string().contains("Invalid TOTP key"));
    }

    #[test]
    fn page_overrides_are_applied() {
        let keys = load_keys(&key_options(None)).unwrap();
        let options = challenge::Options {
            issuer: "https://id.example.com".to_string(),
            audience: "idp".to_string(),
            public_base_url: Url::parse("https://id.example.com").unwrap(),
            pages: Pages {
                recover: Some(Url::parse("https://reset.example.com/go").unwrap()),
                ..Pages::default()
            },
            code_length: 6,
            timeouts: Timeouts {
                recover_seconds: 120,
                delete_seconds: 60,
                email_seconds: 3600,
                completion_seconds: 300,
            },
            hashing: Hashing {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
        };
        let config = build_config(options, keys);
        assert_eq!(config.issuer(), "https://id.example.com");
        assert_eq!(config.code_length(), 6);
        assert_eq!(config.recover_timeout_seconds(), 120);
        assert_eq!(config.recover_url().as_str(), "https://reset.example.com/go");
        assert_eq!(
            config.email_url().as_str(),
            "https://id.example.com/email/verify"
        );
    }

    #[tokio::test]
    async fn memory_store_without_dsn() {
        let (store, database) = identity_store(None).await.unwrap();
        assert!(database.is_none());
        assert!(store.fetch_identity("nobody").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn log_sender_without_smtp_host() {
        let mut options = mail::Options {
            provider_name: "idp".to_string(),
            provider_email: "no-reply@example.com".to_string(),
            template_dir: None,
            smtp: None,
        };
        assert!(mail_sender(&options).is_ok());

        options.smtp = Some(crate::mail::SmtpSettings {
            host: "localhost".to_string(),
            port: 25,
            username: None,
            password: None,
            insecure: true,
        });
        assert!(mail_sender(&options).is_ok());
    }
}
