use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::path::PathBuf;

use crate::identity::{normalize_email, valid_email};
use crate::mail::SmtpSettings;

pub const ARG_PROVIDER_NAME: &str = "provider-name";
pub const ARG_PROVIDER_EMAIL: &str = "provider-email";
pub const ARG_TEMPLATE_DIR: &str = "template-dir";
pub const ARG_SMTP_HOST: &str = "smtp-host";
pub const ARG_SMTP_PORT: &str = "smtp-port";
pub const ARG_SMTP_USERNAME: &str = "smtp-username";
pub const ARG_SMTP_PASSWORD: &str = "smtp-password";
pub const ARG_SMTP_INSECURE: &str = "smtp-insecure";

#[derive(Debug, Clone)]
pub struct Options {
    pub provider_name: String,
    pub provider_email: String,
    pub template_dir: Option<PathBuf>,
    /// `None` logs mails instead of sending them.
    pub smtp: Option<SmtpSettings>,
}

impl Options {
    /// Parse mail arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the provider email is not a valid address.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let provider_email = matches
            .get_one::<String>(ARG_PROVIDER_EMAIL)
            .map(|email| normalize_email(email))
            .filter(|email| valid_email(email))
            .context("invalid --provider-email")?;

        Ok(Self {
            provider_name: matches
                .get_one::<String>(ARG_PROVIDER_NAME)
                .cloned()
                .unwrap_or_default(),
            provider_email,
            template_dir: matches.get_one::<PathBuf>(ARG_TEMPLATE_DIR).cloned(),
            smtp: smtp_settings(matches),
        })
    }
}

fn smtp_settings(matches: &ArgMatches) -> Option<SmtpSettings> {
    let host = matches.get_one::<String>(ARG_SMTP_HOST)?;
    Some(SmtpSettings {
        host: host.clone(),
        port: matches.get_one::<u16>(ARG_SMTP_PORT).copied().unwrap_or(587),
        username: matches.get_one::<String>(ARG_SMTP_USERNAME).cloned(),
        password: matches
            .get_one::<String>(ARG_SMTP_PASSWORD)
            .map(|password| SecretString::from(password.as_str())),
        insecure: matches.get_flag(ARG_SMTP_INSECURE),
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PROVIDER_NAME)
                .long(ARG_PROVIDER_NAME)
                .help("Sender name shown in mails")
                .env("IDP_PROVIDER_NAME")
                .default_value("idp"),
        )
        .arg(
            Arg::new(ARG_PROVIDER_EMAIL)
                .long(ARG_PROVIDER_EMAIL)
                .help("Sender address of mails")
                .env("IDP_PROVIDER_EMAIL")
                .default_value("no-reply@localhost.localdomain"),
        )
        .arg(
            Arg::new(ARG_TEMPLATE_DIR)
                .long(ARG_TEMPLATE_DIR)
                .help("Directory with <kind>.txt mail templates overriding the built-in ones")
                .env("IDP_TEMPLATE_DIR")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long(ARG_SMTP_HOST)
                .help("SMTP relay host; without it mails are only logged")
                .env("IDP_SMTP_HOST"),
        )
        .arg(
            Arg::new(ARG_SMTP_PORT)
                .long(ARG_SMTP_PORT)
                .help("SMTP relay port, 465 for implicit TLS")
                .env("IDP_SMTP_PORT")
                .default_value("587")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_SMTP_USERNAME)
                .long(ARG_SMTP_USERNAME)
                .help("SMTP username")
                .env("IDP_SMTP_USERNAME")
                .requires(ARG_SMTP_PASSWORD),
        )
        .arg(
            Arg::new(ARG_SMTP_PASSWORD)
                .long(ARG_SMTP_PASSWORD)
                .help("SMTP password")
                .env("IDP_SMTP_PASSWORD")
                .hide_env_values(true)
                .requires(ARG_SMTP_USERNAME),
        )
        .arg(
            Arg::new(ARG_SMTP_INSECURE)
                .long(ARG_SMTP_INSECURE)
                .help("Talk plain SMTP without TLS")
                .env("IDP_SMTP_INSECURE")
                .action(ArgAction::SetTrue),
        )
}
