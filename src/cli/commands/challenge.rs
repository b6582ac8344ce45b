use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use url::Url;

pub const ARG_ISSUER: &str = "issuer";
pub const ARG_AUDIENCE: &str = "audience";
pub const ARG_PUBLIC_BASE_URL: &str = "public-base-url";
pub const ARG_PASSCODE_URL: &str = "passcode-url";
pub const ARG_RECOVER_URL: &str = "recover-url";
pub const ARG_RECOVER_COMPLETION_URL: &str = "recover-completion-url";
pub const ARG_EMAIL_URL: &str = "email-url";
pub const ARG_CODE_LENGTH: &str = "code-length";
pub const ARG_RECOVER_TIMEOUT: &str = "recover-timeout-seconds";
pub const ARG_DELETE_TIMEOUT: &str = "delete-timeout-seconds";
pub const ARG_EMAIL_TIMEOUT: &str = "email-timeout-seconds";
pub const ARG_COMPLETION_TIMEOUT: &str = "completion-timeout-seconds";
pub const ARG_HASH_MEMORY_KIB: &str = "hash-memory-kib";
pub const ARG_HASH_ITERATIONS: &str = "hash-iterations";
pub const ARG_HASH_PARALLELISM: &str = "hash-parallelism";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    pub recover_seconds: i64,
    pub delete_seconds: i64,
    pub email_seconds: i64,
    pub completion_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hashing {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

/// Overrides for the pages links point at. Unset pages live under the
/// public base URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pages {
    pub passcode: Option<Url>,
    pub recover: Option<Url>,
    pub recover_completion: Option<Url>,
    pub email: Option<Url>,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub issuer: String,
    pub audience: String,
    pub public_base_url: Url,
    pub pages: Pages,
    pub code_length: usize,
    pub timeouts: Timeouts,
    pub hashing: Hashing,
}

fn parse_url(matches: &ArgMatches, id: &str) -> Result<Option<Url>> {
    matches
        .get_one::<String>(id)
        .filter(|v| !v.trim().is_empty())
        .map(|v| Url::parse(v).with_context(|| format!("invalid --{id}: {v}")))
        .transpose()
}

impl Options {
    /// Parse challenge arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a URL argument does not parse.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let string = |id: &str| matches.get_one::<String>(id).cloned().unwrap_or_default();
        let seconds = |id: &str| matches.get_one::<i64>(id).copied().unwrap_or_default();
        let cost = |id: &str| matches.get_one::<u32>(id).copied().unwrap_or(1);

        let public_base_url = parse_url(matches, ARG_PUBLIC_BASE_URL)?
            .context("missing required argument: --public-base-url")?;

        Ok(Self {
            issuer: string(ARG_ISSUER),
            audience: string(ARG_AUDIENCE),
            public_base_url,
            pages: Pages {
                passcode: parse_url(matches, ARG_PASSCODE_URL)?,
                recover: parse_url(matches, ARG_RECOVER_URL)?,
                recover_completion: parse_url(matches, ARG_RECOVER_COMPLETION_URL)?,
                email: parse_url(matches, ARG_EMAIL_URL)?,
            },
            code_length: matches
                .get_one::<usize>(ARG_CODE_LENGTH)
                .copied()
                .unwrap_or(crate::credentials::DEFAULT_CODE_LENGTH),
            timeouts: Timeouts {
                recover_seconds: seconds(ARG_RECOVER_TIMEOUT),
                delete_seconds: seconds(ARG_DELETE_TIMEOUT),
                email_seconds: seconds(ARG_EMAIL_TIMEOUT),
                completion_seconds: seconds(ARG_COMPLETION_TIMEOUT),
            },
            hashing: Hashing {
                memory_kib: cost(ARG_HASH_MEMORY_KIB),
                iterations: cost(ARG_HASH_ITERATIONS),
                parallelism: cost(ARG_HASH_PARALLELISM),
            },
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_page_args(command);
    let command = with_timeout_args(command);
    with_hashing_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ISSUER)
                .long(ARG_ISSUER)
                .help("Issuer written to and required on signed claims")
                .env("IDP_ISSUER")
                .default_value("idp"),
        )
        .arg(
            Arg::new(ARG_AUDIENCE)
                .long(ARG_AUDIENCE)
                .help("Audience written to and required on signed claims")
                .env("IDP_AUDIENCE")
                .default_value("idp"),
        )
        .arg(
            Arg::new(ARG_CODE_LENGTH)
                .long(ARG_CODE_LENGTH)
                .help("Length of mailed one-time codes")
                .env("IDP_CODE_LENGTH")
                .default_value("8")
                .value_parser(clap::value_parser!(usize)),
        )
}

fn with_page_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PUBLIC_BASE_URL)
                .long(ARG_PUBLIC_BASE_URL)
                .help("Base URL of the user facing pages links point at")
                .env("IDP_PUBLIC_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_PASSCODE_URL)
                .long(ARG_PASSCODE_URL)
                .help("Passcode page, default <public-base-url>/passcode")
                .env("IDP_PASSCODE_URL"),
        )
        .arg(
            Arg::new(ARG_RECOVER_URL)
                .long(ARG_RECOVER_URL)
                .help("Recovery page, default <public-base-url>/recover")
                .env("IDP_RECOVER_URL"),
        )
        .arg(
            Arg::new(ARG_RECOVER_COMPLETION_URL)
                .long(ARG_RECOVER_COMPLETION_URL)
                .help("Recovery completion page, default <public-base-url>/recover/complete")
                .env("IDP_RECOVER_COMPLETION_URL"),
        )
        .arg(
            Arg::new(ARG_EMAIL_URL)
                .long(ARG_EMAIL_URL)
                .help("Email verification page, default <public-base-url>/email/verify")
                .env("IDP_EMAIL_URL"),
        )
}

fn with_timeout_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RECOVER_TIMEOUT)
                .long(ARG_RECOVER_TIMEOUT)
                .help("Lifetime of a recovery challenge in seconds")
                .env("IDP_RECOVER_TIMEOUT_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_DELETE_TIMEOUT)
                .long(ARG_DELETE_TIMEOUT)
                .help("Lifetime of a delete challenge in seconds")
                .env("IDP_DELETE_TIMEOUT_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_EMAIL_TIMEOUT)
                .long(ARG_EMAIL_TIMEOUT)
                .help("Lifetime of an email confirm or change challenge in seconds")
                .env("IDP_EMAIL_TIMEOUT_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_COMPLETION_TIMEOUT)
                .long(ARG_COMPLETION_TIMEOUT)
                .help("Lifetime of a recovery completion blob in seconds")
                .env("IDP_COMPLETION_TIMEOUT_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}

fn with_hashing_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_HASH_MEMORY_KIB)
                .long(ARG_HASH_MEMORY_KIB)
                .help("Argon2id memory cost in KiB")
                .env("IDP_HASH_MEMORY_KIB")
                .default_value("19456")
                .value_parser(clap::value_parser!(u32).range(8..)),
        )
        .arg(
            Arg::new(ARG_HASH_ITERATIONS)
                .long(ARG_HASH_ITERATIONS)
                .help("Argon2id iterations")
                .env("IDP_HASH_ITERATIONS")
                .default_value("2")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_HASH_PARALLELISM)
                .long(ARG_HASH_PARALLELISM)
                .help("Argon2id lanes")
                .env("IDP_HASH_PARALLELISM")
                .default_value("1")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let matches = with_args(Command::new("idp")).get_matches_from(vec!["idp"]);
        let options = Options::parse(&matches).unwrap();
        assert_eq!(options.issuer, "idp");
        assert_eq!(options.code_length, 8);
        assert_eq!(options.timeouts.recover_seconds, 600);
        assert_eq!(options.timeouts.email_seconds, 3600);
        assert_eq!(options.hashing.memory_kib, 19456);
        assert_eq!(options.pages, Pages::default());
    }

    #[test]
    fn page_overrides_from_env() {
        temp_env::with_vars(
            [
                ("IDP_RECOVER_URL", Some("https://id.example.com/reset")),
                ("IDP_DELETE_TIMEOUT_SECONDS", Some("60")),
            ],
            || {
                let matches = with_args(Command::new("idp")).get_matches_from(vec!["idp"]);
                let options = Options::parse(&matches).unwrap();
                assert_eq!(
                    options.pages.recover.map(String::from),
                    Some("https://id.example.com/reset".to_string())
                );
                assert!(options.pages.email.is_none());
                assert_eq!(options.timeouts.delete_seconds, 60);
            },
        );
    }

    #[test]
    fn invalid_page_url() {
        let matches = with_args(Command::new("idp"))
            .get_matches_from(vec!["idp", "--email-url", "/relative"]);
        let err = Options::parse(&matches).unwrap_err();
        assert!(err.to_string().contains("--email-url"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let result = with_args(Command::new("idp"))
            .try_get_matches_from(vec!["idp", "--recover-timeout-seconds", "0"]);
        assert!(result.is_err());
    }
}
