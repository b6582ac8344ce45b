use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use url::Url;

use crate::authority::{HydraEndpoints, DEFAULT_REMEMBER_FOR};

pub const ARG_AUTHORITY_URL: &str = "authority-url";
pub const ARG_AUTHORITY_LOGIN_PATH: &str = "authority-login-path";
pub const ARG_AUTHORITY_ACCEPT_PATH: &str = "authority-accept-path";
pub const ARG_AUTHORITY_REJECT_PATH: &str = "authority-reject-path";
pub const ARG_AUTHORITY_INTROSPECT_PATH: &str = "authority-introspect-path";
pub const ARG_REMEMBER_FOR: &str = "remember-for";

#[derive(Debug, Clone)]
pub struct Options {
    pub admin_url: Url,
    pub endpoints: HydraEndpoints,
    pub remember_for: u64,
}

impl Options {
    /// Parse login authority arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the admin URL is missing or not a valid URL.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let admin_url = matches
            .get_one::<String>(ARG_AUTHORITY_URL)
            .context("missing required argument: --authority-url")?;
        let admin_url =
            Url::parse(admin_url).with_context(|| format!("invalid --{ARG_AUTHORITY_URL}"))?;

        let defaults = HydraEndpoints::default();
        let path = |id: &str, default: String| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(default)
        };

        Ok(Self {
            admin_url,
            endpoints: HydraEndpoints {
                login: path(ARG_AUTHORITY_LOGIN_PATH, defaults.login),
                login_accept: path(ARG_AUTHORITY_ACCEPT_PATH, defaults.login_accept),
                login_reject: path(ARG_AUTHORITY_REJECT_PATH, defaults.login_reject),
                introspect: path(ARG_AUTHORITY_INTROSPECT_PATH, defaults.introspect),
            },
            remember_for: matches
                .get_one::<u64>(ARG_REMEMBER_FOR)
                .copied()
                .unwrap_or(DEFAULT_REMEMBER_FOR),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_AUTHORITY_URL)
                .long(ARG_AUTHORITY_URL)
                .help("Admin base URL of the login authority, example: http://hydra:4445")
                .env("IDP_AUTHORITY_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_AUTHORITY_LOGIN_PATH)
                .long(ARG_AUTHORITY_LOGIN_PATH)
                .help("Path of the login request endpoint")
                .env("IDP_AUTHORITY_LOGIN_PATH"),
        )
        .arg(
            Arg::new(ARG_AUTHORITY_ACCEPT_PATH)
                .long(ARG_AUTHORITY_ACCEPT_PATH)
                .help("Path of the login accept endpoint")
                .env("IDP_AUTHORITY_ACCEPT_PATH"),
        )
        .arg(
            Arg::new(ARG_AUTHORITY_REJECT_PATH)
                .long(ARG_AUTHORITY_REJECT_PATH)
                .help("Path of the login reject endpoint")
                .env("IDP_AUTHORITY_REJECT_PATH"),
        )
        .arg(
            Arg::new(ARG_AUTHORITY_INTROSPECT_PATH)
                .long(ARG_AUTHORITY_INTROSPECT_PATH)
                .help("Path of the token introspection endpoint used to authorize API callers")
                .env("IDP_AUTHORITY_INTROSPECT_PATH"),
        )
        .arg(
            Arg::new(ARG_REMEMBER_FOR)
                .long(ARG_REMEMBER_FOR)
                .help("Seconds the authority remembers an accepted login")
                .env("IDP_REMEMBER_FOR")
                .default_value("120")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_paths_default_to_hydra() {
        temp_env::with_vars(
            [
                ("IDP_AUTHORITY_URL", Some("http://hydra:4445")),
                ("IDP_AUTHORITY_ACCEPT_PATH", Some("/custom/accept")),
                ("IDP_AUTHORITY_LOGIN_PATH", None),
                ("IDP_AUTHORITY_REJECT_PATH", None),
                ("IDP_AUTHORITY_INTROSPECT_PATH", Some("/admin/oauth2/introspect")),
                ("IDP_REMEMBER_FOR", None),
            ],
            || {
                let matches = with_args(Command::new("idp")).get_matches_from(vec!["idp"]);
                let options = Options::parse(&matches).unwrap();
                assert_eq!(options.admin_url.as_str(), "http://hydra:4445/");
                assert_eq!(options.endpoints.login, HydraEndpoints::default().login);
                assert_eq!(options.endpoints.login_accept, "/custom/accept");
                assert_eq!(options.endpoints.introspect, "/admin/oauth2/introspect");
                assert_eq!(options.remember_for, 120);
            },
        );
    }

    #[test]
    fn invalid_admin_url() {
        let matches = with_args(Command::new("idp"))
            .get_matches_from(vec!["idp", "--authority-url", "not a url"]);
        assert!(Options::parse(&matches).is_err());
    }
}
