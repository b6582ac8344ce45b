//! Maps parsed CLI arguments to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{authority, challenge, keys, mail, ARG_BULK_MAX_REQUESTS, ARG_DSN, ARG_PORT};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or do not parse.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .filter(|dsn| !dsn.trim().is_empty());
    let bulk_max_requests = matches
        .get_one::<usize>(ARG_BULK_MAX_REQUESTS)
        .copied()
        .unwrap_or(1);

    Ok(Action::Server(Args {
        port,
        dsn,
        bulk_max_requests,
        authority: authority::Options::parse(matches)?,
        keys: keys::Options::parse(matches)?,
        challenge: challenge::Options::parse(matches)?,
        mail: mail::Options::parse(matches)?,
    }))
}
