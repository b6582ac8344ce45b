pub mod authority;
pub mod challenge;
pub mod keys;
pub mod logging;
pub mod mail;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_BULK_MAX_REQUESTS: &str = "bulk-max-requests";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("idp")
        .about("Identity provider challenge and credential token engine")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("IDP_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .long_help(
                    "Postgres connection string. Without it identities are kept in memory and lost on exit.",
                )
                .env("IDP_DSN"),
        )
        .arg(
            Arg::new(ARG_BULK_MAX_REQUESTS)
                .long(ARG_BULK_MAX_REQUESTS)
                .help("Maximum number of items accepted by bulk endpoints")
                .env("IDP_BULK_MAX_REQUESTS")
                .default_value("1")
                .value_parser(clap::value_parser!(usize)),
        );

    let command = authority::with_args(command);
    let command = keys::with_args(command);
    let command = challenge::with_args(command);
    let command = mail::with_args(command);
    logging::with_args(command)
}
