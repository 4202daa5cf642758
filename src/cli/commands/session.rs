use anyhow::{anyhow, Result};
use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::{cookie::DEFAULT_COOKIE_NAME, session::DEFAULT_LOGIN_PATH};

pub const ARG_SESSION_SECRET: &str = "session-secret";
pub const ARG_COOKIE_NAME: &str = "cookie-name";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_LOGIN_PATH: &str = "login-path";

#[derive(Debug, Clone)]
pub struct Options {
    pub secret: SecretString,
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub login_path: String,
}

impl Options {
    /// Parse cookie session arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the session secret is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let secret = matches
            .get_one::<String>(ARG_SESSION_SECRET)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("missing required argument: --{ARG_SESSION_SECRET}"))?;

        Ok(Self {
            secret: SecretString::from(secret),
            cookie_name: matches
                .get_one::<String>(ARG_COOKIE_NAME)
                .cloned()
                .unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string()),
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
            login_path: matches
                .get_one::<String>(ARG_LOGIN_PATH)
                .cloned()
                .unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_string()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_SECRET)
                .long(ARG_SESSION_SECRET)
                .help("Secret used to sign the session cookie (at least 64 bytes)")
                .env("GATEHOUSE_SESSION_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_COOKIE_NAME)
                .long(ARG_COOKIE_NAME)
                .help("Name of the session cookie")
                .env("GATEHOUSE_COOKIE_NAME")
                .default_value(DEFAULT_COOKIE_NAME),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the session cookie Secure (serve over HTTPS)")
                .env("GATEHOUSE_COOKIE_SECURE")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_LOGIN_PATH)
                .long(ARG_LOGIN_PATH)
                .help("Where unauthenticated requests are redirected")
                .env("GATEHOUSE_LOGIN_PATH")
                .default_value(DEFAULT_LOGIN_PATH),
        )
}
