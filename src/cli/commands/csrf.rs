use anyhow::Result;
use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};

use crate::auth::csrf::{CsrfConfig, FailureAction, HeaderCheck};

pub const ARG_CSRF_CHECK_HEADER: &str = "csrf-check-header";
pub const ARG_CSRF_FAILURE: &str = "csrf-failure";
pub const ARG_CSRF_ALLOW_BLANKET_TOKENS: &str = "csrf-allow-blanket-tokens";

#[derive(Debug, Clone)]
pub struct Options {
    pub check_header: HeaderCheck,
    pub failure: FailureAction,
    pub allow_blanket_tokens: bool,
}

impl Options {
    /// Parse CSRF arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a value is not recognized.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let check_header = matches
            .get_one::<String>(ARG_CSRF_CHECK_HEADER)
            .map_or(Ok(HeaderCheck::Either), |value| value.parse())?;
        let failure = matches
            .get_one::<String>(ARG_CSRF_FAILURE)
            .map_or(Ok(FailureAction::Raise), |value| value.parse())?;

        Ok(Self {
            check_header,
            failure,
            allow_blanket_tokens: matches.get_flag(ARG_CSRF_ALLOW_BLANKET_TOKENS),
        })
    }

    #[must_use]
    pub fn into_config(self) -> CsrfConfig {
        CsrfConfig::new()
            .with_check_header(self.check_header)
            .with_failure(self.failure)
            .with_require_request_specific_tokens(!self.allow_blanket_tokens)
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CSRF_CHECK_HEADER)
                .long(ARG_CSRF_CHECK_HEADER)
                .help("Where to look for the CSRF token")
                .env("GATEHOUSE_CSRF_CHECK_HEADER")
                .value_parser(["params", "header", "either"])
                .default_value("either"),
        )
        .arg(
            Arg::new(ARG_CSRF_FAILURE)
                .long(ARG_CSRF_FAILURE)
                .help("Response to a failed CSRF check")
                .env("GATEHOUSE_CSRF_FAILURE")
                .value_parser(["raise", "empty-403", "clear-session"])
                .default_value("raise"),
        )
        .arg(
            Arg::new(ARG_CSRF_ALLOW_BLANKET_TOKENS)
                .long(ARG_CSRF_ALLOW_BLANKET_TOKENS)
                .help("Also accept tokens not bound to a method and path")
                .env("GATEHOUSE_CSRF_ALLOW_BLANKET_TOKENS")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}
