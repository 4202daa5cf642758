//! Map parsed arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{csrf, session, ARG_DSN, ARG_MEMORY, ARG_PORT};
use anyhow::{anyhow, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let memory = matches.get_flag(ARG_MEMORY);
    let dsn = matches.get_one::<String>(ARG_DSN).cloned();

    if dsn.is_none() && !memory {
        return Err(anyhow!("missing required argument: --{ARG_DSN}"));
    }

    let session_opts = session::Options::parse(matches)?;
    let csrf_opts = csrf::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        memory,
        session_secret: session_opts.secret,
        cookie_name: session_opts.cookie_name,
        cookie_secure: session_opts.cookie_secure,
        login_path: session_opts.login_path,
        csrf: csrf_opts,
    }))
}
