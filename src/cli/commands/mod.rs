pub mod csrf;
pub mod logging;
pub mod session;

use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        BoolishValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_MEMORY: &str = "memory";

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

    let command = Command::new("gatehouse")
        .about("Cookie session authentication with signed CSRF tokens")
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
                .env("GATEHOUSE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .env("GATEHOUSE_DSN")
                .required_unless_present(ARG_MEMORY),
        )
        .arg(
            Arg::new(ARG_MEMORY)
                .long(ARG_MEMORY)
                .help("Keep users and sessions in memory (nothing survives a restart)")
                .env("GATEHOUSE_MEMORY")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new())
                .conflicts_with(ARG_DSN),
        );

    let command = session::with_args(command);
    let command = csrf::with_args(command);
    logging::with_args(command)
}
