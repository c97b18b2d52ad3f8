use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use platchan_codec::CodecKind;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod invoke;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept runtime links and serve the echo channel and host plugins.
    Serve(ServeArgs),
    /// Invoke one method over a runtime link and print the result.
    Invoke(InvokeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Invoke(args) => invoke::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    #[arg(env = "PLATCHAN_SOCKET")]
    pub path: PathBuf,
    /// Method codec spoken on the echo channel; links announcing another codec are refused.
    #[arg(long, default_value = "json")]
    pub codec: CodecKind,
    /// Exit after this many links have been served and closed.
    #[arg(long)]
    pub max_links: Option<usize>,
    /// Terminate on channel-level failures (unknown channel, failing handler)
    /// instead of logging them and replying empty.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct InvokeArgs {
    /// Socket path to connect to.
    #[arg(env = "PLATCHAN_SOCKET")]
    pub path: PathBuf,
    /// Method to invoke.
    #[arg(long, short = 'm')]
    pub method: String,
    /// Channel the method lives on.
    #[arg(long, short = 'c', default_value = "platchan/echo")]
    pub channel: String,
    /// Arguments as JSON. Default: null.
    #[arg(long, value_name = "JSON")]
    pub args: Option<String>,
    /// Method codec to announce and speak.
    #[arg(long, default_value = "json")]
    pub codec: CodecKind,
    /// Maximum time for the handshake and for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
