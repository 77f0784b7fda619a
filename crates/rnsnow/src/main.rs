mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Command;
use crate::exit::CliResult;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "rnsnow", version, about = "Reticulum serial to ESP-NOW bridge")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). Default: the configured `loglevel`.
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<LogLevel>,

    /// JSON configuration file.
    #[arg(long, value_name = "PATH", global = true, env = "RNSNOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

fn dispatch(cli: Cli) -> CliResult<i32> {
    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);

    if let Command::Version(args) = cli.command {
        return cmd::version::run(args);
    }

    let config = cmd::load_config(cli.config.as_deref())?;
    let level = cli.log_level.unwrap_or_else(|| config.loglevel.into());
    init_logging(cli.log_format, level);

    cmd::run(cli.command, config, cli.config, format)
}
