// Configuration for routeview
// Supports CLI arguments and environment variables

use crate::routes::Platform;
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser};
use tracing::Level;

/// Draw how this device routes between two addresses, as ASCII boxes
#[derive(Parser, Debug, Clone)]
#[command(name = "routeview")]
#[command(author, version, about, long_about = None, disable_version_flag = true)]
pub struct CliArgs {
    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    pub version: Option<bool>,

    /// Source and destination IP addresses
    #[arg(value_name = "ADDRESS")]
    pub addresses: Vec<String>,

    /// Print the resolved routes as JSON instead of drawing them
    #[arg(long, env = "ROUTEVIEW_JSON")]
    pub json: bool,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", env = "ROUTEVIEW_LOG")]
    pub log_level: String,

    /// Command syntax to use instead of the detected one
    #[arg(long, value_enum, env = "ROUTEVIEW_PLATFORM")]
    pub platform: Option<Platform>,
}

/// Merged configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    pub source: String,
    pub destination: String,
    pub json: bool,
    pub log_level: Level,
    pub platform: Option<Platform>,
}

/// What the command line asks for
#[derive(Debug)]
pub enum Invocation {
    Run(Config),
    /// Wrong arguments: show usage and exit successfully
    Usage(String),
}

impl Config {
    /// Load configuration from the process arguments and environment
    /// Priority: CLI args > Environment variables > Defaults
    pub fn load() -> anyhow::Result<Invocation> {
        Self::from_args(std::env::args_os())
    }

    pub fn from_args<I, T>(args: I) -> anyhow::Result<Invocation>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli_args = match CliArgs::try_parse_from(args) {
            Ok(cli_args) => cli_args,
            Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
            Err(_) => return Ok(Invocation::Usage(usage())),
        };

        let [source, destination] = match <[String; 2]>::try_from(cli_args.addresses) {
            Ok(pair) => pair,
            Err(_) => return Ok(Invocation::Usage(usage())),
        };

        let log_level = parse_log_level(&cli_args.log_level)?;

        Ok(Invocation::Run(Config {
            source,
            destination,
            json: cli_args.json,
            log_level,
            platform: cli_args.platform,
        }))
    }
}

fn usage() -> String {
    CliArgs::command().render_help().to_string()
}

fn parse_log_level(level_str: &str) -> anyhow::Result<Level> {
    match level_str.to_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(anyhow::anyhow!("Invalid log level: {}", level_str)),
    }
}
