use clap::{Parser, Subcommand, ValueEnum};
use flowbridge::DispatcherKind;
use std::path::PathBuf;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Yaml,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatcherArg {
    Inline,
    Pool,
}

impl From<DispatcherArg> for DispatcherKind {
    fn from(arg: DispatcherArg) -> Self {
        match arg {
            DispatcherArg::Inline => DispatcherKind::Inline,
            DispatcherArg::Pool => DispatcherKind::Pool,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "flowbridge")]
#[command(version)]
#[command(about = "Run flowbridge demonstration workflows")]
#[command(long_about = "
flowbridge runs small demonstration workflows on the flowbridge runtime so
that suspension, resumption, dispatcher scoping and retries can be checked
by hand with full logging.

Configuration is read from FLOWBRIDGE_* environment variables and from
flowbridge.yaml in the current directory.

Example usage:
  flowbridge retry --failures 2 --max-attempts 3
  flowbridge delay --millis 250 --dispatcher pool
  flowbridge config --format json
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Read configuration from this file instead of ./flowbridge.yaml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a retry loop over a body that fails a given number of times
    #[command(long_about = "
Runs a retry loop whose body fails FAILURES times before succeeding. Each
failure is logged by an exception handler. The attempt log is printed when
the loop finishes.

Exit codes:
  0 - The body eventually succeeded
  1 - The retry loop was exhausted
  2 - The workflow could not be created or run

Examples:
  flowbridge retry --failures 2 --max-attempts 3
  flowbridge retry --failures 5 --max-attempts 2 --backoff-ms 100
")]
    Retry {
        /// Number of times the body fails before it succeeds
        #[arg(long, default_value_t = 2)]
        failures: u32,

        /// Attempt limit of the retry loop
        #[arg(long, default_value_t = 3)]
        max_attempts: u32,

        /// Fixed delay between attempts in milliseconds
        #[arg(long, default_value_t = 0)]
        backoff_ms: u64,
    },
    /// Run a timer followed by a task on the chosen dispatcher
    #[command(long_about = "
Runs a sequence of a timer delay and a task activity. The task runs inside
a dispatcher scope when --dispatcher is given, otherwise on the host default.
Instance statistics are printed when the workflow closes.

Examples:
  flowbridge delay --millis 250
  flowbridge delay --millis 0 --dispatcher pool
")]
    Delay {
        /// Timer duration in milliseconds
        #[arg(long, default_value_t = 100)]
        millis: u64,

        /// Dispatcher scope for the task
        #[arg(long, value_enum)]
        dispatcher: Option<DispatcherArg>,
    },
    /// Show the effective host configuration
    Config {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,

        /// Print an example flowbridge.yaml instead
        #[arg(long)]
        example: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    #[allow(dead_code)]
    pub fn try_parse_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(args)
    }
}
