//! # proviso-cli
//!
//! Compiles a Python project's dependencies into one pinned requirements file
//! that covers several target Python versions.
//!
//! This is the main entry point for the `proviso` binary. It handles argument
//! parsing, sets up logging and the panic hook, and dispatches to the command
//! handlers.

use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use proviso_config::pyproject::ToolSettings;
use proviso_config::merge::split_list;
use proviso_core::{ProvisoError, ProvisoResult};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Pin a project's dependencies for every supported Python version
#[derive(Parser)]
#[command(name = "proviso", version, about = "Multi-version Python requirements compiler")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Options for the default compile action
    #[command(flatten)]
    pub compile: CompileArgs,

    /// Logging level
    #[arg(long, value_enum, default_value_t = LogLevel::Info, ignore_case = true, global = true)]
    pub level: LogLevel,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve dependencies and write the requirements file (default)
    Compile(CompileArgs),
    /// Print the Python versions that are currently supported upstream
    PythonVersions,
    /// Show version information
    Version,
}

/// Options of `proviso compile`
#[derive(Args, Debug, Clone, Default)]
pub struct CompileArgs {
    /// Project root directory (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub directory: Option<String>,

    /// Comma separated extras to include (default: every declared extra)
    #[arg(long, value_name = "EXTRAS")]
    pub extras: Option<String>,

    /// Comma separated Python versions (default: active release cycles)
    #[arg(long, value_name = "VERSIONS")]
    pub python_versions: Option<String>,

    /// Output file; a bare name is placed in the project directory, a path is used as given
    #[arg(long, value_name = "FILE")]
    pub filename: Option<String>,

    /// Simple index base URL, may be repeated
    #[arg(long = "index-url", value_name = "URL")]
    pub index_urls: Vec<String>,

    /// Ignore files uploaded after this RFC 3339 timestamp or YYYY-MM-DD date
    #[arg(long, value_name = "DATE")]
    pub exclude_newer: Option<String>,

    /// Per-environment resolution timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Search rounds allowed per environment
    #[arg(long, value_name = "N")]
    pub max_rounds: Option<usize>,

    /// Environments resolved at once
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Comment written at the top of the output file
    #[arg(long, value_name = "TEXT")]
    pub header: Option<String>,
}

impl CompileArgs {
    /// The command line settings layer
    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings {
            index_urls: (!self.index_urls.is_empty()).then(|| self.index_urls.clone()),
            python_versions: self.python_versions.as_deref().map(split_list),
            extras: self.extras.as_deref().map(split_list),
            filename: self.filename.clone(),
            exclude_newer: self.exclude_newer.clone(),
            max_rounds: self.max_rounds,
            timeout: self.timeout,
            concurrency: self.concurrency,
        }
    }
}

/// `--level` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Filter directives for a `--level`.
///
/// proviso's own targets follow the level; HTTP client crates stay at `warn`
/// unless debugging.
pub fn filter_directives(level: LogLevel) -> String {
    let own = level.as_directive();
    let http = if level == LogLevel::Debug { "debug" } else { "warn" };
    format!("warn,proviso={own},reqwest={http},hyper={http}")
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.level);
    setup_panic_handler();

    debug!("Starting proviso v{}", env!("CARGO_PKG_VERSION"));

    match run_cli(cli) {
        Ok(status) => status,
        Err(err) => {
            eprintln!("{}", ErrorFormatter::new().format_error(&err));
            ExitCode::FAILURE
        },
    }
}

fn run_cli(cli: Cli) -> ProvisoResult<ExitCode> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| ProvisoError::io("Failed to create async runtime".to_string(), e))?;

    rt.block_on(async {
        let ctx = CommandContext::new()?;
        let command = cli.command.unwrap_or(Commands::Compile(cli.compile));
        commands::dispatch_command(command, &ctx).await
    })
}

fn setup_logging(level: LogLevel) {
    // RUST_LOG wins over --level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directives(level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("proviso encountered an unexpected error: {}", panic_info);
        eprintln!("proviso crashed! This is a bug.");
        eprintln!("Please report this at: https://github.com/proviso-dev/proviso/issues");
        eprintln!("Error: {}", panic_info);
    }));
}
