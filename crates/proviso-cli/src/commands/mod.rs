//! Command implementations and dispatch logic.
//!
//! Each command is an async function taking a `CommandContext`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use proviso_config::{ConfigLayering, ConfigLoader};
use proviso_core::{ProvisoError, ProvisoResult};
use proviso_index::ReleaseSchedule;
use tracing::info;

pub mod compile;


use crate::{output::OutputHandler, Commands};

/// Shared context for all commands
pub struct CommandContext {
    pub cwd: Utf8PathBuf,
    /// `PROVISO_*` variables captured at startup
    pub env: HashMap<String, String>,
    /// Global config file, when not the default location
    pub global_config: Option<Utf8PathBuf>,
    pub output: OutputHandler,
}

impl CommandContext {
    pub fn new() -> ProvisoResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| ProvisoError::io("Failed to get current directory".to_string(), e))?;

        Ok(Self {
            cwd: utf8_path(cwd, "directory")?,
            env: ConfigLayering::collect_env_overrides(),
            global_config: None,
            output: OutputHandler::new(),
        })
    }

    /// Config loader starting its search at `directory`
    pub fn loader(&self, directory: Utf8PathBuf) -> ConfigLoader {
        let loader = ConfigLoader::new(directory);
        match &self.global_config {
            Some(path) => loader.with_global_path(path.clone()),
            None => loader,
        }
    }
}

/// Dispatch a command to its handler
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> ProvisoResult<ExitCode> {
    match command {
        Commands::Compile(args) => {
            info!("Compiling requirements");
            let success = compile::execute(args, ctx).await?;
            Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        },
        Commands::PythonVersions => {
            show_python_versions(ctx).await?;
            Ok(ExitCode::SUCCESS)
        },
        Commands::Version => {
            show_version(ctx);
            Ok(ExitCode::SUCCESS)
        },
    }
}

/// Python release cycles that are out and not yet end-of-life, oldest first
pub async fn active_python_versions() -> ProvisoResult<Vec<String>> {
    let today = chrono::Utc::now().date_naive();
    let versions = ReleaseSchedule::new()?.active_versions(today).await?;
    if versions.is_empty() {
        return Err(ProvisoError::config(
            "python-versions",
            "the release schedule lists no active Python versions; pass --python-versions",
        ));
    }
    Ok(versions)
}

async fn show_python_versions(ctx: &CommandContext) -> ProvisoResult<()> {
    for version in active_python_versions().await? {
        ctx.output.plain(&version);
    }
    Ok(())
}

fn show_version(ctx: &CommandContext) {
    let target = format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS);

    ctx.output.plain(&format!("proviso v{}", env!("CARGO_PKG_VERSION")));
    ctx.output.info(&format!("Built: {}", env!("BUILD_DATE")));
    ctx.output.info(&format!("Target: {}", target));
    ctx.output.info(&format!("Rust: {}", env!("RUSTC_VERSION")));
}

/// Replace a leading `~` with the home directory
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => PathBuf::from(path),
        },
        _ => PathBuf::from(path),
    }
}

/// Convert a path for use with camino, naming the setting it came from
pub fn utf8_path(path: PathBuf, field: &str) -> ProvisoResult<Utf8PathBuf> {
    Utf8PathBuf::try_from(path)
        .map_err(|e| ProvisoError::config(field, format!("{} is not valid UTF-8", e.as_path().display())))
}
