//! `proviso compile`
//!
//! Reads the project's static metadata, resolves its requirements once per
//! target Python version and writes a single pinned requirements file.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use proviso_config::Settings;
use proviso_core::{Environment, PackageMetadata, ProvisoError, ProvisoResult, Requirement};
use proviso_index::{IndexClient, IndexConfig};
use proviso_resolver::orchestrator::DEFAULT_CONCURRENCY;
use proviso_resolver::{
    CandidateSupply, MultiResolution, Orchestrator, OrchestratorOptions, PackageIndex, DEFAULT_MAX_ROUNDS,
};
use tracing::{debug, info, warn};

use super::{active_python_versions, expand_home, utf8_path, CommandContext};
use crate::output::errors::ErrorFormatter;
use crate::output::requirements::RequirementsWriter;
use crate::CompileArgs;

/// Everything a compile run needs before the index is contacted
#[derive(Debug)]
pub struct CompilePlan {
    /// Directory holding pyproject.toml
    pub project_dir: Utf8PathBuf,
    pub metadata: PackageMetadata,
    /// Selected extras, canonicalized
    pub extras: Vec<String>,
    /// Root requirements after extra selection
    pub requirements: Vec<Requirement>,
    pub settings: Settings,
    pub output_path: Utf8PathBuf,
    pub header: Option<String>,
}

impl CompilePlan {
    /// Load the project and layer its settings under `args`
    pub async fn load(args: &CompileArgs, ctx: &CommandContext) -> ProvisoResult<Self> {
        let directory = match &args.directory {
            Some(dir) => ctx.cwd.join(utf8_path(expand_home(dir), "directory")?),
            None => ctx.cwd.clone(),
        };

        let loader = ctx.loader(directory);
        let (pyproject, pyproject_path) = loader.load_project().await?;
        let settings = loader
            .layered_settings(Some((&pyproject, pyproject_path.as_path())), &ctx.env, args.tool_settings())
            .await?;
        let metadata = pyproject.metadata()?;

        let project_dir = pyproject_path
            .parent()
            .map_or_else(|| ctx.cwd.clone(), Utf8Path::to_path_buf);

        let declared = metadata.declared_extras();
        let extras = settings.extras.clone().unwrap_or_else(|| declared.clone());
        for extra in extras.iter().filter(|extra| !declared.contains(extra)) {
            warn!("Extra '{}' is not declared by {}", extra, metadata.name);
        }
        let requirements = metadata.requirements_for_extras(&extras);

        let output_path = output_path(&ctx.cwd, &project_dir, &settings.filename)?;

        Ok(Self {
            project_dir,
            metadata,
            extras,
            requirements,
            settings,
            output_path,
            header: args.header.clone(),
        })
    }

    /// Target Python versions from settings, or `None` to use the release schedule
    pub fn python_versions(&self) -> Option<&[String]> {
        self.settings.python_versions.as_deref()
    }

    pub fn options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            max_rounds: self.settings.max_rounds.unwrap_or(DEFAULT_MAX_ROUNDS),
            timeout: self.settings.timeout,
            concurrency: self.settings.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
        }
    }

    /// Index client for the configured indexes and upload cutoff
    pub fn index_client(&self) -> ProvisoResult<IndexClient> {
        let mut config = IndexConfig::default().with_exclude_newer(self.settings.exclude_newer);
        if !self.settings.index_urls.is_empty() {
            config = config.with_index_urls(self.settings.index_urls.iter().map(|url| url.as_str()))?;
        }
        IndexClient::with_config(config)
    }

    fn log_summary(&self, python_versions: &[String]) {
        let version = self
            .metadata
            .version
            .as_ref()
            .map_or_else(|| "(unversioned)".to_string(), ToString::to_string);
        info!("Project: {} {}", self.metadata.name, version);
        debug!("Project directory: {}", self.project_dir);
        info!("  extras: {}", self.extras.join(", "));
        info!("  python_versions: {}", python_versions.join(", "));

        if self.requirements.is_empty() {
            info!("No requirements to resolve");
            return;
        }
        info!("Requirements:");
        for requirement in &self.requirements {
            info!("  {}", requirement);
        }
    }

    /// Resolve for every environment and write the requirements file.
    ///
    /// The file is written even when some environments fail; their labels are
    /// simply absent from the markers.
    pub async fn run<I>(&self, orchestrator: &Orchestrator<I>, python_versions: &[String]) -> ProvisoResult<MultiResolution>
    where
        I: PackageIndex + 'static,
    {
        let environments = environments(python_versions)?;
        self.log_summary(python_versions);

        let merged = orchestrator.resolve_all(&self.requirements, &environments).await;

        for label in &merged.environments {
            if merged.failures.iter().all(|failure| &failure.label != label) {
                info!("  Python {}: resolved {} dependencies", label, merged.count_for(label));
            }
        }
        debug!("Candidate supply: {:?}", orchestrator.supply().stats());

        RequirementsWriter::new(&merged)
            .with_header(self.header.as_deref())
            .write_to(&self.output_path)
            .await?;
        info!("Wrote {}", self.output_path);

        Ok(merged)
    }
}

/// One environment per target version, in the order given
pub fn environments(python_versions: &[String]) -> ProvisoResult<Vec<Environment>> {
    if python_versions.is_empty() {
        return Err(ProvisoError::config("python-versions", "at least one Python version is required"));
    }
    python_versions
        .iter()
        .map(|version| Environment::for_python(version).map_err(ProvisoError::from))
        .collect()
}

/// Where the requirements file goes: a bare file name lands in the project
/// directory, anything with a directory part is used as given.
pub fn output_path(cwd: &Utf8Path, project_dir: &Utf8Path, filename: &str) -> ProvisoResult<Utf8PathBuf> {
    let has_directory = Utf8Path::new(filename)
        .parent()
        .is_some_and(|parent| !parent.as_str().is_empty());

    if has_directory {
        Ok(cwd.join(utf8_path(expand_home(filename), "filename")?))
    } else {
        Ok(project_dir.join(filename))
    }
}

/// Run `proviso compile`, returning whether every environment resolved
pub async fn execute(args: CompileArgs, ctx: &CommandContext) -> ProvisoResult<bool> {
    let plan = CompilePlan::load(&args, ctx).await?;
    let python_versions = match plan.python_versions() {
        Some(versions) => versions.to_vec(),
        None => active_python_versions().await?,
    };

    let supply = Arc::new(CandidateSupply::new(plan.index_client()?));
    let orchestrator = Orchestrator::new(supply).with_options(plan.options());
    let merged = plan.run(&orchestrator, &python_versions).await?;

    report(&merged, &plan.output_path, ctx);
    Ok(merged.is_success())
}

fn report(merged: &MultiResolution, output_path: &Utf8Path, ctx: &CommandContext) {
    if merged.is_success() {
        ctx.output.success(&format!(
            "Pinned {} releases for {} Python versions in {}",
            merged.pinned_count(),
            merged.environments.len(),
            output_path
        ));
        return;
    }

    let formatter = ErrorFormatter::new();
    for failure in &merged.failures {
        eprintln!("{}", formatter.format_failure(failure));
    }
    ctx.output.error(&format!(
        "{} of {} Python versions failed to resolve; {} only covers the rest",
        merged.failures.len(),
        merged.environments.len(),
        output_path
    ));
}
