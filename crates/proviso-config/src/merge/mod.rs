//! Configuration layering, project discovery and environment overrides
//!
//! Settings are layered lowest to highest: built-in defaults, the global
//! config file, the project's `[tool.proviso]` table, `PROVISO_*`
//! environment variables and CLI flags.

use std::collections::HashMap;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use url::Url;

use proviso_core::types::canonicalize;
use proviso_core::{Name, ProvisoError, Version};

use crate::pyproject::{self, PyProject, ToolSettings};
use crate::ConfigResult;

/// Default output file name
pub const DEFAULT_FILENAME: &str = "requirements.txt";

/// Project metadata file name
pub const PYPROJECT_FILE: &str = "pyproject.toml";

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "PROVISO_";

/// Where a settings layer came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Global config file
    Global(Utf8PathBuf),
    /// Project `[tool.proviso]` table
    Project(Utf8PathBuf),
    /// `PROVISO_*` environment variables
    Environment,
    /// CLI flags
    CommandLine,
}

/// Validated settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Simple index base URLs; empty means the default index
    pub index_urls: Vec<Url>,
    /// Target Python versions; `None` means the active release cycles
    pub python_versions: Option<Vec<String>>,
    /// Extras to include, canonicalized; `None` means every declared extra
    pub extras: Option<Vec<String>>,
    pub filename: String,
    /// Ignore files uploaded after this instant
    pub exclude_newer: Option<DateTime<Utc>>,
    pub max_rounds: Option<usize>,
    /// Per-environment resolution timeout
    pub timeout: Option<Duration>,
    pub concurrency: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index_urls: Vec::new(),
            python_versions: None,
            extras: None,
            filename: DEFAULT_FILENAME.to_string(),
            exclude_newer: None,
            max_rounds: None,
            timeout: None,
            concurrency: None,
        }
    }
}

impl Settings {
    /// Validate raw settings, filling unset fields with defaults
    pub fn from_raw(raw: ToolSettings) -> ConfigResult<Self> {
        let mut settings = Settings::default();

        if let Some(urls) = raw.index_urls {
            if urls.is_empty() {
                return Err(ProvisoError::config("index-urls", "at least one index URL is required"));
            }
            settings.index_urls = urls
                .iter()
                .map(|url| {
                    Url::parse(url).map_err(|e| ProvisoError::config("index-urls", format!("'{}': {}", url, e)))
                })
                .collect::<ConfigResult<_>>()?;
        }

        if let Some(versions) = raw.python_versions {
            for version in &versions {
                version
                    .parse::<Version>()
                    .map_err(|e| ProvisoError::config("python-versions", e.to_string()))?;
            }
            settings.python_versions = Some(versions);
        }

        if let Some(extras) = raw.extras {
            for extra in &extras {
                if !Name::is_valid(extra) {
                    return Err(ProvisoError::config("extras", format!("'{}' is not a valid extra name", extra)));
                }
            }
            settings.extras = Some(extras.iter().map(|extra| canonicalize(extra)).collect());
        }

        if let Some(filename) = raw.filename {
            if filename.trim().is_empty() {
                return Err(ProvisoError::config("filename", "must not be empty"));
            }
            settings.filename = filename;
        }

        if let Some(cutoff) = raw.exclude_newer {
            settings.exclude_newer = Some(parse_exclude_newer(&cutoff)?);
        }

        settings.max_rounds = positive("max-rounds", raw.max_rounds)?;
        settings.concurrency = positive("concurrency", raw.concurrency)?;
        settings.timeout = positive("timeout", raw.timeout)?.map(Duration::from_secs);

        Ok(settings)
    }
}

fn positive<T: Default + PartialEq>(field: &str, value: Option<T>) -> ConfigResult<Option<T>> {
    match value {
        Some(value) if value == T::default() => Err(ProvisoError::config(field, "must be greater than zero")),
        other => Ok(other),
    }
}

/// Parse an RFC 3339 timestamp or a `YYYY-MM-DD` date (midnight UTC)
pub fn parse_exclude_newer(value: &str) -> ConfigResult<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .ok_or_else(|| {
            ProvisoError::config(
                "exclude-newer",
                format!("'{}' is neither an RFC 3339 timestamp nor a YYYY-MM-DD date", value),
            )
        })
}

fn parse_number(key: &str, value: &str) -> ConfigResult<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| ProvisoError::config(key, format!("'{}': {}", value, e)))
}

/// Split a comma-separated list, dropping empty items
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Ordered settings layers, lowest priority first
#[derive(Debug, Clone, Default)]
pub struct ConfigLayering {
    layers: Vec<(ConfigSource, ToolSettings)>,
}

impl ConfigLayering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer above the existing ones
    pub fn with_layer(mut self, source: ConfigSource, settings: ToolSettings) -> Self {
        self.layers.push((source, settings));
        self
    }

    /// Sources in application order
    pub fn sources(&self) -> impl Iterator<Item = &ConfigSource> {
        self.layers.iter().map(|(source, _)| source)
    }

    /// Overlay every layer and validate the result
    pub fn resolve(self) -> ConfigResult<Settings> {
        let raw = self
            .layers
            .into_iter()
            .fold(ToolSettings::default(), |merged, (source, layer)| {
                tracing::debug!("Applying settings from {:?}", source);
                merged.overlay(layer)
            });
        Settings::from_raw(raw)
    }

    /// Settings from `PROVISO_*` variables
    pub fn env_settings(vars: &HashMap<String, String>) -> ConfigResult<ToolSettings> {
        let mut settings = ToolSettings::default();
        for (key, value) in vars {
            match key.as_str() {
                "PROVISO_INDEX_URL" => settings.index_urls = Some(split_list(value)),
                "PROVISO_PYTHON_VERSIONS" => settings.python_versions = Some(split_list(value)),
                "PROVISO_EXTRAS" => settings.extras = Some(split_list(value)),
                "PROVISO_FILENAME" => settings.filename = Some(value.clone()),
                "PROVISO_EXCLUDE_NEWER" => settings.exclude_newer = Some(value.trim().to_string()),
                "PROVISO_MAX_ROUNDS" => settings.max_rounds = Some(parse_number(key, value)? as usize),
                "PROVISO_TIMEOUT" => settings.timeout = Some(parse_number(key, value)?),
                "PROVISO_CONCURRENCY" => settings.concurrency = Some(parse_number(key, value)? as usize),
                _ => {
                    // Unknown variable, ignore
                },
            }
        }
        Ok(settings)
    }

    /// Collect `PROVISO_*` variables from the process environment
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars().filter(|(key, _)| key.starts_with(ENV_PREFIX)).collect()
    }
}

/// Locates and loads configuration files
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Directory the search starts from
    cwd: Utf8PathBuf,
    /// Global config file, when not the default location
    global_path: Option<Utf8PathBuf>,
}

impl ConfigLoader {
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self { cwd, global_path: None }
    }

    /// Read global settings from `path` instead of the default location
    pub fn with_global_path(mut self, path: Utf8PathBuf) -> Self {
        self.global_path = Some(path);
        self
    }

    /// Find pyproject.toml in the working directory or its parents
    pub fn find_pyproject(&self) -> Option<Utf8PathBuf> {
        self.cwd
            .ancestors()
            .map(|dir| dir.join(PYPROJECT_FILE))
            .find(|path| path.is_file())
    }

    /// Load the nearest pyproject.toml
    pub async fn load_project(&self) -> ConfigResult<(PyProject, Utf8PathBuf)> {
        let path = self.find_pyproject().ok_or_else(|| {
            ProvisoError::config(
                PYPROJECT_FILE,
                format!("No {} found in {} or its parent directories", PYPROJECT_FILE, self.cwd),
            )
        })?;
        tracing::debug!("Loading {}", path);
        let project = pyproject::load_from_file(&path).await?;
        Ok((project, path))
    }

    /// Location of the global config file, `~/.config/proviso/config.toml`
    pub fn global_config_path(&self) -> Option<Utf8PathBuf> {
        if let Some(path) = &self.global_path {
            return Some(path.clone());
        }
        let home = Utf8PathBuf::try_from(dirs::home_dir()?).ok()?;
        Some(home.join(".config").join("proviso").join("config.toml"))
    }

    /// Load the global settings file, if present
    pub async fn load_global(&self) -> ConfigResult<Option<(ToolSettings, Utf8PathBuf)>> {
        match self.global_config_path() {
            Some(path) if path.is_file() => {
                let settings = pyproject::load_settings_file(&path).await?;
                Ok(Some((settings, path)))
            },
            _ => Ok(None),
        }
    }

    /// Layer global, project, environment and CLI settings
    pub async fn layered_settings(
        &self,
        project: Option<(&PyProject, &Utf8Path)>,
        env: &HashMap<String, String>,
        cli: ToolSettings,
    ) -> ConfigResult<Settings> {
        let mut layering = ConfigLayering::new();
        if let Some((global, path)) = self.load_global().await? {
            layering = layering.with_layer(ConfigSource::Global(path), global);
        }
        if let Some((pyproject, path)) = project {
            if let Some(settings) = pyproject.settings() {
                layering = layering.with_layer(ConfigSource::Project(path.to_path_buf()), settings.clone());
            }
        }
        layering
            .with_layer(ConfigSource::Environment, ConfigLayering::env_settings(env)?)
            .with_layer(ConfigSource::CommandLine, cli)
            .resolve()
    }
}
