//! pyproject.toml parsing
//!
//! Reads the static `[project]` table (PEP 621) into `PackageMetadata` and
//! the `[tool.proviso]` settings table. Projects whose dependencies are
//! computed by a build backend are rejected.

use std::collections::BTreeMap;

use camino::Utf8Path;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use proviso_core::types::canonicalize;
use proviso_core::{MarkerTree, Name, PackageMetadata, ProvisoError, Requirement, Version, VersionSpecifiers};

use crate::ConfigResult;

/// The parts of pyproject.toml proviso reads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PyProject {
    /// Static project metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectTable>,

    /// Tool tables
    #[serde(default)]
    pub tool: ToolTable,
}

/// PEP 621 `[project]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectTable {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_python: Option<String>,

    /// PEP 508 runtime requirements
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Requirements per extra
    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, Vec<String>>,

    /// Fields left to the build backend
    #[serde(default)]
    pub dynamic: Vec<String>,
}

/// `[tool]` table, other tools' entries are ignored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proviso: Option<ToolSettings>,
}

/// proviso settings as written in `[tool.proviso]` or the global config file.
///
/// Every field is optional; unset fields fall through to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ToolSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_urls: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_versions: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// RFC 3339 timestamp or `YYYY-MM-DD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_newer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<usize>,

    /// Per-environment timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

impl ToolSettings {
    /// Overlay `other` on top of `self`; set fields in `other` win
    pub fn overlay(mut self, other: ToolSettings) -> Self {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        take!(
            index_urls,
            python_versions,
            extras,
            filename,
            exclude_newer,
            max_rounds,
            timeout,
            concurrency
        );
        self
    }
}

impl PyProject {
    /// The `[tool.proviso]` table, if any
    pub fn settings(&self) -> Option<&ToolSettings> {
        self.tool.proviso.as_ref()
    }

    /// Static metadata from `[project]`
    pub fn metadata(&self) -> ConfigResult<PackageMetadata> {
        self.project
            .as_ref()
            .ok_or_else(|| ProvisoError::config("project", "pyproject.toml has no [project] table"))?
            .metadata()
    }
}

impl ProjectTable {
    /// Convert to package metadata.
    ///
    /// Optional dependencies become requirements gated on `extra == '<name>'`,
    /// combined with any marker they already carry.
    pub fn metadata(&self) -> ConfigResult<PackageMetadata> {
        if let Some(field) = self
            .dynamic
            .iter()
            .find(|field| matches!(field.as_str(), "dependencies" | "optional-dependencies"))
        {
            return Err(ProvisoError::config(
                "project.dynamic",
                format!("'{}' is dynamic; only static project metadata is supported", field),
            ));
        }

        let name = Name::new(&self.name)?;
        let version = match &self.version {
            Some(version) => Some(
                version
                    .parse::<Version>()
                    .map_err(|e| ProvisoError::config("project.version", e.to_string()))?,
            ),
            None => None,
        };

        let mut metadata = PackageMetadata::new(name, version);
        if let Some(requires_python) = &self.requires_python {
            let specifiers = requires_python
                .parse::<VersionSpecifiers>()
                .map_err(|e| ProvisoError::config("project.requires-python", e.to_string()))?;
            metadata = metadata.with_requires_python(specifiers);
        }

        for dependency in &self.dependencies {
            metadata = metadata.with_requirement(parse_requirement("project.dependencies", dependency)?);
        }

        for (extra, dependencies) in &self.optional_dependencies {
            let field = format!("project.optional-dependencies.{}", extra);
            if !Name::is_valid(extra) {
                return Err(ProvisoError::config(field, format!("'{}' is not a valid extra name", extra)));
            }
            let extra = canonicalize(extra);
            let gate: MarkerTree = format!("extra == '{}'", extra).parse()?;

            for dependency in dependencies {
                let mut requirement = parse_requirement(&field, dependency)?;
                requirement.marker = Some(match requirement.marker.take() {
                    Some(marker) => MarkerTree::And(vec![marker, gate.clone()]),
                    None => gate.clone(),
                });
                metadata = metadata.with_requirement(requirement);
            }
            metadata.provides_extra.push(extra);
        }

        Ok(metadata)
    }
}

fn parse_requirement(field: &str, text: &str) -> ConfigResult<Requirement> {
    text.parse()
        .map_err(|e: proviso_core::types::RequirementError| ProvisoError::config(field, e.to_string()))
}

fn parse_toml<T: DeserializeOwned>(content: &str, file: &str) -> ConfigResult<T> {
    let error = |message: String| ProvisoError::TomlParse {
        file: file.to_string(),
        message,
    };
    // toml_edit reports line and column for syntax errors
    content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| error(e.to_string()))?;
    toml::from_str(content).map_err(|e| error(e.to_string()))
}

/// Parse pyproject.toml content. `file` names the source in errors.
pub fn parse_pyproject(content: &str, file: &str) -> ConfigResult<PyProject> {
    parse_toml(content, file)
}

/// Parse a settings file whose keys sit at the top level
pub fn parse_settings(content: &str, file: &str) -> ConfigResult<ToolSettings> {
    parse_toml(content, file)
}

async fn read(path: &Utf8Path) -> ConfigResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ProvisoError::io(format!("Failed to read {}", path), e))
}

/// Load and parse pyproject.toml from `path`
pub async fn load_from_file(path: &Utf8Path) -> ConfigResult<PyProject> {
    let content = read(path).await?;
    parse_pyproject(&content, path.as_str())
}

/// Load a settings file from `path`
pub async fn load_settings_file(path: &Utf8Path) -> ConfigResult<ToolSettings> {
    let content = read(path).await?;
    parse_settings(&content, path.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYPROJECT: &str = r#"
[build-system]
requires = ["hatchling"]
build-backend = "hatchling.build"

[project]
name = "My_Project"
version = "1.2.0"
requires-python = ">=3.9"
dependencies = [
    "requests>=2.0.0",
    "tomli; python_version < '3.11'",
]

[project.optional-dependencies]
Security = ["cryptography>=1.0"]
test = ["pytest>=7", "pytest-asyncio; python_version >= '3.10'"]

[tool.black]
line-length = 100

[tool.proviso]
python-versions = ["3.10", "3.12"]
filename = "constraints.txt"
max-rounds = 5000
"#;

    fn names(requirements: &[Requirement]) -> Vec<String> {
        requirements.iter().map(|r| r.name.to_string()).collect()
    }

    #[test]
    fn test_parse_project_metadata() {
        let pyproject = parse_pyproject(PYPROJECT, "pyproject.toml").unwrap();
        let metadata = pyproject.metadata().unwrap();

        assert_eq!(metadata.name.as_str(), "my-project");
        assert_eq!(metadata.version.unwrap().to_string(), "1.2.0");
        assert_eq!(metadata.requires_python.unwrap().to_string(), ">=3.9");
        assert_eq!(metadata.provides_extra, vec!["security", "test"]);
        assert_eq!(metadata.requires_dist.len(), 5);
    }

    #[test]
    fn test_extras_gate_optional_dependencies() {
        let metadata = parse_pyproject(PYPROJECT, "pyproject.toml").unwrap().metadata().unwrap();

        assert_eq!(names(&metadata.requirements_for_extras(&[])), vec!["requests", "tomli"]);
        assert_eq!(
            names(&metadata.requirements_for_extras(&["security".to_string()])),
            vec!["requests", "tomli", "cryptography"]
        );

        let with_test = metadata.requirements_for_extras(&["test".to_string()]);
        assert_eq!(names(&with_test), vec!["requests", "tomli", "pytest", "pytest-asyncio"]);
        assert_eq!(
            with_test[3].marker.as_ref().unwrap().to_string(),
            "python_version >= \"3.10\" and extra == \"test\""
        );
    }

    #[test]
    fn test_tool_settings() {
        let pyproject = parse_pyproject(PYPROJECT, "pyproject.toml").unwrap();
        let settings = pyproject.settings().unwrap();

        assert_eq!(
            settings.python_versions.as_deref(),
            Some(&["3.10".to_string(), "3.12".to_string()][..])
        );
        assert_eq!(settings.filename.as_deref(), Some("constraints.txt"));
        assert_eq!(settings.max_rounds, Some(5000));
        assert!(settings.index_urls.is_none());
    }

    #[test]
    fn test_unknown_tool_key_rejected() {
        let content = "[tool.proviso]\npython-version = [\"3.12\"]\n";
        assert!(matches!(
            parse_pyproject(content, "pyproject.toml"),
            Err(ProvisoError::TomlParse { .. })
        ));
    }

    #[test]
    fn test_syntax_error_reports_location() {
        let error = parse_pyproject("[project\nname = 'x'\n", "pyproject.toml").unwrap_err();
        match error {
            ProvisoError::TomlParse { file, message } => {
                assert_eq!(file, "pyproject.toml");
                assert!(message.contains("line 1"));
            },
            other => panic!("Expected TomlParse, got {:?}", other),
        }
    }

    #[test]
    fn test_dynamic_dependencies_rejected() {
        let content = "[project]\nname = \"demo\"\ndynamic = [\"version\", \"dependencies\"]\n";
        let error = parse_pyproject(content, "pyproject.toml").unwrap().metadata().unwrap_err();
        assert!(matches!(error, ProvisoError::ConfigValidation { ref field, .. } if field == "project.dynamic"));

        // A dynamic version alone is fine
        let content = "[project]\nname = \"demo\"\ndynamic = [\"version\"]\n";
        let metadata = parse_pyproject(content, "pyproject.toml").unwrap().metadata().unwrap();
        assert!(metadata.version.is_none());
    }

    #[test]
    fn test_invalid_dependency_rejected() {
        let content = "[project]\nname = \"demo\"\ndependencies = [\"requests @ https://example.com/requests.zip\"]\n";
        let error = parse_pyproject(content, "pyproject.toml").unwrap().metadata().unwrap_err();
        assert!(matches!(error, ProvisoError::ConfigValidation { ref field, .. } if field == "project.dependencies"));
    }

    #[test]
    fn test_missing_project_table() {
        let pyproject = parse_pyproject("[tool.proviso]\nextras = []\n", "pyproject.toml").unwrap();
        assert!(pyproject.metadata().is_err());
        assert_eq!(pyproject.settings().unwrap().extras, Some(Vec::new()));
    }

    #[test]
    fn test_overlay_prefers_set_fields() {
        let base = ToolSettings {
            filename: Some("base.txt".to_string()),
            timeout: Some(10),
            ..ToolSettings::default()
        };
        let top = ToolSettings {
            timeout: Some(30),
            ..ToolSettings::default()
        };

        let merged = base.overlay(top);
        assert_eq!(merged.filename.as_deref(), Some("base.txt"));
        assert_eq!(merged.timeout, Some(30));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = camino::Utf8PathBuf::try_from(dir.path().join("pyproject.toml")).unwrap();
        std::fs::write(&path, PYPROJECT).unwrap();

        let pyproject = tokio_test::block_on(load_from_file(&path)).unwrap();
        assert_eq!(pyproject.project.unwrap().name, "My_Project");

        let missing = tokio_test::block_on(load_from_file(&path.with_file_name("absent.toml")));
        assert!(matches!(missing, Err(ProvisoError::Io { .. })));
    }
}
