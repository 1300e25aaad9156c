//! Simple API response types and distribution file parsing
//!
//! Covers the PEP 691 JSON project page, distribution filenames (wheels and
//! sdists) and the RFC 822 style core-metadata document served next to each
//! file.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use proviso_core::types::canonicalize;
use proviso_core::{Name, PackageMetadata, Requirement, Version, VersionSpecifiers};

/// Media type of the JSON simple API
pub const SIMPLE_JSON_MEDIA_TYPE: &str = "application/vnd.pypi.simple.v1+json";

/// Project page from a simple index
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectPage {
    /// Project name as published
    pub name: String,
    /// Distribution files of every release
    pub files: Vec<ProjectFile>,
    /// API metadata
    #[serde(default)]
    pub meta: Option<PageMeta>,
}

/// Page-level metadata
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PageMeta {
    #[serde(rename = "api-version")]
    pub api_version: Option<String>,
}

/// One distribution file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectFile {
    /// File name, e.g. `requests-2.31.0-py3-none-any.whl`
    pub filename: String,
    /// Download URL, absolute once the page has been fetched
    pub url: String,
    /// Hash digests by algorithm
    #[serde(default)]
    pub hashes: HashMap<String, String>,
    /// `Requires-Python` of the release
    #[serde(rename = "requires-python", default)]
    pub requires_python: Option<String>,
    /// Core metadata availability (PEP 714 name)
    #[serde(rename = "core-metadata", default)]
    pub core_metadata: Option<MetadataAvailability>,
    /// Core metadata availability (PEP 658 name)
    #[serde(rename = "data-dist-info-metadata", default)]
    pub data_dist_info_metadata: Option<MetadataAvailability>,
    /// Core metadata availability (legacy name)
    #[serde(rename = "dist-info-metadata", default)]
    pub dist_info_metadata: Option<MetadataAvailability>,
    /// Yank status
    #[serde(default)]
    pub yanked: Yanked,
    /// When the file was uploaded
    #[serde(rename = "upload-time", default)]
    pub upload_time: Option<DateTime<Utc>>,
}

/// Either a flag or the hashes of the metadata file
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MetadataAvailability {
    Flag(bool),
    Hashes(HashMap<String, String>),
}

/// Either a flag or the yank reason
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Yanked {
    Flag(bool),
    Reason(String),
}

impl Default for Yanked {
    fn default() -> Self {
        Yanked::Flag(false)
    }
}

impl MetadataAvailability {
    fn is_available(&self) -> bool {
        match self {
            MetadataAvailability::Flag(flag) => *flag,
            MetadataAvailability::Hashes(_) => true,
        }
    }
}

impl ProjectFile {
    /// Check if the file was yanked
    pub fn is_yanked(&self) -> bool {
        match &self.yanked {
            Yanked::Flag(flag) => *flag,
            Yanked::Reason(_) => true,
        }
    }

    /// Check if the index serves `{url}.metadata` for this file
    pub fn has_core_metadata(&self) -> bool {
        [
            &self.core_metadata,
            &self.data_dist_info_metadata,
            &self.dist_info_metadata,
        ]
        .into_iter()
        .flatten()
        .any(MetadataAvailability::is_available)
    }

    /// Check if the file was uploaded after `cutoff`.
    ///
    /// Files without an upload time are never considered too new.
    pub fn is_newer_than(&self, cutoff: &DateTime<Utc>) -> bool {
        self.upload_time.is_some_and(|uploaded| uploaded > *cutoff)
    }

    /// Parsed `requires-python`, if present and valid
    pub fn requires_python(&self) -> Option<VersionSpecifiers> {
        self.requires_python
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .and_then(|text| text.parse().ok())
    }
}

/// Kind of distribution file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DistKind {
    Wheel,
    Sdist,
}

/// Project version encoded in a distribution filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistFilename {
    pub kind: DistKind,
    pub version: Version,
}

const SDIST_EXTENSIONS: &[&str] = &[".tar.gz", ".zip", ".tar.bz2", ".tar.xz", ".tgz", ".tar"];

impl DistFilename {
    /// Parse a wheel or sdist filename belonging to `name`.
    ///
    /// Returns `None` for other file types, other projects and unparseable
    /// versions.
    pub fn parse(filename: &str, name: &Name) -> Option<Self> {
        if let Some(stem) = filename.strip_suffix(".whl") {
            // {name}-{version}(-{build})?-{python}-{abi}-{platform}
            let mut parts = stem.split('-');
            let project = parts.next()?;
            let version = parts.next()?;
            if canonicalize(project) != name.as_str() {
                return None;
            }
            return Some(Self {
                kind: DistKind::Wheel,
                version: version.parse().ok()?,
            });
        }

        let stem = SDIST_EXTENSIONS
            .iter()
            .find_map(|extension| filename.strip_suffix(extension))?;
        // Project names may contain dashes, so try every split point
        stem.match_indices('-').find_map(|(index, _)| {
            let (project, version) = (&stem[..index], &stem[index + 1..]);
            if canonicalize(project) != name.as_str() {
                return None;
            }
            Some(Self {
                kind: DistKind::Sdist,
                version: version.parse().ok()?,
            })
        })
    }
}

/// Parse a core-metadata document into the fields the resolver needs.
///
/// Invalid `Requires-Dist` and `Requires-Python` values are skipped with a
/// warning. `name` is used when the document has no `Name` header.
pub fn parse_core_metadata(name: &Name, text: &str) -> PackageMetadata {
    let mut metadata = PackageMetadata::new(name.clone(), None);

    for (key, value) in headers(text) {
        match key.to_ascii_lowercase().as_str() {
            "name" => {
                if let Ok(declared) = Name::new(&value) {
                    metadata.name = declared;
                }
            },
            "version" => metadata.version = value.parse().ok(),
            "requires-python" => match value.parse() {
                Ok(specifiers) => metadata.requires_python = Some(specifiers),
                Err(e) => tracing::warn!("{}: ignoring Requires-Python: {}", name, e),
            },
            "requires-dist" => match value.parse::<Requirement>() {
                Ok(requirement) => metadata.requires_dist.push(requirement),
                Err(e) => tracing::warn!("{}: ignoring Requires-Dist: {}", name, e),
            },
            "provides-extra" => metadata.provides_extra.push(canonicalize(&value)),
            _ => {},
        }
    }

    metadata
}

/// Header fields up to the first blank line, with continuation lines joined
fn headers(text: &str) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = fields.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            fields.push((key.trim().to_string(), value.trim().to_string()));
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        Name::new(s).unwrap()
    }

    #[test]
    fn test_deserialize_project_page() {
        let page: ProjectPage = serde_json::from_value(serde_json::json!({
            "meta": {"api-version": "1.1"},
            "name": "demo",
            "files": [
                {
                    "filename": "demo-1.0-py3-none-any.whl",
                    "url": "https://files.example/demo-1.0-py3-none-any.whl",
                    "hashes": {"sha256": "abc"},
                    "requires-python": ">=3.8",
                    "core-metadata": {"sha256": "def"},
                    "data-dist-info-metadata": {"sha256": "def"},
                    "yanked": false,
                    "upload-time": "2023-05-01T12:00:00.123456Z"
                },
                {
                    "filename": "demo-0.9.tar.gz",
                    "url": "https://files.example/demo-0.9.tar.gz",
                    "yanked": "broken build"
                }
            ]
        }))
        .unwrap();

        assert_eq!(page.files.len(), 2);
        assert!(page.files[0].has_core_metadata());
        assert!(!page.files[0].is_yanked());
        assert_eq!(page.files[0].requires_python().unwrap().to_string(), ">=3.8");
        assert!(page.files[1].is_yanked());
        assert!(!page.files[1].has_core_metadata());
        assert!(page.files[1].upload_time.is_none());
    }

    #[test]
    fn test_upload_cutoff() {
        let file: ProjectFile = serde_json::from_value(serde_json::json!({
            "filename": "demo-1.0.tar.gz",
            "url": "https://files.example/demo-1.0.tar.gz",
            "upload-time": "2024-01-02T00:00:00Z"
        }))
        .unwrap();
        let early: DateTime<Utc> = "2024-01-01T00:00:00Z".parse().unwrap();
        let late: DateTime<Utc> = "2024-02-01T00:00:00Z".parse().unwrap();

        assert!(file.is_newer_than(&early));
        assert!(!file.is_newer_than(&late));
    }

    #[test]
    fn test_parse_wheel_filename() {
        let parsed = DistFilename::parse("Typing_Extensions-4.8.0-py3-none-any.whl", &name("typing-extensions"))
            .unwrap();
        assert_eq!(parsed.kind, DistKind::Wheel);
        assert_eq!(parsed.version.to_string(), "4.8.0");

        assert!(DistFilename::parse("other-1.0-py3-none-any.whl", &name("demo")).is_none());
    }

    #[test]
    fn test_parse_sdist_filename() {
        let parsed = DistFilename::parse("zope.interface-6.1.tar.gz", &name("zope-interface")).unwrap();
        assert_eq!(parsed.kind, DistKind::Sdist);
        assert_eq!(parsed.version.to_string(), "6.1");

        let parsed = DistFilename::parse("my-cool-pkg-2.0rc1.zip", &name("my-cool-pkg")).unwrap();
        assert_eq!(parsed.version.to_string(), "2.0rc1");

        assert!(DistFilename::parse("demo-1.0.exe", &name("demo")).is_none());
        assert!(DistFilename::parse("demo-latest.tar.gz", &name("demo")).is_none());
    }

    #[test]
    fn test_parse_core_metadata() {
        let text = [
            "Metadata-Version: 2.1",
            "Name: Demo_Pkg",
            "Version: 1.2.0",
            "Summary: A demo",
            "  spanning two lines",
            "Requires-Python: >=3.8",
            "Requires-Dist: urllib3>=1.21.1",
            "Requires-Dist: PySocks!=1.5.7; extra == \"socks\"",
            "Requires-Dist: not a valid requirement!!",
            "Provides-Extra: Socks",
            "",
            "Requires-Dist: body-is-ignored",
        ]
        .join("\n");

        let metadata = parse_core_metadata(&name("demo-pkg"), &text);
        assert_eq!(metadata.name.as_str(), "demo-pkg");
        assert_eq!(metadata.version.unwrap().to_string(), "1.2.0");
        assert_eq!(metadata.requires_python.unwrap().to_string(), ">=3.8");
        assert_eq!(metadata.requires_dist.len(), 2);
        assert_eq!(metadata.requires_dist[1].name.as_str(), "pysocks");
        assert_eq!(metadata.provides_extra, vec!["socks".to_string()]);
    }
}
