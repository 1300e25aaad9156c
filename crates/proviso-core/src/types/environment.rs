//! Target environment descriptors.
//!
//! An `Environment` maps marker variable names to values and carries the
//! label that identifies it in resolver output.

use std::collections::BTreeMap;
use std::fmt;

use super::marker::MarkerVariable;
use super::version::{Version, VersionError};

/// Marker variable values for one target runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    label: String,
    label_variable: String,
    values: BTreeMap<String, String>,
}

impl Environment {
    /// Create an environment from marker values.
    ///
    /// Legacy dotted variable names are stored under their canonical names.
    pub fn new<K, V>(label: impl Into<String>, values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|(key, value)| {
                let key = key.as_ref();
                let key = MarkerVariable::from_name(key)
                    .map_or_else(|| key.to_string(), |variable| variable.as_str().to_string());
                (key, value.into())
            })
            .collect();

        Self {
            label: label.into(),
            label_variable: MarkerVariable::PythonVersion.as_str().to_string(),
            values,
        }
    }

    /// Build the environment of a target Python version running on this host
    pub fn for_python(label: &str) -> Result<Self, VersionError> {
        let version: Version = label.parse()?;
        let short = format!("{}.{}", version.major(), version.minor());
        let full = format!("{}.{}.{}", version.major(), version.minor(), version.micro());
        let host = HostPlatform::current();
        // `python_version` only carries major.minor
        let label_variable = if version.release().len() > 2 {
            MarkerVariable::PythonFullVersion
        } else {
            MarkerVariable::PythonVersion
        };

        Ok(Self::new(
            label.trim(),
            [
                ("python_version", short),
                ("python_full_version", full.clone()),
                ("implementation_version", full),
                ("implementation_name", "cpython".to_string()),
                ("platform_python_implementation", "CPython".to_string()),
                ("os_name", host.os_name.to_string()),
                ("sys_platform", host.sys_platform.to_string()),
                ("platform_system", host.platform_system.to_string()),
                ("platform_machine", host.platform_machine.to_string()),
            ],
        )
        .with_label_variable(label_variable.as_str()))
    }

    /// Use a different marker variable for the label in output
    pub fn with_label_variable(mut self, variable: impl Into<String>) -> Self {
        self.label_variable = variable.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn label_variable(&self) -> &str {
        &self.label_variable
    }

    /// Value of a marker variable; missing variables read as ""
    pub fn get(&self, variable: &str) -> &str {
        self.values.get(variable).map_or("", String::as_str)
    }

    /// The full interpreter version, used for `Requires-Python` checks
    pub fn python_full_version(&self) -> Option<Version> {
        [MarkerVariable::PythonFullVersion, MarkerVariable::PythonVersion]
            .iter()
            .find_map(|variable| self.get(variable.as_str()).parse().ok())
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Platform marker values of the machine we run on
struct HostPlatform {
    os_name: &'static str,
    sys_platform: &'static str,
    platform_system: &'static str,
    platform_machine: &'static str,
}

impl HostPlatform {
    fn current() -> Self {
        use std::env::consts::{ARCH, FAMILY, OS};

        let os_name = if FAMILY == "windows" { "nt" } else { "posix" };
        let (sys_platform, platform_system) = match OS {
            "linux" => ("linux", "Linux"),
            "macos" => ("darwin", "Darwin"),
            "windows" => ("win32", "Windows"),
            "freebsd" => ("freebsd", "FreeBSD"),
            other => (other, other),
        };
        let platform_machine = match (OS, ARCH) {
            ("windows", "x86_64") => "AMD64",
            ("macos", "aarch64") => "arm64",
            (_, arch) => arch,
        };

        Self {
            os_name,
            sys_platform,
            platform_system,
            platform_machine,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_python_fills_versions() {
        let env = Environment::for_python("3.10").unwrap();
        assert_eq!(env.label(), "3.10");
        assert_eq!(env.label_variable(), "python_version");
        assert_eq!(env.get("python_version"), "3.10");
        assert_eq!(env.get("python_full_version"), "3.10.0");
        assert_eq!(env.get("implementation_name"), "cpython");
        assert!(!env.get("sys_platform").is_empty());
    }

    #[test]
    fn test_for_python_with_micro() {
        let env = Environment::for_python("3.9.7").unwrap();
        assert_eq!(env.label_variable(), "python_full_version");
        assert_eq!(env.get("python_version"), "3.9");
        assert_eq!(env.get("python_full_version"), "3.9.7");
        assert_eq!(env.python_full_version(), Some("3.9.7".parse().unwrap()));
    }

    #[test]
    fn test_for_python_rejects_garbage() {
        assert!(Environment::for_python("three").is_err());
    }

    #[test]
    fn test_legacy_keys_are_canonicalized() {
        let env = Environment::new("x", [("sys.platform", "linux")]);
        assert_eq!(env.get("sys_platform"), "linux");
        assert_eq!(env.get("os_name"), "");
        assert_eq!(env.python_full_version(), None);
    }
}
