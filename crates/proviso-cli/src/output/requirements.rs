//! requirements.txt rendering
//!
//! One `name==version` line per pinned release, names sorted and versions
//! ascending. A release chosen by only some environments carries a marker
//! naming those environments, in request order.

use camino::Utf8Path;
use indexmap::IndexSet;
use proviso_core::{ProvisoError, ProvisoResult};
use proviso_resolver::MultiResolution;

/// Renders a merged resolution as a requirements file
pub struct RequirementsWriter<'a> {
    resolution: &'a MultiResolution,
    header: Option<&'a str>,
}

impl<'a> RequirementsWriter<'a> {
    pub fn new(resolution: &'a MultiResolution) -> Self {
        Self { resolution, header: None }
    }

    /// Text written before the pins, newline terminated if it isn't already
    pub fn with_header(mut self, header: Option<&'a str>) -> Self {
        self.header = header;
        self
    }

    pub fn render(&self) -> String {
        let mut output = String::new();

        if let Some(header) = self.header {
            output.push_str(header);
            if !header.ends_with('\n') {
                output.push('\n');
            }
        }

        for (name, versions) in &self.resolution.versions {
            for (version, labels) in versions {
                output.push_str(&format!("{}=={}", name, version));
                if !self.resolution.covers_all(labels) {
                    output.push_str("; ");
                    output.push_str(&environment_marker(self.resolution, labels));
                }
                output.push('\n');
            }
        }

        output
    }

    /// Write the rendered file, replacing any previous content
    pub async fn write_to(&self, path: &Utf8Path) -> ProvisoResult<()> {
        tokio::fs::write(path, self.render())
            .await
            .map_err(|e| ProvisoError::io(format!("Failed to write {}", path), e))
    }
}

fn environment_marker(resolution: &MultiResolution, labels: &IndexSet<String>) -> String {
    labels
        .iter()
        .map(|label| format!("{}=='{}'", resolution.label_variable(label), label))
        .collect::<Vec<_>>()
        .join(" or ")
}
