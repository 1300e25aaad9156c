//! Error message formatting with actionable suggestions.
//!
//! Every report has the same shape: the message, an optional `help` line and
//! the chain of underlying causes.

use std::error::Error;

use proviso_core::ProvisoError;
use proviso_resolver::EnvironmentFailure;

use super::colors::ColorSupport;

/// Error formatter with suggestions
pub struct ErrorFormatter {
    colors: ColorSupport,
}

impl ErrorFormatter {
    pub fn new() -> Self {
        Self {
            colors: ColorSupport::detect(),
        }
    }

    pub fn with_colors(colors: ColorSupport) -> Self {
        Self { colors }
    }

    /// Format a fatal error
    pub fn format_error(&self, error: &ProvisoError) -> String {
        self.format_report(&self.colors.red("error"), error, error.suggestion())
    }

    /// Format an environment that failed to resolve
    pub fn format_failure(&self, failure: &EnvironmentFailure) -> String {
        let heading = format!(
            "{} {} ({})",
            self.colors.red("failed"),
            self.colors.bold(&failure.label),
            failure.error.kind()
        );
        self.format_report(&heading, &failure.error, failure.error.suggestion())
    }

    fn format_report(&self, heading: &str, error: &dyn Error, suggestion: Option<&str>) -> String {
        let mut output = format!("{}: {}\n", heading, error);

        if let Some(suggestion) = suggestion {
            output.push('\n');
            output.push_str(&self.colors.dim("help"));
            output.push_str(": ");
            output.push_str(suggestion);
            output.push('\n');
        }

        let mut source = error.source();
        while let Some(err) = source {
            output.push('\n');
            output.push_str(&self.colors.dim("caused by"));
            output.push_str(": ");
            output.push_str(&err.to_string());
            source = err.source();
        }

        output
    }
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        Self::new()
    }
}
