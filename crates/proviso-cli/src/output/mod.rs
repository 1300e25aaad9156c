//! Terminal output.
//!
//! Results go to stdout and failures to stderr. Progress and diagnostics
//! that should respect `--level` are logged through `tracing` instead.

pub mod colors;
pub mod errors;
pub mod requirements;

use colors::ColorSupport;

/// Writes user-facing status lines
pub struct OutputHandler {
    colors: ColorSupport,
}

impl OutputHandler {
    pub fn new() -> Self {
        Self {
            colors: ColorSupport::detect(),
        }
    }

    /// A line as is, for output meant to be piped
    pub fn plain(&self, message: &str) {
        println!("{}", message);
    }

    /// Secondary detail, dimmed
    pub fn info(&self, message: &str) {
        println!("{}", self.colors.dim(message));
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", self.colors.green("✓"), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", self.colors.red("✗"), message);
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new()
    }
}
