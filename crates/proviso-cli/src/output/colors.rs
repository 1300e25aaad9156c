//! Terminal color support.
//!
//! Colors are used only when both stdout and stderr are terminals and
//! `NO_COLOR` is unset.

use std::env;
use std::io::{self, IsTerminal};

const RESET: &str = "\x1b[0m";

/// Color support detection and formatting
#[derive(Debug, Clone, Copy)]
pub struct ColorSupport {
    enabled: bool,
}

impl ColorSupport {
    pub fn detect() -> Self {
        let enabled = env::var_os("NO_COLOR").is_none() && io::stderr().is_terminal() && io::stdout().is_terminal();
        Self { enabled }
    }

    /// Plain text, for tests and redirected output
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{}m{}{}", code, text, RESET)
        } else {
            text.to_string()
        }
    }

    pub fn green(&self, text: &str) -> String {
        self.paint("32", text)
    }

    pub fn red(&self, text: &str) -> String {
        self.paint("31", text)
    }

    pub fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }

    pub fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }
}
