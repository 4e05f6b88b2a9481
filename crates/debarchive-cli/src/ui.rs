//! Console status output.
//!
//! Status lines go to stderr so stdout stays clean for data (`inspect`,
//! `show`, `hash`, `key --export`).

use crossterm::style::Stylize;

/// Status printer honouring `--quiet`. Warnings are always shown.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    quiet: bool,
}

impl Output {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    /// Prints an informational message.
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            eprintln!("  {} {msg}", "•".dark_grey());
        }
    }

    /// Prints a success message.
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            eprintln!("  {} {msg}", "✓".green());
        }
    }

    /// Prints a warning.
    pub fn warning(&self, msg: &str) {
        eprintln!("  {} {msg}", "!".yellow());
    }
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    let kb = bytes as f64 / 1024.0;
    let mb = kb / 1024.0;
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else if kb >= 1024.0 {
        format!("{mb:.1} MB")
    } else if kb >= 1.0 {
        format!("{kb:.1} KB")
    } else {
        format!("{bytes} B")
    }
}
