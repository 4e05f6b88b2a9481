//! Completions command

use clap::CommandFactory;
use clap_complete::Shell;

use crate::Cli;

/// Write a completion script for `shell` to stdout.
pub fn completions(shell: Shell) {
    clap_complete::generate(shell, &mut Cli::command(), "debarchive", &mut std::io::stdout());
}
