//! debarchive - build and publish signed Debian binary repositories
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Thin command-line front end over `debarchive-core`.
//!
//! # Layout of a published repository
//!
//! ```text
//! <root>/
//! ├── .store/                       # content-addressed objects
//! ├── dists/<suite>/
//! │   ├── Release, Release.gpg, InRelease
//! │   └── <component>/binary-<arch>/Packages
//! └── pool/<component>/<prefix>/<source>/*.deb
//! ```

pub mod cmd;
pub mod ui;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "debarchive")]
#[command(author, version, about = "Build and publish signed Debian binary repositories")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress status messages
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build every configured suite and publish it
    Publish {
        /// Configuration file
        #[arg(short, long, default_value = "debarchive.toml")]
        config: PathBuf,
        /// Signing key, overriding `signing_key` in the configuration
        #[arg(long, env = "DEBARCHIVE_SIGNING_KEY")]
        key: Option<PathBuf>,
        /// Publish without Release.gpg and InRelease
        #[arg(long)]
        unsigned: bool,
        /// Build everything but link nothing into the live tree
        #[arg(long)]
        dry_run: bool,
        /// Collect unreferenced objects afterwards
        #[arg(long)]
        gc: bool,
    },
    /// Remove store objects no published path refers to
    Gc {
        /// Repository root
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// List the records of a Packages index (plain, .gz, .xz or .zst)
    Inspect {
        /// Index file
        index: PathBuf,
        /// Print full records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the Packages record a .deb would get
    Show {
        /// Package file
        deb: PathBuf,
        /// Use the pool location for this component as Filename
        #[arg(long)]
        component: Option<String>,
    },
    /// Print size and every supported digest of files
    Hash {
        /// Files to hash
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show the identity of a signing key
    Key {
        /// Key file (armored or binary)
        #[arg(long, env = "DEBARCHIVE_SIGNING_KEY")]
        key: PathBuf,
        /// Print the armored public key
        #[arg(long)]
        export: bool,
    },
    /// Check the signatures and index digests of a published suite
    Verify {
        /// Public or secret key to verify against
        #[arg(long, env = "DEBARCHIVE_SIGNING_KEY")]
        key: PathBuf,
        /// Suite name
        #[arg(long)]
        suite: String,
        /// Repository root
        #[arg(default_value = ".")]
        root: PathBuf,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_publish() {
        let cli = Cli::try_parse_from([
            "debarchive",
            "-vv",
            "publish",
            "--config",
            "repo.toml",
            "--unsigned",
            "--gc",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Publish {
                config,
                unsigned,
                dry_run,
                gc,
                ..
            } => {
                assert_eq!(config, PathBuf::from("repo.toml"));
                assert!(unsigned && gc && !dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_hash_needs_files() {
        assert!(Cli::try_parse_from(["debarchive", "hash"]).is_err());
    }
}
