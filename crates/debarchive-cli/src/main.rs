//! debarchive - Debian repository publisher CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use debarchive_cli::cmd;
use debarchive_cli::cmd::publish::PublishOptions;
use debarchive_cli::ui::Output;
use debarchive_cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let output = Output::new(cli.quiet);
    match cli.command {
        Commands::Publish {
            config,
            key,
            unsigned,
            dry_run,
            gc,
        } => cmd::publish::publish(
            &config,
            key.as_deref(),
            PublishOptions {
                unsigned,
                dry_run,
                gc,
            },
            &output,
        ),
        Commands::Gc { root } => cmd::gc::gc(&root, &output),
        Commands::Inspect { index, json } => cmd::inspect::inspect(&index, json),
        Commands::Show { deb, component } => cmd::show::show(&deb, component.as_deref()),
        Commands::Hash { files } => cmd::hash::hash(&files),
        Commands::Key { key, export } => cmd::key::key(&key, export),
        Commands::Verify { key, suite, root } => cmd::verify::verify(&root, &suite, &key, &output),
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
    }
}
