//! Inspect command

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use debarchive_core::PackagesReader;

/// List the records of a `Packages` file, one per line, or as a JSON
/// array of full records.
pub fn inspect(index: &Path, json: bool) -> Result<()> {
    let reader = PackagesReader::open(index)
        .with_context(|| format!("Failed to open index {}", index.display()))?;
    let mut stdout = io::stdout().lock();

    if json {
        let records = reader
            .map(|package| package.map(|p| p.to_paragraph()))
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to decode {}", index.display()))?;
        serde_json::to_writer_pretty(&mut stdout, &records)?;
        writeln!(stdout)?;
        return Ok(());
    }

    for package in reader {
        let package = package.with_context(|| format!("Failed to decode {}", index.display()))?;
        writeln!(
            stdout,
            "{} {} {} {}",
            package.name, package.version, package.architecture, package.filename
        )?;
    }
    Ok(())
}
