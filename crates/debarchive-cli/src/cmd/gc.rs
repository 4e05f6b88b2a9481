//! Gc command

use std::path::Path;

use anyhow::{Context, Result, bail};
use debarchive_core::Archive;
use debarchive_core::store::STORE_DIR;

use crate::ui::{Output, format_size};

/// Collect objects of the repository at `root` that nothing links to.
pub fn gc(root: &Path, output: &Output) -> Result<()> {
    if !root.join(STORE_DIR).is_dir() {
        bail!("{} is not a debarchive repository", root.display());
    }
    let archive = Archive::open(root, None)
        .with_context(|| format!("Failed to open repository {}", root.display()))?;
    let summary = archive.gc().context("Garbage collection failed")?;

    output.success(&format!(
        "{} of {} objects removed, {} reclaimed",
        summary.reclaimed,
        summary.scanned,
        format_size(summary.reclaimed_bytes)
    ));
    Ok(())
}
