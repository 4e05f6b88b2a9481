//! Show command

use std::path::Path;

use anyhow::{Context, Result};
use debarchive_core::Package;
use debarchive_core::archive::pool_path;

/// Print the index record for a `.deb`. With a component, `Filename` is
/// the location the pool would give it.
pub fn show(deb: &Path, component: Option<&str>) -> Result<()> {
    let mut package =
        Package::from_deb(deb).with_context(|| format!("Failed to read {}", deb.display()))?;
    if let Some(component) = component {
        package.filename = pool_path(component, &package);
    }
    print!("{}", package.to_paragraph());
    Ok(())
}
