//! Publish command

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use debarchive_core::config::{ArchiveConfig, ComponentConfig, SuiteConfig};
use debarchive_core::{
    Archive, ArchiveState, Component, Package, PackagesReader, SigningKey, Suite,
};
use tracing::{debug, info, warn};

use crate::ui::Output;

/// Switches of the publish command.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOptions {
    /// Skip `Release.gpg`/`InRelease`.
    pub unsigned: bool,
    /// Engross but do not link.
    pub dry_run: bool,
    /// Collect garbage after linking.
    pub gc: bool,
}

/// Build every suite of the configuration, then link the result.
///
/// All suites are engrossed before anything is linked, so a failure in
/// any of them leaves the live tree untouched.
pub fn publish(
    config_path: &Path,
    key: Option<&Path>,
    options: PublishOptions,
    output: &Output,
) -> Result<()> {
    let config = ArchiveConfig::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    if config.suites.is_empty() {
        output.warning("No suites configured");
    }

    let signing_key = if options.unsigned {
        None
    } else {
        let path = key
            .map(Path::to_path_buf)
            .or_else(|| config.signing_key.clone())
            .context("No signing key configured; pass --key or --unsigned")?;
        let key = SigningKey::load(&path)
            .with_context(|| format!("Failed to load signing key {}", path.display()))?;
        output.info(&format!("Signing with {}", key.fingerprint()));
        Some(key)
    };

    let archive = Archive::open(&config.root, signing_key)
        .with_context(|| format!("Failed to open repository {}", config.root.display()))?;

    let mut state = ArchiveState::new();
    for suite_config in &config.suites {
        let mut suite = archive.suite(&suite_config.name)?;
        configure(&mut suite, suite_config)?;
        for component_config in &suite_config.components {
            add_component(&archive, &mut suite, component_config, &mut state)
                .with_context(|| {
                    format!(
                        "Failed to build {}/{}",
                        suite_config.name, component_config.name
                    )
                })?;
        }

        let engrossed = if options.unsigned {
            archive.engross_unsigned(&mut suite)
        } else {
            archive.engross(&mut suite)
        }
        .with_context(|| format!("Failed to engross suite {}", suite_config.name))?;
        output.info(&format!(
            "{}: {} packages, {} paths",
            suite_config.name,
            suite.components().map(Component::len).sum::<usize>(),
            engrossed.len()
        ));
        state.extend(engrossed);
    }

    if options.dry_run {
        for (path, object) in &state {
            println!("{object}  {path}");
        }
        output.info("Dry run, nothing linked");
        return Ok(());
    }

    archive.link(&state).context("Failed to link")?;
    output.success(&format!(
        "Published {} suites to {}",
        config.suites.len(),
        archive.path().display()
    ));

    if options.gc {
        let summary = archive.gc().context("Garbage collection failed")?;
        output.info(&format!("{} unreferenced objects removed", summary.reclaimed));
    }
    Ok(())
}

fn configure(suite: &mut Suite<'_>, config: &SuiteConfig) -> Result<()> {
    suite.description.clone_from(&config.description);
    suite.origin.clone_from(&config.origin);
    suite.label.clone_from(&config.label);
    suite.version.clone_from(&config.version);
    if let Some(hashes) = &config.hashes {
        suite.set_hashes(hashes)?;
    }
    suite
        .set_valid_for(config.valid_for())
        .with_context(|| format!("Invalid valid_for for suite {}", config.name))?;
    Ok(())
}

fn add_component(
    archive: &Archive,
    suite: &mut Suite<'_>,
    config: &ComponentConfig,
    state: &mut ArchiveState,
) -> Result<()> {
    let component = suite.component(&config.name)?;

    for path in expand(&config.debs)? {
        let package = if config.pool {
            archive.pool().include_deb(&config.name, &path, state)?
        } else {
            in_place(archive, &path)?
        };
        debug!(package = %package.name, filename = %package.filename, "adding");
        component.add_package(&package)?;
    }

    for index in &config.indices {
        let reader = PackagesReader::open(index)
            .with_context(|| format!("Failed to open index {}", index.display()))?;
        let mut imported = 0;
        for package in reader {
            component.add_package(&package?)?;
            imported += 1;
        }
        info!(index = %index.display(), imported, "index imported");
    }
    Ok(())
}

/// A `.deb` already inside the repository, indexed where it lies.
fn in_place(archive: &Archive, path: &Path) -> Result<Package> {
    let absolute = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    let Ok(relative) = absolute.strip_prefix(archive.path()) else {
        bail!(
            "{} is outside the repository root; enable pool for its component",
            path.display()
        );
    };

    let mut package = Package::from_deb(&absolute)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    package.filename = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Ok(package)
}

/// Expand glob patterns into a sorted, de-duplicated file list.
fn expand(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let matches = glob::glob(pattern).with_context(|| format!("Invalid pattern {pattern:?}"))?;
        let before = paths.len();
        for entry in matches {
            let path = entry?;
            if path.is_file() {
                paths.push(path);
            }
        }
        if paths.len() == before {
            warn!(pattern, "pattern matched no files");
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_sorts_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.deb", "a.deb", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.deb")).unwrap();

        let all = format!("{}/*.deb", dir.path().display());
        let one = format!("{}/a.deb", dir.path().display());
        let missing = format!("{}/none-*.deb", dir.path().display());
        let paths = expand(&[all, one, missing]).unwrap();
        assert_eq!(
            paths,
            [dir.path().join("a.deb"), dir.path().join("b.deb")]
        );
    }

    #[test]
    fn test_in_place_requires_file_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::open(dir.path().join("repo"), None).unwrap();
        let outside = dir.path().join("x.deb");
        std::fs::write(&outside, b"x").unwrap();
        assert!(in_place(&archive, &outside).is_err());
    }
}
