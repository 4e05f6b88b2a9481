//! Publishing configuration (`debarchive.toml`).
//!
//! ```toml
//! root = "public"
//! signing_key = "keys/archive.asc"
//!
//! [[suite]]
//! name = "stable"
//! origin = "Example"
//! valid_for = "168h"
//! hashes = ["sha256", "sha512"]
//!
//! [[suite.component]]
//! name = "main"
//! debs = ["incoming/*.deb"]
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use debarchive_schema::HashAlgorithm;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn default_valid_for() -> String {
    "168h".to_string()
}

fn default_pool() -> bool {
    true
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Repository root; `dists/`, `pool/` and `.store/` live here.
    pub root: PathBuf,
    /// Armored or binary OpenPGP secret key.
    #[serde(default)]
    pub signing_key: Option<PathBuf>,
    /// Suites to publish.
    #[serde(default, rename = "suite")]
    pub suites: Vec<SuiteConfig>,
}

/// One `[[suite]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub version: String,
    /// Go-style duration; an empty string disables `Valid-Until`.
    #[serde(default = "default_valid_for")]
    pub valid_for: String,
    /// Digest set for indices and `Release`; the suite default when absent.
    #[serde(default)]
    pub hashes: Option<Vec<HashAlgorithm>>,
    #[serde(default, rename = "component")]
    pub components: Vec<ComponentConfig>,
}

/// One `[[suite.component]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    pub name: String,
    /// Glob patterns of `.deb` files to include.
    #[serde(default)]
    pub debs: Vec<String>,
    /// Existing `Packages` files (optionally compressed) whose records are
    /// carried over as they are.
    #[serde(default)]
    pub indices: Vec<PathBuf>,
    /// Copy `.deb` files into `pool/`; otherwise they must already sit
    /// under the root and are indexed where they are.
    #[serde(default = "default_pool")]
    pub pool: bool,
}

impl SuiteConfig {
    /// The validity duration, `None` when disabled.
    pub fn valid_for(&self) -> Option<&str> {
        Some(self.valid_for.trim()).filter(|d| !d.is_empty())
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl ArchiveConfig {
    /// Read and validate a configuration file.
    ///
    /// # Errors
    ///
    /// The file cannot be read, is not valid TOML for this schema, or
    /// repeats a suite or component name.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&text, base)
    }

    /// Parse configuration text, resolving relative paths against `base`.
    ///
    /// # Errors
    ///
    /// See [`ArchiveConfig::load`].
    pub fn parse(text: &str, base: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(text)?;
        config.validate()?;

        config.root = resolve(base, &config.root);
        config.signing_key = config.signing_key.as_deref().map(|key| resolve(base, key));
        for component in config.suites.iter_mut().flat_map(|s| s.components.iter_mut()) {
            for pattern in &mut component.debs {
                *pattern = resolve(base, Path::new(pattern.as_str()))
                    .to_string_lossy()
                    .into_owned();
            }
            for index in &mut component.indices {
                *index = resolve(base, index);
            }
        }
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut suites = HashSet::new();
        for suite in &self.suites {
            if !suites.insert(suite.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "suite {:?} is defined twice",
                    suite.name
                )));
            }
            if suite.hashes.as_ref().is_some_and(Vec::is_empty) {
                return Err(ConfigError::Invalid(format!(
                    "suite {:?} lists no hashes",
                    suite.name
                )));
            }
            let mut components = HashSet::new();
            for component in &suite.components {
                if !components.insert(component.name.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "component {:?} is defined twice in suite {:?}",
                        component.name, suite.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
root = "public"
signing_key = "/etc/debarchive/key.asc"

[[suite]]
name = "stable"
origin = "Example"
hashes = ["SHA256", "sha-512"]

[[suite.component]]
name = "main"
debs = ["incoming/*.deb"]
indices = ["legacy/Packages.gz"]

[[suite.component]]
name = "contrib"
pool = false

[[suite]]
name = "testing"
valid_for = ""
"#;

    #[test]
    fn test_parse_and_resolve() {
        let config = ArchiveConfig::parse(CONFIG, Path::new("/srv/repo")).unwrap();
        assert_eq!(config.root, Path::new("/srv/repo/public"));
        assert_eq!(
            config.signing_key.as_deref(),
            Some(Path::new("/etc/debarchive/key.asc"))
        );

        let stable = &config.suites[0];
        assert_eq!(stable.valid_for(), Some("168h"));
        assert_eq!(
            stable.hashes.as_deref(),
            Some(&[HashAlgorithm::Sha256, HashAlgorithm::Sha512][..])
        );
        assert_eq!(stable.components[0].debs, ["/srv/repo/incoming/*.deb"]);
        assert_eq!(
            stable.components[0].indices,
            [PathBuf::from("/srv/repo/legacy/Packages.gz")]
        );
        assert!(stable.components[0].pool);
        assert!(!stable.components[1].pool);

        assert_eq!(config.suites[1].valid_for(), None);
        assert!(config.suites[1].components.is_empty());
    }

    #[test]
    fn test_rejects_bad_configs() {
        let base = Path::new("/");
        assert!(matches!(
            ArchiveConfig::parse("root = 'x'\nunknown = 1\n", base),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ArchiveConfig::parse("root = 'x'\n[[suite]]\nname = 'a'\nhashes = ['crc32']\n", base),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ArchiveConfig::parse("root = 'x'\n[[suite]]\nname = 'a'\n[[suite]]\nname = 'a'\n", base),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ArchiveConfig::parse("root = 'x'\n[[suite]]\nname = 'a'\nhashes = []\n", base),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debarchive.toml");
        std::fs::write(&path, "root = \"out\"\n").unwrap();

        let config = ArchiveConfig::load(&path).unwrap();
        assert_eq!(config.root, dir.path().join("out"));
        assert!(config.suites.is_empty());

        assert!(matches!(
            ArchiveConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
