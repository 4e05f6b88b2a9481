//! Debian architecture names.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Rejected architecture name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid architecture name '{0}'")]
pub struct ArchError(pub String);

/// A Debian architecture such as `amd64`, `arm64` or `all`.
///
/// Names are validated on construction: lowercase ASCII letters, digits
/// and `-`, non-empty. Ordering is by name, which keeps index paths and
/// the `Architectures` field stable.
///
/// ```
/// use debarchive_schema::Arch;
///
/// let arch: Arch = "arm64".parse().unwrap();
/// assert_eq!(arch.as_str(), "arm64");
/// assert!("Arm64".parse::<Arch>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Arch(String);

impl Arch {
    /// Validate and wrap a name.
    ///
    /// # Errors
    ///
    /// Returns [`ArchError`] for empty names or names with characters
    /// outside `[a-z0-9-]`.
    pub fn new(name: impl Into<String>) -> Result<Self, ArchError> {
        let name = name.into();
        let valid = !name.is_empty()
            && !name.starts_with('-')
            && name
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
        if valid {
            Ok(Self(name))
        } else {
            Err(ArchError(name))
        }
    }

    /// The architecture-independent pseudo architecture.
    pub fn all() -> Self {
        Self("all".to_string())
    }

    /// Whether this is `all`.
    pub fn is_all(&self) -> bool {
        self.0 == "all"
    }

    /// The name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Arch {
    type Err = ArchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim())
    }
}

impl AsRef<str> for Arch {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["amd64", "arm64", "armhf", "i386", "ppc64el", "kfreebsd-amd64", "all"] {
            assert_eq!(Arch::new(name).unwrap().as_str(), name);
        }
        assert!(Arch::all().is_all());
        assert!(!Arch::new("amd64").unwrap().is_all());
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "AMD64", "x86_64", "arm 64", "-amd64"] {
            assert_eq!(Arch::new(name), Err(ArchError(name.to_string())));
        }
    }

    #[test]
    fn test_ordering_is_by_name() {
        let mut arches: Vec<Arch> = ["arm64", "all", "amd64"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        arches.sort();
        let names: Vec<_> = arches.iter().map(Arch::as_str).collect();
        assert_eq!(names, ["all", "amd64", "arm64"]);
    }
}
