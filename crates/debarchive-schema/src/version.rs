//! Debian package versions, `[epoch:]upstream[-revision]`, with dpkg ordering.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Reasons a version string is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// Nothing but whitespace.
    #[error("version string is empty")]
    Empty,

    /// The part before `:` is not a non-negative integer.
    #[error("invalid epoch '{0}'")]
    InvalidEpoch(String),

    /// Nothing between the epoch and the revision.
    #[error("version '{0}' has an empty upstream part")]
    EmptyUpstream(String),

    /// A trailing `-` with nothing after it.
    #[error("version '{0}' has an empty revision")]
    EmptyRevision(String),

    /// A character outside the allowed set.
    #[error("invalid character {ch:?} in version '{version}'")]
    InvalidCharacter {
        /// The full version string.
        version: String,
        /// The first offending character.
        ch: char,
    },
}

/// A parsed Debian version.
///
/// Equality follows dpkg's comparison, so `1.0` equals `1.0-0` and
/// `0:1.0`. Display drops a zero epoch.
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u32,
    upstream: String,
    revision: Option<String>,
}

impl Version {
    /// Parse a version string.
    ///
    /// # Errors
    ///
    /// Returns a [`VersionError`] describing the first problem found.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionError::Empty);
        }

        let (epoch, rest) = match s.split_once(':') {
            Some((e, rest)) => {
                let epoch = e
                    .parse::<u32>()
                    .map_err(|_| VersionError::InvalidEpoch(e.to_string()))?;
                (epoch, rest)
            }
            None => (0, s),
        };

        let (upstream, revision) = match rest.rsplit_once('-') {
            Some((u, r)) => (u, Some(r)),
            None => (rest, None),
        };

        if upstream.is_empty() {
            return Err(VersionError::EmptyUpstream(s.to_string()));
        }
        let invalid = |ch| VersionError::InvalidCharacter {
            version: s.to_string(),
            ch,
        };
        if let Some(ch) = upstream
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || ".+~-:".contains(*c)))
        {
            return Err(invalid(ch));
        }
        if let Some(revision) = revision {
            if revision.is_empty() {
                return Err(VersionError::EmptyRevision(s.to_string()));
            }
            if let Some(ch) = revision
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || ".+~".contains(*c)))
            {
                return Err(invalid(ch));
            }
        }
        if !upstream.starts_with(|c: char| c.is_ascii_digit()) {
            tracing::warn!(version = s, "version does not start with a digit");
        }

        Ok(Self {
            epoch,
            upstream: upstream.to_string(),
            revision: revision.map(str::to_string),
        })
    }

    /// The epoch, zero when absent.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// The upstream part.
    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// The Debian revision, if any.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// `upstream[-revision]`, the form used in `.deb` file names.
    pub fn without_epoch(&self) -> String {
        match &self.revision {
            Some(rev) => format!("{}-{rev}", self.upstream),
            None => self.upstream.clone(),
        }
    }
}

fn order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => i32::from(c),
        Some(c) => i32::from(c) + 256,
    }
}

/// dpkg's `verrevcmp`: alternate non-digit runs (compared with [`order`])
/// and digit runs (compared numerically).
fn verrevcmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);
    let is_digit = |s: &[u8], k: usize| s.get(k).is_some_and(u8::is_ascii_digit);

    while i < a.len() || j < b.len() {
        while (i < a.len() && !is_digit(a, i)) || (j < b.len() && !is_digit(b, j)) {
            let (ac, bc) = (order(a.get(i).copied()), order(b.get(j).copied()));
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }
        while a.get(i) == Some(&b'0') {
            i += 1;
        }
        while b.get(j) == Some(&b'0') {
            j += 1;
        }
        let mut first_diff = Ordering::Equal;
        while is_digit(a, i) && is_digit(b, j) {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }
        if is_digit(a, i) {
            return Ordering::Greater;
        }
        if is_digit(b, j) {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }
    Ordering::Equal
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| verrevcmp(&self.upstream, &other.upstream))
            .then_with(|| {
                verrevcmp(
                    self.revision.as_deref().unwrap_or(""),
                    other.revision.as_deref().unwrap_or(""),
                )
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        f.write_str(&self.without_epoch())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_components() {
        let ver = v("2:1.18.4-3ubuntu1");
        assert_eq!(ver.epoch(), 2);
        assert_eq!(ver.upstream(), "1.18.4");
        assert_eq!(ver.revision(), Some("3ubuntu1"));
        assert_eq!(ver.to_string(), "2:1.18.4-3ubuntu1");
        assert_eq!(ver.without_epoch(), "1.18.4-3ubuntu1");

        let native = v("0.9.2");
        assert_eq!(native.epoch(), 0);
        assert_eq!(native.revision(), None);

        let hyphens = v("1.0-beta-2");
        assert_eq!(hyphens.upstream(), "1.0-beta");
        assert_eq!(hyphens.revision(), Some("2"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Version::parse("  "), Err(VersionError::Empty));
        assert!(matches!(
            Version::parse("x:1.0"),
            Err(VersionError::InvalidEpoch(_))
        ));
        assert!(matches!(
            Version::parse("1:-1"),
            Err(VersionError::EmptyUpstream(_))
        ));
        assert!(matches!(
            Version::parse("1.0-"),
            Err(VersionError::EmptyRevision(_))
        ));
        assert!(matches!(
            Version::parse("1.0 beta"),
            Err(VersionError::InvalidCharacter { ch: ' ', .. })
        ));
        assert!(matches!(
            Version::parse("1.0-1_2"),
            Err(VersionError::InvalidCharacter { .. })
        ));
    }

    #[test]
    fn test_dpkg_ordering() {
        let ascending = [
            "~~", "~~a", "~", "0", "1.0~rc1", "1.0", "1.0-1", "1.0-2", "1.0-10", "1.0a",
            "1.0+b1", "1.2", "1.10", "2.0", "1:0.1",
        ];
        for pair in ascending.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_equality_ignores_spelling() {
        assert_eq!(v("1.0"), v("1.0-0"));
        assert_eq!(v("0:1.0"), v("1.0"));
        assert_eq!(v("1.00"), v("1.0"));
        assert_ne!(v("1.0"), v("1.0.0"));
    }
}
