use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{self, Write};

use chrono::{DateTime, TimeDelta, Utc};
use debarchive_schema::{Arch, FileDigest, HashAlgorithm, Paragraph};

/// `Date`/`Valid-Until` format: RFC 1123 with a numeric zone, always UTC.
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Format a timestamp the way `Release` files carry it.
pub fn format_date(when: DateTime<Utc>) -> String {
    when.format(DATE_FORMAT).to_string()
}

/// Snapshot of one suite's manifest, built fresh on every engross.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// `Suite`
    pub suite: String,
    /// `Description`
    pub description: String,
    /// `Date`
    pub date: DateTime<Utc>,
    /// `Valid-Until`
    pub valid_until: Option<DateTime<Utc>>,
    /// `Origin`
    pub origin: String,
    /// `Label`
    pub label: String,
    /// `Version`
    pub version: String,
    /// Architectures with at least one populated index.
    pub architectures: BTreeSet<Arch>,
    /// Components with at least one populated index.
    pub components: BTreeSet<String>,
    /// Index digests per algorithm, paths relative to `dists/<suite>`.
    pub files: BTreeMap<HashAlgorithm, Vec<FileDigest>>,
}

impl Release {
    /// An empty manifest issued at `date`, expiring `valid_for` later.
    pub fn new(suite: impl Into<String>, date: DateTime<Utc>, valid_for: Option<TimeDelta>) -> Self {
        Self {
            suite: suite.into(),
            description: String::new(),
            date,
            valid_until: valid_for.and_then(|d| date.checked_add_signed(d)),
            origin: String::new(),
            label: String::new(),
            version: String::new(),
            architectures: BTreeSet::new(),
            components: BTreeSet::new(),
            files: BTreeMap::new(),
        }
    }

    /// Record one digest line.
    pub fn add_file(&mut self, entry: FileDigest) {
        self.files
            .entry(entry.digest.algorithm())
            .or_default()
            .push(entry);
    }

    /// Lines of one digest field.
    pub fn files(&self, algorithm: HashAlgorithm) -> &[FileDigest] {
        self.files.get(&algorithm).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The manifest as a single control paragraph. Empty descriptive fields
    /// are left out.
    pub fn to_paragraph(&self) -> Paragraph {
        let mut para = Paragraph::new();
        para.set("Suite", self.suite.as_str());
        if !self.description.is_empty() {
            para.set("Description", self.description.as_str());
        }
        para.set("Date", format_date(self.date));
        if let Some(valid_until) = self.valid_until {
            para.set("Valid-Until", format_date(valid_until));
        }
        for (name, value) in [
            ("Origin", &self.origin),
            ("Label", &self.label),
            ("Version", &self.version),
        ] {
            if !value.is_empty() {
                para.set(name, value.as_str());
            }
        }

        let join = |items: Vec<&str>| items.join(" ");
        para.set(
            "Architectures",
            join(self.architectures.iter().map(Arch::as_str).collect()),
        );
        para.set(
            "Components",
            join(self.components.iter().map(String::as_str).collect()),
        );

        for (algorithm, entries) in &self.files {
            let mut value = String::new();
            for entry in entries {
                value.push('\n');
                value.push_str(&entry.to_string());
            }
            para.set(algorithm.release_field(), value);
        }
        para
    }

    /// Serialize the manifest.
    ///
    /// # Errors
    ///
    /// Write failures.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        self.to_paragraph().write_to(out)
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_paragraph(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use debarchive_schema::Digest;

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2027, 1, 15, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_date_format() {
        assert_eq!(format_date(date()), "Fri, 15 Jan 2027 08:00:00 +0000");
    }

    #[test]
    fn test_manifest_text() {
        let mut release = Release::new("stable", date(), Some(TimeDelta::hours(168)));
        release.description = "Stable packages".into();
        release.origin = "Example".into();
        release.architectures.insert(Arch::new("arm64").unwrap());
        release.architectures.insert(Arch::new("amd64").unwrap());
        release.components.insert("main".into());
        for algorithm in [HashAlgorithm::Sha256, HashAlgorithm::Md5] {
            release.add_file(FileDigest {
                digest: Digest::compute(algorithm, b""),
                size: 0,
                path: "main/binary-amd64/Packages".into(),
            });
        }

        assert_eq!(
            release.to_string(),
            "Suite: stable\n\
             Description: Stable packages\n\
             Date: Fri, 15 Jan 2027 08:00:00 +0000\n\
             Valid-Until: Fri, 22 Jan 2027 08:00:00 +0000\n\
             Origin: Example\n\
             Architectures: amd64 arm64\n\
             Components: main\n\
             MD5Sum:\n \
             d41d8cd98f00b204e9800998ecf8427e 0 main/binary-amd64/Packages\n\
             SHA256:\n \
             e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855 0 main/binary-amd64/Packages\n"
        );
    }

    #[test]
    fn test_without_validity() {
        let release = Release::new("sid", date(), None);
        let text = release.to_string();
        assert!(!text.contains("Valid-Until"));
        assert!(text.contains("Architectures: \n") || text.contains("Architectures:\n"));
        assert!(release.files(HashAlgorithm::Sha512).is_empty());
    }
}
