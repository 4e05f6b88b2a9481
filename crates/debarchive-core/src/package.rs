//! Binary package records
//!
//! A [`Package`] is one stanza of a `Packages` index: the control fields of
//! a `.deb` plus where the file lives and what it hashes to. Well-known
//! fields are typed; everything else, relationship fields included, stays
//! in an ordered side table and is parsed on request.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use debarchive_schema::{
    Arch, Dependency, DependencyError, Digest, HashAlgorithm, Paragraph, Version,
};
use thiserror::Error;

use crate::io::deb::{self, DebError};
use crate::io::hashing::digest_reader;

/// Errors that can occur when building a package record.
#[derive(Error, Debug)]
pub enum PackageError {
    /// The package file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A mandatory field is absent or empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A typed field holds a value that does not parse.
    #[error("Invalid {field} field: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Parser message.
        reason: String,
    },

    /// Control data could not be pulled out of the `.deb`.
    #[error("Failed to read package archive: {0}")]
    Deb(#[from] DebError),
}

/// One binary package as listed in an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// `Package`
    pub name: String,
    /// `Source`, possibly with a `(version)` suffix.
    pub source: Option<String>,
    /// `Version`
    pub version: Version,
    /// `Section`
    pub section: Option<String>,
    /// `Priority`
    pub priority: Option<String>,
    /// `Architecture`
    pub architecture: Arch,
    /// `Essential: yes`
    pub essential: bool,
    /// `Installed-Size`, in KiB.
    pub installed_size: Option<u64>,
    /// `Maintainer`
    pub maintainer: String,
    /// `Description`, synopsis on the first line.
    pub description: String,
    /// `Homepage`
    pub homepage: Option<String>,
    /// `Filename`, relative to the repository root.
    pub filename: String,
    /// `Size` of the `.deb` in bytes.
    pub size: u64,
    /// `MD5sum`
    pub md5sum: Option<String>,
    /// `SHA1`
    pub sha1: Option<String>,
    /// `SHA256`
    pub sha256: Option<String>,
    /// `SHA512`
    pub sha512: Option<String>,
    /// `Description-md5`
    pub description_md5: Option<String>,
    /// Every other field, in input order.
    pub extra: Paragraph,
}

fn required(para: &mut Paragraph, field: &'static str) -> Result<String, PackageError> {
    para.remove(field)
        .filter(|v| !v.is_empty())
        .ok_or(PackageError::MissingField(field))
}

fn invalid(field: &'static str, reason: impl ToString) -> PackageError {
    PackageError::InvalidField {
        field,
        reason: reason.to_string(),
    }
}

fn number(field: &'static str, value: &str) -> Result<u64, PackageError> {
    value.trim().parse().map_err(|e| invalid(field, e))
}

impl Package {
    /// Build a record from a decoded stanza.
    ///
    /// # Errors
    ///
    /// [`PackageError::MissingField`] if any of Package, Version,
    /// Architecture, Maintainer, Description, Filename or Size is absent;
    /// [`PackageError::InvalidField`] if a typed field does not parse.
    pub fn from_paragraph(mut para: Paragraph) -> Result<Self, PackageError> {
        let name = required(&mut para, "Package")?;
        let version = required(&mut para, "Version")?;
        let version = Version::parse(&version).map_err(|e| invalid("Version", e))?;
        let architecture = required(&mut para, "Architecture")?;
        let architecture = Arch::new(architecture).map_err(|e| invalid("Architecture", e))?;
        let maintainer = required(&mut para, "Maintainer")?;
        let description = required(&mut para, "Description")?;
        let filename = required(&mut para, "Filename")?;
        let size = number("Size", &required(&mut para, "Size")?)?;

        let essential = match para.remove("Essential").as_deref() {
            None | Some("no") => false,
            Some("yes") => true,
            Some(other) => return Err(invalid("Essential", format!("expected yes or no, got {other:?}"))),
        };
        let installed_size = para
            .remove("Installed-Size")
            .map(|v| number("Installed-Size", &v))
            .transpose()?;

        Ok(Self {
            name,
            source: para.remove("Source"),
            version,
            section: para.remove("Section"),
            priority: para.remove("Priority"),
            architecture,
            essential,
            installed_size,
            maintainer,
            description,
            homepage: para.remove("Homepage"),
            filename,
            size,
            md5sum: para.remove("MD5sum"),
            sha1: para.remove("SHA1"),
            sha256: para.remove("SHA256"),
            sha512: para.remove("SHA512"),
            description_md5: para.remove("Description-md5"),
            extra: para,
        })
    }

    /// Stanza for an index, in the customary Debian field order.
    pub fn to_paragraph(&self) -> Paragraph {
        let mut para = Paragraph::new();
        para.set("Package", self.name.as_str());
        if let Some(source) = &self.source {
            para.set("Source", source.as_str());
        }
        para.set("Version", self.version.to_string());
        para.set("Architecture", self.architecture.as_str());
        if self.essential {
            para.set("Essential", "yes");
        }
        if let Some(size) = self.installed_size {
            para.set("Installed-Size", size.to_string());
        }
        para.set("Maintainer", self.maintainer.as_str());
        for (name, value) in self.extra.iter() {
            para.set(name, value);
        }
        para.set("Description", self.description.as_str());
        let optional = [
            ("Homepage", &self.homepage),
            ("Description-md5", &self.description_md5),
            ("Section", &self.section),
            ("Priority", &self.priority),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                para.set(name, value.as_str());
            }
        }
        para.set("Filename", self.filename.as_str());
        para.set("Size", self.size.to_string());
        let digests = [
            ("MD5sum", &self.md5sum),
            ("SHA1", &self.sha1),
            ("SHA256", &self.sha256),
            ("SHA512", &self.sha512),
        ];
        for (name, value) in digests {
            if let Some(value) = value {
                para.set(name, value.as_str());
            }
        }
        para
    }

    /// Merge file location, size and digests into `control` and build the
    /// record.
    ///
    /// # Errors
    ///
    /// As [`Package::from_paragraph`].
    pub fn from_control(
        mut control: Paragraph,
        filename: &str,
        size: u64,
        digests: &[Digest],
    ) -> Result<Self, PackageError> {
        control.set("Filename", filename);
        control.set("Size", size.to_string());
        for digest in digests {
            control.set(digest.algorithm().package_field(), digest.as_str());
        }
        Self::from_paragraph(control)
    }

    /// Build a record for the file at `path`, whose control metadata is
    /// `control`. The file is read once; size, MD5, SHA1 and SHA256 all come
    /// from that pass. `Filename` is set to `path` as given.
    ///
    /// # Errors
    ///
    /// I/O failures, or a missing/invalid field after merging.
    pub fn from_file(path: &Path, control: &Paragraph) -> Result<Self, PackageError> {
        let file = File::open(path)?;
        let (size, digests) = digest_reader(BufReader::new(file), &HashAlgorithm::PACKAGE_FILE)?;
        Self::from_control(control.clone(), &path.to_string_lossy(), size, &digests)
    }

    /// [`Package::from_file`] with the control paragraph read from the
    /// `.deb` itself.
    ///
    /// # Errors
    ///
    /// Archive, I/O and field errors.
    pub fn from_deb(path: &Path) -> Result<Self, PackageError> {
        let control = deb::read_control(path)?;
        Self::from_file(path, &control)
    }

    /// Source package name: `Source` without any `(version)`, else the
    /// binary name.
    pub fn source_name(&self) -> &str {
        self.source
            .as_deref()
            .and_then(|s| s.split_whitespace().next())
            .unwrap_or(&self.name)
    }

    /// Parse a relationship field by name. An absent field is an empty
    /// dependency, not an error.
    ///
    /// # Errors
    ///
    /// The field is present but malformed.
    pub fn relation(&self, field: &str) -> Result<Dependency, DependencyError> {
        self.extra
            .get(field)
            .map_or_else(|| Ok(Dependency::default()), Dependency::parse)
    }

    /// `Depends`
    pub fn depends(&self) -> Result<Dependency, DependencyError> {
        self.relation("Depends")
    }

    /// `Pre-Depends`
    pub fn pre_depends(&self) -> Result<Dependency, DependencyError> {
        self.relation("Pre-Depends")
    }

    /// `Recommends`
    pub fn recommends(&self) -> Result<Dependency, DependencyError> {
        self.relation("Recommends")
    }

    /// `Suggests`
    pub fn suggests(&self) -> Result<Dependency, DependencyError> {
        self.relation("Suggests")
    }

    /// `Enhances`
    pub fn enhances(&self) -> Result<Dependency, DependencyError> {
        self.relation("Enhances")
    }

    /// `Breaks`
    pub fn breaks(&self) -> Result<Dependency, DependencyError> {
        self.relation("Breaks")
    }

    /// `Conflicts`
    pub fn conflicts(&self) -> Result<Dependency, DependencyError> {
        self.relation("Conflicts")
    }

    /// `Replaces`
    pub fn replaces(&self) -> Result<Dependency, DependencyError> {
        self.relation("Replaces")
    }

    /// `Provides`
    pub fn provides(&self) -> Result<Dependency, DependencyError> {
        self.relation("Provides")
    }

    /// `Built-Using`
    pub fn built_using(&self) -> Result<Dependency, DependencyError> {
        self.relation("Built-Using")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use debarchive_schema::ParagraphReader;

    const EXAMPLE_STANZA: &str = "\
Package: hello
Source: hello-src (2.10-3)
Version: 2.10-3
Architecture: amd64
Maintainer: Santiago Vila <sanvila@debian.org>
Installed-Size: 280
Depends: libc6 (>= 2.34)
Breaks: hello-debhelper (<< 2.9)
Replaces: hello-debhelper (<< 2.9)
X-Custom: kept
Description: example package based on GNU hello
 The GNU hello program produces a familiar, friendly greeting.
Homepage: https://www.gnu.org/software/hello/
Section: devel
Priority: optional
Filename: pool/main/h/hello/hello_2.10-3_amd64.deb
Size: 53092
MD5sum: 5eb63bbbe01eeed093cb22bb8f5acdc3
SHA256: b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9
";

    fn stanza(text: &str) -> Paragraph {
        ParagraphReader::new(text.as_bytes())
            .read_paragraph()
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_parse_stanza() {
        let pkg = Package::from_paragraph(stanza(EXAMPLE_STANZA)).unwrap();

        assert_eq!(pkg.name, "hello");
        assert_eq!(pkg.version.to_string(), "2.10-3");
        assert_eq!(pkg.architecture.as_str(), "amd64");
        assert_eq!(pkg.installed_size, Some(280));
        assert_eq!(pkg.size, 53092);
        assert_eq!(pkg.section.as_deref(), Some("devel"));
        assert_eq!(pkg.sha1, None);
        assert_eq!(pkg.source_name(), "hello-src");
        assert!(!pkg.essential);

        let extras: Vec<_> = pkg.extra.iter().map(|(n, _)| n).collect();
        assert_eq!(extras, ["Depends", "Breaks", "Replaces", "X-Custom"]);
    }

    #[test]
    fn test_paragraph_round_trip_is_stable() {
        let pkg = Package::from_paragraph(stanza(EXAMPLE_STANZA)).unwrap();
        let text = pkg.to_paragraph().to_string();

        assert!(text.starts_with("Package: hello\nSource: hello-src (2.10-3)\nVersion: 2.10-3\n"));
        assert!(text.contains("Maintainer: Santiago Vila <sanvila@debian.org>\nDepends:"));
        assert!(text.ends_with(&format!(
            "Size: 53092\nMD5sum: 5eb63bbbe01eeed093cb22bb8f5acdc3\nSHA256: {}\n",
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        )));
        assert_eq!(Package::from_paragraph(stanza(&text)).unwrap(), pkg);
    }

    #[test]
    fn test_missing_required_field() {
        for field in ["Package", "Version", "Architecture", "Maintainer", "Description", "Filename", "Size"] {
            let mut para = stanza(EXAMPLE_STANZA);
            para.remove(field);
            match Package::from_paragraph(para) {
                Err(PackageError::MissingField(missing)) => assert_eq!(missing, field),
                other => panic!("expected missing {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_invalid_fields() {
        for (field, value) in [
            ("Size", "big"),
            ("Version", "1.0 final"),
            ("Architecture", "AMD64"),
            ("Installed-Size", "-1"),
            ("Essential", "maybe"),
        ] {
            let mut para = stanza(EXAMPLE_STANZA);
            para.set(field, value);
            assert!(
                matches!(
                    Package::from_paragraph(para),
                    Err(PackageError::InvalidField { field: f, .. }) if f == field
                ),
                "{field}: {value}"
            );
        }
    }

    #[test]
    fn test_relations_on_demand() {
        let pkg = Package::from_paragraph(stanza(EXAMPLE_STANZA)).unwrap();

        let depends = pkg.depends().unwrap();
        assert_eq!(depends.relations[0].alternatives[0].name, "libc6");
        assert_eq!(pkg.breaks().unwrap().to_string(), "hello-debhelper (<< 2.9)");
        assert_eq!(pkg.replaces().unwrap(), pkg.breaks().unwrap());

        assert!(pkg.suggests().unwrap().is_empty());
        assert!(pkg.pre_depends().unwrap().is_empty());
        assert!(pkg.built_using().unwrap().is_empty());
    }

    #[test]
    fn test_bad_relation_fails_only_its_accessor() {
        let mut para = stanza(EXAMPLE_STANZA);
        para.set("Suggests", "foo (>= )");
        let pkg = Package::from_paragraph(para).unwrap();

        assert!(pkg.suggests().is_err());
        assert!(pkg.depends().is_ok());
    }

    #[test]
    fn test_from_file_hashes_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello_2.10-3_amd64.deb");
        let bytes: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &bytes).unwrap();

        let control = stanza(crate::io::deb::tests::HELLO_CONTROL);
        let pkg = Package::from_file(&path, &control).unwrap();

        assert_eq!(pkg.size, bytes.len() as u64);
        assert_eq!(pkg.filename, path.to_string_lossy());
        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(
            pkg.md5sum.as_deref(),
            Some(Digest::compute(HashAlgorithm::Md5, &on_disk).as_str())
        );
        assert_eq!(
            pkg.sha1.as_deref(),
            Some(Digest::compute(HashAlgorithm::Sha1, &on_disk).as_str())
        );
        assert_eq!(
            pkg.sha256.as_deref(),
            Some(Digest::compute(HashAlgorithm::Sha256, &on_disk).as_str())
        );
        assert_eq!(pkg.sha512, None);
        assert_eq!(pkg.maintainer, "Santiago Vila <sanvila@debian.org>");
    }

    #[test]
    fn test_from_file_requires_control_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.deb");
        std::fs::write(&path, b"x").unwrap();

        let err = Package::from_file(&path, &stanza("Package: x\nVersion: 1\n")).unwrap_err();
        assert!(matches!(err, PackageError::MissingField("Architecture")));

        let err = Package::from_file(&dir.path().join("absent.deb"), &Paragraph::new()).unwrap_err();
        assert!(matches!(err, PackageError::Io(_)));
    }

    #[test]
    fn test_from_deb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.deb");
        let deb = crate::io::deb::tests::build_deb(crate::io::deb::tests::HELLO_CONTROL, "gz");
        std::fs::write(&path, &deb).unwrap();

        let pkg = Package::from_deb(&path).unwrap();
        assert_eq!(pkg.name, "hello");
        assert_eq!(pkg.size, deb.len() as u64);
        assert_eq!(
            pkg.sha256.as_deref(),
            Some(Digest::compute(HashAlgorithm::Sha256, &deb).as_str())
        );
        assert_eq!(pkg.depends().unwrap().to_string(), "libc6 (>= 2.34)");
    }
}
