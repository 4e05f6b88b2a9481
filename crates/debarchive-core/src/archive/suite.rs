use std::collections::BTreeMap;
use std::mem;

use chrono::TimeDelta;
use debarchive_schema::{Arch, HashAlgorithm};
use tracing::{debug, trace};

use super::{Archive, ArchiveError, validate_name};
use crate::duration::{DurationError, parse_duration};
use crate::index::{CommittedIndex, IndexWriter};
use crate::package::Package;
use crate::store::Store;

/// Default lifetime of a `Release` file, in hours.
const DEFAULT_VALID_HOURS: i64 = 168;

/// Write-only builder for one `dists/<suite>`.
///
/// A suite never reads anything back from disk: it starts empty and only
/// describes what the next engross will publish.
#[derive(Debug)]
pub struct Suite<'a> {
    pub(super) archive: &'a Archive,
    name: String,
    /// `Description`
    pub description: String,
    /// `Origin`
    pub origin: String,
    /// `Label`
    pub label: String,
    /// `Version`
    pub version: String,
    hashes: Vec<HashAlgorithm>,
    valid_for: Option<TimeDelta>,
    pub(super) components: BTreeMap<String, Component<'a>>,
}

impl<'a> Suite<'a> {
    pub(super) fn new(archive: &'a Archive, name: String) -> Self {
        Self {
            archive,
            name,
            description: String::new(),
            origin: String::new(),
            label: String::new(),
            version: String::new(),
            hashes: HashAlgorithm::SUITE_DEFAULT.to_vec(),
            valid_for: Some(TimeDelta::hours(DEFAULT_VALID_HOURS)),
            components: BTreeMap::new(),
        }
    }

    /// `Suite` name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Digest algorithms computed for every index and listed in `Release`.
    pub fn hashes(&self) -> &[HashAlgorithm] {
        &self.hashes
    }

    /// Replace the digest set. Duplicates are dropped and the set is kept in
    /// `Release` field order.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::EmptyHashes`] for an empty set, and
    /// [`ArchiveError::HashesLocked`] once any index writer exists, since
    /// writers pick their accumulators when they are created.
    pub fn set_hashes(&mut self, hashes: &[HashAlgorithm]) -> Result<(), ArchiveError> {
        if hashes.is_empty() {
            return Err(ArchiveError::EmptyHashes);
        }
        if self.components.values().any(|c| !c.indices.is_empty()) {
            return Err(ArchiveError::HashesLocked {
                suite: self.name.clone(),
            });
        }
        let mut hashes = hashes.to_vec();
        hashes.sort_unstable();
        hashes.dedup();
        for component in self.components.values_mut() {
            component.hashes.clone_from(&hashes);
        }
        self.hashes = hashes;
        Ok(())
    }

    /// How long a `Release` stays valid after its `Date`.
    pub fn valid_for(&self) -> Option<TimeDelta> {
        self.valid_for
    }

    /// Set the validity from a duration string such as `168h`; `None` drops
    /// `Valid-Until` altogether.
    ///
    /// # Errors
    ///
    /// The string does not parse, or is zero or negative.
    pub fn set_valid_for(&mut self, duration: Option<&str>) -> Result<(), ArchiveError> {
        self.valid_for = match duration {
            None => None,
            Some(text) => {
                let parsed = parse_duration(text)?;
                if parsed <= TimeDelta::zero() {
                    return Err(DurationError::NotPositive(text.to_string()).into());
                }
                Some(parsed)
            }
        };
        Ok(())
    }

    /// Get or create a component. Repeated calls with one name return the
    /// same component.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::InvalidName`] for a name that cannot be a path
    /// segment under `dists/<suite>`.
    pub fn component(&mut self, name: &str) -> Result<&mut Component<'a>, ArchiveError> {
        if !self.components.contains_key(name) {
            validate_name(name, true)?;
            debug!(suite = %self.name, component = name, "component created");
            let archive: &'a Archive = self.archive;
            let component = Component::new(name, &archive.store, self.hashes.clone());
            self.components.insert(name.to_string(), component);
        }
        self.components
            .get_mut(name)
            .ok_or_else(|| ArchiveError::InvalidName(name.to_string()))
    }

    /// Components created so far, by name.
    pub fn components(&self) -> impl Iterator<Item = &Component<'a>> {
        self.components.values()
    }
}

/// Per-architecture index state.
#[derive(Debug)]
enum IndexState {
    Open(IndexWriter),
    Committed(CommittedIndex),
    /// Finalization failed; the pending object was discarded.
    Failed,
}

/// One component of a suite: a lazily grown set of per-architecture
/// `Packages` writers.
#[derive(Debug)]
pub struct Component<'a> {
    name: String,
    store: &'a Store,
    hashes: Vec<HashAlgorithm>,
    indices: BTreeMap<Arch, IndexState>,
}

impl<'a> Component<'a> {
    fn new(name: &str, store: &'a Store, hashes: Vec<HashAlgorithm>) -> Self {
        Self {
            name: name.to_string(),
            store,
            hashes,
            indices: BTreeMap::new(),
        }
    }

    /// Component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a record to the index of its architecture, creating that
    /// index on first use. No ordering or uniqueness policy is applied.
    ///
    /// # Errors
    ///
    /// The writer cannot be created or written, or the index was already
    /// committed by an engross.
    pub fn add_package(&mut self, package: &Package) -> Result<(), ArchiveError> {
        let arch = &package.architecture;
        if !self.indices.contains_key(arch) {
            debug!(component = %self.name, %arch, "index writer created");
            let writer = IndexWriter::new(self.store, &self.hashes)?;
            self.indices.insert(arch.clone(), IndexState::Open(writer));
        }

        match self.indices.get_mut(arch) {
            Some(IndexState::Open(writer)) => {
                if let Err(e) = writer.add(package) {
                    // the handle is not reused after a failed write
                    self.indices.insert(arch.clone(), IndexState::Failed);
                    return Err(e.into());
                }
                trace!(component = %self.name, package = %package.name, "added");
                Ok(())
            }
            Some(IndexState::Committed(_)) => Err(ArchiveError::IndexFinalized {
                component: self.name.clone(),
                arch: arch.clone(),
            }),
            Some(IndexState::Failed) | None => Err(ArchiveError::IndexPoisoned {
                component: self.name.clone(),
                arch: arch.clone(),
            }),
        }
    }

    /// Architectures with an index, in order.
    pub fn architectures(&self) -> impl Iterator<Item = &Arch> {
        self.indices.keys()
    }

    /// Records added so far across all architectures.
    pub fn len(&self) -> usize {
        self.indices
            .values()
            .map(|state| match state {
                IndexState::Open(writer) => writer.len(),
                IndexState::Committed(index) => index.packages,
                IndexState::Failed => 0,
            })
            .sum()
    }

    /// Whether no record was added.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finalize every open writer. Already committed indices are returned
    /// as they are, so a second engross sees the same objects.
    pub(super) fn commit(&mut self) -> Result<Vec<(&Arch, &CommittedIndex)>, ArchiveError> {
        for (arch, state) in &mut self.indices {
            match mem::replace(state, IndexState::Failed) {
                IndexState::Open(writer) => {
                    let committed = writer.finish(self.store)?;
                    debug!(
                        component = %self.name,
                        %arch,
                        packages = committed.packages,
                        "index finalized"
                    );
                    *state = IndexState::Committed(committed);
                }
                IndexState::Committed(committed) => *state = IndexState::Committed(committed),
                IndexState::Failed => {
                    return Err(ArchiveError::IndexPoisoned {
                        component: self.name.clone(),
                        arch: arch.clone(),
                    });
                }
            }
        }

        Ok(self
            .indices
            .iter()
            .filter_map(|(arch, state)| match state {
                IndexState::Committed(index) => Some((arch, index)),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use debarchive_schema::{Paragraph, ParagraphReader};

    fn package(name: &str, version: &str, arch: &str) -> Package {
        let text = format!(
            "Package: {name}\nVersion: {version}\nArchitecture: {arch}\n\
             Maintainer: Test <test@example.org>\nDescription: {name}\n\
             Filename: pool/main/{name}_{version}_{arch}.deb\nSize: 1\n"
        );
        let para: Paragraph = ParagraphReader::new(text.as_bytes())
            .read_paragraph()
            .unwrap()
            .unwrap();
        Package::from_paragraph(para).unwrap()
    }

    fn archive() -> (tempfile::TempDir, Archive) {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::open(dir.path(), None).unwrap();
        (dir, archive)
    }

    #[test]
    fn test_component_is_get_or_create() {
        let (_dir, archive) = archive();
        let mut suite = archive.suite("stable").unwrap();
        suite
            .component("main")
            .unwrap()
            .add_package(&package("foo", "1.0", "amd64"))
            .unwrap();
        let again = suite.component("main").unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(suite.components().count(), 1);
    }

    #[test]
    fn test_one_writer_per_architecture() {
        let (_dir, archive) = archive();
        let mut suite = archive.suite("stable").unwrap();
        let main = suite.component("main").unwrap();
        main.add_package(&package("foo", "1.0", "arm64")).unwrap();
        main.add_package(&package("bar", "1.0", "amd64")).unwrap();
        main.add_package(&package("baz", "1.0", "arm64")).unwrap();

        let arches: Vec<_> = main.architectures().map(Arch::as_str).collect();
        assert_eq!(arches, ["amd64", "arm64"]);
        assert_eq!(main.len(), 3);
    }

    #[test]
    fn test_invalid_component_names() {
        let (_dir, archive) = archive();
        let mut suite = archive.suite("stable").unwrap();
        for name in ["", "..", "main/../x", "/main", "a b"] {
            assert!(
                matches!(suite.component(name), Err(ArchiveError::InvalidName(_))),
                "{name:?}"
            );
        }
        assert!(suite.component("updates/main").is_ok());
    }

    #[test]
    fn test_set_hashes() {
        let (_dir, archive) = archive();
        let mut suite = archive.suite("stable").unwrap();
        assert_eq!(suite.hashes(), HashAlgorithm::SUITE_DEFAULT);

        suite
            .set_hashes(&[HashAlgorithm::Sha512, HashAlgorithm::Md5, HashAlgorithm::Sha512])
            .unwrap();
        assert_eq!(suite.hashes(), [HashAlgorithm::Md5, HashAlgorithm::Sha512]);
        assert!(matches!(suite.set_hashes(&[]), Err(ArchiveError::EmptyHashes)));

        // an empty component does not lock the set
        suite.component("main").unwrap();
        suite.set_hashes(&[HashAlgorithm::Sha256]).unwrap();

        suite
            .component("main")
            .unwrap()
            .add_package(&package("foo", "1.0", "amd64"))
            .unwrap();
        assert!(matches!(
            suite.set_hashes(&HashAlgorithm::ALL),
            Err(ArchiveError::HashesLocked { .. })
        ));
    }

    #[test]
    fn test_set_valid_for() {
        let (_dir, archive) = archive();
        let mut suite = archive.suite("stable").unwrap();
        assert_eq!(suite.valid_for(), Some(TimeDelta::hours(168)));

        suite.set_valid_for(Some("36h30m")).unwrap();
        assert_eq!(suite.valid_for(), Some(TimeDelta::minutes(36 * 60 + 30)));

        suite.set_valid_for(None).unwrap();
        assert_eq!(suite.valid_for(), None);

        for bad in ["7d", "0", "-1h", ""] {
            assert!(
                matches!(suite.set_valid_for(Some(bad)), Err(ArchiveError::Duration(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_commit_then_add_is_rejected() {
        let (_dir, archive) = archive();
        let mut suite = archive.suite("stable").unwrap();
        let main = suite.component("main").unwrap();
        main.add_package(&package("foo", "1.0", "amd64")).unwrap();

        let first: Vec<_> = main
            .commit()
            .unwrap()
            .into_iter()
            .map(|(_, index)| index.object.clone())
            .collect();
        let second: Vec<_> = main
            .commit()
            .unwrap()
            .into_iter()
            .map(|(_, index)| index.object.clone())
            .collect();
        assert_eq!(first, second);

        assert!(matches!(
            main.add_package(&package("bar", "1.0", "amd64")),
            Err(ArchiveError::IndexFinalized { .. })
        ));
        // other architectures still open fresh writers
        main.add_package(&package("bar", "1.0", "arm64")).unwrap();
    }
}
