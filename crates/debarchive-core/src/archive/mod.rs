//! Archive assembly and publication
//!
//! An [`Archive`] owns the object store and the signing key. Suites are
//! built in memory, turned into immutable objects by
//! [`Archive::engross`], and only become visible under the repository root
//! when [`Archive::link`] swaps them in.
//!
//! ```text
//! Archive ─┬─ Suite "stable" ─┬─ Component "main" ─┬─ amd64 → IndexWriter
//!          │                  │                    └─ arm64 → IndexWriter
//!          │                  └─ Component "contrib" ...
//!          └─ Pool (.deb files)
//! ```

mod pool;
mod release;
mod suite;

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::io::{self, Write};
use std::path::Path;

use chrono::Utc;
use debarchive_schema::Arch;
use thiserror::Error;
use tracing::{debug, info};

use crate::duration::DurationError;
use crate::index::IndexError;
use crate::io::deb::DebError;
use crate::io::hashing::Tee;
use crate::package::PackageError;
use crate::signing::{SigningError, SigningKey};
use crate::store::{GcSummary, Object, Store, StoreError};

pub use pool::{Pool, pool_path};
pub use release::{Release, format_date};
pub use suite::{Component, Suite};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Object store error: {0}")]
    Store(#[from] StoreError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Package error: {0}")]
    Package(#[from] PackageError),

    #[error("Package archive error: {0}")]
    Deb(#[from] DebError),

    #[error("Signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("Invalid validity duration: {0}")]
    Duration(#[from] DurationError),

    #[error("Pool path {path} already holds {planned}, refusing {incoming}")]
    PoolConflict {
        path: String,
        planned: Object,
        incoming: Object,
    },

    #[error("No signing key loaded")]
    NoSigningKey,

    #[error("Suite {suite} belongs to a different archive")]
    ForeignSuite { suite: String },

    #[error("Invalid suite or component name: {0:?}")]
    InvalidName(String),

    #[error("Hash set of suite {suite} is fixed once packages were added")]
    HashesLocked { suite: String },

    #[error("A suite needs at least one hash algorithm")]
    EmptyHashes,

    #[error("Index {component}/binary-{arch} was already finalized")]
    IndexFinalized { component: String, arch: Arch },

    #[error("Index {component}/binary-{arch} failed earlier and cannot be used")]
    IndexPoisoned { component: String, arch: Arch },
}

/// Accept `stable`, `bookworm-updates`, and for components `updates/main`;
/// reject anything that could escape `dists/`.
pub(crate) fn validate_name(name: &str, allow_slash: bool) -> Result<(), ArchiveError> {
    let segment_ok = |s: &str| {
        !s.is_empty()
            && s != "."
            && s != ".."
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+' | '~'))
    };
    let ok = if allow_slash {
        name.split('/').all(segment_ok)
    } else {
        segment_ok(name)
    };
    if ok {
        Ok(())
    } else {
        Err(ArchiveError::InvalidName(name.to_string()))
    }
}

/// Logical repository path → committed object.
///
/// The hand-off between engross and link: everything in it is already
/// immutable, and nothing in it is visible until linked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveState(BTreeMap<String, Object>);

impl ArchiveState {
    /// An empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `path` to `object`, returning what it replaced.
    pub fn insert(&mut self, path: impl Into<String>, object: Object) -> Option<Object> {
        self.0.insert(path.into(), object)
    }

    /// The object planned for `path`.
    pub fn get(&self, path: &str) -> Option<&Object> {
        self.0.get(path)
    }

    /// Number of paths.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is planned.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `(path, object)` pairs in path order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Object> {
        self.0.iter()
    }
}

impl Extend<(String, Object)> for ArchiveState {
    fn extend<I: IntoIterator<Item = (String, Object)>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for ArchiveState {
    type Item = (String, Object);
    type IntoIter = btree_map::IntoIter<String, Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'s> IntoIterator for &'s ArchiveState {
    type Item = (&'s String, &'s Object);
    type IntoIter = btree_map::Iter<'s, String, Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A repository under construction.
///
/// Meant for writing archives only; nothing here reads or trusts an
/// existing `Release`.
#[derive(Debug)]
pub struct Archive {
    store: Store,
    signing_key: Option<SigningKey>,
}

impl Archive {
    /// Open the repository at `root`, creating its store if needed.
    ///
    /// # Errors
    ///
    /// The store directories cannot be created.
    pub fn open(root: impl AsRef<Path>, signing_key: Option<SigningKey>) -> Result<Self, ArchiveError> {
        let store = Store::open(root)?;
        match &signing_key {
            Some(key) => info!(root = %store.root().display(), key = %key.fingerprint(), "archive opened"),
            None => info!(root = %store.root().display(), "archive opened without signing key"),
        }
        Ok(Self { store, signing_key })
    }

    /// Absolute repository root.
    pub fn path(&self) -> &Path {
        self.store.root()
    }

    /// The underlying object store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The configured signing key.
    pub fn signing_key(&self) -> Option<&SigningKey> {
        self.signing_key.as_ref()
    }

    /// A fresh, empty suite. Nothing is read from an existing `dists/`.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::InvalidName`] for names that are not a single path
    /// segment.
    pub fn suite(&self, name: &str) -> Result<Suite<'_>, ArchiveError> {
        validate_name(name, false)?;
        Ok(Suite::new(self, name.to_string()))
    }

    /// Handle for placing `.deb` files under `pool/`.
    pub fn pool(&self) -> Pool<'_> {
        Pool::new(&self.store)
    }

    /// Commit every index of `suite` and build its `Release`, without
    /// signing or writing the manifest anywhere.
    ///
    /// The returned state holds the `Packages` objects only.
    ///
    /// # Errors
    ///
    /// Store failures while finalizing an index, or a suite from another
    /// archive.
    pub fn assemble(&self, suite: &mut Suite<'_>) -> Result<(Release, ArchiveState), ArchiveError> {
        if !std::ptr::eq(suite.archive, self) {
            return Err(ArchiveError::ForeignSuite {
                suite: suite.name().to_string(),
            });
        }

        let mut release = Release::new(suite.name(), Utc::now(), suite.valid_for());
        release.description.clone_from(&suite.description);
        release.origin.clone_from(&suite.origin);
        release.label.clone_from(&suite.label);
        release.version.clone_from(&suite.version);

        let dists = format!("dists/{}", suite.name());
        let mut state = ArchiveState::new();
        for (name, component) in &mut suite.components {
            for (arch, index) in component.commit()? {
                release.components.insert(name.clone());
                release.architectures.insert(arch.clone());

                let relative = format!("{name}/binary-{arch}/Packages");
                for entry in index.file_digests(&relative) {
                    release.add_file(entry);
                }
                state.insert(format!("{dists}/{relative}"), index.object.clone());
            }
        }

        debug!(
            suite = %release.suite,
            components = release.components.len(),
            architectures = release.architectures.len(),
            "release assembled"
        );
        Ok((release, state))
    }

    /// Build everything `suite` publishes: its indices, `Release`,
    /// `Release.gpg` and `InRelease`. The live tree is not touched.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::NoSigningKey`] before any work is done when the
    /// archive has no key; otherwise store and signing failures. A failed
    /// engross never yields a state to link.
    pub fn engross(&self, suite: &mut Suite<'_>) -> Result<ArchiveState, ArchiveError> {
        self.key()?;
        let (release, mut state) = self.assemble(suite)?;
        let dists = format!("dists/{}", release.suite);

        let (manifest, signature) = self.encode_signed(&release)?;
        state.insert(format!("{dists}/Release"), manifest);
        state.insert(format!("{dists}/Release.gpg"), signature);
        state.insert(format!("{dists}/InRelease"), self.encode_clearsigned(&release)?);

        info!(suite = %release.suite, paths = state.len(), "suite engrossed");
        Ok(state)
    }

    /// [`Archive::engross`] for unsigned repositories: indices and a plain
    /// `Release` only.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn engross_unsigned(&self, suite: &mut Suite<'_>) -> Result<ArchiveState, ArchiveError> {
        let (release, mut state) = self.assemble(suite)?;
        state.insert(
            format!("dists/{}/Release", release.suite),
            self.encode(&release, io::sink())?,
        );
        info!(suite = %release.suite, paths = state.len(), "suite engrossed unsigned");
        Ok(state)
    }

    /// Publish a state. Each path is swapped in atomically, but the set as
    /// a whole is not: a failure part-way leaves earlier paths updated.
    ///
    /// # Errors
    ///
    /// The first link failure.
    pub fn link(&self, state: &ArchiveState) -> Result<(), ArchiveError> {
        for (path, object) in state {
            self.store.link(object, path)?;
        }
        info!(paths = state.len(), "linked");
        Ok(())
    }

    /// Remove every object no live path refers to. Anything engrossed but
    /// not yet linked is collected too.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn gc(&self) -> Result<GcSummary, ArchiveError> {
        Ok(self.store.gc()?)
    }

    /// Serialize `release` into a new object, mirroring the bytes to `tap`.
    fn encode<T: Write>(&self, release: &Release, tap: T) -> Result<Object, ArchiveError> {
        let mut tee = Tee::new(self.store.create()?, tap);
        release.write_to(&mut tee)?;
        let (pending, _) = tee.into_inner();
        Ok(self.store.commit(pending)?)
    }

    fn key(&self) -> Result<&SigningKey, ArchiveError> {
        self.signing_key.as_ref().ok_or(ArchiveError::NoSigningKey)
    }

    /// `Release` plus its detached signature, from one serialization pass.
    fn encode_signed(&self, release: &Release) -> Result<(Object, Object), ArchiveError> {
        let mut signer = self.key()?.detached_signer()?;
        let manifest = self.encode(release, &mut signer)?;
        let signature = self.store.insert_bytes(&signer.finish()?)?;
        Ok((manifest, signature))
    }

    /// `Release` inside a clearsign envelope.
    fn encode_clearsigned(&self, release: &Release) -> Result<Object, ArchiveError> {
        let mut envelope = self.key()?.clearsign_writer(self.store.create()?)?;
        release.write_to(&mut envelope)?;
        let pending = envelope.finish()?;
        Ok(self.store.commit(pending)?)
    }
}
