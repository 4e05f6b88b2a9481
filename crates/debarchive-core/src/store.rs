//! Content-addressed object store
//!
//! Objects are immutable files named by the SHA-256 of their bytes and kept
//! under `<root>/.store/objects/ab/abcdef...`. Everything else under `<root>`
//! is the live repository tree, which only [`Store::link`] writes to.
//!
//! ```text
//! <root>/
//! ├── .store/
//! │   ├── objects/   # ab/<sha256>
//! │   └── tmp/       # in-flight writers
//! ├── dists/         # live tree, hard links onto objects
//! └── pool/
//! ```

use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use debarchive_schema::{Digest, HashAlgorithm};
use sha2::{Digest as _, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Name of the store directory inside the repository root.
pub const STORE_DIR: &str = ".store";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Object not found in store: {0}")]
    NotFound(String),

    #[error("Invalid repository path: {0:?}")]
    InvalidPath(String),
}

/// A committed, immutable object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Object {
    id: String,
    size: u64,
}

impl Object {
    /// SHA-256 of the content, lowercase hex.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Outcome of [`Store::gc`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcSummary {
    /// Objects examined.
    pub scanned: usize,
    /// Objects still referenced from the live tree.
    pub retained: usize,
    /// Objects deleted.
    pub reclaimed: usize,
    /// Bytes freed.
    pub reclaimed_bytes: u64,
}

/// An in-flight object. Bytes go to a temp file under `.store/tmp` and are
/// hashed as they pass. Dropping the writer without committing it removes
/// the temp file.
#[derive(Debug)]
pub struct ObjectWriter {
    file: BufWriter<NamedTempFile>,
    hasher: Sha256,
    size: u64,
}

impl ObjectWriter {
    /// Bytes accepted so far.
    pub fn written(&self) -> u64 {
        self.size
    }

    fn into_parts(self) -> io::Result<(NamedTempFile, String, u64)> {
        let file = self
            .file
            .into_inner()
            .map_err(io::IntoInnerError::into_error)?;
        Ok((file, hex::encode(self.hasher.finalize()), self.size))
    }
}

impl Write for ObjectWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Handle to one repository root and its object store.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    objects: PathBuf,
    staging: PathBuf,
}

impl Store {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let root = root.canonicalize()?;
        let objects = root.join(STORE_DIR).join("objects");
        let staging = root.join(STORE_DIR).join("tmp");
        fs::create_dir_all(&objects)?;
        fs::create_dir_all(&staging)?;
        Ok(Self {
            root,
            objects,
            staging,
        })
    }

    /// The repository root (absolute).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start writing a new object.
    pub fn create(&self) -> Result<ObjectWriter, StoreError> {
        let file = tempfile::Builder::new()
            .prefix("object-")
            .tempfile_in(&self.staging)?;
        Ok(ObjectWriter {
            file: BufWriter::new(file),
            hasher: Sha256::new(),
            size: 0,
        })
    }

    /// Seal a writer into an immutable object. Content already present in
    /// the store is deduplicated.
    ///
    /// Objects are made read-only. Published paths are hard links onto
    /// them, so writing through a published path would otherwise change
    /// the bytes behind the object's id.
    pub fn commit(&self, writer: ObjectWriter) -> Result<Object, StoreError> {
        let (file, id, size) = writer.into_parts()?;
        let path = self.path_for(&id);

        if path.exists() {
            debug!(object = %id, "object already stored");
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut permissions = file.as_file().metadata()?.permissions();
            permissions.set_readonly(true);
            file.as_file().set_permissions(permissions)?;
            file.as_file().sync_all()?;
            file.persist(&path).map_err(|e| e.error)?;
            debug!(object = %id, size, "object committed");
        }

        Ok(Object { id, size })
    }

    /// Store a byte slice in one step.
    pub fn insert_bytes(&self, data: &[u8]) -> Result<Object, StoreError> {
        let mut writer = self.create()?;
        writer.write_all(data)?;
        self.commit(writer)
    }

    /// Where an object lives on disk.
    pub fn object_path(&self, object: &Object) -> PathBuf {
        self.path_for(&object.id)
    }

    /// Whether the object is (still) present.
    pub fn contains(&self, object: &Object) -> bool {
        self.object_path(object).is_file()
    }

    /// Open an object for reading.
    pub fn open_object(&self, object: &Object) -> Result<File, StoreError> {
        File::open(self.object_path(object)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(object.id.clone()),
            _ => StoreError::Io(e),
        })
    }

    /// Read an object fully.
    pub fn read(&self, object: &Object) -> Result<Vec<u8>, StoreError> {
        let mut buf = Vec::with_capacity(usize::try_from(object.size).unwrap_or(0));
        io::copy(&mut self.open_object(object)?, &mut buf)?;
        Ok(buf)
    }

    /// Publish `object` at the logical `path` (relative to the root),
    /// replacing whatever is there. The switch of a single path is atomic:
    /// the object is hard-linked (or copied, across filesystems) next to the
    /// target and renamed over it. The published file is therefore
    /// read-only like the object; replace it by linking again, never by
    /// editing it in place.
    pub fn link(&self, object: &Object, path: &str) -> Result<PathBuf, StoreError> {
        let relative = validate_path(path)?;
        let source = self.object_path(object);
        if !source.is_file() {
            return Err(StoreError::NotFound(object.id.clone()));
        }

        let target = self.root.join(&relative);
        let (Some(parent), Some(name)) = (target.parent(), target.file_name()) else {
            return Err(StoreError::InvalidPath(path.to_string()));
        };
        fs::create_dir_all(parent)?;

        let staged = parent.join(format!(
            ".{}.{}.link",
            name.to_string_lossy(),
            std::process::id()
        ));
        match fs::remove_file(&staged) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        if fs::hard_link(&source, &staged).is_err() {
            fs::copy(&source, &staged)?;
        }
        if let Err(e) = fs::rename(&staged, &target) {
            let _ = fs::remove_file(&staged);
            return Err(e.into());
        }
        // rename(2) leaves both names in place when they share an inode
        if fs::symlink_metadata(&staged).is_ok() {
            fs::remove_file(&staged)?;
        }

        debug!(object = %object, path, "linked");
        Ok(target)
    }

    /// Delete every object not referenced by a file in the live tree.
    ///
    /// Reachability is decided by content: each regular file outside
    /// `.store` is hashed, and objects whose id is not among those hashes
    /// are removed. Must not run while an engross/link sequence is in
    /// flight, since committed-but-unlinked objects look like garbage.
    pub fn gc(&self) -> Result<GcSummary, StoreError> {
        let store_dir = self.root.join(STORE_DIR);
        let mut live = HashSet::new();

        let walker = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.path() != store_dir);
        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_file() {
                live.insert(hash_file(entry.path())?);
            }
        }

        let mut summary = GcSummary::default();
        for entry in WalkDir::new(&self.objects).min_depth(2).max_depth(2) {
            let entry = entry.map_err(io::Error::from)?;
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !entry.file_type().is_file() || Digest::from_hex(HashAlgorithm::Sha256, name).is_err()
            {
                continue;
            }

            summary.scanned += 1;
            if live.contains(name) {
                summary.retained += 1;
                continue;
            }
            let size = entry.metadata().map_err(io::Error::from)?.len();
            fs::remove_file(entry.path())?;
            summary.reclaimed += 1;
            summary.reclaimed_bytes += size;
            debug!(object = name, size, "reclaimed");
        }

        info!(
            scanned = summary.scanned,
            reclaimed = summary.reclaimed,
            bytes = summary.reclaimed_bytes,
            "garbage collection finished"
        );
        Ok(summary)
    }

    /// Uses 2-char prefix: ab/abcdef123...
    fn path_for(&self, id: &str) -> PathBuf {
        let prefix = &id[..2.min(id.len())];
        self.objects.join(prefix).join(id)
    }
}

fn validate_path(path: &str) -> Result<PathBuf, StoreError> {
    let invalid = || StoreError::InvalidPath(path.to_string());
    let mut out = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(invalid()),
        }
    }
    if out.as_os_str().is_empty() || out.starts_with(STORE_DIR) {
        return Err(invalid());
    }
    Ok(out)
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
