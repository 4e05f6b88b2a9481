use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use debarchive_schema::HashAlgorithm;
use tracing::debug;

use super::{ArchiveError, ArchiveState, validate_name};
use crate::io::deb;
use crate::io::hashing::HashingWriter;
use crate::package::Package;
use crate::store::Store;

/// Where a package lives under `pool/`:
/// `pool/<component>/<prefix>/<source>/<name>_<version>_<arch>.deb`, with
/// the epoch dropped from the version and `libX` prefixes for `lib*`
/// sources.
pub fn pool_path(component: &str, package: &Package) -> String {
    let source = package.source_name();
    let prefix_len = if source.starts_with("lib") && source.len() > 3 {
        4
    } else {
        1
    };
    let prefix: String = source.chars().take(prefix_len).collect();
    format!(
        "pool/{component}/{prefix}/{source}/{}_{}_{}.deb",
        package.name,
        package.version.without_epoch(),
        package.architecture
    )
}

/// Places `.deb` files into the object store at their pool path.
#[derive(Debug, Clone, Copy)]
pub struct Pool<'a> {
    store: &'a Store,
}

impl<'a> Pool<'a> {
    pub(super) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Copy the `.deb` at `path` into the store and plan it at its pool
    /// path in `state`.
    ///
    /// The copy, its size and MD5/SHA1/SHA256 come from one read of the
    /// file. The returned record's `Filename` is the pool path.
    ///
    /// # Errors
    ///
    /// The file is not a readable `.deb`, its control data lacks required
    /// fields, or the store fails. [`ArchiveError::PoolConflict`] if `state`
    /// already plans different bytes at the same pool path; including
    /// identical bytes twice is accepted.
    pub fn include_deb(
        &self,
        component: &str,
        path: &Path,
        state: &mut ArchiveState,
    ) -> Result<Package, ArchiveError> {
        validate_name(component, true)?;
        let control = deb::read_control(path)?;

        let mut copy = HashingWriter::new(self.store.create()?, &HashAlgorithm::PACKAGE_FILE);
        io::copy(&mut BufReader::new(File::open(path)?), &mut copy)?;
        let (pending, digests, size) = copy.finish()?;
        let object = self.store.commit(pending)?;

        let mut package = Package::from_control(control, &path.to_string_lossy(), size, &digests)?;
        package.filename = pool_path(component, &package);
        debug!(
            package = %package.name,
            version = %package.version,
            filename = %package.filename,
            "pooled"
        );
        match state.get(&package.filename) {
            Some(existing) if *existing != object => {
                return Err(ArchiveError::PoolConflict {
                    path: package.filename,
                    planned: existing.clone(),
                    incoming: object,
                });
            }
            Some(_) => {}
            None => {
                state.insert(package.filename.clone(), object);
            }
        }
        Ok(package)
    }
}
