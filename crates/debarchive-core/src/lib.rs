//! Build and publish signed Debian binary repositories.
//!
//! Packages go into per-architecture `Packages` indices grouped by
//! component and suite. Each suite gets a `Release` manifest signed two ways
//! (`Release.gpg`, `InRelease`). Every artifact lands in a content-addressed
//! store first and is linked into the live tree afterwards.

pub mod archive;
pub mod config;
pub mod duration;
pub mod index;
pub mod io;
pub mod package;
pub mod signing;
pub mod store;

pub use archive::{Archive, ArchiveError, ArchiveState, Component, Pool, Release, Suite};
pub use config::{ArchiveConfig, ConfigError};
pub use index::{CommittedIndex, IndexError, IndexWriter, PackagesReader};
pub use package::{Package, PackageError};
pub use signing::{PublicKey, SigningError, SigningKey};
pub use store::{GcSummary, Object, Store, StoreError};
