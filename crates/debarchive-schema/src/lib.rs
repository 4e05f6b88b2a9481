//! Wire-level types shared by the debarchive crates.
//!
//! Nothing in this crate touches the filesystem. It describes the text
//! formats a Debian repository is made of: control paragraphs, package
//! versions, relationship fields, architecture names and the digest
//! algorithms a `Release` file lists.

pub mod arch;
pub mod control;
pub mod dependency;
pub mod hash;
pub mod version;

// Re-exports
pub use arch::{Arch, ArchError};
pub use control::{ControlError, Paragraph, ParagraphReader, ParagraphWriter};
pub use dependency::{
    ArchRestriction, Dependency, DependencyError, Operator, Possibility, ProfileTerm, Relation,
    VersionConstraint,
};
pub use hash::{Digest, DigestError, FileDigest, HashAlgorithm, Hasher};
pub use version::{Version, VersionError};
