//! IO modules - byte plumbing and on-disk package archives

pub mod deb;
pub mod hashing;
