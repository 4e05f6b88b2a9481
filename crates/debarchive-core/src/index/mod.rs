//! `Packages` index files: streaming decode and hashed, store-backed encode.

mod reader;
mod writer;

use std::io;

use debarchive_schema::ControlError;
use thiserror::Error;

use crate::package::PackageError;
use crate::store::StoreError;

pub use reader::PackagesReader;
pub use writer::{CommittedIndex, IndexWriter};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed index: {0}")]
    Control(#[from] ControlError),

    #[error("Invalid package record: {0}")]
    Package(#[from] PackageError),

    #[error("Object store error: {0}")]
    Store(#[from] StoreError),
}
