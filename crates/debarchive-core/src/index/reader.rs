use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use debarchive_schema::ParagraphReader;
use flate2::read::MultiGzDecoder;
use xz2::read::XzDecoder;
use zstd::stream::Decoder as ZstdDecoder;

use super::IndexError;
use crate::package::Package;

/// Sequential decoder over a `Packages` file. Holds one record in memory at
/// a time.
///
/// The index carries no proof of authenticity; callers that did not build
/// it should check it against a verified `Release` first.
#[derive(Debug)]
pub struct PackagesReader<R> {
    paragraphs: ParagraphReader<R>,
}

impl PackagesReader<Box<dyn BufRead>> {
    /// Open an index on disk. `.gz`, `.xz` and `.zst` files are decompressed
    /// on the fly.
    ///
    /// # Errors
    ///
    /// The file cannot be opened or the decompressor fails to start.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let file = File::open(path)?;
        let reader: Box<dyn BufRead> = match path.extension().and_then(|e| e.to_str()) {
            Some("gz") => Box::new(BufReader::new(MultiGzDecoder::new(file))),
            Some("xz") => Box::new(BufReader::new(XzDecoder::new(file))),
            Some("zst") => Box::new(BufReader::new(ZstdDecoder::new(file)?)),
            _ => Box::new(BufReader::new(file)),
        };
        Ok(Self::new(reader))
    }
}

impl<R: BufRead> PackagesReader<R> {
    /// Wrap an already-open stream.
    pub fn new(reader: R) -> Self {
        Self {
            paragraphs: ParagraphReader::new(reader),
        }
    }

    /// Decode the next record. `Ok(None)` marks the end of the index and is
    /// returned again on every further call.
    ///
    /// # Errors
    ///
    /// Malformed text, or a stanza that is not a valid package record.
    pub fn next_package(&mut self) -> Result<Option<Package>, IndexError> {
        match self.paragraphs.read_paragraph()? {
            Some(para) => Ok(Some(Package::from_paragraph(para)?)),
            None => Ok(None),
        }
    }
}

impl<R: BufRead> Iterator for PackagesReader<R> {
    type Item = Result<Package, IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_package().transpose()
    }
}
