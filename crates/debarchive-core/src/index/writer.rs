use debarchive_schema::{Digest, FileDigest, HashAlgorithm, ParagraphWriter};
use tracing::{debug, trace};

use super::IndexError;
use crate::io::hashing::HashingWriter;
use crate::package::Package;
use crate::store::{Object, ObjectWriter, Store};

/// Append-only `Packages` encoder.
///
/// Each record is encoded once; the bytes go through a single fan-out that
/// feeds every configured digest and the pending store object, so nothing
/// is re-read at finalization.
#[derive(Debug)]
pub struct IndexWriter {
    encoder: ParagraphWriter<HashingWriter<ObjectWriter>>,
}

/// A finalized index: the committed object plus what `Release` needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedIndex {
    /// The immutable store object.
    pub object: Object,
    /// Byte length.
    pub size: u64,
    /// One digest per configured algorithm, in configuration order.
    pub digests: Vec<Digest>,
    /// Number of records.
    pub packages: usize,
}

impl CommittedIndex {
    /// `Release` lines for this file published at `path`.
    pub fn file_digests<'a>(&'a self, path: &'a str) -> impl Iterator<Item = FileDigest> + 'a {
        self.digests.iter().map(move |digest| FileDigest {
            digest: digest.clone(),
            size: self.size,
            path: path.to_string(),
        })
    }

    /// The digest for one algorithm, if it was configured.
    pub fn digest(&self, algorithm: HashAlgorithm) -> Option<&Digest> {
        self.digests.iter().find(|d| d.algorithm() == algorithm)
    }
}

impl IndexWriter {
    /// Allocate a store object and one accumulator per algorithm.
    ///
    /// # Errors
    ///
    /// The store cannot create a temp object.
    pub fn new(store: &Store, algorithms: &[HashAlgorithm]) -> Result<Self, IndexError> {
        let object = store.create()?;
        Ok(Self {
            encoder: ParagraphWriter::new(HashingWriter::new(object, algorithms)),
        })
    }

    /// Encode one record.
    ///
    /// # Errors
    ///
    /// Write failures of the pending object.
    pub fn add(&mut self, package: &Package) -> Result<(), IndexError> {
        self.encoder.write(&package.to_paragraph())?;
        trace!(package = %package.name, version = %package.version, "index record");
        Ok(())
    }

    /// Records written so far.
    pub fn len(&self) -> usize {
        self.encoder.count()
    }

    /// Whether nothing was written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.encoder.get_ref().written()
    }

    /// Close the handle and commit it. Consumes the writer, so it can only
    /// happen once.
    ///
    /// # Errors
    ///
    /// Flush or commit failures; the pending object is discarded.
    pub fn finish(self, store: &Store) -> Result<CommittedIndex, IndexError> {
        let packages = self.encoder.count();
        let hashing = self.encoder.into_inner()?;
        let (pending, digests, size) = hashing.finish()?;
        let object = store.commit(pending)?;
        debug!(object = %object, packages, size, "index committed");
        Ok(CommittedIndex {
            object,
            size,
            digests,
            packages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PackagesReader;
    use debarchive_schema::{Paragraph, ParagraphReader};

    fn package(name: &str, version: &str, arch: &str) -> Package {
        let text = format!(
            "Package: {name}\nVersion: {version}\nArchitecture: {arch}\n\
             Maintainer: Test <test@example.org>\nDepends: libc6\n\
             Description: {name} package\n long description\n .\n second paragraph\n\
             Filename: pool/main/{name}_{version}_{arch}.deb\nSize: 42\n"
        );
        let para: Paragraph = ParagraphReader::new(text.as_bytes())
            .read_paragraph()
            .unwrap()
            .unwrap();
        Package::from_paragraph(para).unwrap()
    }

    #[test]
    fn test_writer_reader_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let added = vec![
            package("zeta", "1.0", "amd64"),
            package("alpha", "2:3.4-5", "amd64"),
            package("mid", "0.1~rc1", "amd64"),
        ];

        let mut writer = IndexWriter::new(&store, &HashAlgorithm::SUITE_DEFAULT).unwrap();
        for pkg in &added {
            writer.add(pkg).unwrap();
        }
        assert_eq!(writer.len(), 3);
        let committed = writer.finish(&store).unwrap();
        assert_eq!(committed.packages, 3);

        let bytes = store.read(&committed.object).unwrap();
        let decoded: Vec<Package> = PackagesReader::new(&bytes[..])
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(decoded, added);
    }

    #[test]
    fn test_blank_description_lines_keep_records_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let mut foo = package("foo", "1.0", "amd64");
        foo.description = "synopsis\n  \nmore text".to_string();

        let mut writer = IndexWriter::new(&store, &HashAlgorithm::SUITE_DEFAULT).unwrap();
        writer.add(&foo).unwrap();
        writer.add(&package("bar", "1.0", "amd64")).unwrap();
        let committed = writer.finish(&store).unwrap();

        let bytes = store.read(&committed.object).unwrap();
        let decoded: Vec<Package> = PackagesReader::new(&bytes[..])
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].description, "synopsis\n\nmore text");
        assert_eq!(decoded[1].name, "bar");
    }

    #[test]
    fn test_lone_dot_description_line_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let mut foo = package("foo", "1.0", "amd64");
        foo.description = "synopsis\n.\nmore text".to_string();

        let mut writer = IndexWriter::new(&store, &HashAlgorithm::SUITE_DEFAULT).unwrap();
        writer.add(&package("bar", "1.0", "amd64")).unwrap();
        let before = writer.written();
        assert!(matches!(writer.add(&foo), Err(IndexError::Io(_))));
        assert_eq!(writer.written(), before);
        assert_eq!(writer.len(), 1);

        let committed = writer.finish(&store).unwrap();
        let bytes = store.read(&committed.object).unwrap();
        let decoded: Vec<Package> = PackagesReader::new(&bytes[..])
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(decoded, [package("bar", "1.0", "amd64")]);
    }

    #[test]
    fn test_digests_match_committed_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let mut writer = IndexWriter::new(&store, &HashAlgorithm::ALL).unwrap();
        writer.add(&package("foo", "1.0", "arm64")).unwrap();
        let written = writer.written();
        let committed = writer.finish(&store).unwrap();

        let bytes = store.read(&committed.object).unwrap();
        assert_eq!(committed.size, bytes.len() as u64);
        assert_eq!(committed.size, written);
        for algorithm in HashAlgorithm::ALL {
            assert_eq!(
                committed.digest(algorithm),
                Some(&Digest::compute(algorithm, &bytes))
            );
        }
        assert_eq!(
            committed.digest(HashAlgorithm::Sha256).unwrap().as_str(),
            committed.object.id()
        );

        let lines: Vec<String> = committed
            .file_digests("main/binary-arm64/Packages")
            .map(|l| l.to_string())
            .collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with(&format!(" {} main/binary-arm64/Packages", bytes.len())));
    }

    #[test]
    fn test_unconfigured_algorithm_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let mut writer = IndexWriter::new(&store, &[HashAlgorithm::Sha256]).unwrap();
        writer.add(&package("foo", "1.0", "amd64")).unwrap();
        let committed = writer.finish(&store).unwrap();

        assert!(committed.digest(HashAlgorithm::Md5).is_none());
        assert_eq!(committed.digests.len(), 1);
    }
}
