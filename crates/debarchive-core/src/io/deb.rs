//! Control metadata extraction from `.deb` files.
//!
//! A binary package is an `ar` archive holding `debian-binary`, a
//! `control.tar[.gz|.xz|.zst]` and a `data.tar.*`. Only the control member
//! is read; the payload is never unpacked.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use debarchive_schema::{ControlError, Paragraph, ParagraphReader};
use flate2::read::GzDecoder;
use thiserror::Error;
use xz2::read::XzDecoder;
use zstd::stream::Decoder as ZstdDecoder;

#[derive(Error, Debug)]
pub enum DebError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Not a Debian binary package: {0}")]
    NotADeb(String),

    #[error("Package has no control.tar member")]
    MissingControlArchive,

    #[error("control.tar has no ./control file")]
    MissingControlFile,

    #[error("Unsupported control archive compression: {0}")]
    UnsupportedCompression(String),

    #[error("Malformed control file: {0}")]
    Control(#[from] ControlError),
}

/// Read the control paragraph of the `.deb` at `path`.
pub fn read_control(path: &Path) -> Result<Paragraph, DebError> {
    let file = File::open(path)?;
    control_from_reader(BufReader::new(file))
}

/// Read the control paragraph from a `.deb` byte stream.
pub fn control_from_reader<R: Read>(reader: R) -> Result<Paragraph, DebError> {
    let mut archive = ar::Archive::new(reader);
    let mut saw_magic = false;

    while let Some(entry) = archive.next_entry() {
        let mut entry = entry.map_err(|e| DebError::NotADeb(e.to_string()))?;
        let name = String::from_utf8_lossy(entry.header().identifier())
            .trim_end_matches('/')
            .to_string();

        if name == "debian-binary" {
            let mut magic = String::new();
            entry.read_to_string(&mut magic)?;
            if !magic.starts_with("2.") {
                return Err(DebError::NotADeb(format!(
                    "unsupported format version {:?}",
                    magic.trim()
                )));
            }
            saw_magic = true;
        } else if name.starts_with("control.tar") {
            if !saw_magic {
                return Err(DebError::NotADeb(
                    "control.tar precedes debian-binary".to_string(),
                ));
            }
            let decoder = decompress(&name, entry)?;
            return control_from_tar(decoder);
        }
    }

    if saw_magic {
        Err(DebError::MissingControlArchive)
    } else {
        Err(DebError::NotADeb("no debian-binary member".to_string()))
    }
}

fn decompress<'a, R: Read + 'a>(name: &str, reader: R) -> Result<Box<dyn Read + 'a>, DebError> {
    Ok(match name {
        "control.tar" => Box::new(reader),
        "control.tar.gz" => Box::new(GzDecoder::new(reader)),
        "control.tar.xz" => Box::new(XzDecoder::new(reader)),
        "control.tar.zst" => Box::new(ZstdDecoder::new(reader)?),
        other => return Err(DebError::UnsupportedCompression(other.to_string())),
    })
}

fn control_from_tar<R: Read>(reader: R) -> Result<Paragraph, DebError> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;
        if path != Path::new("./control") && path != Path::new("control") {
            continue;
        }
        let mut text = String::new();
        entry.read_to_string(&mut text)?;
        return ParagraphReader::new(text.as_bytes())
            .read_paragraph()?
            .ok_or(DebError::MissingControlFile);
    }
    Err(DebError::MissingControlFile)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    pub(crate) const HELLO_CONTROL: &str = "\
Package: hello
Version: 2.10-3
Architecture: amd64
Maintainer: Santiago Vila <sanvila@debian.org>
Installed-Size: 280
Depends: libc6 (>= 2.34)
Section: devel
Priority: optional
Description: example package based on GNU hello
 The GNU hello program produces a familiar, friendly greeting.
";

    fn control_tar(control: &str) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(control.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, "./control", control.as_bytes())
            .unwrap();
        builder.into_inner().unwrap()
    }

    /// Assemble a minimal `.deb` with the given control member.
    pub(crate) fn build_deb(control: &str, compression: &str) -> Vec<u8> {
        let tar = control_tar(control);
        let (member, body) = match compression {
            "gz" => {
                let mut enc = GzEncoder::new(Vec::new(), Compression::default());
                enc.write_all(&tar).unwrap();
                ("control.tar.gz", enc.finish().unwrap())
            }
            "zst" => ("control.tar.zst", zstd::encode_all(&tar[..], 0).unwrap()),
            _ => ("control.tar", tar),
        };

        let mut builder = ar::Builder::new(Vec::new());
        for (name, data) in [
            ("debian-binary", b"2.0\n".to_vec()),
            (member, body),
            ("data.tar", control_tar("")),
        ] {
            let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
            builder.append(&header, &data[..]).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_reads_control_from_each_compression() {
        for compression in ["gz", "zst", "none"] {
            let deb = build_deb(HELLO_CONTROL, compression);
            let control = control_from_reader(&deb[..]).unwrap();
            assert_eq!(control.get("Package"), Some("hello"), "{compression}");
            assert_eq!(control.get("Depends"), Some("libc6 (>= 2.34)"));
        }
    }

    #[test]
    fn test_read_control_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello_2.10-3_amd64.deb");
        std::fs::write(&path, build_deb(HELLO_CONTROL, "gz")).unwrap();

        let control = read_control(&path).unwrap();
        assert_eq!(control.get("Version"), Some("2.10-3"));
    }

    #[test]
    fn test_rejects_non_deb() {
        let err = control_from_reader(&b"definitely not an ar archive"[..]).unwrap_err();
        assert!(matches!(err, DebError::NotADeb(_)));
    }

    #[test]
    fn test_missing_control_member() {
        let mut builder = ar::Builder::new(Vec::new());
        let header = ar::Header::new(b"debian-binary".to_vec(), 4);
        builder.append(&header, &b"2.0\n"[..]).unwrap();
        let deb = builder.into_inner().unwrap();

        let err = control_from_reader(&deb[..]).unwrap_err();
        assert!(matches!(err, DebError::MissingControlArchive));
    }

    #[test]
    fn test_empty_control_file() {
        let deb = build_deb("", "none");
        let err = control_from_reader(&deb[..]).unwrap_err();
        assert!(matches!(err, DebError::MissingControlFile));
    }
}
