//! Hash command

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use debarchive_core::io::hashing::digest_reader;
use debarchive_schema::{HashAlgorithm, Paragraph};

/// Print one stanza per file with its size and MD5/SHA1/SHA256/SHA512,
/// named the way `Packages` names them.
pub fn hash(files: &[PathBuf]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    for (i, path) in files.iter().enumerate() {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let (size, digests) = digest_reader(BufReader::new(file), &HashAlgorithm::ALL)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let mut stanza = Paragraph::new();
        stanza.set("File", path.to_string_lossy());
        stanza.set("Size", size.to_string());
        for digest in &digests {
            stanza.set(digest.algorithm().package_field(), digest.as_str());
        }
        if i > 0 {
            writeln!(stdout)?;
        }
        stanza.write_to(&mut stdout)?;
    }
    Ok(())
}
