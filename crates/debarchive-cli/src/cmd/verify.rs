//! Verify command

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result, bail};
use debarchive_core::PublicKey;
use debarchive_core::io::hashing::digest_reader;
use debarchive_schema::{Digest, HashAlgorithm, ParagraphReader};

use crate::ui::Output;

/// Check `dists/<suite>` under `root`: both signature forms against `key`,
/// `InRelease` carrying the same manifest as `Release`, and every digest
/// line against the index file it names.
pub fn verify(root: &Path, suite: &str, key: &Path, output: &Output) -> Result<()> {
    let key =
        PublicKey::load(key).with_context(|| format!("Failed to load key {}", key.display()))?;
    let dists = root.join("dists").join(suite);
    let release_path = dists.join("Release");
    let release = fs::read(&release_path)
        .with_context(|| format!("Failed to read {}", release_path.display()))?;

    let detached = dists.join("Release.gpg");
    let clearsigned = dists.join("InRelease");
    if !detached.is_file() && !clearsigned.is_file() {
        bail!("Suite {suite} is not signed");
    }
    if detached.is_file() {
        let signature = fs::read(&detached)?;
        key.verify_detached(&release, &signature)
            .context("Release.gpg does not verify")?;
        output.success("Release.gpg");
    } else {
        output.warning("Release.gpg is missing");
    }
    if clearsigned.is_file() {
        let text = fs::read_to_string(&clearsigned)?;
        let content = key
            .verify_clearsigned(&text)
            .context("InRelease does not verify")?;
        if content.as_bytes() != release.as_slice() {
            bail!("InRelease does not carry the same manifest as Release");
        }
        output.success("InRelease");
    } else {
        output.warning("InRelease is missing");
    }

    let manifest = ParagraphReader::new(release.as_slice())
        .read_paragraph()?
        .context("Release is empty")?;
    let mut checked = 0;
    for algorithm in HashAlgorithm::ALL {
        let Some(lines) = manifest.get(algorithm.release_field()) else {
            continue;
        };
        for line in lines.lines().filter(|l| !l.trim().is_empty()) {
            let mut parts = line.split_whitespace();
            let (Some(hex), Some(size), Some(path), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                bail!("Malformed {} line: {line:?}", algorithm.release_field());
            };
            let expected = Digest::from_hex(algorithm, hex)?;
            let size: u64 = size
                .parse()
                .with_context(|| format!("Malformed size in {line:?}"))?;

            let file = File::open(dists.join(path))
                .with_context(|| format!("Failed to open {path} listed in Release"))?;
            let (actual_size, digests) = digest_reader(BufReader::new(file), &[algorithm])?;
            if actual_size != size || digests.first() != Some(&expected) {
                bail!("{path} does not match its {algorithm} entry in Release");
            }
            checked += 1;
        }
    }

    output.success(&format!(
        "{suite} verified with {} ({checked} digests)",
        key.fingerprint()
    ));
    Ok(())
}
