//! Key command

use std::path::Path;

use anyhow::{Context, Result};
use debarchive_core::SigningKey;

/// Print fingerprint, key id and user id of a secret key, and the signing
/// subkey when there is one; with `export`, its armored public key.
pub fn key(path: &Path, export: bool) -> Result<()> {
    let key = SigningKey::load(path)
        .with_context(|| format!("Failed to load signing key {}", path.display()))?;

    if export {
        print!("{}", key.public_key_armored()?);
        return Ok(());
    }

    let lw = 12;
    println!("{:<lw$}{}", "fingerprint", key.fingerprint());
    println!("{:<lw$}{}", "key id", key.key_id());
    let signer = key.signer_fingerprint();
    if signer != key.fingerprint() {
        println!("{:<lw$}{signer}", "subkey");
    }
    if let Some(user_id) = key.user_id() {
        println!("{:<lw$}{user_id}", "user id");
    }
    Ok(())
}
