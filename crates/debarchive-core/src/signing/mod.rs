//! OpenPGP signatures for `Release`.
//!
//! Built on the `pgp` crate: loading an unprotected secret key of any
//! algorithm, producing v4 SHA-512 signatures as a detached packet
//! (`Release.gpg`) or a clearsigned message (`InRelease`), checking them
//! again, and exporting the public key for clients.
//!
//! Like GnuPG, a key block with a signing-capable subkey signs with its
//! newest such subkey; otherwise the primary key signs.

mod signer;

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use pgp::composed::{
    ArmorOptions, CleartextSignedMessage, Deserializable, SignedPublicKey, SignedSecretKey,
    StandaloneSignature,
};
use pgp::packet::{SecretKey, SecretSubkey, Signature, SignatureType, SubpacketData};
use pgp::types::{KeyDetails, PublicKeyTrait, SecretKeyTrait};
use thiserror::Error;
use tracing::debug;

pub use signer::{ClearsignWriter, DetachedSigner};

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("OpenPGP error: {0}")]
    Pgp(#[source] Box<pgp::errors::Error>),

    #[error("Invalid ASCII armor: {0}")]
    Armor(String),

    #[error("Malformed OpenPGP data: {0}")]
    Malformed(String),

    #[error("Unsupported OpenPGP feature: {0}")]
    Unsupported(String),

    #[error("No signing-capable key found in key block")]
    NoUsableKey,

    #[error("Key block holds no secret key material")]
    NoSecretKey,

    #[error("Secret key is passphrase-protected; export it unprotected for signing")]
    Encrypted,

    #[error("Signature was made by key {0}, not by this key")]
    WrongKey(String),

    #[error("Bad signature")]
    BadSignature,

    #[error("Signature time {0} cannot be encoded")]
    Timestamp(DateTime<Utc>),
}

impl From<pgp::errors::Error> for SigningError {
    fn from(err: pgp::errors::Error) -> Self {
        Self::Pgp(Box::new(err))
    }
}

/// A transferable public key: primary key, user IDs and subkeys.
#[derive(Clone)]
pub struct PublicKey {
    key: SignedPublicKey,
    user_ids: Vec<String>,
}

/// The secret key packet chosen to make signatures.
enum Signer {
    Primary(SecretKey),
    Subkey(SecretSubkey),
}

/// An unprotected secret key that can sign `Release` files.
pub struct SigningKey {
    signer: Signer,
    public: PublicKey,
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("fingerprint", &self.fingerprint())
            .field("user_ids", &self.user_ids)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("fingerprint", &self.public.fingerprint())
            .field("signer", &self.signer_fingerprint())
            .finish_non_exhaustive()
    }
}

fn upper_hex(bytes: impl AsRef<[u8]>) -> String {
    hex::encode_upper(bytes)
}

/// Whether self-signatures allow signing: `None` when none of them carries
/// a key flags subpacket.
fn flags_allow_signing<'a>(signatures: impl IntoIterator<Item = &'a Signature>) -> Option<bool> {
    let mut flagged = false;
    for signature in signatures {
        let has_flags = signature.config().is_some_and(|config| {
            config
                .hashed_subpackets()
                .any(|packet| matches!(packet.data, SubpacketData::KeyFlags(_)))
        });
        if has_flags {
            if signature.key_flags().sign() {
                return Some(true);
            }
            flagged = true;
        }
    }
    flagged.then_some(false)
}

/// Newest subkey bound with the sign flag, else a primary key whose flags
/// do not forbid signing.
fn select_signer(key: &SignedSecretKey) -> Option<Signer> {
    let subkey = key
        .secret_subkeys
        .iter()
        .filter(|sub| {
            sub.key.public_key().is_signing_key()
                && flags_allow_signing(&sub.signatures) == Some(true)
        })
        .max_by_key(|sub| *sub.key.public_key().created_at());
    if let Some(sub) = subkey {
        return Some(Signer::Subkey(sub.key.clone()));
    }

    let self_signatures = key
        .details
        .users
        .iter()
        .flat_map(|user| &user.signatures)
        .chain(&key.details.direct_signatures);
    (key.primary_key.public_key().is_signing_key()
        && flags_allow_signing(self_signatures) != Some(false))
    .then(|| Signer::Primary(key.primary_key.clone()))
}

fn verifies(signature: &Signature, key: &impl PublicKeyTrait, data: &[u8]) -> bool {
    let verified = signature.verify(key, data).is_ok();
    if verified {
        debug!(
            key = %upper_hex(key.fingerprint().as_bytes()),
            created = ?signature.created(),
            "signature verified"
        );
    }
    verified
}

impl PublicKey {
    fn new(key: SignedPublicKey) -> Self {
        let user_ids = key
            .details
            .users
            .iter()
            .map(|user| String::from_utf8_lossy(user.id.id()).into_owned())
            .collect();
        Self { key, user_ids }
    }

    /// Read a public (or secret) key from an armored or binary file.
    ///
    /// # Errors
    ///
    /// Unreadable file, or not an OpenPGP key block.
    pub fn load(path: &Path) -> Result<Self, SigningError> {
        Self::from_bytes(&fs::read(path)?)
    }

    /// Parse an armored or binary key block. Secret key blocks yield their
    /// public half.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, SigningError> {
        let key = match SignedPublicKey::from_reader_single(data) {
            Ok((key, _)) => key,
            Err(err) => match SignedSecretKey::from_reader_single(data) {
                Ok((secret, _)) => secret.signed_public_key(),
                Err(_) => return Err(err.into()),
            },
        };
        key.verify()?;
        Ok(Self::new(key))
    }

    /// 40 uppercase hex digits of the primary key.
    pub fn fingerprint(&self) -> String {
        upper_hex(self.key.fingerprint().as_bytes())
    }

    /// The primary key ID, as 16 uppercase hex digits.
    pub fn key_id(&self) -> String {
        upper_hex(self.key.key_id())
    }

    /// The first user ID, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.user_ids.first().map(String::as_str)
    }

    /// All user IDs bound to the primary key.
    pub fn user_ids(&self) -> &[String] {
        &self.user_ids
    }

    /// Export as an armored `PUBLIC KEY BLOCK`.
    ///
    /// # Errors
    ///
    /// Serialization failures.
    pub fn to_armored(&self) -> Result<String, SigningError> {
        Ok(self.key.to_armored_string(ArmorOptions::default())?)
    }

    /// Check `signature` over `data` with whichever of this key's primary
    /// key or subkeys issued it.
    fn check(&self, signature: &Signature, data: &[u8]) -> Result<(), SigningError> {
        let fingerprints = signature.issuer_fingerprint();
        let key_ids = signature.issuer();
        let anonymous = fingerprints.is_empty() && key_ids.is_empty();
        let issued = |key: &dyn KeyDetails| {
            anonymous
                || fingerprints.iter().any(|fp| **fp == key.fingerprint())
                || key_ids.iter().any(|id| **id == key.key_id())
        };

        let mut tried = false;
        if issued(&self.key) {
            tried = true;
            if verifies(signature, &self.key, data) {
                return Ok(());
            }
        }
        for subkey in &self.key.public_subkeys {
            if issued(subkey) {
                tried = true;
                if verifies(signature, subkey, data) {
                    return Ok(());
                }
            }
        }

        if tried {
            return Err(SigningError::BadSignature);
        }
        let issuer = fingerprints
            .first()
            .map(|fp| upper_hex(fp.as_bytes()))
            .or_else(|| key_ids.first().map(upper_hex))
            .unwrap_or_default();
        Err(SigningError::WrongKey(issuer))
    }

    /// Check a detached signature (binary or armored) over `data`.
    ///
    /// # Errors
    ///
    /// [`SigningError::BadSignature`] or [`SigningError::WrongKey`] when it
    /// does not verify; [`SigningError::Unsupported`] for anything but a
    /// binary-document signature.
    pub fn verify_detached(&self, data: &[u8], signature: &[u8]) -> Result<(), SigningError> {
        let (signature, _) = StandaloneSignature::from_reader_single(signature)?;
        let signature = signature.signature;
        if signature.typ() != Some(SignatureType::Binary) {
            return Err(SigningError::Unsupported(format!(
                "signature type {:?} for a detached signature",
                signature.typ()
            )));
        }
        self.check(&signature, data)
    }

    /// Check a clearsigned message and return its content, dash escapes
    /// removed and each line ending in `\n`.
    ///
    /// Succeeds when any of the message's signatures verifies.
    ///
    /// # Errors
    ///
    /// As [`Self::verify_detached`], for text signatures; a malformed
    /// envelope is [`SigningError::Armor`].
    pub fn verify_clearsigned(&self, text: &str) -> Result<String, SigningError> {
        if !text.trim_start().starts_with(signer::CLEARSIGN_HEADER) {
            return Err(SigningError::Armor("not a clearsigned message".into()));
        }
        let (message, _) = CleartextSignedMessage::from_string(text)?;
        let signed = message.signed_text();

        let mut outcome = Err(SigningError::Malformed("no signature in message".into()));
        for standalone in message.signatures() {
            let signature = &standalone.signature;
            outcome = if signature.typ() == Some(SignatureType::Text) {
                self.check(signature, signed.as_bytes())
            } else {
                Err(SigningError::Unsupported(format!(
                    "signature type {:?} for a clearsigned message",
                    signature.typ()
                )))
            };
            if outcome.is_ok() {
                break;
            }
        }
        outcome?;

        let mut content = String::with_capacity(message.text().len() + 1);
        for line in message.text().split_inclusive('\n') {
            content.push_str(line.strip_prefix("- ").unwrap_or(line));
        }
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        Ok(content)
    }
}

impl SigningKey {
    /// Read an unprotected secret key from an armored or binary file.
    ///
    /// # Errors
    ///
    /// Unreadable file, not a secret key block, a passphrase-protected
    /// key, or no key that may sign.
    pub fn load(path: &Path) -> Result<Self, SigningError> {
        let key = Self::from_binary(&fs::read(path)?)?;
        debug!(
            path = %path.display(),
            fingerprint = %key.fingerprint(),
            signer = %key.signer_fingerprint(),
            "signing key loaded"
        );
        Ok(key)
    }

    /// Parse an armored `PRIVATE KEY BLOCK`.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn from_armored(text: &str) -> Result<Self, SigningError> {
        if !text.trim_start().starts_with("-----BEGIN PGP") {
            return Err(SigningError::Armor("no BEGIN line".into()));
        }
        Self::from_binary(text.as_bytes())
    }

    /// Parse a key block; armored input is detected and accepted too.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn from_binary(data: &[u8]) -> Result<Self, SigningError> {
        let secret = match SignedSecretKey::from_reader_single(data) {
            Ok((secret, _)) => secret,
            Err(err) => {
                return Err(if SignedPublicKey::from_reader_single(data).is_ok() {
                    SigningError::NoSecretKey
                } else {
                    err.into()
                });
            }
        };
        secret.verify()?;

        let signer = select_signer(&secret).ok_or(SigningError::NoUsableKey)?;
        let encrypted = match &signer {
            Signer::Primary(key) => key.secret_params().is_encrypted(),
            Signer::Subkey(key) => key.secret_params().is_encrypted(),
        };
        if encrypted {
            return Err(SigningError::Encrypted);
        }
        Ok(Self {
            signer,
            public: PublicKey::new(secret.signed_public_key()),
        })
    }

    /// The key packet that makes signatures.
    fn signer(&self) -> &dyn SecretKeyTrait {
        match &self.signer {
            Signer::Primary(key) => key,
            Signer::Subkey(key) => key,
        }
    }

    /// The public half.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// See [`PublicKey::fingerprint`].
    pub fn fingerprint(&self) -> String {
        self.public.fingerprint()
    }

    /// Fingerprint of the primary key or subkey that signs.
    pub fn signer_fingerprint(&self) -> String {
        upper_hex(self.signer().fingerprint().as_bytes())
    }

    /// See [`PublicKey::key_id`].
    pub fn key_id(&self) -> String {
        self.public.key_id()
    }

    /// See [`PublicKey::user_id`].
    pub fn user_id(&self) -> Option<&str> {
        self.public.user_id()
    }

    /// See [`PublicKey::to_armored`].
    ///
    /// # Errors
    ///
    /// See [`PublicKey::to_armored`].
    pub fn public_key_armored(&self) -> Result<String, SigningError> {
        self.public.to_armored()
    }

    /// See [`PublicKey::verify_detached`].
    ///
    /// # Errors
    ///
    /// See [`PublicKey::verify_detached`].
    pub fn verify_detached(&self, data: &[u8], signature: &[u8]) -> Result<(), SigningError> {
        self.public.verify_detached(data, signature)
    }

    /// See [`PublicKey::verify_clearsigned`].
    ///
    /// # Errors
    ///
    /// See [`PublicKey::verify_clearsigned`].
    pub fn verify_clearsigned(&self, text: &str) -> Result<String, SigningError> {
        self.public.verify_clearsigned(text)
    }
}
