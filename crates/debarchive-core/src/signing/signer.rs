use std::io::{self, Write};

use chrono::{DateTime, SubsecRound, Utc};
use pgp::composed::{ArmorOptions, StandaloneSignature};
use pgp::crypto::hash::HashAlgorithm;
use pgp::packet::{SignatureConfig, SignatureHasher, SignatureType, Subpacket, SubpacketData};
use pgp::ser::Serialize as _;
use pgp::types::{KeyDetails, KeyVersion, Password};

use super::{SigningError, SigningKey};

pub(super) const CLEARSIGN_HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";

/// Streaming detached signature over everything written to it.
///
/// Bytes are only hashed, never buffered, so the signed content can be
/// teed into storage at the same time.
pub struct DetachedSigner<'k> {
    key: &'k SigningKey,
    hasher: SignatureHasher,
}

impl std::fmt::Debug for DetachedSigner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetachedSigner")
            .field("key", &self.key.signer_fingerprint())
            .finish_non_exhaustive()
    }
}

impl DetachedSigner<'_> {
    fn sign(self) -> Result<StandaloneSignature, SigningError> {
        let signature = self.hasher.sign(self.key.signer(), &Password::empty())?;
        Ok(StandaloneSignature::new(signature))
    }

    /// Sign and return the binary signature packet.
    ///
    /// # Errors
    ///
    /// The key cannot produce the signature.
    pub fn finish(self) -> Result<Vec<u8>, SigningError> {
        Ok(self.sign()?.to_bytes()?)
    }
}

impl Write for DetachedSigner<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Streaming clearsign envelope.
///
/// Lines are dash-escaped and forwarded to the inner writer as soon as they
/// are complete; only a partial trailing line is held back. The signature
/// covers the canonical text form: trailing blanks stripped, lines joined
/// with CRLF and no final line break.
pub struct ClearsignWriter<'k, W: Write> {
    inner: W,
    signer: DetachedSigner<'k>,
    pending: Vec<u8>,
    first_line: bool,
}

impl<W: Write> std::fmt::Debug for ClearsignWriter<'_, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClearsignWriter")
            .field("signer", &self.signer)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl<W: Write> ClearsignWriter<'_, W> {
    fn emit_line(&mut self, line: &[u8]) -> io::Result<()> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        // text mode hashes each LF as CRLF
        if !self.first_line {
            self.signer.write_all(b"\n")?;
        }
        self.first_line = false;
        let end = line
            .iter()
            .rposition(|&b| b != b' ' && b != b'\t')
            .map_or(0, |i| i + 1);
        self.signer.write_all(&line[..end])?;

        if line.starts_with(b"-") {
            self.inner.write_all(b"- ")?;
        }
        self.inner.write_all(line)?;
        self.inner.write_all(b"\n")
    }

    /// Close the message, append the armored signature and hand back the
    /// inner writer.
    ///
    /// # Errors
    ///
    /// Signing fails, or the inner writer fails.
    pub fn finish(mut self) -> Result<W, SigningError> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.emit_line(&line)?;
        }
        let Self {
            mut inner, signer, ..
        } = self;
        signer
            .sign()?
            .to_armored_writer(&mut inner, ArmorOptions::default())?;
        inner.flush()?;
        Ok(inner)
    }
}

impl<W: Write> Write for ClearsignWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while let Some(newline) = rest.iter().position(|&b| b == b'\n') {
            let (line, tail) = (&rest[..newline], &rest[newline + 1..]);
            if self.pending.is_empty() {
                self.emit_line(line)?;
            } else {
                let mut joined = std::mem::take(&mut self.pending);
                joined.extend_from_slice(line);
                self.emit_line(&joined)?;
            }
            rest = tail;
        }
        self.pending.extend_from_slice(rest);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl SigningKey {
    /// v4 SHA-512 signature settings: creation time and issuer
    /// fingerprint hashed, issuer key ID unhashed.
    fn signature_config(
        &self,
        typ: SignatureType,
        created: DateTime<Utc>,
    ) -> Result<SignatureConfig, SigningError> {
        if u32::try_from(created.timestamp()).is_err() {
            return Err(SigningError::Timestamp(created));
        }
        let signer = self.signer();
        if signer.version() != KeyVersion::V4 {
            return Err(SigningError::Unsupported(format!(
                "{:?} signing keys",
                signer.version()
            )));
        }

        let mut config = SignatureConfig::v4(typ, signer.algorithm(), HashAlgorithm::Sha512);
        config.hashed_subpackets = vec![
            Subpacket::regular(SubpacketData::SignatureCreationTime(
                created.trunc_subsecs(0),
            ))?,
            Subpacket::regular(SubpacketData::IssuerFingerprint(signer.fingerprint()))?,
        ];
        config.unhashed_subpackets = vec![Subpacket::regular(SubpacketData::Issuer(
            signer.key_id(),
        ))?];
        Ok(config)
    }

    fn signer_for(
        &self,
        typ: SignatureType,
        created: DateTime<Utc>,
    ) -> Result<DetachedSigner<'_>, SigningError> {
        Ok(DetachedSigner {
            key: self,
            hasher: self.signature_config(typ, created)?.into_hasher()?,
        })
    }

    /// A detached signer stamped with the current time.
    ///
    /// # Errors
    ///
    /// The clock is outside the OpenPGP timestamp range.
    pub fn detached_signer(&self) -> Result<DetachedSigner<'_>, SigningError> {
        self.detached_signer_at(Utc::now())
    }

    /// A detached signer with a fixed creation time.
    ///
    /// # Errors
    ///
    /// `created` is before 1970 or after 2106, or the signing key is not a
    /// v4 key.
    pub fn detached_signer_at(
        &self,
        created: DateTime<Utc>,
    ) -> Result<DetachedSigner<'_>, SigningError> {
        self.signer_for(SignatureType::Binary, created)
    }

    /// Sign a whole stream.
    ///
    /// # Errors
    ///
    /// Read failures, or see [`Self::detached_signer`].
    pub fn sign_detached<R: io::Read>(&self, mut reader: R) -> Result<Vec<u8>, SigningError> {
        let mut signer = self.detached_signer()?;
        io::copy(&mut reader, &mut signer)?;
        signer.finish()
    }

    /// Start a clearsigned message on `out`, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Writing the envelope header fails, or see [`Self::detached_signer`].
    pub fn clearsign_writer<W: Write>(&self, out: W) -> Result<ClearsignWriter<'_, W>, SigningError> {
        self.clearsign_writer_at(out, Utc::now())
    }

    /// [`Self::clearsign_writer`] with a fixed creation time.
    ///
    /// # Errors
    ///
    /// Writing the envelope header fails, or see [`Self::detached_signer_at`].
    pub fn clearsign_writer_at<W: Write>(
        &self,
        mut out: W,
        created: DateTime<Utc>,
    ) -> Result<ClearsignWriter<'_, W>, SigningError> {
        let signer = self.signer_for(SignatureType::Text, created)?;
        write!(out, "{CLEARSIGN_HEADER}\nHash: SHA512\n\n")?;
        Ok(ClearsignWriter {
            inner: out,
            signer,
            pending: Vec::new(),
            first_line: true,
        })
    }

    /// Clearsign a complete text.
    ///
    /// # Errors
    ///
    /// See [`Self::clearsign_writer`].
    pub fn clearsign(&self, text: &str) -> Result<String, SigningError> {
        let mut writer = self.clearsign_writer(Vec::new())?;
        writer.write_all(text.as_bytes())?;
        let bytes = writer.finish()?;
        String::from_utf8(bytes)
            .map_err(|_| SigningError::Malformed("clearsigned text is not UTF-8".into()))
    }
}
