use std::fmt;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Digest as _;
use thiserror::Error;

/// Errors raised when naming an algorithm or validating a digest string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    /// The algorithm name is not one of md5, sha1, sha256, sha512.
    #[error("Unknown digest algorithm: {0}")]
    UnknownAlgorithm(String),

    /// The hex string has the wrong length or non-hex characters.
    #[error("Invalid {algorithm} digest: '{value}'")]
    InvalidHex {
        /// Algorithm the value was checked against.
        algorithm: HashAlgorithm,
        /// The rejected value.
        value: String,
    },
}

/// Digest algorithms that appear in Debian `Packages` and `Release` files.
///
/// Variants are declared in the order `Release` lists them, so sorting a
/// set of algorithms yields field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashAlgorithm {
    /// MD5, kept for package identification only.
    Md5,
    /// SHA-1
    Sha1,
    /// SHA-256
    Sha256,
    /// SHA-512
    Sha512,
}

impl HashAlgorithm {
    /// Every supported algorithm, in field order.
    pub const ALL: [HashAlgorithm; 4] = [Self::Md5, Self::Sha1, Self::Sha256, Self::Sha512];

    /// Algorithms always recorded for a package file.
    pub const PACKAGE_FILE: [HashAlgorithm; 3] = [Self::Md5, Self::Sha1, Self::Sha256];

    /// Algorithms a suite lists in its `Release` file unless told otherwise.
    pub const SUITE_DEFAULT: [HashAlgorithm; 3] = [Self::Sha256, Self::Sha1, Self::Sha512];

    /// Lowercase name (`sha256`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Field name inside a `Release` file.
    pub fn release_field(self) -> &'static str {
        match self {
            Self::Md5 => "MD5Sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }

    /// Field name inside a `Packages` stanza.
    pub fn package_field(self) -> &'static str {
        match self {
            Self::Md5 => "MD5sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }

    /// Raw digest length in bytes.
    pub fn output_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    /// Fresh accumulator for this algorithm.
    pub fn hasher(self) -> Hasher {
        Hasher::new(self)
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "md5" | "md5sum" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            _ => Err(DigestError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl Serialize for HashAlgorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HashAlgorithm {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone)]
enum State {
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Sha512(sha2::Sha512),
}

/// A digest accumulator whose algorithm is picked at runtime.
///
/// Implements [`io::Write`] so it can sit behind `io::copy` or inside a
/// fan-out writer.
#[derive(Clone)]
pub struct Hasher {
    state: State,
}

impl Hasher {
    /// Start a new accumulator.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Md5 => State::Md5(md5::Md5::new()),
            HashAlgorithm::Sha1 => State::Sha1(sha1::Sha1::new()),
            HashAlgorithm::Sha256 => State::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Sha512 => State::Sha512(sha2::Sha512::new()),
        };
        Self { state }
    }

    /// Algorithm this accumulator computes.
    pub fn algorithm(&self) -> HashAlgorithm {
        match self.state {
            State::Md5(_) => HashAlgorithm::Md5,
            State::Sha1(_) => HashAlgorithm::Sha1,
            State::Sha256(_) => HashAlgorithm::Sha256,
            State::Sha512(_) => HashAlgorithm::Sha512,
        }
    }

    /// Feed bytes.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            State::Md5(h) => h.update(data),
            State::Sha1(h) => h.update(data),
            State::Sha256(h) => h.update(data),
            State::Sha512(h) => h.update(data),
        }
    }

    /// Finish and return the digest.
    pub fn finalize(self) -> Digest {
        let algorithm = self.algorithm();
        let hex = match self.state {
            State::Md5(h) => hex::encode(h.finalize()),
            State::Sha1(h) => hex::encode(h.finalize()),
            State::Sha256(h) => hex::encode(h.finalize()),
            State::Sha512(h) => hex::encode(h.finalize()),
        };
        Digest { algorithm, hex }
    }
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hasher")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

impl io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A finished digest: algorithm plus lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: HashAlgorithm,
    hex: String,
}

impl Digest {
    /// Hash a byte slice in one go.
    pub fn compute(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        let mut hasher = Hasher::new(algorithm);
        hasher.update(data);
        hasher.finalize()
    }

    /// Validate a hex string for `algorithm`. Accepts either case.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::InvalidHex`] if the length does not match the
    /// algorithm or the string is not hex.
    pub fn from_hex(algorithm: HashAlgorithm, value: &str) -> Result<Self, DigestError> {
        if value.len() == algorithm.output_len() * 2
            && value.chars().all(|c| c.is_ascii_hexdigit())
        {
            Ok(Self {
                algorithm,
                hex: value.to_ascii_lowercase(),
            })
        } else {
            Err(DigestError::InvalidHex {
                algorithm,
                value: value.to_string(),
            })
        }
    }

    /// Algorithm that produced the digest.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Lowercase hex.
    pub fn as_str(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.hex
    }
}

/// One line of a `Release` digest field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// Digest of the file's bytes.
    pub digest: Digest,
    /// Size in bytes.
    pub size: u64,
    /// Path relative to the suite directory.
    pub path: String,
}

impl fmt::Display for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.digest, self.size, self.path)
    }
}
