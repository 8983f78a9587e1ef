//! `algorithm-hexdigest` URL fragments and the digests behind them.
//!
//! Algorithm names are the lowercase, punctuation-free spellings used in
//! fragments and cache paths: `sha256`, `sha512256`, `sha3256`, ...

use std::fmt;
use std::str::FromStr;

use digest::DynDigest;
use thiserror::Error;

/// Errors from parsing hash fragments or names.
#[derive(Error, Debug, PartialEq)]
pub enum HashError {
    /// Fragment is not `name-hex`.
    #[error("invalid fragment format, use hashAlgo-hexDigest")]
    InvalidFormat,

    /// Digest part is not valid hex.
    #[error("invalid hex digest: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Name does not denote any known algorithm.
    #[error("no supported hash with name {0:?}")]
    Unknown(String),

    /// Known algorithm without an implementation in this build.
    #[error("hash {0} not available")]
    Unavailable(HashAlgorithm),

    /// Digest length does not match the algorithm output size.
    #[error("{algorithm} digest must be {expected} bytes, got {actual}")]
    Length {
        /// Algorithm named in the fragment.
        algorithm: HashAlgorithm,
        /// Output size of `algorithm`.
        expected: usize,
        /// Decoded digest length.
        actual: usize,
    },
}

/// Every digest algorithm name accepted in fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// MD4 (recognized, unavailable).
    Md4,
    /// MD5.
    Md5,
    /// SHA-1.
    Sha1,
    /// SHA-224.
    Sha224,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
    /// RIPEMD-160 (recognized, unavailable).
    Ripemd160,
    /// SHA3-224.
    Sha3_224,
    /// SHA3-256.
    Sha3_256,
    /// SHA3-384.
    Sha3_384,
    /// SHA3-512.
    Sha3_512,
    /// SHA-512/224.
    Sha512_224,
    /// SHA-512/256.
    Sha512_256,
    /// BLAKE2s-256 (recognized, unavailable).
    Blake2s256,
    /// BLAKE2b-256 (recognized, unavailable).
    Blake2b256,
    /// BLAKE2b-384 (recognized, unavailable).
    Blake2b384,
    /// BLAKE2b-512 (recognized, unavailable).
    Blake2b512,
}

impl HashAlgorithm {
    /// All recognized algorithms.
    pub const ALL: [Self; 18] = [
        Self::Md4,
        Self::Md5,
        Self::Sha1,
        Self::Sha224,
        Self::Sha256,
        Self::Sha384,
        Self::Sha512,
        Self::Ripemd160,
        Self::Sha3_224,
        Self::Sha3_256,
        Self::Sha3_384,
        Self::Sha3_512,
        Self::Sha512_224,
        Self::Sha512_256,
        Self::Blake2s256,
        Self::Blake2b256,
        Self::Blake2b384,
        Self::Blake2b512,
    ];

    /// Canonical fragment name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Md4 => "md4",
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
            Self::Ripemd160 => "ripemd160",
            Self::Sha3_224 => "sha3224",
            Self::Sha3_256 => "sha3256",
            Self::Sha3_384 => "sha3384",
            Self::Sha3_512 => "sha3512",
            Self::Sha512_224 => "sha512224",
            Self::Sha512_256 => "sha512256",
            Self::Blake2s256 => "blake2s256",
            Self::Blake2b256 => "blake2b256",
            Self::Blake2b384 => "blake2b384",
            Self::Blake2b512 => "blake2b512",
        }
    }

    /// Digest length in bytes.
    pub fn output_size(self) -> usize {
        match self {
            Self::Md4 | Self::Md5 => 16,
            Self::Sha1 | Self::Ripemd160 => 20,
            Self::Sha224 | Self::Sha3_224 | Self::Sha512_224 => 28,
            Self::Sha256
            | Self::Sha3_256
            | Self::Sha512_256
            | Self::Blake2s256
            | Self::Blake2b256 => 32,
            Self::Sha384 | Self::Sha3_384 | Self::Blake2b384 => 48,
            Self::Sha512 | Self::Sha3_512 | Self::Blake2b512 => 64,
        }
    }

    /// Whether this build can compute the digest.
    pub fn is_available(self) -> bool {
        self.new_hasher().is_some()
    }

    /// Fresh streaming hasher.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Unavailable`] for recognized algorithms that
    /// have no implementation linked in.
    pub fn hasher(self) -> Result<Box<dyn DynDigest + Send>, HashError> {
        self.new_hasher().ok_or(HashError::Unavailable(self))
    }

    fn new_hasher(self) -> Option<Box<dyn DynDigest + Send>> {
        let h: Box<dyn DynDigest + Send> = match self {
            Self::Md5 => Box::new(md5::Md5::default()),
            Self::Sha1 => Box::new(sha1::Sha1::default()),
            Self::Sha224 => Box::new(sha2::Sha224::default()),
            Self::Sha256 => Box::new(sha2::Sha256::default()),
            Self::Sha384 => Box::new(sha2::Sha384::default()),
            Self::Sha512 => Box::new(sha2::Sha512::default()),
            Self::Sha512_224 => Box::new(sha2::Sha512_224::default()),
            Self::Sha512_256 => Box::new(sha2::Sha512_256::default()),
            Self::Sha3_224 => Box::new(sha3::Sha3_224::default()),
            Self::Sha3_256 => Box::new(sha3::Sha3_256::default()),
            Self::Sha3_384 => Box::new(sha3::Sha3_384::default()),
            Self::Sha3_512 => Box::new(sha3::Sha3_512::default()),
            Self::Md4
            | Self::Ripemd160
            | Self::Blake2s256
            | Self::Blake2b256
            | Self::Blake2b384
            | Self::Blake2b512 => return None,
        };
        Some(h)
    }

    /// Digest `data` in one go.
    ///
    /// # Errors
    ///
    /// Same as [`HashAlgorithm::hasher`].
    pub fn digest(self, data: &[u8]) -> Result<Vec<u8>, HashError> {
        let mut h = self.hasher()?;
        h.update(data);
        Ok(h.finalize().into_vec())
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    /// Case-insensitive lookup. Unavailable algorithms are rejected here
    /// too, so a parsed name can always produce a hasher.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let alg = Self::ALL
            .into_iter()
            .find(|a| a.name() == lower)
            .ok_or_else(|| HashError::Unknown(s.to_string()))?;
        if !alg.is_available() {
            return Err(HashError::Unavailable(alg));
        }
        Ok(alg)
    }
}

/// Expected digest parsed from a URL fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashSpec {
    algorithm: HashAlgorithm,
    digest: Vec<u8>,
}

impl HashSpec {
    /// Pair an algorithm with an expected digest.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Length`] if `digest` is not exactly
    /// `algorithm.output_size()` bytes.
    pub fn new(algorithm: HashAlgorithm, digest: Vec<u8>) -> Result<Self, HashError> {
        if digest.len() != algorithm.output_size() {
            return Err(HashError::Length {
                algorithm,
                expected: algorithm.output_size(),
                actual: digest.len(),
            });
        }
        Ok(Self { algorithm, digest })
    }

    /// Parse a URL fragment. An empty fragment means no verification.
    ///
    /// # Errors
    ///
    /// Any malformed, unknown, unavailable or wrong-length fragment.
    pub fn parse_fragment(fragment: &str) -> Result<Option<Self>, HashError> {
        if fragment.is_empty() {
            return Ok(None);
        }
        let (name, hex_digest) = match fragment.split_once('-') {
            Some((name, hex_digest)) if !name.is_empty() && !hex_digest.is_empty() => {
                (name, hex_digest)
            }
            _ => return Err(HashError::InvalidFormat),
        };
        let digest = hex::decode(hex_digest)?;
        let algorithm: HashAlgorithm = name.parse()?;
        Self::new(algorithm, digest).map(Some)
    }

    /// Algorithm in use.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Expected digest bytes.
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Whether `actual` equals the expected digest.
    pub fn matches(&self, actual: &[u8]) -> bool {
        self.digest == actual
    }
}

/// `name-hexdigest`, the fragment and cache path form.
impl fmt::Display for HashSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.algorithm, hex::encode(&self.digest))
    }
}
