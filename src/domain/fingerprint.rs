use std::{fmt::Display, fs::File, io::Read, path::Path};

use blake3::Hash;

/// Number of leading bytes of an audio file that take part in the fingerprint.
pub const PREFIX_LEN: u64 = 200_000;

/// Coarse content digest of an audio snippet.
///
/// Only the first [`PREFIX_LEN`] bytes are hashed, so two encodings of the same
/// clip produce different fingerprints while byte-identical clips always
/// collide. Good enough to recognise a clip that was already resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub Hash);

impl Fingerprint {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let end = bytes.len().min(PREFIX_LEN as usize);
        Self(blake3::hash(&bytes[..end]))
    }

    pub fn from_reader(reader: impl Read) -> std::io::Result<Self> {
        let mut prefix = Vec::with_capacity(PREFIX_LEN as usize);
        reader.take(PREFIX_LEN).read_to_end(&mut prefix)?;
        Ok(Self(blake3::hash(&prefix)))
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        Self::from_reader(File::open(path)?)
    }

    pub fn from_hex(hex: &str) -> anyhow::Result<Self> {
        Ok(Self(Hash::from_hex(hex)?))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
