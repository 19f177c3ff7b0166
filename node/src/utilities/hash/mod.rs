use std::fmt::{Debug, Display, Formatter};

use digest::consts::U32;
use digest::Digest;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::utilities::encoding::{from_hex, to_hex};

pub fn blake2_256(data: &[u8]) -> [u8; 32] {
    let mut dest = [0; 32];
    type Blake2b256 = blake2::Blake2b<U32>;
    dest.copy_from_slice(Blake2b256::digest(data).as_slice());
    dest
}

/// Hashes the concatenation of all parts.
pub fn blake2_256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut dest = [0; 32];
    let mut hasher = blake2::Blake2b::<U32>::new();
    for part in parts {
        hasher.update(part);
    }
    dest.copy_from_slice(hasher.finalize().as_slice());
    dest
}

/// 256-bit digest, written as hex on the wire.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashType([u8; 32]);

impl HashType {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn digest(data: &[u8]) -> Self {
        Self(blake2_256(data))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 32]
    }

    pub fn inner(&self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_hex_str(hex: &str) -> anyhow::Result<Self> {
        let bytes = from_hex(hex)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("Invalid hash length"))?;
        Ok(Self(bytes))
    }
}

impl From<[u8; 32]> for HashType {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for HashType {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for HashType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", to_hex(self.0))
    }
}

impl Debug for HashType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl Serialize for HashType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_hex(self.0))
    }
}

impl<'de> Deserialize<'de> for HashType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        HashType::from_hex_str(&hex).map_err(serde::de::Error::custom)
    }
}
