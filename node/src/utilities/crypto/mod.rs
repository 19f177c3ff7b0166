use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use ed25519::{Ed25519Keypair, Ed25519PublicKey};
pub use keypair::{ChainKeypair, ChainPublicKey, KeyPairError};

use crate::utilities::encoding::{from_hex, to_hex};

pub(crate) mod ed25519;
pub(crate) mod keypair;

pub type Keypair = Ed25519Keypair;
pub type PublicKey = Ed25519PublicKey;

/// Raw signature bytes, hex on the wire.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", to_hex(&self.0))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_hex(&self.0))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        from_hex(hex)
            .map(Signature)
            .map_err(serde::de::Error::custom)
    }
}

/// A signature together with the key that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Certificate {
    pub public_key: PublicKey,
    pub signature: Signature,
}

impl Certificate {
    pub fn prepare<M: AsRef<[u8]>>(keypair: &Keypair, msg: &M) -> Result<Self, KeyPairError> {
        let signature = keypair.sign(msg)?;
        Ok(Self {
            public_key: keypair.public_key(),
            signature,
        })
    }

    pub fn verify<M: AsRef<[u8]>>(&self, msg: &M) -> bool {
        self.public_key.verify(msg, &self.signature)
    }
}
