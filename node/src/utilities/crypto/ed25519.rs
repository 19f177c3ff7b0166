use std::fmt::{Debug, Display, Formatter};

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::utilities::crypto::keypair::{ChainKeypair, ChainPublicKey, KeyPairError};
use crate::utilities::crypto::Signature;
use crate::utilities::hash::blake2_256;

// Careful with DEBUG, DISPLAY!!!
pub struct Ed25519Keypair(SigningKey);

/// Raw compressed point; validated when decoded.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ed25519PublicKey([u8; 32]);

impl ChainKeypair for Ed25519Keypair {
    type Signature = Signature;
    type PublicKey = Ed25519PublicKey;

    fn generate(seed: Option<Vec<u8>>) -> Self {
        match seed {
            Some(seed) => Ed25519Keypair(SigningKey::from_bytes(&blake2_256(&seed))),
            None => Ed25519Keypair(SigningKey::generate(&mut OsRng)),
        }
    }

    fn sign<M: AsRef<[u8]>>(&self, msg: &M) -> Result<Self::Signature, KeyPairError> {
        let signature = self
            .0
            .try_sign(msg.as_ref())
            .map_err(|_| KeyPairError::Signature)?;
        Ok(Signature::new(signature.to_bytes().to_vec()))
    }

    fn verify<M: AsRef<[u8]>>(&self, msg: &M, signature: &Self::Signature) -> bool {
        self.public_key().verify(msg, signature)
    }

    fn to_raw_vec(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }

    fn from_raw_vec(raw: Vec<u8>) -> Result<Self, KeyPairError>
    where
        Self: Sized,
    {
        let bytes: [u8; 32] = raw.try_into().map_err(|_| KeyPairError::SliceLength)?;
        Ok(Ed25519Keypair(SigningKey::from_bytes(&bytes)))
    }

    fn public_key(&self) -> Self::PublicKey {
        Ed25519PublicKey(self.0.verifying_key().to_bytes())
    }
}

impl Debug for Ed25519Keypair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Keypair")
            .field("public_key", &self.public_key())
            .finish()
    }
}

impl ChainPublicKey for Ed25519PublicKey {
    type Signature = Signature;

    fn to_raw_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    fn from_raw_vec(raw: Vec<u8>) -> Result<Self, KeyPairError>
    where
        Self: Sized,
    {
        let bytes: [u8; 32] = raw.try_into().map_err(|_| KeyPairError::SliceLength)?;
        VerifyingKey::from_bytes(&bytes).map_err(|e| KeyPairError::PublicKey(e.to_string()))?;
        Ok(Ed25519PublicKey(bytes))
    }

    fn verify<M: AsRef<[u8]>>(&self, msg: &M, signature: &Self::Signature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let Ok(signature) = ed25519_dalek::Signature::from_slice(signature.as_ref()) else {
            return false;
        };
        key.verify(msg.as_ref(), &signature).is_ok()
    }
}

impl Display for Ed25519PublicKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl Serialize for Ed25519PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for Ed25519PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let base58 = String::deserialize(deserializer)?;
        Ed25519PublicKey::from_base58(&base58).map_err(serde::de::Error::custom)
    }
}
