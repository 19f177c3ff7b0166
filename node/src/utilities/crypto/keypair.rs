//! Key traits behind block producer and account keys.
//!
//! Keys travel base58 encoded: in the chain configuration (`init_public_key`), in account
//! authorities and in producer registrations.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyPairError {
    #[error("Key is not valid base58")]
    InvalidEncoding,
    #[error("Key has the wrong length")]
    SliceLength,
    #[error("Signing failed")]
    Signature,
    #[error("Not a usable public key: {0}")]
    PublicKey(String),
}

/// Key that block and transaction signatures are checked against.
pub trait ChainPublicKey {
    type Signature: AsRef<[u8]>;

    fn to_raw_vec(&self) -> Vec<u8>;

    fn from_raw_vec(raw: Vec<u8>) -> Result<Self, KeyPairError>
    where
        Self: Sized;

    /// False for malformed signatures as well as mismatching ones.
    fn verify<M: AsRef<[u8]>>(&self, msg: &M, signature: &Self::Signature) -> bool;

    fn to_base58(&self) -> String {
        bs58::encode(self.to_raw_vec()).into_string()
    }

    fn from_base58(base58: &str) -> Result<Self, KeyPairError>
    where
        Self: Sized,
    {
        let raw = bs58::decode(base58)
            .into_vec()
            .map_err(|_| KeyPairError::InvalidEncoding)?;
        Self::from_raw_vec(raw)
    }
}

/// Signing key of a producer or account holder.
pub trait ChainKeypair {
    type Signature;
    type PublicKey;

    /// The same seed always yields the same key, as the `generate-keypair --seed` command and
    /// test accounts rely on. Without a seed the key is random.
    fn generate(seed: Option<Vec<u8>>) -> Self;

    fn sign<M: AsRef<[u8]>>(&self, msg: &M) -> Result<Self::Signature, KeyPairError>;

    fn verify<M: AsRef<[u8]>>(&self, msg: &M, signature: &Self::Signature) -> bool;

    fn to_raw_vec(&self) -> Vec<u8>;

    fn from_raw_vec(raw: Vec<u8>) -> Result<Self, KeyPairError>
    where
        Self: Sized;

    fn public_key(&self) -> Self::PublicKey;

    fn to_base58(&self) -> String {
        bs58::encode(self.to_raw_vec()).into_string()
    }

    fn from_base58(base58: &str) -> Result<Self, KeyPairError>
    where
        Self: Sized,
    {
        let raw = bs58::decode(base58)
            .into_vec()
            .map_err(|_| KeyPairError::InvalidEncoding)?;
        Self::from_raw_vec(raw)
    }
}
