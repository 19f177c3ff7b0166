pub(crate) mod crypto;
pub(crate) mod encoding;
pub(crate) mod hash;
pub(crate) mod merkle;
pub(crate) mod time;

pub use crypto::Certificate;
pub use crypto::ChainKeypair;
pub use crypto::ChainPublicKey;
pub use crypto::Ed25519Keypair;
pub use crypto::Ed25519PublicKey;
pub use crypto::KeyPairError;
pub use crypto::Signature;

pub use crate::utilities::encoding::{decode, encode, from_base58, from_hex, to_base58, to_hex};
pub use crate::utilities::hash::{blake2_256, HashType};
pub use crate::utilities::time::TimePointSec;
