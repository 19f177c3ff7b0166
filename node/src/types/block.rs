use std::fmt::{Debug, Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{AccountName, SignedTransaction};
use crate::utilities::crypto::{Certificate, ChainPublicKey, Keypair, PublicKey, Signature};
use crate::utilities::encoding::{encode, from_hex, to_hex};
use crate::utilities::hash::HashType;
use crate::utilities::merkle::Merkle;
use crate::utilities::time::TimePointSec;

/// Block identifier. The first four bytes hold the block number (big endian), the rest
/// comes from the digest of the signed header.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId([u8; 32]);

impl BlockId {
    pub fn new(block_num: u32, digest: &HashType) -> Self {
        let mut bytes = digest.inner();
        bytes[..4].copy_from_slice(&block_num.to_be_bytes());
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn block_num(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Word used by transactions to prove which chain they were built on.
    pub fn ref_prefix(&self) -> u32 {
        u32::from_le_bytes([self.0[4], self.0[5], self.0[6], self.0[7]])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 32]
    }

    pub fn from_hex_str(hex: &str) -> anyhow::Result<Self> {
        let bytes: [u8; 32] = from_hex(hex)?
            .try_into()
            .map_err(|_| anyhow::anyhow!("Invalid block id length"))?;
        Ok(Self(bytes))
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", to_hex(self.0))
    }
}

impl Debug for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.block_num(), to_hex(&self.0[4..12]))
    }
}

impl Serialize for BlockId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_hex(self.0))
    }
}

impl<'de> Deserialize<'de> for BlockId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        BlockId::from_hex_str(&hex).map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub previous: BlockId,
    pub timestamp: TimePointSec,
    pub producer: AccountName,
    pub transaction_merkle_root: HashType,
}

impl BlockHeader {
    pub fn block_num(&self) -> u32 {
        self.previous.block_num().saturating_add(1)
    }

    /// Digest the producer signs.
    pub fn digest(&self) -> anyhow::Result<HashType> {
        Ok(HashType::digest(&encode(self)?))
    }
}

impl Display for BlockHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "block {} by {} at {}",
            self.block_num(),
            self.producer,
            self.timestamp
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlock {
    pub header: BlockHeader,
    pub producer_signature: Signature,
    pub transactions: Vec<SignedTransaction>,
}

impl SignedBlock {
    pub fn new(header: BlockHeader, transactions: Vec<SignedTransaction>) -> Self {
        Self {
            header,
            producer_signature: Signature::default(),
            transactions,
        }
    }

    pub fn block_num(&self) -> u32 {
        self.header.block_num()
    }

    pub fn previous(&self) -> BlockId {
        self.header.previous
    }

    pub fn timestamp(&self) -> TimePointSec {
        self.header.timestamp
    }

    /// Covers the header and the producer signature.
    pub fn id(&self) -> anyhow::Result<BlockId> {
        let bytes = encode((&self.header, &self.producer_signature))?;
        Ok(BlockId::new(self.block_num(), &HashType::digest(&bytes)))
    }

    pub fn calculate_merkle_root(&self) -> anyhow::Result<HashType> {
        let leaves = self
            .transactions
            .iter()
            .map(SignedTransaction::merkle_digest)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Merkle::calculate_root(&leaves))
    }

    pub fn sign(&mut self, keypair: &Keypair) -> anyhow::Result<()> {
        let digest = self.header.digest()?;
        let certificate = Certificate::prepare(keypair, &digest)?;
        self.producer_signature = certificate.signature;
        Ok(())
    }

    pub fn validate_signee(&self, signing_key: &PublicKey) -> anyhow::Result<bool> {
        let digest = self.header.digest()?;
        Ok(signing_key.verify(&digest, &self.producer_signature))
    }
}
