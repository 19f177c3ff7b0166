use serde::{Deserialize, Serialize};

use crate::types::{BlockId, Operation, RequiredAuthorities, ValidationError};
use crate::utilities::crypto::{Certificate, Keypair};
use crate::utilities::encoding::encode;
use crate::utilities::hash::{blake2_256_concat, HashType};
use crate::utilities::time::TimePointSec;

pub type TransactionId = HashType;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Low 16 bits of the referenced block number.
    pub ref_block_num: u16,
    /// Prefix word of the referenced block id.
    pub ref_block_prefix: u32,
    pub expiration: TimePointSec,
    pub operations: Vec<Operation>,
}

impl Transaction {
    pub fn id(&self) -> anyhow::Result<TransactionId> {
        Ok(HashType::digest(&encode(self)?))
    }

    /// Digest the signatures commit to. Bound to one chain.
    pub fn sig_digest(&self, chain_id: &HashType) -> anyhow::Result<HashType> {
        let bytes = encode(self)?;
        Ok(HashType::new(blake2_256_concat(&[chain_id.as_ref(), &bytes])))
    }

    pub fn set_reference_block(&mut self, block_id: &BlockId) {
        self.ref_block_num = (block_id.block_num() & 0xffff) as u16;
        self.ref_block_prefix = block_id.ref_prefix();
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.operations.is_empty() {
            return Err(ValidationError::EmptyTransaction);
        }
        for operation in &self.operations {
            operation.validate()?;
        }
        Ok(())
    }

    pub fn required_authorities(&self) -> RequiredAuthorities {
        let mut required = RequiredAuthorities::default();
        for operation in &self.operations {
            operation.required_authorities(&mut required);
        }
        required
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signatures: Vec<Certificate>,
}

impl SignedTransaction {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            signatures: vec![],
        }
    }

    /// Identity ignores signatures, so re-signing doesn't make a new transaction.
    pub fn id(&self) -> anyhow::Result<TransactionId> {
        self.transaction.id()
    }

    /// Leaf of the block's transaction merkle tree. Covers signatures too.
    pub fn merkle_digest(&self) -> anyhow::Result<HashType> {
        Ok(HashType::digest(&encode(self)?))
    }

    pub fn sign(&mut self, keypair: &Keypair, chain_id: &HashType) -> anyhow::Result<()> {
        let digest = self.transaction.sig_digest(chain_id)?;
        let certificate = Certificate::prepare(keypair, &digest)?;
        self.signatures.push(certificate);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::types::{AccountName, TransferOperation};
    use crate::utilities::crypto::{ChainKeypair, Keypair};

    use super::*;

    fn transaction() -> Transaction {
        Transaction {
            ref_block_num: 0,
            ref_block_prefix: 0,
            expiration: TimePointSec::new(100),
            operations: vec![Operation::Transfer(TransferOperation {
                from: AccountName::from("alice"),
                to: AccountName::from("bob"),
                amount: 1,
                memo: String::new(),
            })],
        }
    }

    #[test]
    fn signatures_do_not_change_id() {
        let keypair = Keypair::generate(None);
        let mut trx = SignedTransaction::new(transaction());
        let unsigned_id = trx.id().unwrap();
        let unsigned_digest = trx.merkle_digest().unwrap();

        trx.sign(&keypair, &HashType::default()).unwrap();

        assert_eq!(trx.id().unwrap(), unsigned_id);
        assert_ne!(trx.merkle_digest().unwrap(), unsigned_digest);
    }

    #[test]
    fn signature_is_bound_to_chain() {
        let keypair = Keypair::generate(None);
        let chain_a = HashType::digest(b"a");
        let chain_b = HashType::digest(b"b");
        let mut trx = SignedTransaction::new(transaction());
        trx.sign(&keypair, &chain_a).unwrap();

        let certificate = &trx.signatures[0];
        assert!(certificate.verify(&trx.transaction.sig_digest(&chain_a).unwrap()));
        assert!(!certificate.verify(&trx.transaction.sig_digest(&chain_b).unwrap()));
    }

    #[test]
    fn empty_transaction_is_invalid() {
        assert_eq!(
            Transaction::default().validate(),
            Err(ValidationError::EmptyTransaction)
        );
    }
}
