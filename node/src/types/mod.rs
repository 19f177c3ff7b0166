use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use authority::{Authority, AuthorityLevel, RequiredAuthorities};
pub use block::{BlockHeader, BlockId, SignedBlock};
pub use operation::{
    AccountCreateOperation, AccountUpdateOperation, CustomJsonOperation, HardforkOperation,
    Operation, ProducerRewardOperation, ProducerUpdateOperation, TransferOperation,
};
pub use transaction::{SignedTransaction, Transaction, TransactionId};

pub mod authority;
pub mod block;
pub mod operation;
pub mod transaction;

pub const MIN_ACCOUNT_NAME_LENGTH: usize = 3;
pub const MAX_ACCOUNT_NAME_LENGTH: usize = 16;

/// Stateless validation failures of blocks, transactions and operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Transaction has no operations")]
    EmptyTransaction,
    #[error("Virtual operation {0} can't be submitted in a transaction")]
    VirtualOperation(&'static str),
    #[error("Invalid account name: '{0}'")]
    InvalidAccountName(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid authority: {0}")]
    InvalidAuthority(String),
    #[error("Invalid operation {operation}: {reason}")]
    InvalidOperation {
        operation: &'static str,
        reason: String,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountName(String);

impl AccountName {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Lowercase letters, digits, dots and dashes, starting with a letter.
    pub fn is_valid(&self) -> bool {
        let len = self.0.len();
        if !(MIN_ACCOUNT_NAME_LENGTH..=MAX_ACCOUNT_NAME_LENGTH).contains(&len) {
            return false;
        }
        let mut chars = self.0.chars();
        let starts_with_letter = chars.next().map_or(false, |c| c.is_ascii_lowercase());
        starts_with_letter
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ValidationError::InvalidAccountName(self.0.clone()))
        }
    }
}

impl Display for AccountName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn account_name_rules() {
        for valid in ["alice", "bob-1", "a.b.c", "initminer"] {
            assert!(AccountName::from(valid).is_valid(), "{valid}");
        }
        for invalid in ["al", "Alice", "1alice", "alice_b", "averyveryverylongname"] {
            assert!(!AccountName::from(invalid).is_valid(), "{invalid}");
        }
    }
}
