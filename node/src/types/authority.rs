use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::types::{AccountName, ValidationError};
use crate::utilities::crypto::PublicKey;

/// Weighted multi-signature authority.
///
/// Satisfied when the summed weights of signing keys and approving accounts reach
/// `weight_threshold`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    pub weight_threshold: u32,
    pub account_auths: BTreeMap<AccountName, u16>,
    pub key_auths: BTreeMap<PublicKey, u16>,
}

impl Authority {
    pub fn from_key(key: PublicKey) -> Self {
        Self {
            weight_threshold: 1,
            account_auths: BTreeMap::new(),
            key_auths: BTreeMap::from([(key, 1)]),
        }
    }

    pub fn with_key(mut self, key: PublicKey, weight: u16) -> Self {
        self.key_auths.insert(key, weight);
        self
    }

    pub fn with_account(mut self, account: AccountName, weight: u16) -> Self {
        self.account_auths.insert(account, weight);
        self
    }

    pub fn with_threshold(mut self, weight_threshold: u32) -> Self {
        self.weight_threshold = weight_threshold;
        self
    }

    /// True when even all keys and accounts together can't reach the threshold.
    pub fn is_impossible(&self) -> bool {
        let total: u64 = self
            .key_auths
            .values()
            .chain(self.account_auths.values())
            .map(|w| u64::from(*w))
            .sum();
        total < u64::from(self.weight_threshold)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.weight_threshold == 0 {
            return Err(ValidationError::InvalidAuthority(
                "weight threshold must be positive".to_string(),
            ));
        }
        for account in self.account_auths.keys() {
            account.validate()?;
        }
        if self.is_impossible() {
            return Err(ValidationError::InvalidAuthority(
                "threshold can't be reached".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityLevel {
    Owner,
    Active,
    Posting,
}

impl Display for AuthorityLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let level = match self {
            AuthorityLevel::Owner => "owner",
            AuthorityLevel::Active => "active",
            AuthorityLevel::Posting => "posting",
        };
        write!(f, "{level}")
    }
}

/// Accounts whose approval a transaction needs, per level.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequiredAuthorities {
    pub owner: BTreeSet<AccountName>,
    pub active: BTreeSet<AccountName>,
    pub posting: BTreeSet<AccountName>,
}

impl RequiredAuthorities {
    pub fn add(&mut self, level: AuthorityLevel, account: AccountName) {
        match level {
            AuthorityLevel::Owner => self.owner.insert(account),
            AuthorityLevel::Active => self.active.insert(account),
            AuthorityLevel::Posting => self.posting.insert(account),
        };
    }

    pub fn is_empty(&self) -> bool {
        self.owner.is_empty() && self.active.is_empty() && self.posting.is_empty()
    }
}
