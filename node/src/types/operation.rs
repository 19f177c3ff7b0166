use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{AccountName, Authority, AuthorityLevel, RequiredAuthorities, ValidationError};
use crate::utilities::crypto::PublicKey;

pub const MAX_MEMO_SIZE: usize = 2048;
pub const MAX_CUSTOM_ID_LENGTH: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Operation {
    AccountCreate(AccountCreateOperation),
    AccountUpdate(AccountUpdateOperation),
    Transfer(TransferOperation),
    ProducerUpdate(ProducerUpdateOperation),
    CustomJson(CustomJsonOperation),
    ProducerReward(ProducerRewardOperation),
    Hardfork(HardforkOperation),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreateOperation {
    pub fee: u64,
    pub creator: AccountName,
    pub new_account_name: AccountName,
    pub owner: Authority,
    pub active: Authority,
    pub posting: Authority,
    pub memo_key: PublicKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdateOperation {
    pub account: AccountName,
    pub owner: Option<Authority>,
    pub active: Option<Authority>,
    pub posting: Option<Authority>,
    pub memo_key: Option<PublicKey>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOperation {
    pub from: AccountName,
    pub to: AccountName,
    pub amount: u64,
    pub memo: String,
}

/// Registers or updates a block producer. A missing signing key retires the producer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerUpdateOperation {
    pub owner: AccountName,
    pub url: String,
    pub signing_key: Option<PublicKey>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomJsonOperation {
    pub required_auths: BTreeSet<AccountName>,
    pub required_posting_auths: BTreeSet<AccountName>,
    pub id: String,
    pub json: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerRewardOperation {
    pub producer: AccountName,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardforkOperation {
    pub version: u32,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::AccountCreate(_) => "account_create",
            Operation::AccountUpdate(_) => "account_update",
            Operation::Transfer(_) => "transfer",
            Operation::ProducerUpdate(_) => "producer_update",
            Operation::CustomJson(_) => "custom_json",
            Operation::ProducerReward(_) => "producer_reward",
            Operation::Hardfork(_) => "hardfork",
        }
    }

    /// Virtual operations are emitted by the chain itself and never signed by users.
    pub fn is_virtual(&self) -> bool {
        matches!(self, Operation::ProducerReward(_) | Operation::Hardfork(_))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Operation::AccountCreate(op) => {
                op.creator.validate()?;
                op.new_account_name.validate()?;
                op.owner.validate()?;
                op.active.validate()?;
                op.posting.validate()
            }
            Operation::AccountUpdate(op) => {
                op.account.validate()?;
                for authority in [&op.owner, &op.active, &op.posting].into_iter().flatten() {
                    authority.validate()?;
                }
                Ok(())
            }
            Operation::Transfer(op) => {
                op.from.validate()?;
                op.to.validate()?;
                if op.amount == 0 {
                    return Err(ValidationError::InvalidAmount(
                        "transfer amount must be positive".to_string(),
                    ));
                }
                if op.memo.len() > MAX_MEMO_SIZE {
                    return Err(self.invalid("memo is too large"));
                }
                Ok(())
            }
            Operation::ProducerUpdate(op) => {
                op.owner.validate()?;
                if op.url.len() > MAX_MEMO_SIZE {
                    return Err(self.invalid("url is too long"));
                }
                Ok(())
            }
            Operation::CustomJson(op) => {
                if op.required_auths.is_empty() && op.required_posting_auths.is_empty() {
                    return Err(self.invalid("at least one account must authorize"));
                }
                if op.id.len() > MAX_CUSTOM_ID_LENGTH {
                    return Err(self.invalid("id is too long"));
                }
                serde_json::from_str::<serde_json::Value>(&op.json)
                    .map_err(|e| self.invalid(&format!("json is malformed: {e}")))?;
                Ok(())
            }
            Operation::ProducerReward(_) | Operation::Hardfork(_) => {
                Err(ValidationError::VirtualOperation(self.name()))
            }
        }
    }

    pub fn required_authorities(&self, required: &mut RequiredAuthorities) {
        match self {
            Operation::AccountCreate(op) => {
                required.add(AuthorityLevel::Active, op.creator.clone());
            }
            Operation::AccountUpdate(op) => {
                let level = if op.owner.is_some() {
                    AuthorityLevel::Owner
                } else {
                    AuthorityLevel::Active
                };
                required.add(level, op.account.clone());
            }
            Operation::Transfer(op) => {
                required.add(AuthorityLevel::Active, op.from.clone());
            }
            Operation::ProducerUpdate(op) => {
                required.add(AuthorityLevel::Active, op.owner.clone());
            }
            Operation::CustomJson(op) => {
                for account in &op.required_auths {
                    required.add(AuthorityLevel::Active, account.clone());
                }
                for account in &op.required_posting_auths {
                    required.add(AuthorityLevel::Posting, account.clone());
                }
            }
            Operation::ProducerReward(_) | Operation::Hardfork(_) => {}
        }
    }

    fn invalid(&self, reason: &str) -> ValidationError {
        ValidationError::InvalidOperation {
            operation: self.name(),
            reason: reason.to_string(),
        }
    }
}
