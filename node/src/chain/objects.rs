use serde::{Deserialize, Serialize};

use crate::state::{LedgerObject, ObjectId};
use crate::types::{AccountName, Authority, BlockId, TransactionId};
use crate::utilities::crypto::PublicKey;
use crate::utilities::time::TimePointSec;

/// Id of the singleton objects.
pub const SINGLETON_ID: ObjectId = ObjectId(0);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountObject {
    pub id: ObjectId,
    pub name: AccountName,
    pub balance: u64,
    pub owner: Authority,
    pub active: Authority,
    pub posting: Authority,
    pub memo_key: PublicKey,
    pub created: TimePointSec,
    pub last_owner_update: TimePointSec,
}

impl LedgerObject for AccountObject {
    const TYPE_NAME: &'static str = "account";

    fn id(&self) -> ObjectId {
        self.id
    }

    fn unique_key(&self) -> Option<Vec<u8>> {
        Some(self.name.as_bytes().to_vec())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerObject {
    pub id: ObjectId,
    pub owner: AccountName,
    /// Producers without a signing key are never scheduled.
    pub signing_key: Option<PublicKey>,
    pub url: String,
    pub created: TimePointSec,
    pub total_missed: u32,
    /// Absolute slot of the last produced block.
    pub last_aslot: u64,
    pub last_confirmed_block_num: u32,
}

impl LedgerObject for ProducerObject {
    const TYPE_NAME: &'static str = "producer";

    fn id(&self) -> ObjectId {
        self.id
    }

    fn unique_key(&self) -> Option<Vec<u8>> {
        Some(self.owner.as_bytes().to_vec())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicGlobalPropertyObject {
    pub id: ObjectId,
    pub head_block_number: u32,
    pub head_block_id: BlockId,
    pub time: TimePointSec,
    pub current_producer: AccountName,
    /// Slots elapsed since genesis, filled or not.
    pub current_aslot: u64,
    pub last_irreversible_block_num: u32,
    pub current_supply: u64,
    /// One bit per recent slot, most recent in the lowest bit.
    pub recent_slots_filled: u64,
    pub participation_count: u32,
}

impl LedgerObject for DynamicGlobalPropertyObject {
    const TYPE_NAME: &'static str = "dynamic_global_properties";

    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerScheduleObject {
    pub id: ObjectId,
    pub current_shuffled_producers: Vec<AccountName>,
    pub next_shuffle_block_num: u32,
}

impl ProducerScheduleObject {
    pub fn num_scheduled_producers(&self) -> u32 {
        self.current_shuffled_producers.len() as u32
    }
}

impl LedgerObject for ProducerScheduleObject {
    const TYPE_NAME: &'static str = "producer_schedule";

    fn id(&self) -> ObjectId {
        self.id
    }
}

/// Recently applied transaction, kept until it expires to reject replays.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionObject {
    pub id: ObjectId,
    pub trx_id: TransactionId,
    pub expiration: TimePointSec,
}

impl LedgerObject for TransactionObject {
    const TYPE_NAME: &'static str = "transaction";

    fn id(&self) -> ObjectId {
        self.id
    }

    fn unique_key(&self) -> Option<Vec<u8>> {
        Some(self.trx_id.as_ref().to_vec())
    }

    fn order_key(&self) -> Option<Vec<u8>> {
        Some(Self::expiration_key(self.expiration))
    }
}

impl TransactionObject {
    pub fn expiration_key(expiration: TimePointSec) -> Vec<u8> {
        expiration.secs().to_be_bytes().to_vec()
    }
}

/// Id of the last block whose number has these low 16 bits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummaryObject {
    pub id: ObjectId,
    pub ref_block_num: u16,
    pub block_id: BlockId,
}

impl BlockSummaryObject {
    pub fn key(ref_block_num: u16) -> Vec<u8> {
        ref_block_num.to_be_bytes().to_vec()
    }
}

impl LedgerObject for BlockSummaryObject {
    const TYPE_NAME: &'static str = "block_summary";

    fn id(&self) -> ObjectId {
        self.id
    }

    fn unique_key(&self) -> Option<Vec<u8>> {
        Some(Self::key(self.ref_block_num))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardforkPropertyObject {
    pub id: ObjectId,
    pub current_version: u32,
    pub processed_hardforks: Vec<TimePointSec>,
    pub last_hardfork_time: TimePointSec,
}

impl LedgerObject for HardforkPropertyObject {
    const TYPE_NAME: &'static str = "hardfork_properties";

    fn id(&self) -> ObjectId {
        self.id
    }
}
