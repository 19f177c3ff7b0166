use crate::chain::error::Result;
use crate::chain::objects::{
    AccountObject, DynamicGlobalPropertyObject, HardforkPropertyObject, ProducerObject,
    ProducerScheduleObject,
};
use crate::config::ChainConfiguration;
use crate::state::Database;
use crate::types::{Authority, BlockId};

/// Creates the initial state. Runs outside of any undo session.
pub(crate) fn init_genesis(db: &Database, config: &ChainConfiguration) -> Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid chain configuration: {e}"))?;

    let init_key = config
        .init_public_key()
        .map_err(|e| anyhow::anyhow!(e))?;
    let init_producer = config.init_producer();
    let genesis_time = config.genesis_time();
    log::info!(
        "Initializing genesis state at {genesis_time} with producer {init_producer}, supply {}",
        config.initial_supply
    );

    db.create(|id| AccountObject {
        id,
        name: init_producer.clone(),
        balance: config.initial_supply,
        owner: Authority::from_key(init_key),
        active: Authority::from_key(init_key),
        posting: Authority::from_key(init_key),
        memo_key: init_key,
        created: genesis_time,
        last_owner_update: genesis_time,
    })?;

    db.create(|id| ProducerObject {
        id,
        owner: init_producer.clone(),
        signing_key: Some(init_key),
        url: String::new(),
        created: genesis_time,
        total_missed: 0,
        last_aslot: 0,
        last_confirmed_block_num: 0,
    })?;

    db.create(|id| DynamicGlobalPropertyObject {
        id,
        head_block_number: 0,
        head_block_id: BlockId::default(),
        time: genesis_time,
        current_producer: init_producer.clone(),
        current_aslot: 0,
        last_irreversible_block_num: 0,
        current_supply: config.initial_supply,
        recent_slots_filled: u64::MAX,
        participation_count: 64,
    })?;

    db.create(|id| ProducerScheduleObject {
        id,
        current_shuffled_producers: vec![init_producer.clone()],
        next_shuffle_block_num: 1,
    })?;

    db.create(|id| HardforkPropertyObject {
        id,
        current_version: 0,
        processed_hardforks: vec![genesis_time],
        last_hardfork_time: genesis_time,
    })?;

    Ok(())
}
