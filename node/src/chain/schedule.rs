//! Producer slots and the producer schedule.
//!
//! Time is divided into slots of one block interval. Slot `n` is the n-th slot after the
//! head block; each slot is owned by one producer of the shuffled schedule.
use crate::chain::error::{ChainError, Result};
use crate::chain::objects::{
    DynamicGlobalPropertyObject, ProducerObject, ProducerScheduleObject, SINGLETON_ID,
};
use crate::config::ChainConfiguration;
use crate::state::{Database, StateReader};
use crate::types::AccountName;
use crate::utilities::time::TimePointSec;

const SHUFFLE_MULTIPLIER: u64 = 2_685_821_657_736_338_717;

pub(crate) fn get_slot_time(
    state: &StateReader,
    config: &ChainConfiguration,
    slot: u32,
) -> Result<TimePointSec> {
    if slot == 0 {
        return Ok(TimePointSec::default());
    }
    let interval = config.block_interval_sec;
    let dgpo = state.get::<DynamicGlobalPropertyObject>(SINGLETON_ID)?;

    if dgpo.head_block_number == 0 {
        // first block: slots count from genesis time
        return Ok(dgpo.time + slot.saturating_mul(interval));
    }

    let head_slot_time = (dgpo.time.secs() / interval) * interval;
    Ok(TimePointSec::new(head_slot_time) + slot.saturating_mul(interval))
}

/// Slot number for a time, 0 when it is before the first slot.
pub(crate) fn get_slot_at_time(
    state: &StateReader,
    config: &ChainConfiguration,
    when: TimePointSec,
) -> Result<u32> {
    let first_slot_time = get_slot_time(state, config, 1)?;
    if when < first_slot_time {
        return Ok(0);
    }
    let elapsed = (when - first_slot_time) as u64;
    Ok((elapsed / u64::from(config.block_interval_sec)) as u32 + 1)
}

pub(crate) fn get_scheduled_producer(state: &StateReader, slot: u32) -> Result<AccountName> {
    let dgpo = state.get::<DynamicGlobalPropertyObject>(SINGLETON_ID)?;
    let schedule = state.get::<ProducerScheduleObject>(SINGLETON_ID)?;
    let producers = &schedule.current_shuffled_producers;
    if producers.is_empty() {
        return Err(ChainError::Invariant("producer schedule is empty".to_string()));
    }
    let aslot = dgpo.current_aslot + u64::from(slot);
    Ok(producers[(aslot % producers.len() as u64) as usize].clone())
}

/// Deterministic xorshift shuffle, seeded with the head block time.
pub(crate) fn shuffle_producers(producers: &mut [AccountName], seed_time: TimePointSec) {
    let now_hi = u64::from(seed_time.secs()) << 32;
    let len = producers.len();
    for i in 0..len {
        let mut k = now_hi.wrapping_add((i as u64).wrapping_mul(SHUFFLE_MULTIPLIER));
        k ^= k >> 12;
        k ^= k << 25;
        k ^= k >> 27;
        k = k.wrapping_mul(SHUFFLE_MULTIPLIER);

        let remaining = (len - i) as u64;
        let j = i + (k % remaining) as usize;
        producers.swap(i, j);
    }
}

/// At a round boundary, rebuilds the schedule from producers that have a signing key.
pub(crate) fn update_producer_schedule(db: &Database, config: &ChainConfiguration) -> Result<()> {
    let dgpo = db.get::<DynamicGlobalPropertyObject>(SINGLETON_ID)?;
    let schedule = db.get::<ProducerScheduleObject>(SINGLETON_ID)?;
    let round = schedule.num_scheduled_producers().max(1);
    if dgpo.head_block_number % round != 0 {
        return Ok(());
    }

    let mut active: Vec<AccountName> = db
        .filter(|producer: &ProducerObject| producer.signing_key.is_some())
        .into_iter()
        .take(config.max_producers as usize)
        .map(|producer| producer.owner)
        .collect();
    if active.is_empty() {
        log::warn!(
            "No producer with a signing key at block {}, keeping the current schedule",
            dgpo.head_block_number
        );
        return Ok(());
    }

    shuffle_producers(&mut active, dgpo.time);
    log::trace!(
        "New producer schedule at block {}: {:?}",
        dgpo.head_block_number,
        active
    );

    let next_shuffle = dgpo.head_block_number + active.len() as u32;
    db.modify(&schedule, |schedule| {
        schedule.current_shuffled_producers = active;
        schedule.next_shuffle_block_num = next_shuffle;
    })?;
    Ok(())
}
