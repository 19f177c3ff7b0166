//! Per-block maintenance, run after a block's transactions.
//!
//! Hooks run in phase order; later phases observe the effects of earlier ones.
use crate::chain::context::ApplyContext;
use crate::chain::error::{ChainError, Result};
use crate::chain::objects::{
    AccountObject, DynamicGlobalPropertyObject, HardforkPropertyObject, TransactionObject,
    SINGLETON_ID,
};
use crate::chain::observer::ObserverRegistry;
use crate::chain::schedule::update_producer_schedule;
use crate::config::ChainConfiguration;
use crate::state::{Database, StateReader};
use crate::types::{HardforkOperation, Operation, ProducerRewardOperation, SignedBlock};
use crate::utilities::time::TimePointSec;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MaintenancePhase {
    ProducerSchedule,
    Funds,
    DeferredWithdrawals,
    ExpiredObjects,
    Governance,
    WorldTick,
    Hardforks,
}

pub struct MaintenanceContext<'a> {
    pub db: &'a Database,
    pub config: &'a ChainConfiguration,
    pub block: &'a SignedBlock,
    pub(crate) apply: &'a mut ApplyContext,
    pub(crate) observers: &'a ObserverRegistry,
}

impl<'a> MaintenanceContext<'a> {
    pub fn global_properties(&self) -> anyhow::Result<DynamicGlobalPropertyObject> {
        Ok(self.db.get(SINGLETON_ID)?)
    }

    pub fn head_block_time(&self) -> anyhow::Result<TimePointSec> {
        Ok(self.global_properties()?.time)
    }

    /// Emits a virtual operation. Observers see state right before and right after `effect`.
    pub fn push_virtual_operation<F>(&mut self, op: Operation, effect: F) -> anyhow::Result<()>
    where
        F: FnOnce(&Database) -> anyhow::Result<()>,
    {
        let state: &StateReader = self.db;
        let note = self
            .observers
            .pre_push_virtual_operation(state, self.apply, op);
        effect(self.db)?;
        self.observers.post_push_virtual_operation(state, &note);
        Ok(())
    }
}

pub trait MaintenanceHook: Send + Sync {
    fn name(&self) -> &'static str;

    fn phase(&self) -> MaintenancePhase;

    fn run(&self, ctx: &mut MaintenanceContext<'_>) -> anyhow::Result<()>;
}

/// Hooks ordered by phase, registration order within a phase.
#[derive(Default)]
pub struct MaintenanceHooks {
    hooks: Vec<Box<dyn MaintenanceHook>>,
}

impl MaintenanceHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut hooks = Self::new();
        hooks.register(Box::new(UpdateProducerSchedule));
        hooks.register(Box::new(ProcessFunds));
        hooks.register(Box::new(ClearExpiredTransactions));
        hooks.register(Box::new(ProcessHardforks));
        hooks
    }

    pub fn register(&mut self, hook: Box<dyn MaintenanceHook>) {
        let position = self
            .hooks
            .iter()
            .position(|existing| existing.phase() > hook.phase())
            .unwrap_or(self.hooks.len());
        self.hooks.insert(position, hook);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.hooks.iter().map(|hook| hook.name()).collect()
    }

    pub(crate) fn run_all(&self, ctx: &mut MaintenanceContext<'_>) -> Result<()> {
        for hook in &self.hooks {
            hook.run(ctx).map_err(|source| ChainError::Maintenance {
                hook: hook.name(),
                source,
            })?;
        }
        Ok(())
    }
}

pub struct UpdateProducerSchedule;

impl MaintenanceHook for UpdateProducerSchedule {
    fn name(&self) -> &'static str {
        "update_producer_schedule"
    }

    fn phase(&self) -> MaintenancePhase {
        MaintenancePhase::ProducerSchedule
    }

    fn run(&self, ctx: &mut MaintenanceContext<'_>) -> anyhow::Result<()> {
        update_producer_schedule(ctx.db, ctx.config)?;
        Ok(())
    }
}

/// Pays the block producer and mints the reward into the supply.
pub struct ProcessFunds;

impl MaintenanceHook for ProcessFunds {
    fn name(&self) -> &'static str {
        "process_funds"
    }

    fn phase(&self) -> MaintenancePhase {
        MaintenancePhase::Funds
    }

    fn run(&self, ctx: &mut MaintenanceContext<'_>) -> anyhow::Result<()> {
        let amount = ctx.config.producer_reward;
        if amount == 0 {
            return Ok(());
        }
        let producer = ctx.block.header.producer.clone();
        let op = Operation::ProducerReward(ProducerRewardOperation {
            producer: producer.clone(),
            amount,
        });

        ctx.push_virtual_operation(op, |db| {
            let account = db.get_by_key::<AccountObject>(producer.as_bytes())?;
            db.modify(&account, |account| account.balance += amount)?;
            db.modify_by_id::<DynamicGlobalPropertyObject, _>(SINGLETON_ID, |dgpo| {
                dgpo.current_supply += amount
            })?;
            Ok(())
        })
    }
}

/// Drops dedupe entries of transactions that can no longer be applied.
pub struct ClearExpiredTransactions;

impl MaintenanceHook for ClearExpiredTransactions {
    fn name(&self) -> &'static str {
        "clear_expired_transactions"
    }

    fn phase(&self) -> MaintenancePhase {
        MaintenancePhase::ExpiredObjects
    }

    fn run(&self, ctx: &mut MaintenanceContext<'_>) -> anyhow::Result<()> {
        let now = ctx.head_block_time()?;
        let expired = ctx
            .db
            .ordered_until::<TransactionObject>(&TransactionObject::expiration_key(now));
        if !expired.is_empty() {
            log::trace!("Removing {} expired transactions", expired.len());
        }
        for trx in &expired {
            ctx.db.remove(trx)?;
        }
        Ok(())
    }
}

/// Activates configured hardforks whose time has come, one virtual operation each.
pub struct ProcessHardforks;

impl MaintenanceHook for ProcessHardforks {
    fn name(&self) -> &'static str {
        "process_hardforks"
    }

    fn phase(&self) -> MaintenancePhase {
        MaintenancePhase::Hardforks
    }

    fn run(&self, ctx: &mut MaintenanceContext<'_>) -> anyhow::Result<()> {
        let now = ctx.head_block_time()?;
        let mut hardforks = ctx.config.hardforks.clone();
        hardforks.sort_by_key(|hardfork| hardfork.version);

        for hardfork in hardforks {
            let props = ctx.db.get::<HardforkPropertyObject>(SINGLETON_ID)?;
            let time = TimePointSec::new(hardfork.time);
            if hardfork.version <= props.current_version || time > now {
                continue;
            }

            log::info!("Applying hardfork {} at {now}", hardfork.version);
            let op = Operation::Hardfork(HardforkOperation {
                version: hardfork.version,
            });
            ctx.push_virtual_operation(op, |db| {
                db.modify(&props, |props| {
                    props.current_version = hardfork.version;
                    props.processed_hardforks.push(time);
                    props.last_hardfork_time = time;
                })?;
                Ok(())
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::chain::context::ValidationSteps;
    use crate::chain::genesis::init_genesis;
    use crate::chain::observer::{ChainObserver, OperationNotification};
    use crate::chain::test::chain_config;
    use crate::config::HardforkSetting;
    use crate::types::{BlockHeader, BlockId};

    use super::*;

    struct Named {
        name: &'static str,
        phase: MaintenancePhase,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl MaintenanceHook for Named {
        fn name(&self) -> &'static str {
            self.name
        }

        fn phase(&self) -> MaintenancePhase {
            self.phase
        }

        fn run(&self, _: &mut MaintenanceContext<'_>) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    struct Failing;

    impl MaintenanceHook for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn phase(&self) -> MaintenancePhase {
            MaintenancePhase::Governance
        }

        fn run(&self, _: &mut MaintenanceContext<'_>) -> anyhow::Result<()> {
            anyhow::bail!("governance failure")
        }
    }

    #[derive(Default)]
    struct VirtualOps {
        seen: AtomicU32,
    }

    impl ChainObserver for VirtualOps {
        fn post_apply_operation(&self, _: &StateReader, note: &OperationNotification) -> anyhow::Result<()> {
            assert!(note.op.is_virtual());
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn genesis(config: &ChainConfiguration) -> Database {
        let db = Database::new();
        init_genesis(&db, config).unwrap();
        db
    }

    fn block(config: &ChainConfiguration) -> SignedBlock {
        SignedBlock::new(
            BlockHeader {
                previous: BlockId::default(),
                timestamp: config.genesis_time() + config.block_interval_sec,
                producer: config.init_producer(),
                transaction_merkle_root: Default::default(),
            },
            vec![],
        )
    }

    #[test]
    fn hooks_run_in_phase_order() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut hooks = MaintenanceHooks::new();
        for (name, phase) in [
            ("hardforks", MaintenancePhase::Hardforks),
            ("schedule", MaintenancePhase::ProducerSchedule),
            ("tick", MaintenancePhase::WorldTick),
            ("schedule_2", MaintenancePhase::ProducerSchedule),
        ] {
            hooks.register(Box::new(Named {
                name,
                phase,
                log: log.clone(),
            }));
        }
        assert_eq!(hooks.names(), vec!["schedule", "schedule_2", "tick", "hardforks"]);

        let config = chain_config();
        let db = genesis(&config);
        let block = block(&config);
        let mut apply = ApplyContext::for_pending(ValidationSteps::all(), 1);
        let observers = ObserverRegistry::default();
        let mut ctx = MaintenanceContext {
            db: &db,
            config: &config,
            block: &block,
            apply: &mut apply,
            observers: &observers,
        };
        hooks.run_all(&mut ctx).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["schedule", "schedule_2", "tick", "hardforks"]);
    }

    #[test]
    fn failing_hook_names_itself() {
        let mut hooks = MaintenanceHooks::new();
        hooks.register(Box::new(Failing));

        let config = chain_config();
        let db = genesis(&config);
        let block = block(&config);
        let mut apply = ApplyContext::for_pending(ValidationSteps::all(), 1);
        let observers = ObserverRegistry::default();
        let mut ctx = MaintenanceContext {
            db: &db,
            config: &config,
            block: &block,
            apply: &mut apply,
            observers: &observers,
        };

        let err = hooks.run_all(&mut ctx).unwrap_err();
        assert!(matches!(err, ChainError::Maintenance { hook: "failing", .. }));
    }

    #[test]
    fn reward_and_hardfork_emit_virtual_operations() {
        let mut config = chain_config();
        config.hardforks = vec![
            HardforkSetting {
                version: 1,
                time: config.genesis_time,
            },
            HardforkSetting {
                version: 2,
                time: config.genesis_time + 1_000_000,
            },
        ];
        let db = genesis(&config);
        let block = block(&config);
        let mut apply = ApplyContext::for_pending(ValidationSteps::all(), 1);
        let observer = Arc::new(VirtualOps::default());
        let mut observers = ObserverRegistry::default();
        observers.register(observer.clone());
        let mut ctx = MaintenanceContext {
            db: &db,
            config: &config,
            block: &block,
            apply: &mut apply,
            observers: &observers,
        };

        MaintenanceHooks::with_defaults().run_all(&mut ctx).unwrap();

        let producer = db
            .get_by_key::<AccountObject>(config.init_producer().as_bytes())
            .unwrap();
        assert_eq!(producer.balance, config.initial_supply + config.producer_reward);
        let dgpo = db.get::<DynamicGlobalPropertyObject>(SINGLETON_ID).unwrap();
        assert_eq!(dgpo.current_supply, config.initial_supply + config.producer_reward);
        let props = db.get::<HardforkPropertyObject>(SINGLETON_ID).unwrap();
        assert_eq!(props.current_version, 1);

        assert_eq!(observer.seen.load(Ordering::SeqCst), 2);
        assert_eq!(apply.virtual_op, 2);
    }

    #[test]
    fn expired_transactions_are_removed() {
        let config = chain_config();
        let db = genesis(&config);
        let now = config.genesis_time();
        let earlier = now.saturating_sub(5);
        for (salt, expiration) in [(1u8, now + 10), (2, now), (3, earlier), (4, now), (5, now + 1)] {
            db.create(|id| TransactionObject {
                id,
                trx_id: crate::utilities::hash::HashType::digest(&[salt]),
                expiration,
            })
            .unwrap();
        }
        let block = block(&config);
        let mut apply = ApplyContext::for_pending(ValidationSteps::all(), 1);
        let observers = ObserverRegistry::default();
        let mut ctx = MaintenanceContext {
            db: &db,
            config: &config,
            block: &block,
            apply: &mut apply,
            observers: &observers,
        };

        ClearExpiredTransactions.run(&mut ctx).unwrap();

        let remaining: Vec<_> = db
            .all::<TransactionObject>()
            .into_iter()
            .map(|trx| trx.expiration)
            .collect();
        assert_eq!(remaining, vec![now + 10, now + 1]);
        assert_eq!(
            db.ordered_until::<TransactionObject>(&TransactionObject::expiration_key(now + 10))
                .into_iter()
                .map(|trx| trx.expiration)
                .collect::<Vec<_>>(),
            vec![now + 1, now + 10]
        );
    }
}
