use crate::chain::objects::AccountObject;
use crate::evaluator::{unexpected, EvaluationContext, Evaluator, OperationResult};
use crate::types::{Authority, Operation};

pub struct AccountCreateEvaluator;

impl Evaluator for AccountCreateEvaluator {
    fn apply(&self, ctx: &EvaluationContext<'_>, op: &Operation) -> anyhow::Result<OperationResult> {
        let Operation::AccountCreate(op) = op else {
            return Err(unexpected("AccountCreateEvaluator", op));
        };

        let creator = ctx.get_account(&op.creator)?;
        if creator.balance < op.fee {
            anyhow::bail!(
                "Insufficient balance to create account: {} has {}, fee is {}",
                creator.name,
                creator.balance,
                op.fee
            );
        }
        if ctx
            .db
            .find_by_key::<AccountObject>(op.new_account_name.as_bytes())
            .is_some()
        {
            anyhow::bail!("Account {} already exists", op.new_account_name);
        }
        for authority in [&op.owner, &op.active, &op.posting] {
            check_referenced_accounts(ctx, authority)?;
        }

        ctx.db.modify(&creator, |creator| creator.balance -= op.fee)?;
        let account = ctx.db.create(|id| AccountObject {
            id,
            name: op.new_account_name.clone(),
            balance: op.fee,
            owner: op.owner.clone(),
            active: op.active.clone(),
            posting: op.posting.clone(),
            memo_key: op.memo_key,
            created: ctx.head_block_time,
            last_owner_update: ctx.head_block_time,
        })?;
        log::debug!("Account {} created by {}", account.name, op.creator);

        Ok(OperationResult::ObjectCreated(account.id))
    }
}

pub struct AccountUpdateEvaluator;

impl Evaluator for AccountUpdateEvaluator {
    fn apply(&self, ctx: &EvaluationContext<'_>, op: &Operation) -> anyhow::Result<OperationResult> {
        let Operation::AccountUpdate(op) = op else {
            return Err(unexpected("AccountUpdateEvaluator", op));
        };

        let account = ctx.get_account(&op.account)?;
        for authority in [&op.owner, &op.active, &op.posting].into_iter().flatten() {
            check_referenced_accounts(ctx, authority)?;
        }

        ctx.db.modify(&account, |account| {
            if let Some(owner) = &op.owner {
                account.owner = owner.clone();
                account.last_owner_update = ctx.head_block_time;
            }
            if let Some(active) = &op.active {
                account.active = active.clone();
            }
            if let Some(posting) = &op.posting {
                account.posting = posting.clone();
            }
            if let Some(memo_key) = op.memo_key {
                account.memo_key = memo_key;
            }
        })?;

        Ok(OperationResult::Void)
    }
}

fn check_referenced_accounts(ctx: &EvaluationContext<'_>, authority: &Authority) -> anyhow::Result<()> {
    for account in authority.account_auths.keys() {
        ctx.get_account(account)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use crate::config::ChainConfiguration;
    use crate::evaluator::test::{account, context};
    use crate::state::Database;
    use crate::types::{AccountCreateOperation, AccountName, AccountUpdateOperation};
    use crate::utilities::crypto::{ChainKeypair, Keypair};

    use super::*;

    fn create_op(name: &str, fee: u64) -> Operation {
        let key = Keypair::generate(Some(name.as_bytes().to_vec())).public_key();
        Operation::AccountCreate(AccountCreateOperation {
            fee,
            creator: "initminer".into(),
            new_account_name: name.into(),
            owner: Authority::from_key(key),
            active: Authority::from_key(key),
            posting: Authority::from_key(key),
            memo_key: key,
        })
    }

    #[test]
    fn create_moves_fee_to_new_account() {
        let db = Database::new();
        let config = ChainConfiguration::default();
        account(&db, "initminer", 100);

        let result = AccountCreateEvaluator
            .apply(&context(&db, &config), &create_op("alice", 30))
            .unwrap();

        let alice = db.get_by_key::<AccountObject>(b"alice").unwrap();
        assert_eq!(result, OperationResult::ObjectCreated(alice.id));
        assert_eq!(alice.balance, 30);
        assert_eq!(db.get_by_key::<AccountObject>(b"initminer").unwrap().balance, 70);
    }

    #[test]
    fn create_rejects_existing_and_unaffordable() {
        let db = Database::new();
        let config = ChainConfiguration::default();
        account(&db, "initminer", 10);
        account(&db, "alice", 0);
        let ctx = context(&db, &config);

        assert!(AccountCreateEvaluator.apply(&ctx, &create_op("alice", 1)).is_err());
        assert!(AccountCreateEvaluator.apply(&ctx, &create_op("bob", 11)).is_err());
    }

    #[test]
    fn update_owner_records_time() {
        let db = Database::new();
        let config = ChainConfiguration::default();
        let alice = account(&db, "alice", 0);
        let new_key = Keypair::generate(None).public_key();
        let op = Operation::AccountUpdate(AccountUpdateOperation {
            account: AccountName::from("alice"),
            owner: Some(Authority::from_key(new_key)),
            active: None,
            posting: None,
            memo_key: None,
        });

        AccountUpdateEvaluator.apply(&context(&db, &config), &op).unwrap();

        let updated = db.get::<AccountObject>(alice.id).unwrap();
        assert_eq!(updated.owner, Authority::from_key(new_key));
        assert_eq!(updated.active, alice.active);
        assert_eq!(updated.last_owner_update.secs(), 1_000);
    }
}
