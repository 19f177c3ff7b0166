use crate::evaluator::{unexpected, EvaluationContext, Evaluator, OperationResult};
use crate::types::Operation;

pub struct TransferEvaluator;

impl Evaluator for TransferEvaluator {
    fn apply(&self, ctx: &EvaluationContext<'_>, op: &Operation) -> anyhow::Result<OperationResult> {
        let Operation::Transfer(op) = op else {
            return Err(unexpected("TransferEvaluator", op));
        };

        let from = ctx.get_account(&op.from)?;
        let to = ctx.get_account(&op.to)?;
        if from.balance < op.amount {
            anyhow::bail!(
                "Insufficient balance: {} has {}, transfer of {}",
                from.name,
                from.balance,
                op.amount
            );
        }

        ctx.db.modify(&from, |from| from.balance -= op.amount)?;
        // re-read, `to` may be the same account
        let to = ctx.get_account(&to.name)?;
        ctx.db.modify(&to, |to| to.balance += op.amount)?;
        Ok(OperationResult::Void)
    }
}

#[cfg(test)]
mod test {
    use crate::chain::objects::AccountObject;
    use crate::config::ChainConfiguration;
    use crate::evaluator::test::{account, context};
    use crate::state::Database;
    use crate::types::TransferOperation;

    use super::*;

    fn transfer(from: &str, to: &str, amount: u64) -> Operation {
        Operation::Transfer(TransferOperation {
            from: from.into(),
            to: to.into(),
            amount,
            memo: String::new(),
        })
    }

    #[test]
    fn moves_balance() {
        let db = Database::new();
        let config = ChainConfiguration::default();
        account(&db, "alice", 50);
        account(&db, "bob", 0);
        let ctx = context(&db, &config);

        TransferEvaluator.apply(&ctx, &transfer("alice", "bob", 20)).unwrap();
        assert_eq!(db.get_by_key::<AccountObject>(b"alice").unwrap().balance, 30);
        assert_eq!(db.get_by_key::<AccountObject>(b"bob").unwrap().balance, 20);

        assert!(TransferEvaluator.apply(&ctx, &transfer("alice", "bob", 31)).is_err());
        assert!(TransferEvaluator.apply(&ctx, &transfer("alice", "carol", 1)).is_err());
    }

    #[test]
    fn self_transfer_keeps_balance() {
        let db = Database::new();
        let config = ChainConfiguration::default();
        account(&db, "alice", 50);

        TransferEvaluator
            .apply(&context(&db, &config), &transfer("alice", "alice", 50))
            .unwrap();
        assert_eq!(db.get_by_key::<AccountObject>(b"alice").unwrap().balance, 50);
    }
}
