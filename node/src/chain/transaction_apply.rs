use crate::chain::authority::{verify_authority, AccountAuthorities};
use crate::chain::context::ApplyContext;
use crate::chain::error::{ChainError, Result};
use crate::chain::objects::{AccountObject, BlockSummaryObject, TransactionObject};
use crate::chain::observer::{OperationNotification, TransactionNotification};
use crate::chain::Ledger;
use crate::evaluator::{EvaluationContext, OperationResult};
use crate::types::{Operation, SignedTransaction};

impl Ledger {
    /// Applies one transaction on the current state. The caller owns the enclosing session.
    pub(crate) fn apply_transaction(
        &mut self,
        trx: &SignedTransaction,
        ctx: &mut ApplyContext,
    ) -> Result<Vec<OperationResult>> {
        let trx_id = trx.id()?;
        ctx.trx_id = Some(trx_id);
        let steps = ctx.steps;

        trx.transaction.validate()?;

        if steps.transaction_dupe_check && self.is_known_transaction(&trx_id) {
            return Err(ChainError::DuplicateTransaction(trx_id));
        }

        if steps.transaction_signatures || steps.authority {
            let chain_id = self.config.chain_id();
            let keys = self.signature_verifier.signing_keys(
                trx,
                &chain_id,
                steps.transaction_signatures,
                self.config.max_signatures,
            )?;
            if steps.authority {
                let db = &self.db;
                verify_authority(
                    &trx.transaction.required_authorities(),
                    &keys,
                    |name| {
                        db.find_by_key::<AccountObject>(name.as_bytes())
                            .map(|account| AccountAuthorities {
                                owner: account.owner,
                                active: account.active,
                                posting: account.posting,
                            })
                    },
                    self.config.max_authority_depth,
                )?;
            }
        }

        let dgpo = self.global_properties()?;
        if dgpo.head_block_number > 0 {
            let transaction = &trx.transaction;
            if steps.tapos {
                let summary = self
                    .db
                    .find_by_key::<BlockSummaryObject>(&BlockSummaryObject::key(transaction.ref_block_num));
                let on_chain = summary
                    .map_or(false, |summary| summary.block_id.ref_prefix() == transaction.ref_block_prefix);
                if !on_chain {
                    return Err(ChainError::TaposMismatch {
                        ref_block_num: transaction.ref_block_num,
                        ref_block_prefix: transaction.ref_block_prefix,
                    });
                }
            }

            let now = dgpo.time;
            let max = now + self.config.max_time_until_expiration_sec;
            if transaction.expiration > max {
                return Err(ChainError::ExpirationTooFar {
                    expiration: transaction.expiration,
                    max,
                });
            }
            if now >= transaction.expiration {
                return Err(ChainError::TransactionExpired {
                    expiration: transaction.expiration,
                    now,
                });
            }
        }

        if steps.transaction_dupe_check {
            self.db.create(|id| TransactionObject {
                id,
                trx_id,
                expiration: trx.transaction.expiration,
            })?;
        }

        let note = TransactionNotification {
            trx_id,
            block_num: ctx.block_num,
            trx_in_block: ctx.trx_in_block,
            transaction: trx,
        };
        self.observers
            .notify("pre_apply_transaction", |o| o.pre_apply_transaction(&self.db, &note));

        let mut results = Vec::with_capacity(trx.transaction.operations.len());
        for (index, op) in trx.transaction.operations.iter().enumerate() {
            ctx.op_in_trx = index as u32;
            let result = self
                .apply_operation(op, ctx)
                .map_err(|source| ChainError::Operation {
                    index,
                    name: op.name(),
                    source,
                })?;
            results.push(result);
        }
        ctx.op_in_trx = 0;

        self.observers
            .notify("post_apply_transaction", |o| o.post_apply_transaction(&self.db, &note));
        Ok(results)
    }

    /// Runs the registered evaluator of the operation, if there is one.
    pub(crate) fn apply_operation(
        &self,
        op: &Operation,
        ctx: &ApplyContext,
    ) -> anyhow::Result<OperationResult> {
        let note = OperationNotification::new(ctx, op.clone());
        self.observers
            .notify("pre_apply_operation", |o| o.pre_apply_operation(&self.db, &note));

        let result = match self.evaluators.evaluator_for(op) {
            Some(evaluator) => {
                let eval_ctx = EvaluationContext {
                    db: &self.db,
                    config: &self.config,
                    head_block_time: self.head_block_time()?,
                    block_num: ctx.block_num,
                };
                evaluator.apply(&eval_ctx, op)?
            }
            None => {
                log::trace!("No evaluator for {}", op.name());
                OperationResult::default()
            }
        };

        self.observers
            .notify("post_apply_operation", |o| o.post_apply_operation(&self.db, &note));
        Ok(result)
    }
}
