use crate::chain::objects::ProducerObject;
use crate::evaluator::{unexpected, EvaluationContext, Evaluator, OperationResult};
use crate::types::Operation;

pub struct ProducerUpdateEvaluator;

impl Evaluator for ProducerUpdateEvaluator {
    fn apply(&self, ctx: &EvaluationContext<'_>, op: &Operation) -> anyhow::Result<OperationResult> {
        let Operation::ProducerUpdate(op) = op else {
            return Err(unexpected("ProducerUpdateEvaluator", op));
        };
        ctx.get_account(&op.owner)?;

        match ctx.db.find_by_key::<ProducerObject>(op.owner.as_bytes()) {
            Some(producer) => {
                ctx.db.modify(&producer, |producer| {
                    producer.url = op.url.clone();
                    producer.signing_key = op.signing_key;
                })?;
                Ok(OperationResult::Void)
            }
            None => {
                let producer = ctx.db.create(|id| ProducerObject {
                    id,
                    owner: op.owner.clone(),
                    signing_key: op.signing_key,
                    url: op.url.clone(),
                    created: ctx.head_block_time,
                    total_missed: 0,
                    last_aslot: 0,
                    last_confirmed_block_num: 0,
                })?;
                log::debug!("Producer {} registered", producer.owner);
                Ok(OperationResult::ObjectCreated(producer.id))
            }
        }
    }
}
