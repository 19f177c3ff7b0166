use crate::evaluator::{unexpected, EvaluationContext, Evaluator, OperationResult};
use crate::types::Operation;

/// Custom operations carry application data only; plugins read them through observers.
pub struct CustomJsonEvaluator;

impl Evaluator for CustomJsonEvaluator {
    fn apply(&self, ctx: &EvaluationContext<'_>, op: &Operation) -> anyhow::Result<OperationResult> {
        let Operation::CustomJson(op) = op else {
            return Err(unexpected("CustomJsonEvaluator", op));
        };
        for account in op.required_auths.iter().chain(&op.required_posting_auths) {
            ctx.get_account(account)?;
        }
        log::trace!("custom_json '{}' in block {}", op.id, ctx.block_num);
        Ok(OperationResult::Void)
    }
}
