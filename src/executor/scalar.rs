use crate::core::{Result, Value};
use crate::executor::ExecutionContext;
use crate::plan::FinalizedPlan;
use crate::source::DataSource;

/// Executes a query whose result is the data source's native single scalar
/// value, bypassing row mapping entirely.
pub struct ScalarExecutor;

impl ScalarExecutor {
    pub fn execute_scalar(
        plan: &FinalizedPlan,
        ctx: &ExecutionContext,
        source: &dyn DataSource,
        statement: usize,
    ) -> Result<Value> {
        plan.statement(statement)?;
        source.execute_scalar(plan, statement, ctx)
    }
}
