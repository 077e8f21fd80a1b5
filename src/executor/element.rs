use crate::core::{DbError, Result};
use crate::executor::{CancellationToken, ExecutionContext};
use crate::mapper::RowMapper;
use crate::plan::FinalizedPlan;
use crate::source::DataSource;

/// Executes a query expected to produce at most one value: the first row's
/// mapped value, or `None` as the defined empty sentinel. Reads at most one
/// row from the cursor.
pub struct ElementExecutor;

impl ElementExecutor {
    pub fn execute_element<T>(
        plan: &FinalizedPlan,
        ctx: &ExecutionContext,
        source: &dyn DataSource,
        mapper: &RowMapper<T>,
        statement: usize,
    ) -> Result<Option<T>> {
        plan.statement(statement)?;
        let mut cursor = source.open_cursor(plan, statement, ctx)?;

        let result = match cursor.read_row() {
            Ok(true) => mapper.map(ctx, source, &*cursor).map(|value| {
                ctx.add_row();
                Some(value)
            }),
            Ok(false) => Ok(None),
            Err(err) => Err(err),
        };

        cursor.close();
        result
    }

    pub async fn execute_element_async<T>(
        plan: &FinalizedPlan,
        ctx: &ExecutionContext,
        source: &dyn DataSource,
        mapper: &RowMapper<T>,
        statement: usize,
        token: CancellationToken,
    ) -> Result<Option<T>> {
        plan.statement(statement)?;
        let mut cursor = source.open_cursor_async(plan, statement, ctx).await?;

        let result = if token.is_cancelled() {
            Err(DbError::Cancelled)
        } else {
            match cursor.read_row_async().await {
                Ok(true) => mapper.map(ctx, source, &*cursor).map(|value| {
                    ctx.add_row();
                    Some(value)
                }),
                Ok(false) => Ok(None),
                Err(err) => Err(err),
            }
        };

        cursor.close();
        result
    }
}
