use std::sync::Arc;

use crate::core::{DbError, Result};
use crate::executor::{CancellationToken, ExecutionContext};
use crate::mapper::RowMapper;
use crate::plan::FinalizedPlan;
use crate::source::{Cursor, DataSource};

/// Drives row-sequence execution over a finalized plan.
///
/// Both protocols share the mapper and the emulated skip/take stage; the
/// sync path hands back a lazy pull iterator, the async path pushes rows
/// into a caller-supplied handler.
pub struct QueryExecutor;

impl QueryExecutor {
    /// Open a cursor for the statement and return the forward-only,
    /// single-pass sequence of mapped rows. Emulated skip/take bindings
    /// are resolved against the call site here, once per invocation.
    pub fn execute_rows<T>(
        plan: Arc<FinalizedPlan>,
        ctx: Arc<ExecutionContext>,
        source: Arc<dyn DataSource>,
        mapper: Arc<RowMapper<T>>,
        statement: usize,
    ) -> Result<RowSequence<T>> {
        let stmt = plan.statement(statement)?;
        let to_skip = match &plan.skip {
            Some(binding) => binding.resolve(stmt, ctx.args())?,
            None => 0,
        };
        let remaining = match &plan.take {
            Some(binding) => Some(binding.resolve(stmt, ctx.args())?),
            None => None,
        };

        let cursor = source.open_cursor(&plan, statement, &ctx)?;
        log::debug!(
            "execution {} opened cursor for statement {}",
            ctx.id(),
            statement
        );

        Ok(RowSequence {
            ctx,
            source,
            mapper,
            cursor: Some(cursor),
            to_skip,
            remaining,
        })
    }

    /// Push each mapped row into `on_row` until exhaustion, an early stop
    /// (`on_row` returning false) or cancellation. The cursor is released
    /// on every exit path; cancellation wins over pending deliveries and
    /// surfaces as `DbError::Cancelled`.
    pub async fn execute_rows_async<T, F>(
        plan: Arc<FinalizedPlan>,
        ctx: Arc<ExecutionContext>,
        source: Arc<dyn DataSource>,
        mapper: Arc<RowMapper<T>>,
        statement: usize,
        mut on_row: F,
        token: CancellationToken,
    ) -> Result<()>
    where
        F: FnMut(T) -> bool + Send,
    {
        let stmt = plan.statement(statement)?;
        let to_skip = match &plan.skip {
            Some(binding) => binding.resolve(stmt, ctx.args())?,
            None => 0,
        };
        let take = match &plan.take {
            Some(binding) => Some(binding.resolve(stmt, ctx.args())?),
            None => None,
        };

        let mut cursor = source.open_cursor_async(&plan, statement, &ctx).await?;
        let result = Self::push_rows(
            &ctx,
            source.as_ref(),
            mapper.as_ref(),
            cursor.as_mut(),
            to_skip,
            take,
            &mut on_row,
            &token,
        )
        .await;
        cursor.close();
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn push_rows<T, F>(
        ctx: &ExecutionContext,
        source: &dyn DataSource,
        mapper: &RowMapper<T>,
        cursor: &mut dyn Cursor,
        to_skip: u64,
        take: Option<u64>,
        on_row: &mut F,
        token: &CancellationToken,
    ) -> Result<()>
    where
        F: FnMut(T) -> bool + Send,
    {
        let mut skipped = 0u64;
        let mut delivered = 0u64;

        loop {
            // Suspension point between rows; keeps a fully synchronous
            // cursor from starving the executor.
            tokio::task::yield_now().await;

            if token.is_cancelled() {
                return Err(DbError::Cancelled);
            }
            if let Some(limit) = take {
                if delivered >= limit {
                    return Ok(());
                }
            }
            if !cursor.read_row_async().await? {
                return Ok(());
            }
            if skipped < to_skip {
                skipped += 1;
                continue;
            }

            let item = mapper.map(ctx, source, &*cursor)?;
            ctx.add_row();

            // A token signalled while the row was being fetched or mapped
            // still prevents its delivery.
            if token.is_cancelled() {
                return Err(DbError::Cancelled);
            }
            if !on_row(item) {
                return Ok(());
            }
            delivered += 1;
        }
    }
}

/// Forward-only, single-pass sequence of mapped rows. Restartable only via
/// a fresh execution. The cursor is released exactly once, on exhaustion,
/// on the first error, or on drop.
pub struct RowSequence<T> {
    ctx: Arc<ExecutionContext>,
    source: Arc<dyn DataSource>,
    mapper: Arc<RowMapper<T>>,
    cursor: Option<Box<dyn Cursor>>,
    to_skip: u64,
    remaining: Option<u64>,
}

impl<T> std::fmt::Debug for RowSequence<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowSequence")
            .field("to_skip", &self.to_skip)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

impl<T> RowSequence<T> {
    /// The execution context backing this sequence; its row counter is
    /// observable while iterating.
    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.ctx
    }

    fn finish(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }
}

impl<T> Iterator for RowSequence<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.as_ref()?;

        // Emulated limit: the limiting stage is outermost, so a satisfied
        // limit stops upstream consumption before any further read, skip
        // reads included.
        if self.remaining == Some(0) {
            self.finish();
            return None;
        }

        // Emulated skip: discard leading rows without mapping them.
        while self.to_skip > 0 {
            match self.cursor.as_mut()?.read_row() {
                Ok(true) => self.to_skip -= 1,
                Ok(false) => {
                    self.finish();
                    return None;
                }
                Err(err) => {
                    self.finish();
                    return Some(Err(err));
                }
            }
        }

        match self.cursor.as_mut()?.read_row() {
            Ok(true) => {}
            Ok(false) => {
                self.finish();
                return None;
            }
            Err(err) => {
                self.finish();
                return Some(Err(err));
            }
        }

        let mapped = {
            let cursor = self.cursor.as_deref()?;
            self.mapper.map(&self.ctx, self.source.as_ref(), cursor)
        };
        match mapped {
            Ok(item) => {
                self.ctx.add_row();
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                Some(Ok(item))
            }
            Err(err) => {
                self.finish();
                Some(Err(err))
            }
        }
    }
}

impl<T> Drop for RowSequence<T> {
    fn drop(&mut self) {
        self.finish();
    }
}
