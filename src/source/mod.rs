pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{DataType, Result, TargetType, Value};
use crate::executor::ExecutionContext;
use crate::plan::FinalizedPlan;

pub use memory::{MemorySource, MemorySourceBuilder};

/// What the data source can do natively. Row-skip/row-limit clauses are
/// emulated client-side when the matching flag is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCapabilities {
    pub supports_native_skip: bool,
    pub supports_native_limit: bool,
}

impl Default for SourceCapabilities {
    fn default() -> Self {
        Self {
            supports_native_skip: true,
            supports_native_limit: true,
        }
    }
}

/// Specialized raw-value reader an adapter may supply for a (source type,
/// target type) pair. Shaped as a lambda over the row and the column index;
/// synthesis unwraps it by substituting both parameters.
#[derive(Clone)]
pub struct ReadStep(Arc<dyn Fn(&dyn Cursor, usize) -> Result<Value> + Send + Sync>);

impl ReadStep {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&dyn Cursor, usize) -> Result<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, cursor: &dyn Cursor, index: usize) -> Result<Value> {
        (self.0)(cursor, index)
    }
}

impl fmt::Debug for ReadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReadStep(..)")
    }
}

/// Open, forward-only handle over one query's result rows. Exclusively
/// owned by one execution and released on every exit path.
#[async_trait]
pub trait Cursor: Send {
    /// Advance to the next row. `false` at exhaustion.
    fn read_row(&mut self) -> Result<bool>;

    /// Async twin of `read_row`.
    async fn read_row_async(&mut self) -> Result<bool>;

    /// Null probe for a cell of the current row.
    fn is_null(&self, column: usize) -> Result<bool>;

    /// Observed source type of a cell. Reports the declared column type for
    /// null cells; heterogeneous providers may report different types for
    /// one column across rows.
    fn source_type(&self, column: usize) -> Result<DataType>;

    /// Whether the column may report null at all, when the driver knows.
    fn null_allowed(&self, column: usize) -> Option<bool>;

    fn column_name(&self, column: usize) -> String;

    /// Raw cell value of the current row.
    fn get_value(&self, column: usize) -> Result<Value>;

    /// Release the underlying resources. Idempotent.
    fn close(&mut self);
}

/// Adapter over the underlying tabular driver.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn open_cursor(
        &self,
        plan: &FinalizedPlan,
        statement: usize,
        ctx: &ExecutionContext,
    ) -> Result<Box<dyn Cursor>>;

    async fn open_cursor_async(
        &self,
        plan: &FinalizedPlan,
        statement: usize,
        ctx: &ExecutionContext,
    ) -> Result<Box<dyn Cursor>> {
        self.open_cursor(plan, statement, ctx)
    }

    /// Native single-scalar result, bypassing row mapping entirely.
    fn execute_scalar(
        &self,
        plan: &FinalizedPlan,
        statement: usize,
        ctx: &ExecutionContext,
    ) -> Result<Value>;

    fn capabilities(&self) -> SourceCapabilities;

    /// Specialized raw-value reader for a conversion pair, when the driver
    /// has one. Default: read through `Cursor::get_value`.
    fn reader_step(&self, _source: DataType, _target: &TargetType) -> Option<ReadStep> {
        None
    }
}
