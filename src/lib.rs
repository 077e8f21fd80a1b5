// ============================================================================
// rowlink - query execution and row materialization core
// ============================================================================

//! Runtime execution pipeline of a database-access library: takes an
//! already-planned query, executes it against a tabular data source,
//! streams result rows and materializes each row into strongly-typed
//! values through per-column conversion logic synthesized lazily and
//! cached per observed source type.
//!
//! The planner, SQL generation, connection handling and the driver itself
//! are collaborators behind the [`plan::PlanOptimizer`] and
//! [`source::DataSource`] seams; this crate owns finalization, skip/take
//! emulation, fault-adaptive row mapping and the sync/async execution
//! protocols.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use rowlink::{
//!     ColumnMapping, CompiledPlan, DataType, ExecutionContext, PassThroughOptimizer,
//!     PlanFinalizer, PlanStatement, QueryExecutor, RowMapper, RowMapping, SelectClause,
//!     Value,
//! };
//! use rowlink::source::{DataSource, MemorySource};
//!
//! # fn main() -> rowlink::Result<()> {
//! let source = Arc::new(
//!     MemorySource::builder()
//!         .column("id", DataType::Integer)
//!         .column("name", DataType::Text)
//!         .row(vec![Value::Integer(1), Value::Text("Alice".into())])
//!         .row(vec![Value::Integer(2), Value::Text("Bob".into())])
//!         .build(),
//! );
//!
//! let plan = Arc::new(PlanFinalizer::finalize(
//!     CompiledPlan::single(PlanStatement::new(
//!         SelectClause::new("SELECT id, name FROM users"),
//!         vec![],
//!     )),
//!     source.capabilities(),
//!     &PassThroughOptimizer,
//! )?);
//!
//! let mapper = Arc::new(RowMapper::with_default_registry(
//!     RowMapping::new(vec![
//!         ColumnMapping::new(0, DataType::Integer),
//!         ColumnMapping::new(1, DataType::Text),
//!     ]),
//!     |values| {
//!         Ok((
//!             values[0].as_i64().unwrap_or_default(),
//!             values[1].to_string(),
//!         ))
//!     },
//! ));
//!
//! let ctx = Arc::new(ExecutionContext::new(vec![]));
//! let rows: Vec<(i64, String)> =
//!     QueryExecutor::execute_rows(plan, ctx.clone(), source, mapper, 0)?
//!         .collect::<rowlink::Result<_>>()?;
//!
//! assert_eq!(rows.len(), 2);
//! assert_eq!(ctx.rows_count(), 2);
//! # Ok(())
//! # }
//! ```

pub mod convert;
pub mod core;
pub mod executor;
pub mod mapper;
pub mod plan;
pub mod source;

// Re-export main types for convenience
pub use convert::{ConversionRegistry, ConversionRule, EnumMapping};
pub use crate::core::{CallArgs, DataType, DbError, Result, TargetType, Value};
pub use executor::{
    CancellationToken, ElementExecutor, ExecutionContext, QueryExecutor, RowSequence,
    ScalarExecutor,
};
pub use mapper::{ColumnMapping, RowMapper, RowMapping};
pub use plan::{
    BoundParameter, CompiledPlan, FetchValue, FinalizedPlan, ParamExpr, PassThroughOptimizer,
    PlanFinalizer, PlanOptimizer, PlanStatement, SelectClause,
};
pub use source::SourceCapabilities;
