pub mod column;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::convert::{ConversionRegistry, ConverterFn};
use crate::core::{Result, TargetType, Value};
use crate::executor::ExecutionContext;
use crate::source::{Cursor, DataSource};

pub use column::{build_column_step, ColumnReader};

/// One column read of a row mapping: which cell, converted to what, and
/// whether a null cell lifts to `Value::Null` instead of the registry
/// default.
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    pub index: usize,
    pub target: TargetType,
    pub nullable: bool,
}

impl ColumnMapping {
    pub fn new(index: usize, target: impl Into<TargetType>) -> Self {
        Self {
            index,
            target: target.into(),
            nullable: false,
        }
    }

    /// Lift the mapping to its nullable form.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Declarative description of one row's materialization: the ordered column
/// reads feeding the projection.
#[derive(Debug, Clone)]
pub struct RowMapping {
    pub columns: Vec<ColumnMapping>,
}

impl RowMapping {
    pub fn new(columns: Vec<ColumnMapping>) -> Self {
        Self { columns }
    }
}

type Projection<T> = Arc<dyn Fn(&[Value]) -> Result<T> + Send + Sync>;

/// The two mapping strategies behind one interface. Fast freezes each
/// column's converter against the first row's observed shape; defensive
/// rediscovers the shape per row through the per-column converter caches.
enum CompiledMapper {
    Fast {
        converters: Vec<ConverterFn>,
        description: String,
    },
    Defensive {
        readers: Vec<ColumnReader>,
        description: String,
    },
}

impl CompiledMapper {
    fn materialize(&self, source: &dyn DataSource, cursor: &dyn Cursor) -> Result<Vec<Value>> {
        match self {
            Self::Fast { converters, .. } => {
                converters.iter().map(|f| f(cursor)).collect()
            }
            Self::Defensive { readers, .. } => readers
                .iter()
                .map(|r| r.get_value(source, cursor))
                .collect(),
        }
    }

    fn description(&self) -> &str {
        match self {
            Self::Fast { description, .. } | Self::Defensive { description, .. } => description,
        }
    }

    fn is_fast(&self) -> bool {
        matches!(self, Self::Fast { .. })
    }
}

/// Fault-adaptive row materializer, created once per query shape and shared
/// across executions and rows.
///
/// First use compiles the fast path by binding every column read to the
/// current row's observed cell types. A format/cast error from the fast
/// path triggers one recompilation into the defensive path and a retry of
/// the same row; a second fault of that class is fatal. The compiled slot
/// and the fault flag follow a first-writer-wins discipline: concurrent
/// first compiles are equivalent and the last assignment wins.
pub struct RowMapper<T> {
    mapping: RowMapping,
    registry: Arc<ConversionRegistry>,
    project: Projection<T>,
    compiled: RwLock<Option<Arc<CompiledMapper>>>,
    faulted: AtomicBool,
}

impl<T> RowMapper<T> {
    pub fn new<F>(mapping: RowMapping, registry: Arc<ConversionRegistry>, project: F) -> Self
    where
        F: Fn(&[Value]) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            mapping,
            registry,
            project: Arc::new(project),
            compiled: RwLock::new(None),
            faulted: AtomicBool::new(false),
        }
    }

    /// Mapper against the process-wide conversion registry.
    pub fn with_default_registry<F>(mapping: RowMapping, project: F) -> Self
    where
        F: Fn(&[Value]) -> Result<T> + Send + Sync + 'static,
    {
        Self::new(mapping, ConversionRegistry::shared(), project)
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::SeqCst)
    }

    /// Whether the active compiled path is the fast one.
    pub fn is_fast(&self) -> bool {
        self.compiled
            .read()
            .ok()
            .and_then(|g| g.as_ref().map(|c| c.is_fast()))
            .unwrap_or(false)
    }

    /// Materialize the cursor's current row.
    pub fn map(
        &self,
        ctx: &ExecutionContext,
        source: &dyn DataSource,
        cursor: &dyn Cursor,
    ) -> Result<T> {
        let compiled = self.ensure_compiled(ctx, source, cursor)?;

        match compiled
            .materialize(source, cursor)
            .and_then(|values| (self.project)(&values))
        {
            Ok(mapped) => Ok(mapped),
            Err(err) if err.is_mapping_fault() && !self.faulted.swap(true, Ordering::SeqCst) => {
                log::warn!(
                    "row mapper switched to defensive mode, mapping error: {}",
                    err
                );
                let defensive = Arc::new(self.compile_defensive());
                ctx.set_mapper_expression(defensive.description().to_string());
                *self.compiled.write()? = Some(defensive.clone());
                // Retry the same row on the defensive path.
                defensive
                    .materialize(source, cursor)
                    .and_then(|values| (self.project)(&values))
            }
            Err(err) => Err(err),
        }
    }

    fn ensure_compiled(
        &self,
        ctx: &ExecutionContext,
        source: &dyn DataSource,
        cursor: &dyn Cursor,
    ) -> Result<Arc<CompiledMapper>> {
        if let Some(compiled) = self.compiled.read()?.clone() {
            return Ok(compiled);
        }

        let compiled = if self.faulted.load(Ordering::SeqCst) {
            Arc::new(self.compile_defensive())
        } else {
            Arc::new(self.compile_fast(source, cursor)?)
        };
        ctx.set_mapper_expression(compiled.description().to_string());

        *self.compiled.write()? = Some(compiled.clone());
        Ok(compiled)
    }

    /// Bind every column read against the current row's observed cell
    /// types and lower the resulting expressions to closures.
    fn compile_fast(&self, source: &dyn DataSource, cursor: &dyn Cursor) -> Result<CompiledMapper> {
        let mut converters = Vec::with_capacity(self.mapping.columns.len());
        let mut parts = Vec::with_capacity(self.mapping.columns.len());

        for column in &self.mapping.columns {
            let observed = cursor.source_type(column.index)?;
            let step = build_column_step(source, &self.registry, cursor, column, observed)?;
            parts.push(step.describe());
            converters.push(step.compile());
        }

        Ok(CompiledMapper::Fast {
            converters,
            description: format!("fast[{}]", parts.join("; ")),
        })
    }

    fn compile_defensive(&self) -> CompiledMapper {
        let readers: Vec<ColumnReader> = self
            .mapping
            .columns
            .iter()
            .map(|column| ColumnReader::new(column.clone(), self.registry.clone()))
            .collect();
        let parts: Vec<String> = readers.iter().map(|r| r.describe()).collect();

        CompiledMapper::Defensive {
            description: format!("defensive[{}]", parts.join("; ")),
            readers,
        }
    }
}

impl RowMapper<Vec<Value>> {
    /// Mapper materializing rows as plain value vectors.
    pub fn values(mapping: RowMapping) -> Self {
        Self::with_default_registry(mapping, |values| Ok(values.to_vec()))
    }
}
