use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{DataType, DbError, Result, TargetType, Value};
use crate::executor::ExecutionContext;
use crate::plan::FinalizedPlan;
use crate::source::{Cursor, DataSource, ReadStep, SourceCapabilities};

#[derive(Debug, Clone)]
struct MemoryColumn {
    name: String,
    declared: DataType,
    nullable: bool,
}

/// In-memory tabular source used by tests and demos.
///
/// Cell values are scripted per row, so a column can present different
/// runtime representations across rows, which is exactly what exercises
/// the mapper's defensive path. The source also counts rows read and open
/// cursors so resource-release and over-fetch behavior are observable.
pub struct MemorySource {
    columns: Arc<Vec<MemoryColumn>>,
    rows: Arc<Vec<Vec<Value>>>,
    capabilities: SourceCapabilities,
    readers: HashMap<(DataType, TargetType), ReadStep>,
    rows_read: Arc<AtomicU64>,
    open_cursors: Arc<AtomicI64>,
}

impl MemorySource {
    pub fn builder() -> MemorySourceBuilder {
        MemorySourceBuilder::new()
    }

    /// Rows actually pulled from cursors of this source, across all
    /// executions.
    pub fn rows_read(&self) -> u64 {
        self.rows_read.load(Ordering::SeqCst)
    }

    /// Currently open (not yet released) cursors.
    pub fn open_cursors(&self) -> i64 {
        self.open_cursors.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for MemorySource {
    fn open_cursor(
        &self,
        _plan: &FinalizedPlan,
        statement: usize,
        _ctx: &ExecutionContext,
    ) -> Result<Box<dyn Cursor>> {
        if statement != 0 {
            return Err(DbError::Resource(format!(
                "memory source has no statement {}",
                statement
            )));
        }
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCursor {
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            position: None,
            closed: false,
            rows_read: self.rows_read.clone(),
            open_cursors: self.open_cursors.clone(),
        }))
    }

    fn execute_scalar(
        &self,
        _plan: &FinalizedPlan,
        _statement: usize,
        _ctx: &ExecutionContext,
    ) -> Result<Value> {
        Ok(self
            .rows
            .first()
            .and_then(|row| row.first())
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    fn reader_step(&self, source: DataType, target: &TargetType) -> Option<ReadStep> {
        self.readers.get(&(source, target.clone())).cloned()
    }
}

pub struct MemorySourceBuilder {
    columns: Vec<MemoryColumn>,
    rows: Vec<Vec<Value>>,
    capabilities: SourceCapabilities,
    readers: HashMap<(DataType, TargetType), ReadStep>,
}

impl MemorySourceBuilder {
    fn new() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            capabilities: SourceCapabilities {
                supports_native_skip: false,
                supports_native_limit: false,
            },
            readers: HashMap::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>, declared: DataType) -> Self {
        self.columns.push(MemoryColumn {
            name: name.into(),
            declared,
            nullable: false,
        });
        self
    }

    pub fn nullable_column(mut self, name: impl Into<String>, declared: DataType) -> Self {
        self.columns.push(MemoryColumn {
            name: name.into(),
            declared,
            nullable: true,
        });
        self
    }

    pub fn row(mut self, cells: Vec<Value>) -> Self {
        self.rows.push(cells);
        self
    }

    pub fn capabilities(mut self, capabilities: SourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Register a specialized reader for a conversion pair.
    pub fn reader_step(mut self, source: DataType, target: TargetType, step: ReadStep) -> Self {
        self.readers.insert((source, target), step);
        self
    }

    pub fn build(self) -> MemorySource {
        MemorySource {
            columns: Arc::new(self.columns),
            rows: Arc::new(self.rows),
            capabilities: self.capabilities,
            readers: self.readers,
            rows_read: Arc::new(AtomicU64::new(0)),
            open_cursors: Arc::new(AtomicI64::new(0)),
        }
    }
}

struct MemoryCursor {
    columns: Arc<Vec<MemoryColumn>>,
    rows: Arc<Vec<Vec<Value>>>,
    position: Option<usize>,
    closed: bool,
    rows_read: Arc<AtomicU64>,
    open_cursors: Arc<AtomicI64>,
}

impl MemoryCursor {
    fn current_row(&self) -> Result<&Vec<Value>> {
        if self.closed {
            return Err(DbError::Resource("cursor is closed".into()));
        }
        self.position
            .and_then(|p| self.rows.get(p))
            .ok_or_else(|| DbError::Resource("cursor has no current row".into()))
    }

    fn cell(&self, column: usize) -> Result<&Value> {
        self.current_row()?
            .get(column)
            .ok_or_else(|| DbError::Resource(format!("column {} out of range", column)))
    }
}

#[async_trait]
impl Cursor for MemoryCursor {
    fn read_row(&mut self) -> Result<bool> {
        if self.closed {
            return Err(DbError::Resource("cursor is closed".into()));
        }
        let next = self.position.map(|p| p + 1).unwrap_or(0);
        if next < self.rows.len() {
            self.position = Some(next);
            self.rows_read.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        } else {
            self.position = Some(next);
            Ok(false)
        }
    }

    async fn read_row_async(&mut self) -> Result<bool> {
        self.read_row()
    }

    fn is_null(&self, column: usize) -> Result<bool> {
        Ok(self.cell(column)?.is_null())
    }

    fn source_type(&self, column: usize) -> Result<DataType> {
        let declared = self
            .columns
            .get(column)
            .map(|c| c.declared)
            .ok_or_else(|| DbError::Resource(format!("column {} out of range", column)))?;
        Ok(self.cell(column)?.data_type().unwrap_or(declared))
    }

    fn null_allowed(&self, column: usize) -> Option<bool> {
        self.columns.get(column).map(|c| c.nullable)
    }

    fn column_name(&self, column: usize) -> String {
        self.columns
            .get(column)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("column_{}", column))
    }

    fn get_value(&self, column: usize) -> Result<Value> {
        Ok(self.cell(column)?.clone())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open_cursors.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.close();
    }
}
