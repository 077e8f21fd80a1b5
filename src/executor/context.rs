use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use uuid::Uuid;

use crate::core::CallArgs;

/// Per-call-site execution state: the captured call arguments, the
/// consumed-row counter and the descriptor of the currently active mapping
/// expression. Exclusively owned by one execution; shared with its row
/// sequence behind an `Arc` so consumers can observe the counter while
/// iterating.
pub struct ExecutionContext {
    id: Uuid,
    args: CallArgs,
    rows_count: AtomicU64,
    mapper_expression: RwLock<Option<String>>,
}

impl ExecutionContext {
    pub fn new(args: CallArgs) -> Self {
        Self {
            id: Uuid::new_v4(),
            args,
            rows_count: AtomicU64::new(0),
            mapper_expression: RwLock::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn args(&self) -> &CallArgs {
        &self.args
    }

    /// Monotonically increasing count of rows consumed so far.
    pub fn rows_count(&self) -> u64 {
        self.rows_count.load(Ordering::SeqCst)
    }

    pub(crate) fn add_row(&self) {
        self.rows_count.fetch_add(1, Ordering::SeqCst);
    }

    /// The mapping expression currently compiled for this execution's
    /// mapper, published as a side effect of compilation so diagnostics can
    /// observe fast/defensive switches.
    pub fn mapper_expression(&self) -> Option<String> {
        self.mapper_expression.read().ok().and_then(|g| g.clone())
    }

    pub fn set_mapper_expression(&self, expression: String) {
        if let Ok(mut guard) = self.mapper_expression.write() {
            *guard = Some(expression);
        }
    }
}
