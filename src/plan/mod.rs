pub mod finalize;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{CallArgs, Result, Value};

pub use finalize::{FetchBinding, FinalizedPlan, PlanFinalizer};

/// Identifier the planner assigns to a bound parameter; the select clause
/// references parameters by it.
pub type ParamId = usize;

/// Accessor deriving a parameter's runtime value from the call-site
/// arguments on every invocation of the compiled query.
pub type ParamAccessor = Arc<dyn Fn(&CallArgs) -> Result<Value> + Send + Sync>;

/// Planner-side source expression of a bound parameter. Only needed until
/// finalization; the finalizer drops it so compiled plans do not retain
/// planner closures.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamExpr {
    /// References the call-site argument at the given position.
    Arg(usize),
    /// Inlined constant.
    Value(Value),
}

/// A parameter owned by one statement: its id, optional source expression
/// and the accessor resolving its value per invocation.
#[derive(Clone)]
pub struct BoundParameter {
    pub id: ParamId,
    pub expr: Option<ParamExpr>,
    pub accessor: ParamAccessor,
}

impl BoundParameter {
    pub fn new(id: ParamId, expr: ParamExpr) -> Self {
        let accessor: ParamAccessor = match &expr {
            ParamExpr::Arg(position) => {
                let position = *position;
                Arc::new(move |args: &CallArgs| {
                    args.get(position).cloned().ok_or_else(|| {
                        crate::core::DbError::Plan(format!(
                            "call argument {} not supplied",
                            position
                        ))
                    })
                })
            }
            ParamExpr::Value(value) => {
                let value = value.clone();
                Arc::new(move |_| Ok(value.clone()))
            }
        };
        Self {
            id,
            expr: Some(expr),
            accessor,
        }
    }

    pub fn resolve(&self, args: &CallArgs) -> Result<Value> {
        (self.accessor)(args)
    }
}

impl fmt::Debug for BoundParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundParameter")
            .field("id", &self.id)
            .field("expr", &self.expr)
            .finish()
    }
}

/// Skip/limit marker in a select clause: either a literal row count or a
/// reference to a bound parameter resolved at invocation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchValue {
    Literal(i64),
    Param(ParamId),
}

/// Normalized select clause as produced by the planner and rewritten by the
/// dialect optimizer. The text is opaque to this core; only the parameter
/// order and the skip/take markers matter here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectClause {
    pub text: String,
    pub parameter_order: Vec<ParamId>,
    pub skip: Option<FetchValue>,
    pub take: Option<FetchValue>,
}

impl SelectClause {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameter_order: Vec::new(),
            skip: None,
            take: None,
        }
    }

    pub fn parameters(mut self, order: Vec<ParamId>) -> Self {
        self.parameter_order = order;
        self
    }

    pub fn skip(mut self, value: FetchValue) -> Self {
        self.skip = Some(value);
        self
    }

    pub fn take(mut self, value: FetchValue) -> Self {
        self.take = Some(value);
        self
    }
}

/// One per-data-source statement: a select clause plus its ordered bound
/// parameters.
#[derive(Debug, Clone)]
pub struct PlanStatement {
    pub select: SelectClause,
    pub parameters: Vec<BoundParameter>,
}

impl PlanStatement {
    pub fn new(select: SelectClause, parameters: Vec<BoundParameter>) -> Self {
        Self { select, parameters }
    }

    /// Index of a parameter within this statement's ordered list.
    pub fn parameter_index(&self, id: ParamId) -> Result<usize> {
        self.parameters
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| {
                crate::core::DbError::Plan(format!("parameter {} not bound to statement", id))
            })
    }
}

/// Planner output: one or more statements. Built once, finalized once per
/// first execution, immutable afterwards.
#[derive(Debug, Clone)]
pub struct CompiledPlan {
    pub statements: Vec<PlanStatement>,
}

impl CompiledPlan {
    pub fn new(statements: Vec<PlanStatement>) -> Self {
        Self { statements }
    }

    pub fn single(statement: PlanStatement) -> Self {
        Self {
            statements: vec![statement],
        }
    }
}

/// Dialect-specific select-clause rewriting, opaque to this core.
pub trait PlanOptimizer: Send + Sync {
    fn finalize(&self, select: SelectClause) -> SelectClause;
}

/// Optimizer for dialects that need no rewriting.
pub struct PassThroughOptimizer;

impl PlanOptimizer for PassThroughOptimizer {
    fn finalize(&self, select: SelectClause) -> SelectClause {
        select
    }
}
