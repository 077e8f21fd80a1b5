use crate::core::{CallArgs, DbError, Result, Value};
use crate::plan::{CompiledPlan, FetchValue, PlanOptimizer, PlanStatement};
use crate::source::SourceCapabilities;

/// Emulated skip/take binding computed at finalization time.
///
/// A literal produces a constant; a parameter reference re-resolves its
/// accessor against the call site on every invocation, so repeated
/// executions of one compiled query may use different windows.
#[derive(Debug, Clone)]
pub enum FetchBinding {
    Constant(u64),
    Param { index: usize },
}

impl FetchBinding {
    pub fn resolve(&self, statement: &PlanStatement, args: &CallArgs) -> Result<u64> {
        match self {
            Self::Constant(n) => Ok(*n),
            Self::Param { index } => {
                let value = statement.parameters[*index].resolve(args)?;
                match value {
                    // Negative resolutions clamp to zero: a skip of zero
                    // skips nothing, a take of zero delivers nothing.
                    Value::Integer(n) => Ok(n.max(0) as u64),
                    other => Err(DbError::Plan(format!(
                        "skip/take parameter resolved to {}, expected an integer",
                        other.type_name()
                    ))),
                }
            }
        }
    }
}

/// A finalized plan: optimizer-rewritten statements with stabilized
/// parameter order, dropped parameter source expressions, and skip/take
/// emulation bindings for sources without native support.
#[derive(Debug)]
pub struct FinalizedPlan {
    pub statements: Vec<PlanStatement>,
    pub skip: Option<FetchBinding>,
    pub take: Option<FetchBinding>,
}

impl FinalizedPlan {
    pub fn statement(&self, index: usize) -> Result<&PlanStatement> {
        self.statements
            .get(index)
            .ok_or_else(|| DbError::Plan(format!("statement {} out of range", index)))
    }
}

pub struct PlanFinalizer;

impl PlanFinalizer {
    /// Normalize a plan for row-sequence/element/scalar execution.
    ///
    /// Per statement: rewrite the select clause through the dialect
    /// optimizer, re-derive the parameter ordering to match the optimized
    /// clause (stable sort by position index), then drop parameter source
    /// expressions. Fails if the plan is not single-statement afterwards.
    pub fn finalize(
        mut plan: CompiledPlan,
        capabilities: SourceCapabilities,
        optimizer: &dyn PlanOptimizer,
    ) -> Result<FinalizedPlan> {
        for statement in &mut plan.statements {
            statement.select = optimizer.finalize(statement.select.clone());

            let order = &statement.select.parameter_order;
            statement
                .parameters
                .sort_by_key(|p| position_of(order, p.id));
        }

        if plan.statements.len() != 1 {
            return Err(DbError::Plan(format!(
                "row execution expects a single-statement plan, got {}",
                plan.statements.len()
            )));
        }

        let skip = Self::bind_fetch(
            &plan.statements[0],
            plan.statements[0].select.skip,
            capabilities.supports_native_skip,
        )?;
        let take = Self::bind_fetch(
            &plan.statements[0],
            plan.statements[0].select.take,
            capabilities.supports_native_limit,
        )?;

        Self::clear_parameters(&mut plan);

        Ok(FinalizedPlan {
            statements: plan.statements,
            skip,
            take,
        })
    }

    /// Compute the emulation binding for one skip/take marker. No binding
    /// when the source handles the clause natively, or for a literal <= 0.
    fn bind_fetch(
        statement: &PlanStatement,
        value: Option<FetchValue>,
        native_support: bool,
    ) -> Result<Option<FetchBinding>> {
        if native_support {
            return Ok(None);
        }
        match value {
            None => Ok(None),
            Some(FetchValue::Literal(n)) if n > 0 => Ok(Some(FetchBinding::Constant(n as u64))),
            Some(FetchValue::Literal(_)) => Ok(None),
            Some(FetchValue::Param(id)) => {
                let index = statement.parameter_index(id)?;
                Ok(Some(FetchBinding::Param { index }))
            }
        }
    }

    /// Drop parameter source expressions so the compiled plan does not
    /// retain planner closures.
    fn clear_parameters(plan: &mut CompiledPlan) {
        for statement in &mut plan.statements {
            for parameter in &mut statement.parameters {
                parameter.expr = None;
            }
        }
    }
}

/// Parameters absent from the optimized clause keep their relative order at
/// the end.
fn position_of(order: &[usize], id: usize) -> usize {
    order.iter().position(|p| *p == id).unwrap_or(usize::MAX)
}
