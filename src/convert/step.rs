use std::sync::Arc;

use crate::convert::{ConversionRule, EnumMapping};
use crate::core::{Result, Value};
use crate::source::{Cursor, ReadStep};

/// Compiled column converter: one closure per (column, observed source
/// type) pair, evaluated against the cursor's current row.
pub type ConverterFn = Arc<dyn Fn(&dyn Cursor) -> Result<Value> + Send + Sync>;

/// Declarative conversion expression for one column.
///
/// Synthesis builds one of these per observed source type and lowers it to
/// a `ConverterFn`. Keeping the tree explicit (instead of composing
/// closures directly) lets diagnostics print the active expression and
/// keeps the single-evaluation guarantee of `Bind` visible.
pub enum ConvertStep {
    /// Raw cell read through the cursor.
    Read { index: usize },
    /// Specialized reader supplied by the data-source adapter. The adapter
    /// hands back a lambda over (row, column index); it is unwrapped here
    /// by substituting both parameters at evaluation time.
    ReadWith { index: usize, reader: ReadStep },
    /// Apply a single-use conversion rule to the inner step's result.
    Apply {
        rule: Arc<ConversionRule>,
        input: Box<ConvertStep>,
    },
    /// Evaluate the inner step once into a local, then apply a rule whose
    /// body consults its input parameter more than once.
    Bind {
        rule: Arc<ConversionRule>,
        input: Box<ConvertStep>,
    },
    /// Translate an underlying value into its enum variant.
    EnumMap {
        mapping: Arc<EnumMapping>,
        input: Box<ConvertStep>,
    },
    /// Null probe: a null cell yields the precomputed default and the inner
    /// step is never evaluated.
    NullCheck {
        index: usize,
        default: Value,
        input: Box<ConvertStep>,
    },
}

impl ConvertStep {
    /// Wrap a rule application, binding the input to a temporary when the
    /// rule declares more than one use of its parameter.
    pub fn apply_rule(rule: Arc<ConversionRule>, input: ConvertStep) -> ConvertStep {
        if rule.param_uses() > 1 {
            ConvertStep::Bind {
                rule,
                input: Box::new(input),
            }
        } else {
            ConvertStep::Apply {
                rule,
                input: Box::new(input),
            }
        }
    }

    /// Human-readable form of the expression, published to the execution
    /// context so diagnostics can observe the active mapping.
    pub fn describe(&self) -> String {
        match self {
            Self::Read { index } => format!("read({})", index),
            Self::ReadWith { index, .. } => format!("read_with({})", index),
            Self::Apply { rule, input } => {
                format!("{} -> {}", input.describe(), rule.to_label())
            }
            Self::Bind { rule, input } => {
                format!("let v = {} in v -> {}", input.describe(), rule.to_label())
            }
            Self::EnumMap { mapping, input } => {
                format!("{} -> enum {}", input.describe(), mapping.name())
            }
            Self::NullCheck { index, input, .. } => {
                format!("null({})? default : {}", index, input.describe())
            }
        }
    }

    /// Lower the expression to a single closure.
    pub fn compile(&self) -> ConverterFn {
        match self {
            Self::Read { index } => {
                let index = *index;
                Arc::new(move |cursor| cursor.get_value(index))
            }
            Self::ReadWith { index, reader } => {
                let index = *index;
                let reader = reader.clone();
                Arc::new(move |cursor| reader.call(cursor, index))
            }
            Self::Apply { rule, input } => {
                let rule = rule.clone();
                let inner = input.compile();
                Arc::new(move |cursor| rule.apply(&inner(cursor)?))
            }
            Self::Bind { rule, input } => {
                let rule = rule.clone();
                let inner = input.compile();
                Arc::new(move |cursor| {
                    let bound = inner(cursor)?;
                    rule.apply(&bound)
                })
            }
            Self::EnumMap { mapping, input } => {
                let mapping = mapping.clone();
                let inner = input.compile();
                Arc::new(move |cursor| mapping.map_value(&inner(cursor)?))
            }
            Self::NullCheck {
                index,
                default,
                input,
            } => {
                let index = *index;
                let default = default.clone();
                let inner = input.compile();
                Arc::new(move |cursor| {
                    if cursor.is_null(index)? {
                        Ok(default.clone())
                    } else {
                        inner(cursor)
                    }
                })
            }
        }
    }
}
