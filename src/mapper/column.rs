use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::convert::{ConversionRegistry, ConvertStep, ConverterFn};
use crate::core::{DataType, DbError, Result, TargetType, Value};
use crate::mapper::ColumnMapping;
use crate::source::{Cursor, DataSource};

/// Synthesize the conversion expression for one column against an observed
/// source type.
///
/// Step order: raw read (specialized adapter reader when available, with
/// its row/column parameters substituted), enum mapping for enum targets
/// (exact registered pair preferred, else conversion to the declared
/// underlying type followed by variant translation), the general scalar
/// rule for scalar targets (bound to a temporary when its body uses the
/// input more than once), and a null-check wrapper when the target is
/// nullable or the column may report null.
pub fn build_column_step(
    source: &dyn DataSource,
    registry: &ConversionRegistry,
    cursor: &dyn Cursor,
    mapping: &ColumnMapping,
    observed: DataType,
) -> Result<ConvertStep> {
    let index = mapping.index;

    let mut step = match source.reader_step(observed, &mapping.target) {
        Some(reader) => ConvertStep::ReadWith { index, reader },
        None => ConvertStep::Read { index },
    };

    match &mapping.target {
        TargetType::Enum(name) => {
            // Prefer a conversion registered for the exact pair.
            if let Some(rule) = registry.get_conversion(observed, &mapping.target, false) {
                step = ConvertStep::apply_rule(rule, step);
            } else {
                let enum_mapping = registry.enum_mapping(name).ok_or_else(|| {
                    DbError::Unsupported(format!("enum '{}' is not registered", name))
                })?;
                let underlying = enum_mapping.underlying();
                if observed != underlying {
                    let rule = registry
                        .get_conversion(observed, &TargetType::Scalar(underlying), true)
                        .ok_or_else(|| {
                            DbError::Unsupported(format!(
                                "no conversion from {} to {} for enum '{}'",
                                observed, underlying, name
                            ))
                        })?;
                    step = ConvertStep::apply_rule(rule, step);
                }
                step = ConvertStep::EnumMap {
                    mapping: enum_mapping,
                    input: Box::new(step),
                };
            }
        }
        TargetType::Scalar(_) => {
            let rule = registry
                .get_conversion(observed, &mapping.target, true)
                .ok_or_else(|| {
                    DbError::Unsupported(format!(
                        "no conversion from {} to {}",
                        observed, mapping.target
                    ))
                })?;
            step = ConvertStep::apply_rule(rule, step);
        }
    }

    if mapping.nullable || cursor.null_allowed(index).unwrap_or(true) {
        let default = if mapping.nullable {
            Value::Null
        } else {
            registry.default_value(&mapping.target)
        };
        step = ConvertStep::NullCheck {
            index,
            default,
            input: Box::new(step),
        };
    }

    Ok(step)
}

/// Per-column converter cache, keyed by the observed source type of the
/// cell. Entries are created on first encounter and never evicted; the
/// population is bounded by the distinct source types a column ever
/// presents, typically one.
pub struct ColumnReader {
    mapping: ColumnMapping,
    default: Value,
    registry: Arc<ConversionRegistry>,
    converters: RwLock<HashMap<DataType, ConverterFn>>,
    syntheses: AtomicU64,
}

impl ColumnReader {
    pub fn new(mapping: ColumnMapping, registry: Arc<ConversionRegistry>) -> Self {
        let default = if mapping.nullable {
            Value::Null
        } else {
            registry.default_value(&mapping.target)
        };
        Self {
            mapping,
            default,
            registry,
            converters: RwLock::new(HashMap::new()),
            syntheses: AtomicU64::new(0),
        }
    }

    /// Convert the current row's cell. A null cell yields the precomputed
    /// default without invoking conversion; otherwise the converter cached
    /// for the cell's observed source type runs, synthesized on first
    /// encounter. Errors come back annotated with the column name.
    pub fn get_value(&self, source: &dyn DataSource, cursor: &dyn Cursor) -> Result<Value> {
        let index = self.mapping.index;

        if cursor.is_null(index)? {
            return Ok(self.default.clone());
        }

        let observed = cursor.source_type(index)?;
        let cached = self.converters.read()?.get(&observed).cloned();
        let converter = match cached {
            Some(f) => f,
            None => {
                let step =
                    build_column_step(source, &self.registry, cursor, &self.mapping, observed)
                        .map_err(|e| e.with_column(&cursor.column_name(index)))?;
                self.syntheses.fetch_add(1, Ordering::SeqCst);
                let compiled = step.compile();
                // A concurrent synthesis may have won the race; both are
                // equivalent, keep whichever landed first.
                self.converters
                    .write()?
                    .entry(observed)
                    .or_insert(compiled)
                    .clone()
            }
        };

        converter(cursor).map_err(|e| e.with_column(&cursor.column_name(index)))
    }

    pub fn describe(&self) -> String {
        let nullable = if self.mapping.nullable { "?" } else { "" };
        format!(
            "column({} as {}{})",
            self.mapping.index, self.mapping.target, nullable
        )
    }

    /// Number of source types a converter has been cached for.
    pub fn cached_converters(&self) -> usize {
        self.converters.read().map(|g| g.len()).unwrap_or(0)
    }

    /// Number of synthesis runs, for cache-behavior assertions.
    pub fn syntheses(&self) -> u64 {
        self.syntheses.load(Ordering::SeqCst)
    }
}
