use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use lazy_static::lazy_static;

use crate::convert::{ConversionRule, EnumMapping};
use crate::core::{DataType, DbError, TargetType, Value};

lazy_static! {
    static ref DEFAULT_REGISTRY: Arc<ConversionRegistry> =
        Arc::new(ConversionRegistry::with_default_rules());
}

/// Registry of scalar and enum conversion rules plus per-type defaults.
///
/// Column-converter synthesis consults it for the general scalar rule, the
/// exact enum-pair rule, the enum's declared underlying mapping type and
/// the default value substituted for null cells.
pub struct ConversionRegistry {
    scalar_rules: HashMap<(DataType, DataType), Arc<ConversionRule>>,
    enum_rules: HashMap<(DataType, String), Arc<ConversionRule>>,
    enums: HashMap<String, Arc<EnumMapping>>,
}

impl ConversionRegistry {
    pub fn new() -> Self {
        Self {
            scalar_rules: HashMap::new(),
            enum_rules: HashMap::new(),
            enums: HashMap::new(),
        }
    }

    /// The process-wide registry with the built-in rule set.
    pub fn shared() -> Arc<ConversionRegistry> {
        DEFAULT_REGISTRY.clone()
    }

    pub fn register_scalar(&mut self, to: DataType, rule: ConversionRule) {
        self.scalar_rules
            .insert((rule.from_type(), to), Arc::new(rule));
    }

    /// Register a conversion straight into an enum type, preferred over the
    /// underlying-type route when present.
    pub fn register_enum_rule(&mut self, enum_name: impl Into<String>, rule: ConversionRule) {
        self.enum_rules
            .insert((rule.from_type(), enum_name.into()), Arc::new(rule));
    }

    pub fn register_enum(&mut self, mapping: EnumMapping) {
        self.enums
            .insert(mapping.name().to_string(), Arc::new(mapping));
    }

    /// Look up the conversion rule for a (source, target) pair.
    ///
    /// With `allow_null_lift` set, a missing rule for an identical scalar
    /// pair degrades to a pass-through: the null handling the rule would
    /// have provided is supplied by the null-check wrapper instead. With it
    /// unset only explicitly registered rules are returned.
    pub fn get_conversion(
        &self,
        from: DataType,
        to: &TargetType,
        allow_null_lift: bool,
    ) -> Option<Arc<ConversionRule>> {
        match to {
            TargetType::Scalar(dt) => {
                if let Some(rule) = self.scalar_rules.get(&(from, *dt)) {
                    return Some(rule.clone());
                }
                if allow_null_lift && from == *dt {
                    return Some(Arc::new(ConversionRule::new(from, dt.name(), |v| {
                        Ok(v.clone())
                    })));
                }
                None
            }
            TargetType::Enum(name) => self.enum_rules.get(&(from, name.clone())).cloned(),
        }
    }

    pub fn enum_mapping(&self, name: &str) -> Option<Arc<EnumMapping>> {
        self.enums.get(name).cloned()
    }

    /// Declared underlying mapping type of a registered enum.
    pub fn enum_mapping_type(&self, name: &str) -> Option<DataType> {
        self.enums.get(name).map(|m| m.underlying())
    }

    /// Precomputed default substituted for null cells of a non-nullable
    /// target. Nullable targets default to `Value::Null` upstream and never
    /// reach this.
    pub fn default_value(&self, target: &TargetType) -> Value {
        match target {
            TargetType::Scalar(DataType::Integer) => Value::Integer(0),
            TargetType::Scalar(DataType::Float) => Value::Float(0.0),
            TargetType::Scalar(DataType::Text) => Value::Text(String::new()),
            TargetType::Scalar(DataType::Boolean) => Value::Boolean(false),
            TargetType::Scalar(DataType::Timestamp) => {
                Value::Timestamp(DateTime::<Utc>::UNIX_EPOCH)
            }
            TargetType::Enum(name) => self
                .enums
                .get(name)
                .map(|m| m.default_variant())
                .unwrap_or(Value::Null),
        }
    }

    /// The built-in scalar rule table.
    pub fn with_default_rules() -> Self {
        use DataType::*;

        let mut r = Self::new();

        // Identity rules
        r.register_scalar(Integer, ConversionRule::new(Integer, "INTEGER", |v| Ok(v.clone())));
        r.register_scalar(Float, ConversionRule::new(Float, "FLOAT", |v| Ok(v.clone())));
        r.register_scalar(Text, ConversionRule::new(Text, "TEXT", |v| Ok(v.clone())));
        r.register_scalar(Boolean, ConversionRule::new(Boolean, "BOOLEAN", |v| Ok(v.clone())));
        r.register_scalar(Timestamp, ConversionRule::new(Timestamp, "TIMESTAMP", |v| Ok(v.clone())));

        // Widening and narrowing between numerics. The float route checks
        // the input twice (range probe, then truncation), so synthesis must
        // bind it to a temporary.
        r.register_scalar(
            Float,
            ConversionRule::new(Integer, "FLOAT", |v| Ok(Value::Float(v.as_i64().unwrap() as f64))),
        );
        r.register_scalar(
            Integer,
            ConversionRule::with_param_uses(Float, "INTEGER", 2, |v| {
                let f = v.as_f64().unwrap();
                if !f.is_finite() || f < i64::MIN as f64 || f > i64::MAX as f64 {
                    return Err(DbError::Format(format!(
                        "float {} out of integer range",
                        f
                    )));
                }
                Ok(Value::Integer(f.trunc() as i64))
            }),
        );

        // Text parsing; parse failures are format errors, the recoverable
        // mapping-fault class.
        r.register_scalar(
            Integer,
            ConversionRule::new(Text, "INTEGER", |v| {
                let s = v.as_str().unwrap();
                s.trim()
                    .parse::<i64>()
                    .map(Value::Integer)
                    .map_err(|e| DbError::Format(format!("'{}' is not an integer: {}", s, e)))
            }),
        );
        r.register_scalar(
            Float,
            ConversionRule::new(Text, "FLOAT", |v| {
                let s = v.as_str().unwrap();
                s.trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|e| DbError::Format(format!("'{}' is not a float: {}", s, e)))
            }),
        );
        r.register_scalar(
            Boolean,
            ConversionRule::new(Text, "BOOLEAN", |v| {
                match v.as_str().unwrap().trim().to_lowercase().as_str() {
                    "true" | "t" | "1" => Ok(Value::Boolean(true)),
                    "false" | "f" | "0" => Ok(Value::Boolean(false)),
                    s => Err(DbError::Format(format!("'{}' is not a boolean", s))),
                }
            }),
        );
        r.register_scalar(
            Timestamp,
            ConversionRule::new(Text, "TIMESTAMP", |v| {
                let s = v.as_str().unwrap().trim();
                if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                    return Ok(Value::Timestamp(ts.with_timezone(&Utc)));
                }
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .map(|naive| Value::Timestamp(naive.and_utc()))
                    .map_err(|e| DbError::Format(format!("'{}' is not a timestamp: {}", s, e)))
            }),
        );

        // Stringification
        r.register_scalar(
            Text,
            ConversionRule::new(Integer, "TEXT", |v| Ok(Value::Text(v.to_string()))),
        );
        r.register_scalar(
            Text,
            ConversionRule::new(Float, "TEXT", |v| Ok(Value::Text(v.to_string()))),
        );
        r.register_scalar(
            Text,
            ConversionRule::new(Boolean, "TEXT", |v| Ok(Value::Text(v.to_string()))),
        );
        r.register_scalar(
            Text,
            ConversionRule::new(Timestamp, "TEXT", |v| Ok(Value::Text(v.to_string()))),
        );

        // Boolean and timestamp bridges
        r.register_scalar(
            Boolean,
            ConversionRule::new(Integer, "BOOLEAN", |v| {
                Ok(Value::Boolean(v.as_i64().unwrap() != 0))
            }),
        );
        r.register_scalar(
            Integer,
            ConversionRule::new(Boolean, "INTEGER", |v| {
                Ok(Value::Integer(if v.as_bool().unwrap() { 1 } else { 0 }))
            }),
        );
        r.register_scalar(
            Integer,
            ConversionRule::new(Timestamp, "INTEGER", |v| match v {
                Value::Timestamp(ts) => Ok(Value::Integer(ts.timestamp())),
                _ => unreachable!(),
            }),
        );

        r
    }
}

impl Default for ConversionRegistry {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rule_lookup() {
        let registry = ConversionRegistry::with_default_rules();

        let rule = registry
            .get_conversion(DataType::Text, &TargetType::Scalar(DataType::Integer), true)
            .unwrap();
        assert_eq!(
            rule.apply(&Value::Text("42".into())).unwrap(),
            Value::Integer(42)
        );
    }

    #[test]
    fn test_text_parse_failure_is_format_error() {
        let registry = ConversionRegistry::with_default_rules();
        let rule = registry
            .get_conversion(DataType::Text, &TargetType::Scalar(DataType::Integer), true)
            .unwrap();

        let err = rule.apply(&Value::Text("not a number".into())).unwrap_err();
        assert!(matches!(err, DbError::Format(_)));
    }

    #[test]
    fn test_null_lift_pass_through() {
        let mut registry = ConversionRegistry::new();
        let target = TargetType::Scalar(DataType::Integer);

        assert!(registry
            .get_conversion(DataType::Integer, &target, false)
            .is_none());

        let lifted = registry
            .get_conversion(DataType::Integer, &target, true)
            .unwrap();
        assert_eq!(lifted.apply(&Value::Integer(7)).unwrap(), Value::Integer(7));

        registry.register_scalar(
            DataType::Integer,
            ConversionRule::new(DataType::Integer, "INTEGER", |v| Ok(v.clone())),
        );
        assert!(registry
            .get_conversion(DataType::Integer, &target, false)
            .is_some());
    }

    #[test]
    fn test_defaults() {
        let registry = ConversionRegistry::with_default_rules();
        assert_eq!(
            registry.default_value(&TargetType::Scalar(DataType::Integer)),
            Value::Integer(0)
        );
        assert_eq!(
            registry.default_value(&TargetType::Scalar(DataType::Text)),
            Value::Text(String::new())
        );
    }

    #[test]
    fn test_enum_registration() {
        let mut registry = ConversionRegistry::with_default_rules();
        registry.register_enum(
            EnumMapping::new("status", DataType::Integer)
                .variant("active", Value::Integer(0))
                .variant("archived", Value::Integer(1)),
        );

        assert_eq!(
            registry.enum_mapping_type("status"),
            Some(DataType::Integer)
        );
        assert_eq!(
            registry.default_value(&TargetType::Enum("status".into())),
            Value::Text("active".into())
        );
        assert!(registry
            .get_conversion(DataType::Integer, &TargetType::Enum("status".into()), false)
            .is_none());
    }

    #[test]
    fn test_timestamp_parsing() {
        let registry = ConversionRegistry::with_default_rules();
        let rule = registry
            .get_conversion(
                DataType::Text,
                &TargetType::Scalar(DataType::Timestamp),
                true,
            )
            .unwrap();

        let parsed = rule
            .apply(&Value::Text("2024-03-01 12:30:00".into()))
            .unwrap();
        assert!(matches!(parsed, Value::Timestamp(_)));
    }
}
