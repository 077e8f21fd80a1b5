use std::fmt;
use std::sync::Arc;

use crate::core::{DataType, DbError, Result, Value};

type RuleBody = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// A registered transformation from one runtime scalar type to a target.
///
/// `param_uses` declares how many times the body consults its input. The
/// synthesizer binds the input to a local temporary when it is more than
/// one, so a side-effecting read step is never evaluated twice.
#[derive(Clone)]
pub struct ConversionRule {
    from: DataType,
    to_label: String,
    param_uses: usize,
    body: RuleBody,
}

impl ConversionRule {
    pub fn new<F>(from: DataType, to_label: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            from,
            to_label: to_label.into(),
            param_uses: 1,
            body: Arc::new(body),
        }
    }

    /// A rule whose body consults its input parameter `uses` times.
    pub fn with_param_uses<F>(
        from: DataType,
        to_label: impl Into<String>,
        uses: usize,
        body: F,
    ) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            from,
            to_label: to_label.into(),
            param_uses: uses,
            body: Arc::new(body),
        }
    }

    pub fn from_type(&self) -> DataType {
        self.from
    }

    pub fn to_label(&self) -> &str {
        &self.to_label
    }

    pub fn param_uses(&self) -> usize {
        self.param_uses
    }

    /// Apply the rule. The input must carry the runtime type the rule was
    /// registered for; anything else is an invalid cast. This is what makes
    /// a frozen fast-path binding fault when a later row changes its
    /// runtime representation.
    pub fn apply(&self, value: &Value) -> Result<Value> {
        match value.data_type() {
            Some(dt) if dt == self.from => (self.body)(value),
            _ => Err(DbError::InvalidCast {
                from: value.type_name().to_string(),
                to: self.to_label.clone(),
            }),
        }
    }
}

impl fmt::Debug for ConversionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConversionRule({} -> {})", self.from, self.to_label)
    }
}

/// A registered enum type: its name, declared underlying mapping type and
/// the variant table translating underlying values into variant names.
#[derive(Debug, Clone)]
pub struct EnumMapping {
    name: String,
    underlying: DataType,
    variants: Vec<EnumVariant>,
}

#[derive(Debug, Clone)]
pub struct EnumVariant {
    pub name: String,
    pub value: Value,
}

impl EnumMapping {
    pub fn new(name: impl Into<String>, underlying: DataType) -> Self {
        Self {
            name: name.into(),
            underlying,
            variants: Vec::new(),
        }
    }

    pub fn variant(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variants.push(EnumVariant {
            name: name.into(),
            value,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn underlying(&self) -> DataType {
        self.underlying
    }

    /// The canonical value for an enum whose mapping yields no match is an
    /// invalid cast, not a silent default.
    pub fn map_value(&self, value: &Value) -> Result<Value> {
        self.variants
            .iter()
            .find(|v| v.value == *value)
            .map(|v| Value::Text(v.name.clone()))
            .ok_or_else(|| DbError::InvalidCast {
                from: value.type_name().to_string(),
                to: format!("enum {}", self.name),
            })
    }

    /// Default value of the enum type: its first registered variant.
    pub fn default_variant(&self) -> Value {
        self.variants
            .first()
            .map(|v| Value::Text(v.name.clone()))
            .unwrap_or(Value::Null)
    }
}
