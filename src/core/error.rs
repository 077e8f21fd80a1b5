use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Plan error: {0}")]
    Plan(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Invalid cast from {from} to {to}")]
    InvalidCast { from: String, to: String },

    #[error("Mapping of column '{column}' value failed: {source}")]
    Conversion {
        column: String,
        #[source]
        source: Box<DbError>,
    },

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    /// True for the format/cast class of errors that a row mapper may
    /// recover from by recompiling to its defensive path. The class stays
    /// visible through a column-annotation wrapper.
    pub fn is_mapping_fault(&self) -> bool {
        match self {
            DbError::Format(_) | DbError::InvalidCast { .. } => true,
            DbError::Conversion { source, .. } => source.is_mapping_fault(),
            _ => false,
        }
    }

    /// Annotate an error with the column it was raised for. An error that
    /// already carries a column name is returned unchanged; anything else
    /// is wrapped exactly once.
    pub fn with_column(self, column: &str) -> DbError {
        match self {
            DbError::Conversion { .. } => self,
            other => DbError::Conversion {
                column: column.to_string(),
                source: Box::new(other),
            },
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Resource(err.to_string())
    }
}
