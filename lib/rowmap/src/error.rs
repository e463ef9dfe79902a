use thiserror::Error;

/// Boxed error returned by connection providers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Malformed or incomplete record metadata.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A delete filter does not pin every primary-key column.
    #[error("Primary key error: {0}")]
    PrimaryKey(String),

    /// Unknown or malformed relation reference.
    #[error("Relation error: {0}")]
    Relation(String),

    /// Row shape or value does not fit the target fields.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Builder input that cannot produce a valid statement.
    #[error("Invalid query: {0}")]
    Query(String),

    /// The underlying store rejected or failed the statement.
    #[error("Execution error: {source} (sql: {sql})")]
    Execution {
        sql: String,
        #[source]
        source: BoxError,
    },
}

impl StorageError {
    /// Whether this error came from the store rather than from the core.
    pub fn is_execution(&self) -> bool {
        matches!(self, StorageError::Execution { .. })
    }
}
