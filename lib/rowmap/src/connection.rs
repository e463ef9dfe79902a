//! The contract between the core and a database provider.

use async_trait::async_trait;

use crate::{BoxError, Value};

/// One returned row: column names and values in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the named column, if present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }
}

/// Outcome of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows_affected: u64,
    pub rows: Vec<Row>,
}

/// An executable SQL connection.
///
/// Implementations bind `params` to the `$n` placeholders of `sql` in order
/// and return every row the statement produced. Dropping the returned future
/// abandons the statement.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult, BoxError>;
}

#[async_trait]
impl<C: Connection + ?Sized> Connection for &C {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult, BoxError> {
        (**self).execute(sql, params).await
    }
}

#[async_trait]
impl<C: Connection + ?Sized> Connection for std::sync::Arc<C> {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult, BoxError> {
        (**self).execute(sql, params).await
    }
}
