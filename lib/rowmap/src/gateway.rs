//! Execution gateway: runs built statements and maps rows into records.
//!
//! Mapping is all-or-nothing. Rows are validated against the statement's
//! shape, populated into scratch instances, and only handed to the caller
//! once every row succeeded.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::{
    BuiltStatement, Connection, FromValue, QueryEvent, QueryHook, QueryResult, Record,
    RecordDescriptor, Row, RowShape, StorageError,
};

#[derive(Clone, Default)]
pub struct Gateway {
    hook: Option<Arc<dyn QueryHook>>,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway that notifies `hook` around every statement.
    pub fn with_hook(hook: impl QueryHook + 'static) -> Self {
        Self {
            hook: Some(Arc::new(hook)),
        }
    }

    pub fn with_shared_hook(hook: Option<Arc<dyn QueryHook>>) -> Self {
        Self { hook }
    }

    /// Run a statement and return the number of rows affected.
    pub async fn execute<C>(&self, conn: &C, statement: &BuiltStatement) -> Result<u64, StorageError>
    where
        C: Connection + ?Sized,
    {
        Ok(self.run(conn, statement).await?.rows_affected)
    }

    /// Run a statement with RETURNING and write the returned row into `target`.
    ///
    /// No returned row leaves `target` untouched. More than one is a
    /// [`StorageError::Mapping`] and `target` is not modified either.
    pub async fn execute_returning<C, T>(
        &self,
        conn: &C,
        statement: &BuiltStatement,
        target: &mut T,
    ) -> Result<u64, StorageError>
    where
        C: Connection + ?Sized,
        T: Record,
    {
        let result = self.run(conn, statement).await?;

        match result.rows.as_slice() {
            [] => {}
            [row] => {
                let descriptor = T::descriptor()?;
                let columns = row_columns(&statement.shape, row);
                check_row(descriptor, &columns, 0, row)?;

                let mut updated = target.clone();
                for (column, value) in columns.iter().zip(row.values.iter()) {
                    updated.set(column, value.clone())?;
                }
                *target = updated;
            }
            rows => {
                return Err(StorageError::Mapping(format!(
                    "expected at most one returned row, got {}",
                    rows.len()
                )));
            }
        }

        Ok(result.rows_affected)
    }

    /// Run a SELECT and append the mapped records to `target`.
    ///
    /// Relations deferred to a secondary query are loaded before anything is
    /// appended. Returns the number of records appended.
    pub async fn query<C, T>(
        &self,
        conn: &C,
        statement: &BuiltStatement,
        target: &mut Vec<T>,
    ) -> Result<usize, StorageError>
    where
        C: Connection + ?Sized,
        T: Record,
    {
        let scratch = self.load::<C, T>(conn, statement, None).await?;
        let count = scratch.len();
        target.extend(scratch);
        Ok(count)
    }

    /// Run a SELECT, map its rows and resolve deferred relations.
    ///
    /// With `max_rows`, a larger result is rejected before any relation
    /// query is sent.
    async fn load<C, T>(
        &self,
        conn: &C,
        statement: &BuiltStatement,
        max_rows: Option<usize>,
    ) -> Result<Vec<T>, StorageError>
    where
        C: Connection + ?Sized,
        T: Record,
    {
        let result = self.run(conn, statement).await?;
        if let Some(max) = max_rows.filter(|max| result.rows.len() > *max) {
            return Err(StorageError::Mapping(format!(
                "expected at most {} row(s), got {}",
                max,
                result.rows.len()
            )));
        }

        let mut scratch = map_rows::<T>(&statement.shape, &result.rows)?;
        for relation in &statement.shape.deferred {
            self.attach(conn, &mut scratch, relation).await?;
        }
        Ok(scratch)
    }

    pub async fn fetch<C, T>(&self, conn: &C, statement: &BuiltStatement) -> Result<Vec<T>, StorageError>
    where
        C: Connection + ?Sized,
        T: Record,
    {
        let mut records = Vec::new();
        self.query(conn, statement, &mut records).await?;
        Ok(records)
    }

    /// Run a SELECT expected to match at most one row.
    pub async fn fetch_optional<C, T>(
        &self,
        conn: &C,
        statement: &BuiltStatement,
    ) -> Result<Option<T>, StorageError>
    where
        C: Connection + ?Sized,
        T: Record,
    {
        let mut records = self.load::<C, T>(conn, statement, Some(1)).await?;
        Ok(records.pop())
    }

    /// Run a statement returning a single value, e.g. `SELECT 1`.
    pub async fn query_scalar<C, V>(&self, conn: &C, statement: &BuiltStatement) -> Result<V, StorageError>
    where
        C: Connection + ?Sized,
        V: FromValue,
    {
        let result = self.run(conn, statement).await?;

        let row = match result.rows.as_slice() {
            [row] => row,
            rows => {
                return Err(StorageError::Mapping(format!(
                    "expected exactly one row for a scalar, got {}",
                    rows.len()
                )));
            }
        };

        let [value] = <[crate::Value; 1]>::try_from(row.values.clone()).map_err(|values| {
            StorageError::Mapping(format!(
                "expected exactly one column for a scalar, got {}",
                values.len()
            ))
        })?;

        V::from_value(value)
    }

    pub(crate) async fn run<C>(&self, conn: &C, statement: &BuiltStatement) -> Result<QueryResult, StorageError>
    where
        C: Connection + ?Sized,
    {
        let event = QueryEvent {
            kind: statement.kind,
            sql: &statement.sql,
            params: &statement.params,
        };

        if let Some(hook) = &self.hook {
            hook.before_query(&event);
        }

        let started = Instant::now();
        let outcome = conn.execute(&statement.sql, &statement.params).await;

        if let Some(hook) = &self.hook {
            hook.after_query(&event, started.elapsed(), outcome.as_ref());
        }

        outcome.map_err(|source| StorageError::Execution {
            sql: statement.sql.clone(),
            source,
        })
    }
}

/// Column names for a row: the statement's shape, or the row's own names
/// for hand-written statements.
fn row_columns(shape: &RowShape, row: &Row) -> Vec<String> {
    if shape.columns.is_empty() && shape.joined.is_empty() {
        row.columns.clone()
    } else {
        shape.columns.clone()
    }
}

fn check_row(
    descriptor: &RecordDescriptor,
    columns: &[String],
    joined_width: usize,
    row: &Row,
) -> Result<(), StorageError> {
    let expected = columns.len() + joined_width;
    if row.values.len() != expected {
        return Err(StorageError::Mapping(format!(
            "row has {} values, statement projects {}",
            row.values.len(),
            expected
        )));
    }

    if let Some(unknown) = columns.iter().find(|c| !descriptor.has_column(c)) {
        return Err(StorageError::Mapping(format!(
            "{} has no column {}",
            descriptor.type_name, unknown
        )));
    }

    Ok(())
}

pub(crate) fn map_rows<T: Record>(shape: &RowShape, rows: &[Row]) -> Result<Vec<T>, StorageError> {
    let descriptor = T::descriptor()?;
    let joined_width = shape.width() - shape.columns.len();

    // Validate every row before populating any instance.
    let columns: Vec<Vec<String>> = rows.iter().map(|row| row_columns(shape, row)).collect();
    for (row, columns) in rows.iter().zip(&columns) {
        check_row(descriptor, columns, joined_width, row)?;
    }

    let mut records = Vec::with_capacity(rows.len());
    for (row, columns) in rows.iter().zip(columns) {
        let mut record = T::default();
        let mut values = row.values.iter().cloned();

        for column in &columns {
            if let Some(value) = values.next() {
                record.set(column, value)?;
            }
        }

        for joined in &shape.joined {
            let relation = descriptor.relation(&joined.relation).ok_or_else(|| {
                StorageError::Relation(format!(
                    "{} declares no relation {}",
                    descriptor.type_name, joined.relation
                ))
            })?;
            let group: Vec<_> = values.by_ref().take(joined.columns.len()).collect();
            if let Some(parent) = relation.materialize(group)? {
                record.set_related(&relation.name, parent)?;
            }
        }

        records.push(record);
    }

    Ok(records)
}
