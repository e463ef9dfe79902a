//! Statement builders for SELECT, INSERT and DELETE.
//!
//! Builders are pure: they combine a record's descriptor with the caller's
//! intent and produce a [`BuiltStatement`] without touching a connection.
//! Values are always bound as `$n` parameters, never embedded in the SQL.

use std::marker::PhantomData;

use crate::statement::{mentions_qualifier, quote, rewrite_expr};
use crate::{
    BuiltStatement, JoinedShape, Record, RecordDescriptor, RowShape, StatementKind, StorageError,
    Value,
};

/// Filter conditions for queries.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// field = value (IS NULL for a null value)
    Eq(String, Value),
    /// field != value (IS NOT NULL for a null value)
    Ne(String, Value),
    /// field > value
    Gt(String, Value),
    /// field >= value
    Gte(String, Value),
    /// field < value
    Lt(String, Value),
    /// field <= value
    Lte(String, Value),
    /// field IN (values)
    In(String, Vec<Value>),
    /// field IS NULL
    IsNull(String),
    /// field IS NOT NULL
    IsNotNull(String),
}

impl Filter {
    pub fn field(&self) -> &str {
        match self {
            Filter::Eq(field, _)
            | Filter::Ne(field, _)
            | Filter::Gt(field, _)
            | Filter::Gte(field, _)
            | Filter::Lt(field, _)
            | Filter::Lte(field, _)
            | Filter::In(field, _)
            | Filter::IsNull(field)
            | Filter::IsNotNull(field) => field,
        }
    }
}

/// A WHERE predicate: a structured filter or a caller expression with `?`
/// placeholders and the values bound to them.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Filter(Filter),
    Expr { sql: String, params: Vec<Value> },
}

/// Sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// How a requested relation is loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelationStrategy {
    /// Fold a LEFT JOIN into the select and read the parent from the same row.
    #[default]
    Join,
    /// Load parents with one follow-up query for all returned rows.
    Query,
}

fn bind(params: &mut Vec<Value>, value: &Value) -> String {
    params.push(value.clone());
    format!("${}", params.len())
}

fn render_filter(filter: &Filter, column: &str, params: &mut Vec<Value>) -> String {
    match filter {
        Filter::Eq(_, Value::Null) | Filter::IsNull(_) => format!("{} IS NULL", column),
        Filter::Ne(_, Value::Null) | Filter::IsNotNull(_) => format!("{} IS NOT NULL", column),
        Filter::Eq(_, value) => format!("{} = {}", column, bind(params, value)),
        Filter::Ne(_, value) => format!("{} != {}", column, bind(params, value)),
        Filter::Gt(_, value) => format!("{} > {}", column, bind(params, value)),
        Filter::Gte(_, value) => format!("{} >= {}", column, bind(params, value)),
        Filter::Lt(_, value) => format!("{} < {}", column, bind(params, value)),
        Filter::Lte(_, value) => format!("{} <= {}", column, bind(params, value)),
        Filter::In(_, values) if values.is_empty() => "FALSE".to_string(),
        Filter::In(_, values) => {
            let placeholders: Vec<String> = values.iter().map(|v| bind(params, v)).collect();
            format!("{} IN ({})", column, placeholders.join(", "))
        }
    }
}

/// Qualify a filter field against the record's alias.
///
/// `relation.column` is taken as written; a bare name must be a record column.
fn qualify(field: &str, descriptor: &RecordDescriptor) -> Result<String, StorageError> {
    match field.split_once('.') {
        Some((table, column)) => Ok(format!("{}.{}", quote(table), quote(column))),
        None if descriptor.has_column(field) => {
            Ok(format!("{}.{}", quote(&descriptor.alias), quote(field)))
        }
        None => Err(StorageError::Query(format!(
            "{} has no column {}",
            descriptor.table, field
        ))),
    }
}

fn check_columns(descriptor: &RecordDescriptor, columns: &[String]) -> Result<(), StorageError> {
    for column in columns {
        if !descriptor.has_column(column) {
            return Err(StorageError::Query(format!(
                "{} has no column {}",
                descriptor.table, column
            )));
        }
    }
    Ok(())
}

fn quoted_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote(c))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq)]
enum Returning {
    Columns(Vec<String>),
    All,
}

fn resolve_returning(
    descriptor: &RecordDescriptor,
    returning: &Option<Returning>,
) -> Result<Option<Vec<String>>, StorageError> {
    match returning {
        None => Ok(None),
        Some(Returning::All) => Ok(Some(
            descriptor.columns.iter().map(|c| c.name.clone()).collect(),
        )),
        Some(Returning::Columns(columns)) if columns.is_empty() => Err(StorageError::Query(
            "RETURNING requires at least one column".to_string(),
        )),
        Some(Returning::Columns(columns)) => {
            check_columns(descriptor, columns)?;
            Ok(Some(columns.clone()))
        }
    }
}

/// Descriptor-level select, shared by [`Select`] and the relation resolver.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SelectPlan {
    pub relations: Vec<(String, RelationStrategy)>,
    pub predicates: Vec<Predicate>,
    pub columns: Option<Vec<String>>,
    pub order_by: Vec<(String, Order)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectPlan {
    pub(crate) fn build(&self, descriptor: &RecordDescriptor) -> Result<BuiltStatement, StorageError> {
        let alias = quote(&descriptor.alias);

        let projection = match &self.columns {
            Some(columns) if columns.is_empty() => {
                return Err(StorageError::Query("empty column projection".to_string()));
            }
            Some(columns) => {
                check_columns(descriptor, columns)?;
                columns.clone()
            }
            None => descriptor.columns.iter().map(|c| c.name.clone()).collect(),
        };

        let mut select_list: Vec<String> = projection
            .iter()
            .map(|c| format!("{}.{}", alias, quote(c)))
            .collect();
        let mut joins = String::new();
        let mut joined: Vec<JoinedShape> = Vec::new();
        let mut deferred: Vec<String> = Vec::new();
        // Deferred relations whose alias the WHERE or ORDER BY refers to.
        let mut filter_joins: Vec<(String, String)> = Vec::new();

        for (name, strategy) in &self.relations {
            let relation = descriptor.relation(name).ok_or_else(|| {
                StorageError::Relation(format!(
                    "{} declares no relation {}",
                    descriptor.type_name, name
                ))
            })?;
            let parent = relation.parent()?;

            match strategy {
                RelationStrategy::Query => {
                    if !projection.contains(&relation.local_column) {
                        return Err(StorageError::Query(format!(
                            "relation {} needs column {} in the projection",
                            name, relation.local_column
                        )));
                    }
                    if !deferred.contains(name) {
                        deferred.push(name.clone());
                        if self.refers_to(&relation.name) {
                            check_alias(&relation.name, descriptor)?;
                            filter_joins.push((
                                relation.name.clone(),
                                join_clause(
                                    &parent.table,
                                    &relation.name,
                                    &relation.remote_column,
                                    descriptor,
                                    &relation.local_column,
                                ),
                            ));
                        }
                    }
                }
                RelationStrategy::Join => {
                    if joined.iter().any(|j| j.relation == *name) {
                        continue;
                    }
                    check_alias(&relation.name, descriptor)?;

                    let relation_alias = quote(&relation.name);
                    for column in &parent.columns {
                        select_list.push(format!(
                            "{}.{} AS {}",
                            relation_alias,
                            quote(&column.name),
                            quote(&format!("{}__{}", relation.name, column.name))
                        ));
                    }
                    joins.push_str(&join_clause(
                        &parent.table,
                        &relation.name,
                        &relation.remote_column,
                        descriptor,
                        &relation.local_column,
                    ));
                    joined.push(JoinedShape {
                        relation: relation.name.clone(),
                        columns: parent.columns.iter().map(|c| c.name.clone()).collect(),
                    });
                }
            }
        }

        // A relation both joined and deferred already has its join.
        for (name, clause) in &filter_joins {
            if !joined.iter().any(|j| j.relation == *name) {
                joins.push_str(clause);
            }
        }

        let mut params = Vec::new();
        let where_clause = where_clause(&self.predicates, descriptor, !joins.is_empty(), &mut params)?;

        let mut sql = format!(
            "SELECT {} FROM {} AS {}{}{}",
            select_list.join(", "),
            quote(&descriptor.table),
            alias,
            joins,
            where_clause
        );

        if !self.order_by.is_empty() {
            let clauses = self
                .order_by
                .iter()
                .map(|(field, order)| {
                    let dir = match order {
                        Order::Asc => "ASC",
                        Order::Desc => "DESC",
                    };
                    Ok(format!("{} {}", qualify(field, descriptor)?, dir))
                })
                .collect::<Result<Vec<_>, StorageError>>()?;
            sql.push_str(&format!(" ORDER BY {}", clauses.join(", ")));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        Ok(BuiltStatement {
            kind: StatementKind::Select,
            sql,
            params,
            returning: None,
            shape: RowShape {
                columns: projection,
                joined,
                deferred,
            },
        })
    }

    /// Whether a predicate or sort key is qualified with `alias`.
    fn refers_to(&self, alias: &str) -> bool {
        let qualified = |field: &str| field.split_once('.').is_some_and(|(table, _)| table == alias);

        self.predicates.iter().any(|predicate| match predicate {
            Predicate::Filter(filter) => qualified(filter.field()),
            Predicate::Expr { sql, .. } => mentions_qualifier(sql, alias),
        }) || self.order_by.iter().any(|(field, _)| qualified(field))
    }
}

fn check_alias(relation: &str, descriptor: &RecordDescriptor) -> Result<(), StorageError> {
    if relation == descriptor.alias {
        return Err(StorageError::Relation(format!(
            "relation {} collides with the alias of {}",
            relation, descriptor.table
        )));
    }
    Ok(())
}

fn join_clause(
    parent_table: &str,
    relation: &str,
    remote_column: &str,
    descriptor: &RecordDescriptor,
    local_column: &str,
) -> String {
    let relation_alias = quote(relation);
    format!(
        " LEFT JOIN {} AS {} ON {}.{} = {}.{}",
        quote(parent_table),
        relation_alias,
        relation_alias,
        quote(remote_column),
        quote(&descriptor.alias),
        quote(local_column)
    )
}

/// Build a WHERE clause; caller expressions are parenthesized.
fn where_clause(
    predicates: &[Predicate],
    descriptor: &RecordDescriptor,
    qualify_exprs: bool,
    params: &mut Vec<Value>,
) -> Result<String, StorageError> {
    if predicates.is_empty() {
        return Ok(String::new());
    }

    let mut clauses = Vec::with_capacity(predicates.len());
    for predicate in predicates {
        let clause = match predicate {
            Predicate::Filter(filter) => {
                let column = qualify(filter.field(), descriptor)?;
                render_filter(filter, &column, params)
            }
            Predicate::Expr { sql, params: values } => {
                let scope = qualify_exprs.then_some(descriptor);
                let (rewritten, placeholders) = rewrite_expr(sql, params.len() + 1, scope);
                if placeholders != values.len() {
                    return Err(StorageError::Query(format!(
                        "expression {:?} has {} placeholders but {} values",
                        sql,
                        placeholders,
                        values.len()
                    )));
                }
                params.extend(values.iter().cloned());
                format!("({})", rewritten)
            }
        };
        clauses.push(clause);
    }

    Ok(format!(" WHERE {}", clauses.join(" AND ")))
}

/// A SELECT builder.
#[derive(Debug, Clone)]
pub struct Select<T> {
    plan: SelectPlan,
    _marker: PhantomData<T>,
}

impl<T: Record> Select<T> {
    pub fn new() -> Self {
        Self {
            plan: SelectPlan::default(),
            _marker: PhantomData,
        }
    }

    /// Load a declared belongs-to relation through a join.
    pub fn relation(self, name: impl Into<String>) -> Self {
        self.relation_with(name, RelationStrategy::Join)
    }

    /// Load a declared belongs-to relation with the given strategy.
    pub fn relation_with(mut self, name: impl Into<String>, strategy: RelationStrategy) -> Self {
        self.plan.relations.push((name.into(), strategy));
        self
    }

    /// Select only these columns. Defaults to every declared column.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plan.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Add a filter condition.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.plan.predicates.push(Predicate::Filter(filter));
        self
    }

    /// Add an equality filter (shorthand for Filter::Eq).
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(field.into(), value.into()))
    }

    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Ne(field.into(), value.into()))
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Gt(field.into(), value.into()))
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Gte(field.into(), value.into()))
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Lt(field.into(), value.into()))
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Lte(field.into(), value.into()))
    }

    /// Add an IN filter (shorthand for Filter::In).
    pub fn r#in<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filter(Filter::In(
            field.into(),
            values.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn is_null(self, field: impl Into<String>) -> Self {
        self.filter(Filter::IsNull(field.into()))
    }

    pub fn is_not_null(self, field: impl Into<String>) -> Self {
        self.filter(Filter::IsNotNull(field.into()))
    }

    /// Add an expression with `?` placeholders, e.g. `("author.id = ?", [1])`.
    pub fn where_expr<I, V>(mut self, sql: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.plan.predicates.push(Predicate::Expr {
            sql: sql.into(),
            params: params.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Add an expression that binds no values.
    pub fn where_raw(mut self, sql: impl Into<String>) -> Self {
        self.plan.predicates.push(Predicate::Expr {
            sql: sql.into(),
            params: Vec::new(),
        });
        self
    }

    /// Add an order-by clause.
    pub fn order_by(mut self, field: impl Into<String>, order: Order) -> Self {
        self.plan.order_by.push((field.into(), order));
        self
    }

    /// Set the maximum number of results.
    pub fn limit(mut self, limit: u64) -> Self {
        self.plan.limit = Some(limit);
        self
    }

    /// Set the offset for pagination.
    pub fn offset(mut self, offset: u64) -> Self {
        self.plan.offset = Some(offset);
        self
    }

    pub fn build(&self) -> Result<BuiltStatement, StorageError> {
        self.plan.build(T::descriptor()?)
    }
}

impl<T: Record> Default for Select<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An INSERT builder for one record instance.
#[derive(Debug, Clone)]
pub struct Insert<'a, T> {
    record: &'a T,
    columns: Option<Vec<String>>,
    returning: Option<Returning>,
}

impl<'a, T: Record> Insert<'a, T> {
    pub fn new(record: &'a T) -> Self {
        Self {
            record,
            columns: None,
            returning: None,
        }
    }

    /// Insert only these columns. Defaults to every non-primary-key column.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Report these columns back after the insert.
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = Some(Returning::Columns(
            columns.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Report every declared column back after the insert.
    pub fn returning_all(mut self) -> Self {
        self.returning = Some(Returning::All);
        self
    }

    pub fn build(&self) -> Result<BuiltStatement, StorageError> {
        let descriptor = T::descriptor()?;

        let columns = match &self.columns {
            Some(columns) => {
                check_columns(descriptor, columns)?;
                columns.clone()
            }
            None => descriptor
                .columns
                .iter()
                .filter(|c| !c.primary_key)
                .map(|c| c.name.clone())
                .collect(),
        };

        let mut params = Vec::with_capacity(columns.len());
        for column in &columns {
            let value = self.record.get(column).ok_or_else(|| {
                StorageError::Schema(format!(
                    "{} does not expose column {}",
                    descriptor.type_name, column
                ))
            })?;
            params.push(value);
        }

        let table = quote(&descriptor.table);
        let mut sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table)
        } else {
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                quoted_list(&columns),
                placeholders.join(", ")
            )
        };

        let returning = resolve_returning(descriptor, &self.returning)?;
        if let Some(returning) = &returning {
            sql.push_str(&format!(" RETURNING {}", quoted_list(returning)));
        }

        Ok(BuiltStatement {
            kind: StatementKind::Insert,
            sql,
            params,
            shape: RowShape {
                columns: returning.clone().unwrap_or_default(),
                ..RowShape::default()
            },
            returning,
        })
    }
}

/// A DELETE builder. The filter must pin the full primary key.
#[derive(Debug, Clone)]
pub struct Delete<T> {
    filters: Vec<Filter>,
    returning: Option<Returning>,
    _marker: PhantomData<T>,
}

impl<T: Record> Delete<T> {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            returning: None,
            _marker: PhantomData,
        }
    }

    /// Delete the row identified by this record's primary-key values.
    pub fn record(record: &T) -> Result<Self, StorageError> {
        let descriptor = T::descriptor()?;
        let mut delete = Self::new();
        for key in descriptor.primary_key() {
            let value = record.get(key).ok_or_else(|| {
                StorageError::Schema(format!(
                    "{} does not expose column {}",
                    descriptor.type_name, key
                ))
            })?;
            delete = delete.eq(key, value);
        }
        Ok(delete)
    }

    /// Add a filter condition. Only equality filters are accepted by `build`.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add an equality filter (shorthand).
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(field.into(), value.into()))
    }

    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = Some(Returning::Columns(
            columns.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn returning_all(mut self) -> Self {
        self.returning = Some(Returning::All);
        self
    }

    pub fn build(&self) -> Result<BuiltStatement, StorageError> {
        let descriptor = T::descriptor()?;

        for filter in &self.filters {
            match filter {
                Filter::Eq(field, _) => check_columns(descriptor, std::slice::from_ref(field))?,
                other => {
                    return Err(StorageError::PrimaryKey(format!(
                        "delete from {} accepts only key equality filters, found {:?}",
                        descriptor.table, other
                    )));
                }
            }
        }

        for key in descriptor.primary_key() {
            let pinned = self.filters.iter().any(|f| {
                matches!(f, Filter::Eq(field, value) if field == key && !value.is_null())
            });
            if !pinned {
                return Err(StorageError::PrimaryKey(format!(
                    "delete from {} does not pin primary key column {}",
                    descriptor.table, key
                )));
            }
        }

        let mut params = Vec::with_capacity(self.filters.len());
        let clauses: Vec<String> = self
            .filters
            .iter()
            .map(|filter| render_filter(filter, &quote(filter.field()), &mut params))
            .collect();

        let mut sql = format!(
            "DELETE FROM {} WHERE {}",
            quote(&descriptor.table),
            clauses.join(" AND ")
        );

        let returning = resolve_returning(descriptor, &self.returning)?;
        if let Some(returning) = &returning {
            sql.push_str(&format!(" RETURNING {}", quoted_list(returning)));
        }

        Ok(BuiltStatement {
            kind: StatementKind::Delete,
            sql,
            params,
            shape: RowShape {
                columns: returning.clone().unwrap_or_default(),
                ..RowShape::default()
            },
            returning,
        })
    }
}

impl<T: Record> Default for Delete<T> {
    fn default() -> Self {
        Self::new()
    }
}
