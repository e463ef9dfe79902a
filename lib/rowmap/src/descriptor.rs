//! Record metadata: tables, columns and belongs-to relations.
//!
//! Descriptors are produced by an explicit registration call,
//! [`Record::describe`](crate::Record::describe), which configures a
//! [`DescriptorBuilder`]. The registry validates and caches the result.

use std::any::{Any, TypeId};

use crate::{Record, StorageError, Value, registry};

type DescribeFn = fn() -> Result<&'static RecordDescriptor, StorageError>;
type MaterializeFn = fn(Vec<Value>) -> Result<Option<Box<dyn Any + Send>>, StorageError>;

/// A mapped column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub primary_key: bool,
    /// Set when the column is the local key of a declared relation.
    pub relation: bool,
}

/// A belongs-to edge from the describing (child) record to a parent record.
#[derive(Debug, Clone)]
pub struct RelationDescriptor {
    pub name: String,
    /// Foreign-key column on the child.
    pub local_column: String,
    /// Primary-key column on the parent.
    pub remote_column: String,
    pub parent_type: TypeId,
    pub parent_name: &'static str,
    describe_parent: DescribeFn,
    materialize: MaterializeFn,
}

impl RelationDescriptor {
    /// The parent's descriptor.
    ///
    /// Fails with [`StorageError::Relation`] when the remote column is not the
    /// parent's (single-column) primary key.
    pub fn parent(&self) -> Result<&'static RecordDescriptor, StorageError> {
        let parent = (self.describe_parent)()?;
        let key = parent.primary_key();
        if key.len() != 1 || key[0] != self.remote_column {
            return Err(StorageError::Relation(format!(
                "relation {} references {}.{}, which is not the primary key of {}",
                self.name, parent.table, self.remote_column, self.parent_name
            )));
        }
        Ok(parent)
    }

    /// Build a boxed parent from values in the parent's column order.
    ///
    /// Returns `None` when every primary-key value is null (no parent row).
    pub(crate) fn materialize(
        &self,
        values: Vec<Value>,
    ) -> Result<Option<Box<dyn Any + Send>>, StorageError> {
        (self.materialize)(values)
    }
}

fn materialize<P: Record>(values: Vec<Value>) -> Result<Option<Box<dyn Any + Send>>, StorageError> {
    let descriptor = registry::describe::<P>()?;
    if values.len() != descriptor.columns.len() {
        return Err(StorageError::Mapping(format!(
            "{} has {} columns, row provided {}",
            descriptor.table,
            descriptor.columns.len(),
            values.len()
        )));
    }

    let missing = descriptor
        .columns
        .iter()
        .zip(&values)
        .filter(|(column, _)| column.primary_key)
        .all(|(_, value)| value.is_null());
    if missing {
        return Ok(None);
    }

    let mut parent = P::default();
    for (column, value) in descriptor.columns.iter().zip(values) {
        parent.set(&column.name, value)?;
    }
    Ok(Some(Box::new(parent)))
}

/// Validated metadata for one record type.
#[derive(Debug, Clone)]
pub struct RecordDescriptor {
    pub type_name: &'static str,
    pub table: String,
    /// Name the table is given in SELECT statements.
    pub alias: String,
    pub columns: Vec<ColumnDescriptor>,
    pub relations: Vec<RelationDescriptor>,
}

impl RecordDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Primary-key column names in declaration order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Position of a column in declaration order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Structured configuration call used by [`Record::describe`].
///
/// ```text
/// builder
///     .table("books")
///     .alias("book")
///     .primary_key("id")
///     .column("title")
///     .column("author_id")
///     .belongs_to::<Author>("author", "author_id", "id")
/// ```
#[derive(Debug)]
pub struct DescriptorBuilder {
    type_name: &'static str,
    table: Option<String>,
    alias: Option<String>,
    columns: Vec<ColumnDescriptor>,
    relations: Vec<RelationDescriptor>,
}

impl DescriptorBuilder {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            table: None,
            alias: None,
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Alias used in SELECT statements. Defaults to the table name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(ColumnDescriptor {
            name: name.into(),
            primary_key: false,
            relation: false,
        });
        self
    }

    /// Declare a column that is (part of) the primary key.
    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.columns.push(ColumnDescriptor {
            name: name.into(),
            primary_key: true,
            relation: false,
        });
        self
    }

    /// Declare a belongs-to relation: `local` on this record references
    /// `remote`, the primary key of `P`.
    pub fn belongs_to<P: Record>(
        mut self,
        name: impl Into<String>,
        local: impl Into<String>,
        remote: impl Into<String>,
    ) -> Self {
        self.relations.push(RelationDescriptor {
            name: name.into(),
            local_column: local.into(),
            remote_column: remote.into(),
            parent_type: TypeId::of::<P>(),
            parent_name: std::any::type_name::<P>(),
            describe_parent: registry::describe::<P>,
            materialize: materialize::<P>,
        });
        self
    }

    pub fn build(self) -> Result<RecordDescriptor, String> {
        let type_name = self.type_name;

        let table = match self.table {
            Some(table) if !table.is_empty() => table,
            _ => return Err(format!("{}: no table name declared", type_name)),
        };

        if !self.columns.iter().any(|c| c.primary_key) {
            return Err(format!("{}: no primary key declared", type_name));
        }

        let mut columns = self.columns;
        for (idx, column) in columns.iter().enumerate() {
            if column.name.is_empty() {
                return Err(format!("{}: empty column name", type_name));
            }
            if columns[..idx].iter().any(|c| c.name == column.name) {
                return Err(format!("{}: duplicate column {}", type_name, column.name));
            }
        }

        for (idx, relation) in self.relations.iter().enumerate() {
            if self.relations[..idx].iter().any(|r| r.name == relation.name) {
                return Err(format!("{}: duplicate relation {}", type_name, relation.name));
            }
            let Some(local) = columns.iter_mut().find(|c| c.name == relation.local_column)
            else {
                return Err(format!(
                    "{}: relation {} references undeclared column {}",
                    type_name, relation.name, relation.local_column
                ));
            };
            local.relation = true;
        }

        let alias = self.alias.unwrap_or_else(|| table.clone());

        Ok(RecordDescriptor {
            type_name,
            table,
            alias,
            columns,
            relations: self.relations,
        })
    }
}
