//! Record trait: the capability a type needs to be mapped to a table.
//!
//! Types implementing `Record` can be built into statements, populated from
//! rows and receive related parents. `#[derive(Record)]` generates the
//! implementation from field attributes.
//!
//! # Example
//!
//! ```text
//! #[derive(Debug, Clone, Default, Record)]
//! #[record(table = "books", alias = "book")]
//! pub struct Book {
//!     #[column(primary_key)]
//!     pub id: i64,
//!     pub title: String,
//!     pub author_id: i64,
//!     #[belongs_to(key = author_id, references = id)]
//!     pub author: Option<Author>,
//! }
//! ```
//!
//! # Column Naming
//!
//! Columns use the Rust field names. Use `#[column(name = "custom_name")]` to
//! override a column name and `#[column(skip)]` to leave a field unmapped.

use std::any::Any;

use crate::{DescriptorBuilder, RecordDescriptor, StorageError, Value, registry};

/// A typed value mapped to a single table's row shape.
pub trait Record: Default + Clone + Send + Sync + 'static {
    /// Declare table, columns and relations. Called once per process.
    fn describe(builder: DescriptorBuilder) -> DescriptorBuilder;

    /// Read a column value. `None` when the record has no such column.
    fn get(&self, column: &str) -> Option<Value>;

    /// Write a column value.
    fn set(&mut self, column: &str, value: Value) -> Result<(), StorageError>;

    /// Attach a loaded parent for a declared belongs-to relation.
    fn set_related(
        &mut self,
        relation: &str,
        related: Box<dyn Any + Send>,
    ) -> Result<(), StorageError> {
        drop(related);
        Err(StorageError::Relation(format!(
            "{} declares no relation {}",
            std::any::type_name::<Self>(),
            relation
        )))
    }

    /// The cached descriptor for this type.
    fn descriptor() -> Result<&'static RecordDescriptor, StorageError> {
        registry::describe::<Self>()
    }
}
