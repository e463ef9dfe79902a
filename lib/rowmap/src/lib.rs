//! rowmap - Typed records over SQL rows.
//!
//! This crate maps typed records to table rows, builds parameterized SQL
//! statements, and loads one level of belongs-to relations. It is database
//! agnostic: a provider crate supplies a [`Connection`] that executes SQL
//! text with bound [`Value`]s and hands raw rows back.
//!
//! # Core Concepts
//!
//! - **Record**: a type mapped to a single table. Its metadata (table, alias,
//!   columns, primary key, relations) is declared once through
//!   [`Record::describe`] and cached process-wide by the registry.
//! - **BuiltStatement**: SQL text plus ordered parameters, produced by the
//!   pure builders [`Select`], [`Insert`] and [`Delete`].
//! - **Gateway**: executes built statements and maps rows back into records,
//!   all-or-nothing.
//!
//! # Relations
//!
//! A belongs-to relation is loaded either by a `LEFT JOIN` folded into the
//! select ([`RelationStrategy::Join`]) or by one batched secondary query
//! ([`RelationStrategy::Query`], or [`Gateway::attach`] directly).

#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::unwrap_in_result,
        clippy::panic
    )
)]

// Lets the derive's `::rowmap::` paths resolve inside this crate's tests.
extern crate self as rowmap;

mod connection;
mod descriptor;
mod error;
mod gateway;
mod hook;
mod query;
mod record;
mod registry;
mod relation;
mod statement;
mod value;

pub use connection::{Connection, QueryResult, Row};
pub use descriptor::{ColumnDescriptor, DescriptorBuilder, RecordDescriptor, RelationDescriptor};
pub use error::{BoxError, StorageError};
pub use gateway::Gateway;
pub use hook::{QueryEvent, QueryHook, TracingHook};
pub use query::{Delete, Filter, Insert, Order, Predicate, RelationStrategy, Select};
pub use record::Record;
pub use registry::describe;
pub use statement::{BuiltStatement, JoinedShape, RowShape, StatementKind};
pub use value::{FromValue, Value};

// Re-export derive macro
pub use rowmap_derive::Record;
