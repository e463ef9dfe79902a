//! PostgreSQL connection provider for rowmap.
//!
//! [`PgPool`] wraps an `sqlx` pool and implements [`rowmap::Connection`]:
//! parameters are bound in placeholder order, rows are decoded by column
//! type into [`rowmap::Value`]s. [`PostgresConfig`] loads the connection
//! settings from `DB_*` environment variables.
//!
//! # Usage
//!
//! ```text
//! let config = PostgresConfig::from_env()?;
//! let pool = PgPool::connect_with(&config).await?;
//! pool.ping().await?;
//!
//! let gateway = Gateway::with_shared_hook(debug_hook_from_env()?);
//! let one: i32 = gateway
//!     .query_scalar(&pool, &BuiltStatement::raw("SELECT 1", vec![]))
//!     .await?;
//! ```

#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::unwrap_in_result,
        clippy::panic
    )
)]

pub mod config;
mod error;
mod executor;
mod types;

pub use config::{PostgresConfig, debug_hook_from_env, debug_hook_from_lookup};
pub use error::{ConfigError, Error};
pub use executor::PgPool;

// Re-export core types for convenience
pub use rowmap::{
    BuiltStatement, Connection, Delete, Filter, Gateway, Insert, Order, QueryResult, Record,
    RelationStrategy, Select, StorageError, Value,
};
