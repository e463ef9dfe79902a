//! PostgreSQL implementation of Connection.

const DEFAULT_MAX_CONNECTIONS: u32 = 16;

use async_trait::async_trait;
use futures::TryStreamExt;
use rowmap::{BoxError, Connection, QueryResult, Value};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{Either, Executor};
use std::ops::Deref;
use std::str::FromStr;

use crate::types::{bind_values, decode_row};
use crate::{ConfigError, Error, PostgresConfig};

/// Wrapper around sqlx::PgPool that implements Connection.
#[derive(Clone, Debug)]
pub struct PgPool(sqlx::PgPool);

impl PgPool {
    /// Create a new PgPool from an sqlx PgPool.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self(pool)
    }

    /// Connect to a PostgreSQL database by URL.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(url)
            .await?;
        Ok(Self(pool))
    }

    /// Connect using loaded configuration.
    pub async fn connect_with(config: &PostgresConfig) -> Result<Self, Error> {
        let sslmode = PgSslMode::from_str(&config.sslmode).map_err(|e| ConfigError::Invalid {
            var: crate::config::DB_SSLMODE,
            value: config.sslmode.clone(),
            reason: e.to_string(),
        })?;

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name)
            .ssl_mode(sslmode);

        tracing::debug!(dsn = %config, "connecting");

        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        Ok(Self(pool))
    }

    /// Check that the server answers.
    pub async fn ping(&self) -> Result<(), Error> {
        let mut conn = self.0.acquire().await?;
        sqlx::Connection::ping(&mut *conn).await?;
        Ok(())
    }

    /// Get the inner sqlx::PgPool.
    pub fn inner(&self) -> &sqlx::PgPool {
        &self.0
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.0.close().await;
    }
}

impl Deref for PgPool {
    type Target = sqlx::PgPool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl Connection for PgPool {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult, BoxError> {
        let args = bind_values(params)?;
        let query = sqlx::query_with(sql, args);

        let mut result = QueryResult::default();
        #[allow(deprecated)]
        let mut stream = (&self.0).fetch_many(query);
        while let Some(step) = stream.try_next().await? {
            match step {
                Either::Left(done) => result.rows_affected += done.rows_affected(),
                Either::Right(row) => result.rows.push(decode_row(&row)?),
            }
        }

        Ok(result)
    }
}
