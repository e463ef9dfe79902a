//! Query notifications.
//!
//! Hooks observe statements; they cannot alter or veto them.

use std::time::Duration;

use crate::{BoxError, QueryResult, StatementKind, Value};

/// A statement about to be, or just, executed.
#[derive(Debug, Clone, Copy)]
pub struct QueryEvent<'a> {
    pub kind: StatementKind,
    pub sql: &'a str,
    pub params: &'a [Value],
}

pub trait QueryHook: Send + Sync {
    /// Called before the statement is sent to the connection.
    fn before_query(&self, event: &QueryEvent<'_>);

    /// Called once the connection has answered.
    fn after_query(
        &self,
        event: &QueryEvent<'_>,
        elapsed: Duration,
        outcome: Result<&QueryResult, &BoxError>,
    ) {
        let _ = (event, elapsed, outcome);
    }
}

/// Logs statements through `tracing`.
///
/// Failures are always logged at `warn`. Verbose mode additionally logs every
/// statement with its parameters and timing at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHook {
    verbose: bool,
}

impl TracingHook {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn verbose() -> Self {
        Self::new(true)
    }

    pub fn failures_only() -> Self {
        Self::new(false)
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

fn render_params(params: &[Value]) -> String {
    serde_json::to_string(params).unwrap_or_else(|_| format!("{:?}", params))
}

impl QueryHook for TracingHook {
    fn before_query(&self, event: &QueryEvent<'_>) {
        if self.verbose {
            tracing::debug!(
                kind = ?event.kind,
                sql = event.sql,
                params = %render_params(event.params),
                "executing statement"
            );
        }
    }

    fn after_query(
        &self,
        event: &QueryEvent<'_>,
        elapsed: Duration,
        outcome: Result<&QueryResult, &BoxError>,
    ) {
        match outcome {
            Ok(result) if self.verbose => {
                tracing::debug!(
                    kind = ?event.kind,
                    sql = event.sql,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    rows = result.rows.len(),
                    rows_affected = result.rows_affected,
                    "statement finished"
                );
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(
                    kind = ?event.kind,
                    sql = event.sql,
                    params = %render_params(event.params),
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    error = %error,
                    "statement failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_render_as_json() {
        let params = vec![Value::Int(1), Value::from("a"), Value::Null];
        assert_eq!(render_params(&params), r#"[1,"a",null]"#);
    }

    #[test]
    fn constructors_set_mode() {
        assert!(TracingHook::verbose().is_verbose());
        assert!(!TracingHook::failures_only().is_verbose());
        assert!(!TracingHook::default().is_verbose());
    }
}
