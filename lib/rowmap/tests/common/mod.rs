#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rowmap::{
    BoxError, Connection, QueryEvent, QueryHook, QueryResult, Record, Row, Value,
};

#[derive(Debug, Clone, Default, PartialEq, Record)]
#[record(table = "authors", alias = "author")]
pub struct Author {
    #[column(primary_key)]
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
#[record(table = "books", alias = "book")]
pub struct Book {
    #[column(primary_key)]
    pub id: i64,
    pub title: String,
    pub author_id: i64,
    #[belongs_to(key = author_id, references = id)]
    pub author: Option<Author>,
}

/// A record whose foreign key may be null.
#[derive(Debug, Clone, Default, PartialEq, Record)]
#[record(table = "notes")]
pub struct Note {
    #[column(primary_key)]
    pub id: i64,
    pub body: String,
    pub author_id: Option<i64>,
    #[belongs_to(key = author_id, references = id)]
    pub author: Option<Author>,
}

pub fn row(columns: &[&str], values: Vec<Value>) -> Row {
    Row::new(columns.iter().map(|c| c.to_string()).collect(), values)
}

pub fn rows(rows: Vec<Row>) -> QueryResult {
    QueryResult {
        rows_affected: rows.len() as u64,
        rows,
    }
}

pub fn affected(count: u64) -> QueryResult {
    QueryResult {
        rows_affected: count,
        rows: Vec::new(),
    }
}

pub fn author_row(id: i64, name: &str) -> Row {
    row(&["id", "name"], vec![Value::Int(id), Value::from(name)])
}

enum Reply {
    Result(QueryResult),
    Fail(String),
    Hang,
}

/// Sets a flag when dropped, i.e. when the future holding it is abandoned.
struct DropGuard(Arc<AtomicBool>);

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// In-memory connection that logs every statement and answers from a script.
///
/// Unscripted statements succeed with an empty result.
#[derive(Default)]
pub struct FakeConnection {
    statements: Mutex<Vec<(String, Vec<Value>)>>,
    replies: Mutex<VecDeque<Reply>>,
    events: Arc<Mutex<Vec<String>>>,
    dropped: Arc<AtomicBool>,
}

impl FakeConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, result: QueryResult) -> &Self {
        self.replies.lock().unwrap().push_back(Reply::Result(result));
        self
    }

    pub fn fail(&self, message: &str) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Reply::Fail(message.to_string()));
        self
    }

    pub fn hang(&self) -> &Self {
        self.replies.lock().unwrap().push_back(Reply::Hang);
        self
    }

    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.statements.lock().unwrap().clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements().into_iter().map(|(sql, _)| sql).collect()
    }

    /// Shared log of connection and hook events, in order.
    pub fn events(&self) -> Arc<Mutex<Vec<String>>> {
        self.events.clone()
    }

    /// Whether a hanging statement's future has been dropped.
    pub fn abandoned(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connection for FakeConnection {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult, BoxError> {
        self.statements
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        self.events.lock().unwrap().push(format!("execute {}", sql));

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            None => Ok(QueryResult::default()),
            Some(Reply::Result(result)) => Ok(result),
            Some(Reply::Fail(message)) => Err(message.into()),
            Some(Reply::Hang) => {
                let _guard = DropGuard(self.dropped.clone());
                loop {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
            }
        }
    }
}

/// Hook that records notifications into a shared event log.
pub struct RecordingHook {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingHook {
    pub fn new(events: Arc<Mutex<Vec<String>>>) -> Self {
        Self { events }
    }
}

impl QueryHook for RecordingHook {
    fn before_query(&self, event: &QueryEvent<'_>) {
        self.events
            .lock()
            .unwrap()
            .push(format!("before {}", event.sql));
    }

    fn after_query(
        &self,
        event: &QueryEvent<'_>,
        _elapsed: Duration,
        outcome: Result<&QueryResult, &BoxError>,
    ) {
        let status = if outcome.is_ok() { "ok" } else { "failed" };
        self.events
            .lock()
            .unwrap()
            .push(format!("after {} {}", status, event.sql));
    }
}
