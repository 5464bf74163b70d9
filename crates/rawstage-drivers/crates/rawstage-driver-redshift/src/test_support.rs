//! In-memory `Connection` that records every statement

use async_trait::async_trait;
use rawstage_core::{
    Connection, QueryResult, RawstageError, Result, StatementResult, Transaction, Value,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Default)]
struct Shared {
    log: Mutex<Vec<ExecutedStatement>>,
    fail_on: Mutex<Vec<String>>,
}

impl Shared {
    fn record(&self, sql: &str, params: &[Value]) -> Result<()> {
        self.log.lock().unwrap().push(ExecutedStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        let fail_on = self.fail_on.lock().unwrap();
        match fail_on.iter().find(|needle| sql.contains(needle.as_str())) {
            Some(needle) => Err(RawstageError::Query(format!("forced failure on {:?}", needle))),
            None => Ok(()),
        }
    }

    /// INSERTs report one affected row per bound parameter row
    fn affected_rows(sql: &str, params: &[Value]) -> u64 {
        if sql.starts_with("INSERT") {
            (params.len() / rawstage_core::PARAMS_PER_ROW) as u64
        } else {
            0
        }
    }
}

/// Records statements, replays scripted query results and fails on demand
#[derive(Default)]
pub struct RecordingConnection {
    shared: Arc<Shared>,
    query_results: Mutex<VecDeque<std::result::Result<QueryResult, String>>>,
    closed: Mutex<bool>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every statement whose SQL contains `needle`
    pub fn fail_on(self, needle: &str) -> Self {
        self.shared.fail_on.lock().unwrap().push(needle.to_string());
        self
    }

    /// Result returned by the next `query` call
    pub fn push_query_result(&self, result: QueryResult) {
        self.query_results.lock().unwrap().push_back(Ok(result));
    }

    pub fn push_query_error(&self, message: &str) {
        self.query_results
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.shared.log.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.executed().into_iter().map(|s| s.sql).collect()
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    fn driver_name(&self) -> &str {
        "recording"
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.shared.record(sql, params)?;
        Ok(StatementResult {
            affected_rows: Shared::affected_rows(sql, params),
        })
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.shared.record(sql, params)?;
        match self.query_results.lock().unwrap().pop_front() {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(RawstageError::Query(message)),
            None => Ok(QueryResult::empty()),
        }
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.shared.record(sql, &[])
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.shared.record("BEGIN", &[])?;
        Ok(Box::new(RecordingTransaction {
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

struct RecordingTransaction {
    shared: Arc<Shared>,
}

#[async_trait]
impl Transaction for RecordingTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.shared.record("COMMIT", &[])
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.shared.record("ROLLBACK", &[])
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.shared.record(sql, params)?;
        Ok(QueryResult::empty())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.shared.record(sql, params)?;
        Ok(StatementResult {
            affected_rows: Shared::affected_rows(sql, params),
        })
    }
}
