//! Scripted in-memory pool for exercising the reader and the executor
//! without a database.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use schemasync_core::value::Row;

use crate::connection::{ConnectionPool, SqlConnection};
use crate::error::{DbError, Result};

#[derive(Debug, Default)]
struct MockState {
    statements: Vec<String>,
    failures: Vec<(String, String)>,
    responses: Vec<(String, Vec<Row>)>,
    delays: Vec<(String, Duration)>,
    acquired: usize,
}

/// Pool whose connections record every statement and answer queries from
/// canned responses. Patterns match as case-sensitive substrings; the
/// first matching pattern wins.
#[derive(Debug, Clone, Default)]
pub struct MockPool {
    state: Arc<Mutex<MockState>>,
}

impl MockPool {
    /// Creates a pool where every statement succeeds and every query
    /// returns no rows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes statements containing `pattern` fail with `message`.
    #[must_use]
    pub fn fail_on(self, pattern: &str, message: &str) -> Self {
        self.lock().failures.push((pattern.to_string(), message.to_string()));
        self
    }

    /// Answers queries containing `pattern` with `rows`.
    #[must_use]
    pub fn respond(self, pattern: &str, rows: Vec<Row>) -> Self {
        self.lock().responses.push((pattern.to_string(), rows));
        self
    }

    /// Delays statements containing `pattern`.
    #[must_use]
    pub fn delay_on(self, pattern: &str, delay: Duration) -> Self {
        self.lock().delays.push((pattern.to_string(), delay));
        self
    }

    /// Every statement and query seen so far, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    /// Number of connections handed out.
    #[must_use]
    pub fn acquired(&self) -> usize {
        self.lock().acquired
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Connection handed out by [`MockPool`].
#[derive(Debug)]
pub struct MockConnection {
    pool: MockPool,
}

impl MockConnection {
    async fn run(&self, sql: &str) -> Result<()> {
        let delay = {
            let mut state = self.pool.lock();
            state.statements.push(sql.to_string());
            state
                .delays
                .iter()
                .find(|(p, _)| sql.contains(p.as_str()))
                .map(|(_, d)| *d)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self
            .pool
            .lock()
            .failures
            .iter()
            .find(|(p, _)| sql.contains(p.as_str()))
            .map(|(_, m)| m.clone());
        match failure {
            Some(message) => Err(DbError::Database(sqlx::Error::Protocol(message))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SqlConnection for MockConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.run(sql).await?;
        Ok(1)
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.run(sql).await?;
        Ok(self
            .pool
            .lock()
            .responses
            .iter()
            .find(|(p, _)| sql.contains(p.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ConnectionPool for MockPool {
    type Conn = MockConnection;

    async fn acquire(&self) -> Result<Self::Conn> {
        self.lock().acquired += 1;
        Ok(MockConnection { pool: self.clone() })
    }
}
