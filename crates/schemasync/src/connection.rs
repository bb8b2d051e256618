//! Connection abstraction over the live database.
//!
//! The reader and the executor only see [`SqlConnection`] and
//! [`ConnectionPool`]. Implementations are provided for `sqlx` PostgreSQL
//! and SQLite pools; other drivers plug in by implementing the two traits.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use schemasync_core::value::{Row, Value};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column as _, Executor as _, PgPool, Postgres, Row as _, Sqlite, SqlitePool, TypeInfo as _, ValueRef as _};
use tracing::debug;

use crate::error::{DbError, Result};

/// A single connection able to run SQL text.
#[async_trait]
pub trait SqlConnection: Send {
    /// Executes a statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Runs a query and decodes every row.
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>>;

    /// Starts a transaction.
    async fn begin(&mut self) -> Result<()> {
        self.execute("BEGIN").await.map(|_| ())
    }

    /// Commits the current transaction.
    async fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT").await.map(|_| ())
    }

    /// Rolls back the current transaction.
    async fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK").await.map(|_| ())
    }
}

/// A pool handing out connections. A connection goes back to the pool when
/// it is dropped, whether or not the work on it succeeded.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Connection type handed out by the pool.
    type Conn: SqlConnection;

    /// Borrows a connection.
    async fn acquire(&self) -> Result<Self::Conn>;
}

// ---- PostgreSQL ----

/// Pooled PostgreSQL connection.
pub struct PgSession {
    conn: PoolConnection<Postgres>,
}

#[async_trait]
impl SqlConnection for PgSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        debug!(sql = %sql, "Executing");
        // Simple query protocol: DDL with procedural bodies and
        // multi-statement chunks go through unprepared.
        let result = (&mut *self.conn).execute(sql).await?;
        Ok(result.rows_affected())
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        debug!(sql = %sql, "Querying");
        let rows = sqlx::query(sql).fetch_all(&mut *self.conn).await?;
        rows.iter().map(decode_pg_row).collect()
    }
}

#[async_trait]
impl ConnectionPool for PgPool {
    type Conn = PgSession;

    async fn acquire(&self) -> Result<Self::Conn> {
        let conn = sqlx::Pool::acquire(self).await?;
        Ok(PgSession { conn })
    }
}

fn decode_pg_row(row: &PgRow) -> Result<Row> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name();
        let value = match type_name {
            "BOOL" => row.try_get::<Option<bool>, _>(i)?.map(Value::Bool),
            "INT2" => row.try_get::<Option<i16>, _>(i)?.map(|v| Value::Int(v.into())),
            "INT4" => row.try_get::<Option<i32>, _>(i)?.map(|v| Value::Int(v.into())),
            "INT8" => row.try_get::<Option<i64>, _>(i)?.map(Value::Int),
            "NUMERIC" => row.try_get::<Option<Decimal>, _>(i)?.map(Value::Decimal),
            "FLOAT4" => row.try_get::<Option<f32>, _>(i)?.map(|v| Value::Float(v.into())),
            "FLOAT8" => row.try_get::<Option<f64>, _>(i)?.map(Value::Float),
            "DATE" => row.try_get::<Option<NaiveDate>, _>(i)?.map(Value::Date),
            "TIME" => row.try_get::<Option<NaiveTime>, _>(i)?.map(Value::Time),
            "TIMESTAMP" => row.try_get::<Option<NaiveDateTime>, _>(i)?.map(Value::Timestamp),
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(i)?
                .map(|v| Value::Timestamp(v.naive_utc())),
            "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(i)?.map(Value::Bytes),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
                row.try_get::<Option<String>, _>(i)?.map(Value::Text)
            }
            other => {
                return Err(DbError::Decode {
                    column: column.name().to_string(),
                    type_name: other.to_string(),
                })
            }
        };
        out.set(column.name(), value.unwrap_or(Value::Null));
    }
    Ok(out)
}

// ---- SQLite ----

/// Pooled SQLite connection.
pub struct SqliteSession {
    conn: PoolConnection<Sqlite>,
}

#[async_trait]
impl SqlConnection for SqliteSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        debug!(sql = %sql, "Executing");
        let result = (&mut *self.conn).execute(sql).await?;
        Ok(result.rows_affected())
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        debug!(sql = %sql, "Querying");
        let rows = sqlx::query(sql).fetch_all(&mut *self.conn).await?;
        rows.iter().map(decode_sqlite_row).collect()
    }
}

#[async_trait]
impl ConnectionPool for SqlitePool {
    type Conn = SqliteSession;

    async fn acquire(&self) -> Result<Self::Conn> {
        let conn = sqlx::Pool::acquire(self).await?;
        Ok(SqliteSession { conn })
    }
}

/// SQLite values are typed per value, not per column, so the storage
/// class of each value drives decoding.
fn decode_sqlite_row(row: &SqliteRow) -> Result<Row> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => Value::Int(row.try_get::<i64, _>(i)?),
                "REAL" => Value::Float(row.try_get::<f64, _>(i)?),
                "BLOB" => Value::Bytes(row.try_get::<Vec<u8>, _>(i)?),
                "TEXT" | "DATE" | "TIME" | "DATETIME" => Value::Text(row.try_get::<String, _>(i)?),
                _ => {
                    return Err(DbError::Decode {
                        column: column.name().to_string(),
                        type_name,
                    })
                }
            }
        };
        out.set(column.name(), value);
    }
    Ok(out)
}
