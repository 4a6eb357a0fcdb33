//! Database session - one connection, optionally inside a transaction guard.
//!
//! Every session opens its own connection from the connection string; sessions
//! are never pooled or reused between tests or test set applications.

use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{
    ConnectOptions, Connection, Executor, Row, SqliteConnection, TypeInfo, ValueRef,
};
use std::str::FromStr;
use tracing::debug;

use crate::error::TestSetError;
use crate::guard::{GuardRelease, GuardStatus, TransactionGuard};

/// The first column of the first row returned by a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl ScalarValue {
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        if row.columns().is_empty() {
            return Ok(Self::Null);
        }

        let type_name = {
            let raw = row.try_get_raw(0)?;
            if raw.is_null() {
                return Ok(Self::Null);
            }
            raw.type_info().name().to_string()
        };

        // Values carry their storage class, not the declared column type.
        Ok(match type_name.as_str() {
            "REAL" => Self::Real(row.try_get(0)?),
            "TEXT" => Self::Text(row.try_get(0)?),
            "BLOB" => Self::Blob(row.try_get(0)?),
            _ => Self::Integer(row.try_get(0)?),
        })
    }
}

/// An open connection used by one test or one test set application.
///
/// Statements run through the session keep the transaction guard's status in
/// sync with the database. When the database has ended the guarded
/// transaction on its own, the session detaches from it before running the
/// next statement, so verification queries keep working. From then on the
/// session autocommits: **changes made after detaching are not rolled back
/// by cleanup.** Only read-only verification queries should follow.
#[derive(Debug)]
pub struct DbSession {
    conn: SqliteConnection,
    guard: Option<TransactionGuard>,
}

impl DbSession {
    /// Open a new connection.
    pub async fn open(connection_string: &str) -> Result<Self, sqlx::Error> {
        let conn = SqliteConnectOptions::from_str(connection_string)?
            .connect()
            .await?;
        debug!("Opened database session");

        Ok(Self { conn, guard: None })
    }

    /// The raw connection, for handing to the code under test.
    ///
    /// Statements run directly on the connection bypass the status checks of
    /// [`DbSession::execute`]; call [`DbSession::refresh_transaction_status`]
    /// afterwards if the code under test may have ended the transaction.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    pub const fn guard(&self) -> Option<&TransactionGuard> {
        self.guard.as_ref()
    }

    /// Returns true while changes made on this session will be rolled back.
    pub fn in_transaction(&self) -> bool {
        self.guard.as_ref().is_some_and(TransactionGuard::is_active)
    }

    /// Begin the encapsulating transaction.
    pub(crate) async fn begin_transaction(&mut self) -> Result<(), sqlx::Error> {
        if self.guard.is_some() {
            debug!("Encapsulating transaction already open");
            return Ok(());
        }
        self.guard = Some(TransactionGuard::begin(&mut self.conn).await?);
        Ok(())
    }

    /// Roll back and release the transaction guard, if any.
    ///
    /// Returns `None` if the session had no guard.
    pub async fn rollback_transaction(&mut self) -> Result<Option<GuardRelease>, TestSetError> {
        match self.guard.take() {
            Some(guard) => guard
                .rollback(&mut self.conn)
                .await
                .map(Some)
                .map_err(TestSetError::GuardRelease),
            None => Ok(None),
        }
    }

    /// Commit and release the transaction guard, if any.
    pub async fn commit_transaction(&mut self) -> Result<Option<GuardRelease>, TestSetError> {
        match self.guard.take() {
            Some(guard) => guard
                .commit(&mut self.conn)
                .await
                .map(Some)
                .map_err(TestSetError::GuardRelease),
            None => Ok(None),
        }
    }

    /// Ask the database whether the guarded transaction is still open.
    pub async fn refresh_transaction_status(&mut self) -> Result<Option<GuardStatus>, TestSetError> {
        match self.guard.as_mut() {
            Some(guard) => Ok(Some(guard.sync_with(&mut self.conn).await?)),
            None => Ok(None),
        }
    }

    /// Execute one batch (one or more statements). Returns the affected rows.
    pub async fn execute(&mut self, sql: &str) -> Result<u64, TestSetError> {
        self.prepare_statement().await?;
        let result = (&mut self.conn).execute(sqlx::raw_sql(sql)).await?;
        Ok(result.rows_affected())
    }

    /// Execute one batch and return the first column of the first row, if any.
    pub async fn execute_scalar(&mut self, sql: &str) -> Result<Option<ScalarValue>, TestSetError> {
        self.prepare_statement().await?;
        let row = (&mut self.conn).fetch_optional(sqlx::raw_sql(sql)).await?;
        match row {
            Some(row) => Ok(Some(ScalarValue::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Current number of rows in `table`.
    pub async fn row_count(&mut self, table: &str) -> Result<i64, TestSetError> {
        self.prepare_statement().await?;
        let sql = format!("SELECT COUNT(1) FROM \"{}\"", table.replace('"', "\"\""));
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&mut self.conn).await?;
        Ok(count)
    }

    /// Close the connection.
    ///
    /// A guard that is still open is rolled back by the database as the
    /// connection closes.
    pub async fn close(self) -> Result<(), sqlx::Error> {
        drop(self.guard);
        self.conn.close().await?;
        debug!("Closed database session");
        Ok(())
    }

    /// Sync the guard and detach from it if the database ended it.
    async fn prepare_statement(&mut self) -> Result<(), TestSetError> {
        if let Some(guard) = self.guard.as_mut() {
            if guard.sync_with(&mut self.conn).await? == GuardStatus::Aborted {
                guard.detach();
            }
        }
        Ok(())
    }
}
