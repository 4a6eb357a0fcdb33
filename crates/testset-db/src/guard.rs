//! Transaction guard - the encapsulating transaction of one test.
//!
//! A guard is opened with `BEGIN` on a session's connection and released
//! exactly once: [`TransactionGuard::rollback`] and
//! [`TransactionGuard::commit`] consume it. A guard that is dropped while
//! still active is released implicitly when its connection closes (`SQLite`
//! rolls back any open transaction on close).
//!
//! `SQLite` can end a transaction on its own (`INSERT OR ROLLBACK`,
//! `RAISE(ROLLBACK, ...)` in a trigger, some I/O errors). The guard notices
//! this through [`TransactionGuard::sync_with`] and becomes
//! [`GuardStatus::Aborted`]; once the session detaches from it, nothing run on
//! that session is covered by the cleanup rollback anymore.

use sqlx::{Executor, SqliteConnection};
use tracing::{debug, warn};

/// Where the guarded transaction currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStatus {
    /// The transaction is open and will be rolled back on release.
    Active,

    /// The database ended the transaction; the session is not detached yet.
    Aborted,

    /// The session was detached from the aborted transaction.
    ///
    /// Statements run after this point are autocommitted.
    Detached,
}

/// How a guard was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardRelease {
    RolledBack,
    Committed,

    /// The database had already ended the transaction; nothing was sent.
    AlreadyEnded,
}

/// Owned handle to the encapsulating transaction of a test.
#[derive(Debug)]
pub struct TransactionGuard {
    status: GuardStatus,
    released: bool,
}

impl TransactionGuard {
    /// Begin a transaction on `conn`.
    pub(crate) async fn begin(conn: &mut SqliteConnection) -> Result<Self, sqlx::Error> {
        (&mut *conn).execute(sqlx::raw_sql("BEGIN")).await?;
        debug!("Began encapsulating transaction");

        Ok(Self {
            status: GuardStatus::Active,
            released: false,
        })
    }

    pub const fn status(&self) -> GuardStatus {
        self.status
    }

    /// Returns true while statements on the session are covered by the rollback.
    pub const fn is_active(&self) -> bool {
        matches!(self.status, GuardStatus::Active)
    }

    /// Check whether the database still has the transaction open, and mark
    /// the guard aborted if it doesn't.
    pub(crate) async fn sync_with(
        &mut self,
        conn: &mut SqliteConnection,
    ) -> Result<GuardStatus, sqlx::Error> {
        if self.status == GuardStatus::Active && !transaction_is_open(conn).await? {
            warn!("Encapsulating transaction was ended by the database");
            self.status = GuardStatus::Aborted;
        }
        Ok(self.status)
    }

    /// Detach from an aborted transaction. Returns true if the status changed.
    pub(crate) fn detach(&mut self) -> bool {
        if self.status != GuardStatus::Aborted {
            return false;
        }
        warn!("Detaching session from aborted transaction; later changes will not be rolled back");
        self.status = GuardStatus::Detached;
        true
    }

    /// Roll back the transaction and release the guard.
    pub(crate) async fn rollback(
        mut self,
        conn: &mut SqliteConnection,
    ) -> Result<GuardRelease, sqlx::Error> {
        let outcome = match self.sync_with(conn).await? {
            GuardStatus::Active => {
                (&mut *conn).execute(sqlx::raw_sql("ROLLBACK")).await?;
                debug!("Rolled back encapsulating transaction");
                GuardRelease::RolledBack
            }
            GuardStatus::Aborted | GuardStatus::Detached => {
                debug!(status = ?self.status, "Encapsulating transaction already ended");
                GuardRelease::AlreadyEnded
            }
        };
        self.released = true;
        Ok(outcome)
    }

    /// Commit the transaction and release the guard.
    ///
    /// A transaction the database already ended can't be committed; the guard
    /// is released and `AlreadyEnded` is returned so the caller can decide.
    pub(crate) async fn commit(
        mut self,
        conn: &mut SqliteConnection,
    ) -> Result<GuardRelease, sqlx::Error> {
        let outcome = match self.sync_with(conn).await? {
            GuardStatus::Active => {
                (&mut *conn).execute(sqlx::raw_sql("COMMIT")).await?;
                debug!("Committed encapsulating transaction");
                GuardRelease::Committed
            }
            GuardStatus::Aborted | GuardStatus::Detached => GuardRelease::AlreadyEnded,
        };
        self.released = true;
        Ok(outcome)
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if !self.released && self.is_active() {
            warn!("Transaction guard dropped without release; closing its connection rolls it back");
        }
    }
}

/// `BEGIN` only succeeds outside a transaction. The probe transaction it
/// opens is rolled back immediately.
async fn transaction_is_open(conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    if (&mut *conn).execute(sqlx::raw_sql("BEGIN")).await.is_err() {
        return Ok(true);
    }
    (&mut *conn).execute(sqlx::raw_sql("ROLLBACK")).await?;
    Ok(false)
}
