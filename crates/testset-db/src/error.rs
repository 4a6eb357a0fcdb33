//! Error type for test set registration, application and test lifecycles.
//!
//! Database errors are passed through untouched (`#[error(transparent)]`) so
//! tests can assert on the engine's own error, e.g. a unique constraint
//! violation raised while a test set is applied.

use std::path::PathBuf;
use thiserror::Error;

use testset_core::ResolutionError;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum TestSetError {
    /// A test set was applied by a name that was never defined.
    #[error("No test set found with name \"{0}\"")]
    UnknownTestSet(String),

    /// The test identity didn't map to exactly one registered test.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The database rejected a statement, or a session could not be opened.
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// Rolling back (or committing) the encapsulating transaction failed.
    #[error("Failed to release the encapsulating transaction: {0}")]
    GuardRelease(#[source] sqlx::Error),

    /// A script selected for a test set doesn't exist.
    #[error("No SQL script found named \"{0}\"")]
    ScriptNotFound(String),

    /// A script file could not be read.
    #[error("Failed to read SQL script {path}: {reason}")]
    ScriptRead { path: PathBuf, reason: String },

    /// `initialize` was called again without `cleanup` in between.
    #[error("Test {0} is already initialized; call cleanup first")]
    AlreadyInitialized(String),

    /// A test session was requested outside `initialize` .. `cleanup`.
    #[error("No test is initialized")]
    NotInitialized,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TestSetError {
    /// The engine's error, if this error came from the database.
    pub fn as_database_error(&self) -> Option<&(dyn sqlx::error::DatabaseError + 'static)> {
        match self {
            Self::Database(e) | Self::GuardRelease(e) => e.as_database_error(),
            _ => None,
        }
    }

    /// Returns true if the database reported a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        self.as_database_error()
            .is_some_and(|e| e.is_unique_violation())
    }
}
