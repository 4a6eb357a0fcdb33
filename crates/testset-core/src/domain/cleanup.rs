//! Cleanup policies.
//!
//! A test declares how its database changes are undone. Declarations use
//! [`DeclaredCleanup`], which can defer to a less specific layer; resolution
//! always produces a concrete [`CleanupPolicy`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Concrete strategy for returning the database to a known state after a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    /// The database is left as-is.
    ///
    /// Only suitable for tests that don't modify the database.
    None,

    /// The test runs inside a transaction that is rolled back afterwards.
    ///
    /// Fast and usually the best choice, unless the code under test manages
    /// its own transactions.
    ByRollback,

    /// The test set is applied again before the next test.
    ///
    /// Slower than [`CleanupPolicy::ByRollback`], but doesn't interfere with
    /// transactions opened by the code under test.
    ByReinitialize,
}

impl CleanupPolicy {
    /// Returns true if the test is wrapped in a transaction guard.
    pub const fn uses_transaction(self) -> bool {
        matches!(self, Self::ByRollback)
    }

    /// Returns true if the next test must reapply its test set, regardless
    /// of name.
    pub const fn forces_reapply(self) -> bool {
        matches!(self, Self::ByReinitialize)
    }
}

impl fmt::Display for CleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::ByRollback => write!(f, "ByRollback"),
            Self::ByReinitialize => write!(f, "ByReinitialize"),
        }
    }
}

/// Cleanup policy as written on a suite, class or method declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredCleanup {
    /// Use the value from the less specific layer.
    #[default]
    Inherited,
    None,
    ByRollback,
    ByReinitialize,
}

impl DeclaredCleanup {
    /// Returns the concrete policy, or `None` for [`DeclaredCleanup::Inherited`].
    pub const fn resolved(self) -> Option<CleanupPolicy> {
        match self {
            Self::Inherited => None,
            Self::None => Some(CleanupPolicy::None),
            Self::ByRollback => Some(CleanupPolicy::ByRollback),
            Self::ByReinitialize => Some(CleanupPolicy::ByReinitialize),
        }
    }
}

impl From<CleanupPolicy> for DeclaredCleanup {
    fn from(policy: CleanupPolicy) -> Self {
        match policy {
            CleanupPolicy::None => Self::None,
            CleanupPolicy::ByRollback => Self::ByRollback,
            CleanupPolicy::ByReinitialize => Self::ByReinitialize,
        }
    }
}
