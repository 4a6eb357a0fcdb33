//! Layered test set declarations and their resolved form.

use serde::{Deserialize, Serialize};

use super::cleanup::{CleanupPolicy, DeclaredCleanup};

/// Test set name used when no layer declares one.
pub const DEFAULT_TEST_SET_NAME: &str = "Default";

/// Key that test set names are compared and registered by.
///
/// Names are case-insensitive, with full Unicode lowercasing.
pub fn test_set_key(test_set_name: &str) -> String {
    test_set_name.to_lowercase()
}

/// One declaration on the suite, class or method level.
///
/// Both fields are optional: an absent name or an `Inherited` policy defers
/// to the next less specific declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestSetDeclaration {
    /// Name of the test set to apply before the test.
    pub test_set_name: Option<String>,

    /// How to undo the test's database changes.
    pub cleanup: DeclaredCleanup,
}

impl TestSetDeclaration {
    /// Declare both a test set name and a cleanup policy.
    pub fn new(test_set_name: impl Into<String>, cleanup: impl Into<DeclaredCleanup>) -> Self {
        Self {
            test_set_name: Some(test_set_name.into()),
            cleanup: cleanup.into(),
        }
    }

    /// Declare only a test set name; the policy is inherited.
    pub fn named(test_set_name: impl Into<String>) -> Self {
        Self {
            test_set_name: Some(test_set_name.into()),
            cleanup: DeclaredCleanup::Inherited,
        }
    }

    /// Declare only a cleanup policy; the name is inherited.
    pub fn with_cleanup(cleanup: impl Into<DeclaredCleanup>) -> Self {
        Self {
            test_set_name: None,
            cleanup: cleanup.into(),
        }
    }

    /// The lowest-priority declaration every resolution falls back to.
    pub(crate) fn fallback() -> Self {
        Self::new(DEFAULT_TEST_SET_NAME, CleanupPolicy::ByRollback)
    }
}

/// The resolved test set name and cleanup policy for one test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveSettings {
    pub test_set_name: String,
    pub cleanup: CleanupPolicy,
}

impl EffectiveSettings {
    pub fn new(test_set_name: impl Into<String>, cleanup: CleanupPolicy) -> Self {
        Self {
            test_set_name: test_set_name.into(),
            cleanup,
        }
    }
}
