//! Session cache - what the previous test left in the database.
//!
//! Applying a test set is expensive, so consecutive tests that start from the
//! same test set skip it. The cache remembers the test set name and cleanup
//! policy of the most recent test and answers whether the next test has to
//! reapply.
//!
//! A cache is a cheap handle: clones share the same state. Hand one instance
//! to every fixture of a test run (or use [`SessionCache::process_wide`]).
//! The mutex only makes single reads and writes safe; whole test lifecycles
//! running in parallel on one cache still race, so parallel workers need one
//! cache (and one database) each.

use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use crate::domain::{CleanupPolicy, EffectiveSettings, test_set_key};

static PROCESS_WIDE: LazyLock<SessionCache> = LazyLock::new(SessionCache::new);

/// State remembered from the most recent test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RememberedState {
    /// Test set applied (or reused) by the most recent test.
    pub test_set_name: Option<String>,

    /// Cleanup policy used by the most recent test.
    pub cleanup: CleanupPolicy,

    /// Set when the database state is unknown, e.g. after a failed apply.
    pub invalidated: bool,
}

impl Default for RememberedState {
    fn default() -> Self {
        Self {
            test_set_name: None,
            cleanup: CleanupPolicy::None,
            invalidated: false,
        }
    }
}

impl RememberedState {
    /// Whether a test using `test_set_name` must apply it first.
    ///
    /// True if the name differs from the remembered one, if the previous test
    /// used [`CleanupPolicy::ByReinitialize`] (its changes were never undone),
    /// or if the state was invalidated. Names compare by [`test_set_key`],
    /// like test set registrations.
    pub fn needs_reapply(&self, test_set_name: &str) -> bool {
        if self.invalidated || self.cleanup.forces_reapply() {
            return true;
        }
        !self
            .test_set_name
            .as_deref()
            .is_some_and(|previous| test_set_key(previous) == test_set_key(test_set_name))
    }
}

/// Shared handle to the [`RememberedState`] of a test run.
#[derive(Debug, Clone, Default)]
pub struct SessionCache {
    state: Arc<Mutex<RememberedState>>,
}

impl SessionCache {
    /// Create an empty cache; the first test always applies its test set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by everything in this process.
    pub fn process_wide() -> Self {
        PROCESS_WIDE.clone()
    }

    /// Whether a test using `test_set_name` must apply it first.
    pub fn needs_reapply(&self, test_set_name: &str) -> bool {
        self.lock().needs_reapply(test_set_name)
    }

    /// Record the settings of a test whose initialization succeeded.
    pub fn remember(&self, settings: &EffectiveSettings) {
        let mut state = self.lock();
        state.test_set_name = Some(settings.test_set_name.clone());
        state.cleanup = settings.cleanup;
        state.invalidated = false;
    }

    /// Record the settings of a test whose test set failed to apply.
    ///
    /// The next test reapplies even if it uses the same name.
    pub fn remember_failed(&self, settings: &EffectiveSettings) {
        let mut state = self.lock();
        state.test_set_name = Some(settings.test_set_name.clone());
        state.cleanup = settings.cleanup;
        state.invalidated = true;
    }

    /// Force the next test to reapply its test set.
    pub fn invalidate(&self) {
        self.lock().invalidated = true;
    }

    /// Forget everything, as if no test had run yet.
    pub fn reset(&self) {
        *self.lock() = RememberedState::default();
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> RememberedState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, RememberedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
