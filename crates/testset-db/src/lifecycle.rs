//! Lifecycle controller - initializes and cleans up the database around one test.
//!
//! For every test the controller:
//!
//! 1. resolves the test's [`EffectiveSettings`] through the shared
//!    [`SettingsResolver`];
//! 2. applies the test set, unless the [`SessionCache`] says the previous
//!    test left the database in exactly that state;
//! 3. opens the test's [`DbSession`] and, under
//!    [`CleanupPolicy::ByRollback`](testset_core::CleanupPolicy::ByRollback),
//!    begins the encapsulating transaction on it.
//!
//! `cleanup` rolls the transaction back (it is never committed) and closes
//! the session.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use testset_core::{
    EffectiveSettings, SessionCache, SettingsResolver, StdoutOutputSink, TestIdentity,
    TestOutputSink,
};

use crate::config::TestDatabaseConfig;
use crate::error::TestSetError;
use crate::guard::GuardRelease;
use crate::registry::TestSetRegistry;
use crate::session::DbSession;

/// A test class that owns a test database.
///
/// Implementors name their database and define the test sets their tests
/// can declare.
pub trait DatabaseTestClass {
    fn config(&self) -> TestDatabaseConfig;

    /// Register the test sets of this class.
    fn define_test_sets(&self, _registry: &mut TestSetRegistry) -> Result<(), TestSetError> {
        Ok(())
    }
}

/// Where the controller stands in the current test's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Idle,
    Initialized,

    /// The last test was cleaned up; behaves like `Idle`.
    CleanedUp,
}

struct ActiveTest {
    identity: TestIdentity,
    settings: EffectiveSettings,
    session: DbSession,
}

pub struct LifecycleController {
    registry: TestSetRegistry,
    resolver: Arc<SettingsResolver>,
    cache: SessionCache,
    sink: Arc<dyn TestOutputSink>,
    phase: LifecyclePhase,
    active: Option<ActiveTest>,
}

impl LifecycleController {
    /// Create a controller writing its per-test output to stdout.
    pub fn new(registry: TestSetRegistry, resolver: Arc<SettingsResolver>, cache: SessionCache) -> Self {
        Self {
            registry,
            resolver,
            cache,
            sink: Arc::new(StdoutOutputSink),
            phase: LifecyclePhase::Idle,
            active: None,
        }
    }

    /// Build the registry of `class` and create a controller for it.
    pub fn for_test_class(
        class: &impl DatabaseTestClass,
        resolver: Arc<SettingsResolver>,
        cache: SessionCache,
    ) -> Result<Self, TestSetError> {
        let mut registry = TestSetRegistry::new(class.config());
        class.define_test_sets(&mut registry)?;
        debug!(test_sets = ?registry.names(), "Defined test sets for test class");

        Ok(Self::new(registry, resolver, cache))
    }

    #[must_use]
    pub fn with_output_sink(mut self, sink: Arc<dyn TestOutputSink>) -> Self {
        self.sink = sink;
        self
    }

    pub const fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub const fn registry(&self) -> &TestSetRegistry {
        &self.registry
    }

    pub const fn registry_mut(&mut self) -> &mut TestSetRegistry {
        &mut self.registry
    }

    pub const fn session_cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Settings of the initialized test.
    pub fn settings(&self) -> Option<&EffectiveSettings> {
        self.active.as_ref().map(|active| &active.settings)
    }

    /// Identity of the initialized test.
    pub fn current_test(&self) -> Option<&TestIdentity> {
        self.active.as_ref().map(|active| &active.identity)
    }

    /// Session of the initialized test.
    pub fn session(&mut self) -> Result<&mut DbSession, TestSetError> {
        self.active
            .as_mut()
            .map(|active| &mut active.session)
            .ok_or(TestSetError::NotInitialized)
    }

    /// Prepare the database for the test `identity`.
    ///
    /// If applying the test set or opening the session fails, the error is
    /// returned as-is, the controller stays idle and the next test reapplies
    /// its test set.
    pub async fn initialize(&mut self, identity: &TestIdentity) -> Result<(), TestSetError> {
        if let Some(active) = &self.active {
            return Err(TestSetError::AlreadyInitialized(active.identity.to_string()));
        }

        let settings = self.resolver.resolve(identity)?;
        debug!(
            test = %identity,
            test_set = %settings.test_set_name,
            policy = %settings.cleanup,
            "Resolved test settings"
        );

        if self.cache.needs_reapply(&settings.test_set_name) {
            self.sink
                .write_line(&format!("Applying test set \"{}\"...", settings.test_set_name));
            if let Err(e) = self.registry.apply(&settings.test_set_name).await {
                self.cache.remember_failed(&settings);
                return Err(e);
            }
        } else {
            debug!(test_set = %settings.test_set_name, "Reusing test set left by the previous test");
        }

        // The database may hold a freshly applied test set by now; a failure
        // below must not let the next test reuse whatever was remembered before.
        let session = match self.open_test_session(&settings).await {
            Ok(session) => session,
            Err(e) => {
                self.cache.remember_failed(&settings);
                return Err(e);
            }
        };

        self.cache.remember(&settings);
        info!(test = %identity, policy = %settings.cleanup, "Initialized test");

        self.active = Some(ActiveTest {
            identity: identity.clone(),
            settings,
            session,
        });
        self.phase = LifecyclePhase::Initialized;
        Ok(())
    }

    async fn open_test_session(&self, settings: &EffectiveSettings) -> Result<DbSession, TestSetError> {
        let mut session = DbSession::open(self.registry.connection_string()).await?;
        if settings.cleanup.uses_transaction() {
            self.sink.write_line("Beginning encapsulating transaction...");
            if let Err(e) = session.begin_transaction().await {
                if let Err(close_err) = session.close().await {
                    warn!("Failed to close test session: {close_err}");
                }
                return Err(e.into());
            }
        }
        Ok(session)
    }

    /// Undo the test's changes (if its policy does) and close its session.
    ///
    /// Does nothing if no test is initialized, so it can be called more than
    /// once.
    pub async fn cleanup(&mut self) -> Result<(), TestSetError> {
        let Some(ActiveTest {
            identity,
            mut session,
            ..
        }) = self.active.take()
        else {
            debug!("Cleanup called without an initialized test; nothing to do");
            return Ok(());
        };
        self.phase = LifecyclePhase::CleanedUp;

        let released = if session.guard().is_some() {
            self.sink.write_line("Rolling back encapsulating transaction...");
            session.rollback_transaction().await
        } else {
            Ok(None)
        };

        if let Err(e) = session.close().await {
            warn!(test = %identity, "Failed to close test session: {e}");
        }

        match released {
            Ok(Some(GuardRelease::AlreadyEnded)) => {
                // Whatever ran after the transaction ended is still in the database.
                warn!(
                    test = %identity,
                    "Encapsulating transaction had already ended; the next test reapplies its test set"
                );
                self.cache.invalidate();
                Ok(())
            }
            Ok(_) => {
                debug!(test = %identity, "Cleaned up test");
                Ok(())
            }
            // SQLite only fails a ROLLBACK on I/O errors or a lost database
            // file, which tests can't provoke on a live connection.
            Err(e) => {
                error!(test = %identity, "Failed to roll back encapsulating transaction: {e}");
                self.sink
                    .write_line(&format!("Failed to roll back encapsulating transaction: {e}"));
                self.cache.invalidate();
                Err(e)
            }
        }
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        warn!(
            test = %active.identity,
            "Lifecycle controller dropped without cleanup; closing the session rolls back its transaction"
        );
        // Changes of a test without a transaction stay behind.
        self.cache.invalidate();

        let mut session = active.session;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = session.rollback_transaction().await {
                    warn!("Failed to roll back transaction of dropped test: {e}");
                }
                if let Err(e) = session.close().await {
                    warn!("Failed to close session of dropped test: {e}");
                }
            });
        }
    }
}
