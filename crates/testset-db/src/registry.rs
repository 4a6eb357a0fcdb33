//! Test set registry - the named test sets of one test database.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use testset_core::test_set_key;

use crate::builder::TestSetBuilder;
use crate::config::{ApplyMode, TestDatabaseConfig};
use crate::error::TestSetError;
use crate::guard::GuardRelease;
use crate::session::DbSession;
use crate::test_set::TestSet;

struct RegisteredTestSet {
    name: String,
    test_set: Arc<dyn TestSet>,
}

/// Named test sets for one connection string.
///
/// Names are case-insensitive. Defining a name again replaces the earlier
/// test set.
pub struct TestSetRegistry {
    config: TestDatabaseConfig,
    test_sets: HashMap<String, RegisteredTestSet>,
}

impl TestSetRegistry {
    pub fn new(config: TestDatabaseConfig) -> Self {
        Self {
            config,
            test_sets: HashMap::new(),
        }
    }

    pub const fn config(&self) -> &TestDatabaseConfig {
        &self.config
    }

    pub fn connection_string(&self) -> &str {
        &self.config.connection_string
    }

    /// Build a test set with `setup` and register it under `name`.
    ///
    /// The test set is built right away; errors from `setup` (e.g. a missing
    /// script) are returned and nothing is registered.
    pub fn define<F, T>(&mut self, name: impl Into<String>, setup: F) -> Result<(), TestSetError>
    where
        F: FnOnce(TestSetBuilder) -> Result<T, TestSetError>,
        T: TestSet + 'static,
    {
        let test_set = setup(TestSetBuilder::new())?;
        self.insert(name, test_set);
        Ok(())
    }

    /// Register an already built test set under `name`.
    pub fn insert(&mut self, name: impl Into<String>, test_set: impl TestSet + 'static) {
        let name = name.into();
        let previous = self.test_sets.insert(
            test_set_key(&name),
            RegisteredTestSet {
                name: name.clone(),
                test_set: Arc::new(test_set),
            },
        );
        if let Some(previous) = previous {
            warn!(
                test_set = %name,
                previous = %previous.name,
                "Test set defined again; the new definition replaces the old one"
            );
        } else {
            debug!(test_set = %name, "Defined test set");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TestSet>> {
        self.test_sets
            .get(&test_set_key(name))
            .map(|registered| Arc::clone(&registered.test_set))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.test_sets.contains_key(&test_set_key(name))
    }

    /// Registered names as they were defined, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .test_sets
            .values()
            .map(|registered| registered.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.test_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.test_sets.is_empty()
    }

    /// Apply the test set registered under `name`.
    pub async fn apply(&self, name: &str) -> Result<(), TestSetError> {
        let test_set = self
            .get(name)
            .ok_or_else(|| TestSetError::UnknownTestSet(name.to_string()))?;

        info!(test_set = %name, mode = %self.config.apply_mode, "Applying test set");
        self.apply_test_set(test_set.as_ref()).await
    }

    /// Apply a test set on a fresh session that is closed afterwards.
    pub async fn apply_test_set(&self, test_set: &dyn TestSet) -> Result<(), TestSetError> {
        let mut session = DbSession::open(self.connection_string()).await?;

        let result = match self.config.apply_mode {
            ApplyMode::Direct => test_set
                .apply(session.connection())
                .await
                .map_err(TestSetError::from),
            ApplyMode::Atomic => apply_atomically(&mut session, test_set).await,
        };

        match session.close().await {
            Ok(()) => result,
            Err(close_err) => {
                warn!("Failed to close test set session: {close_err}");
                result.and(Err(close_err.into()))
            }
        }
    }
}

async fn apply_atomically(session: &mut DbSession, test_set: &dyn TestSet) -> Result<(), TestSetError> {
    session.begin_transaction().await?;

    match test_set.apply(session.connection()).await {
        Ok(()) => {
            if session.commit_transaction().await? == Some(GuardRelease::AlreadyEnded) {
                warn!("Test set ended the apply transaction itself; its changes may be partial");
            }
            Ok(())
        }
        Err(apply_err) => {
            if let Err(rollback_err) = session.rollback_transaction().await {
                warn!("Failed to roll back partially applied test set: {rollback_err}");
            }
            Err(apply_err.into())
        }
    }
}
