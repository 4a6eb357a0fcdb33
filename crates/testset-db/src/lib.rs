#![doc = include_str!("../README.md")]

pub mod builder;
pub mod config;
pub mod error;
pub mod guard;
pub mod lifecycle;
pub mod registry;
pub mod session;
pub mod test_set;

// Re-export the types a test fixture needs
pub use builder::{SqlScriptTestSetBuilder, TestSetBuilder, UninitializedSqlScriptTestSetBuilder};
pub use config::{APPLY_MODE_ENV, ApplyMode, ConfigError, DATABASE_URL_ENV, TestDatabaseConfig};
pub use error::TestSetError;
pub use guard::{GuardRelease, GuardStatus, TransactionGuard};
pub use lifecycle::{DatabaseTestClass, LifecycleController, LifecyclePhase};
pub use registry::TestSetRegistry;
pub use session::{DbSession, ScalarValue};
pub use test_set::{SqlScriptTestSet, TestSet};
