//! Domain types for database test sets.
//!
//! These are plain data types with no infrastructure dependencies.

pub mod cleanup;
pub mod declaration;
pub mod identity;
pub mod script;

pub use cleanup::{CleanupPolicy, DeclaredCleanup};
pub use declaration::{DEFAULT_TEST_SET_NAME, EffectiveSettings, TestSetDeclaration, test_set_key};
pub use identity::TestIdentity;
pub use script::{SqlScriptPart, parts_for_script, split_sql_script_on_go};
