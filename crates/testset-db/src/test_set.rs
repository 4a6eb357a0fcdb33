//! Test sets - reusable procedures that put the database in a known state.

use async_trait::async_trait;
use sqlx::{Executor, SqliteConnection};
use tracing::debug;

use testset_core::SqlScriptPart;
use testset_core::domain::parts_for_script;

/// A set of test data the database can be initialized with.
///
/// Applying a test set on a clean baseline must always reach the same state.
/// Nothing is guaranteed when it is applied on top of leftovers from a test
/// that wasn't cleaned up; scripts usually start by dropping what they create.
///
/// Run statements through the [`Executor`] methods of the connection, e.g.
/// `(&mut *conn).execute(sqlx::raw_sql(sql))`. The returned future must be
/// `Send`, and `sqlx::raw_sql(sql).execute(&mut *conn)` isn't.
#[async_trait]
pub trait TestSet: Send + Sync {
    /// Fill the database behind `conn` with this test set.
    ///
    /// The first failing statement aborts the apply and its error is
    /// returned unchanged.
    async fn apply(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error>;
}

/// A test set that executes one or more SQL scripts, split on `GO`.
#[derive(Debug, Clone, Default)]
pub struct SqlScriptTestSet {
    parts: Vec<SqlScriptPart>,
}

impl SqlScriptTestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `contents` on `GO` and append its parts, numbered from 1.
    pub fn add_sql_script(&mut self, script_name: &str, contents: &str) {
        self.parts.extend(parts_for_script(script_name, contents));
    }

    /// Builder-style [`SqlScriptTestSet::add_sql_script`].
    #[must_use]
    pub fn with_sql_script(mut self, script_name: &str, contents: &str) -> Self {
        self.add_sql_script(script_name, contents);
        self
    }

    /// All parts, in execution order.
    pub fn parts(&self) -> &[SqlScriptPart] {
        &self.parts
    }
}

#[async_trait]
impl TestSet for SqlScriptTestSet {
    async fn apply(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        for part in &self.parts {
            debug!(script = %part.script_name, part = part.part_nr, "Executing script part");
            (&mut *conn).execute(sqlx::raw_sql(&part.contents)).await?;
        }
        Ok(())
    }
}
