//! Builders for script-based test sets.
//!
//! [`TestSetRegistry::define`](crate::TestSetRegistry::define) hands a
//! [`TestSetBuilder`] to its setup closure:
//!
//! ```no_run
//! # use testset_db::{TestDatabaseConfig, TestSetRegistry};
//! # fn example() -> Result<(), testset_db::TestSetError> {
//! let mut registry = TestSetRegistry::new(TestDatabaseConfig::new("sqlite://test.db"));
//! registry.define("Orders", |setup| {
//!     setup
//!         .from_sql_script_dir("tests/scripts")
//!         .with_names_matching(|name| name.starts_with("orders_"))
//!         .build()
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! Scripts are selected first (`all`, `with_names_matching` or `select`) and
//! read when `build` is called.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::TestSetError;
use crate::test_set::SqlScriptTestSet;

/// Entry point passed to the setup closure of `define`.
#[derive(Debug)]
pub struct TestSetBuilder {
    _private: (),
}

impl TestSetBuilder {
    pub(crate) const fn new() -> Self {
        Self { _private: () }
    }

    /// Use `.sql` files from a directory.
    pub fn from_sql_script_dir(self, dir: impl Into<PathBuf>) -> UninitializedSqlScriptTestSetBuilder {
        UninitializedSqlScriptTestSetBuilder {
            source: ScriptSource::Directory(dir.into()),
        }
    }

    /// Use every `.sql` file from a directory, sorted by file name.
    pub fn from_all_sql_scripts_in(self, dir: impl Into<PathBuf>) -> SqlScriptTestSetBuilder {
        self.from_sql_script_dir(dir).all()
    }

    /// Use scripts compiled into the test binary, e.g. with `include_str!`.
    pub fn from_embedded_sql_scripts<I, N, S>(self, scripts: I) -> UninitializedSqlScriptTestSetBuilder
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        UninitializedSqlScriptTestSetBuilder {
            source: ScriptSource::Embedded(
                scripts
                    .into_iter()
                    .map(|(name, contents)| (name.into(), contents.into()))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone)]
enum ScriptSource {
    Directory(PathBuf),
    Embedded(Vec<(String, String)>),
}

impl ScriptSource {
    fn names(&self) -> Result<Vec<String>, TestSetError> {
        match self {
            Self::Directory(dir) => list_sql_files(dir),
            Self::Embedded(scripts) => Ok(scripts.iter().map(|(name, _)| name.clone()).collect()),
        }
    }

    fn read(&self, name: &str) -> Result<String, TestSetError> {
        match self {
            Self::Directory(dir) => {
                let path = dir.join(name);
                if !path.is_file() {
                    return Err(TestSetError::ScriptNotFound(name.to_string()));
                }
                fs::read_to_string(&path).map_err(|e| TestSetError::ScriptRead {
                    path,
                    reason: e.to_string(),
                })
            }
            Self::Embedded(scripts) => scripts
                .iter()
                .find(|(script_name, _)| script_name == name)
                .map(|(_, contents)| contents.clone())
                .ok_or_else(|| TestSetError::ScriptNotFound(name.to_string())),
        }
    }
}

fn list_sql_files(dir: &Path) -> Result<Vec<String>, TestSetError> {
    let read_error = |e: std::io::Error| TestSetError::ScriptRead {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();
        let is_sql = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"));
        if path.is_file() && is_sql {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// A script source whose scripts haven't been selected yet.
#[derive(Debug, Clone)]
pub struct UninitializedSqlScriptTestSetBuilder {
    source: ScriptSource,
}

impl UninitializedSqlScriptTestSetBuilder {
    /// Use all scripts, sorted by name.
    pub fn all(self) -> SqlScriptTestSetBuilder {
        self.with_names_matching(|_| true)
    }

    /// Use the scripts whose name matches `predicate`, sorted by name.
    pub fn with_names_matching(
        self,
        predicate: impl Fn(&str) -> bool,
    ) -> SqlScriptTestSetBuilder {
        let selection = self.source.names().map(|names| {
            let mut selected: Vec<String> =
                names.into_iter().filter(|name| predicate(name.as_str())).collect();
            selected.sort();
            selected
        });
        SqlScriptTestSetBuilder {
            source: self.source,
            selection,
        }
    }

    /// Let the caller pick scripts and their order from all available names.
    pub fn select(self, choose: impl FnOnce(Vec<String>) -> Vec<String>) -> SqlScriptTestSetBuilder {
        let selection = self.source.names().map(choose);
        SqlScriptTestSetBuilder {
            source: self.source,
            selection,
        }
    }
}

/// A script source with selected scripts, ready to [`build`](Self::build).
#[derive(Debug)]
pub struct SqlScriptTestSetBuilder {
    source: ScriptSource,
    selection: Result<Vec<String>, TestSetError>,
}

impl SqlScriptTestSetBuilder {
    /// Read the selected scripts, in selection order.
    pub fn build(self) -> Result<SqlScriptTestSet, TestSetError> {
        let mut test_set = SqlScriptTestSet::new();
        for name in self.selection? {
            let contents = self.source.read(&name)?;
            test_set.add_sql_script(&name, &contents);
        }
        Ok(test_set)
    }
}
