//! SQL script model.
//!
//! Scripts are split into batches on the `GO` separator. `GO` is not SQL;
//! it is a client-side convention from SQL Server tooling that many seed
//! scripts still use.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// A standalone, case-insensitive `GO` with whitespace or line breaks on both
/// sides (or at the very end of the script). Repeated separators match as one.
static GO_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+GO(?:\s+GO)*(?:\s+|\z)").expect("GO separator pattern is valid")
});

/// One executable batch of a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlScriptPart {
    /// Name of the script this part came from.
    pub script_name: String,

    /// 1-based position of this part within its script.
    pub part_nr: usize,

    /// SQL text, executed as a single batch.
    pub contents: String,
}

impl SqlScriptPart {
    pub fn new(script_name: impl Into<String>, part_nr: usize, contents: impl Into<String>) -> Self {
        Self {
            script_name: script_name.into(),
            part_nr,
            contents: contents.into(),
        }
    }
}

/// Splits a script into batches on standalone `GO` lines.
///
/// Empty and whitespace-only batches are dropped.
pub fn split_sql_script_on_go(sql_script: &str) -> Vec<String> {
    GO_SEPARATOR
        .split(sql_script)
        .filter(|part| !part.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Splits a script and numbers its parts from 1.
pub fn parts_for_script(script_name: &str, sql_script: &str) -> Vec<SqlScriptPart> {
    split_sql_script_on_go(sql_script)
        .into_iter()
        .enumerate()
        .map(|(index, contents)| SqlScriptPart::new(script_name, index + 1, contents))
        .collect()
}
