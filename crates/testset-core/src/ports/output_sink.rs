//! Per-test output sink port.
//!
//! The lifecycle controller reports what it does for a test (applying a test
//! set, opening or rolling back the encapsulating transaction) through this
//! port, so the lines end up next to the test's own output.

use std::sync::{Mutex, PoisonError};

/// Port for appending human-readable lines to the current test's output.
///
/// Implementations should be thread-safe and non-blocking where possible.
pub trait TestOutputSink: Send + Sync {
    /// Append one line (without trailing newline).
    fn write_line(&self, line: &str);
}

/// Writes to stdout, which the Rust test harness captures per test.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutOutputSink;

impl TestOutputSink for StdoutOutputSink {
    fn write_line(&self, line: &str) {
        println!("{line}");
    }
}

/// Forwards lines to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingOutputSink;

impl TestOutputSink for TracingOutputSink {
    fn write_line(&self, line: &str) {
        tracing::info!(target: "testset::output", "{line}");
    }
}

/// Discards all lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOutputSink;

impl TestOutputSink for NoopOutputSink {
    fn write_line(&self, _line: &str) {
        // Intentionally do nothing
    }
}

/// Keeps all lines in memory, in order.
#[derive(Debug, Default)]
pub struct BufferedOutputSink {
    lines: Mutex<Vec<String>>,
}

impl BufferedOutputSink {
    pub const fn new() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of all lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes and returns all lines written so far.
    pub fn take_lines(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl TestOutputSink for BufferedOutputSink {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}
