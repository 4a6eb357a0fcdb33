//! Port definitions (trait abstractions) for test runner collaborators.
//!
//! # Design Rules
//!
//! - No `sqlx` types in any signature
//! - Sinks are synchronous and must not fail the test they report on

pub mod output_sink;

pub use output_sink::{
    BufferedOutputSink, NoopOutputSink, StdoutOutputSink, TestOutputSink, TracingOutputSink,
};
