#![doc = include_str!("../README.md")]

pub mod domain;
pub mod error;
pub mod ports;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::{
    CleanupPolicy, DEFAULT_TEST_SET_NAME, DeclaredCleanup, EffectiveSettings, SqlScriptPart,
    TestIdentity, TestSetDeclaration, split_sql_script_on_go, test_set_key,
};
pub use error::{ManifestError, ResolutionError};
pub use ports::{
    BufferedOutputSink, NoopOutputSink, StdoutOutputSink, TestOutputSink, TracingOutputSink,
};
pub use services::{RememberedState, SessionCache, SettingsResolver};
