//! Error types for settings resolution.

use thiserror::Error;

/// The test identity could not be mapped to exactly one registered test.
///
/// These are lookup failures, not policy failures: a registered test with
/// no declarations at all still resolves through the fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// No class with this name is registered.
    #[error("Couldn't locate the test class \"{class_name}\"")]
    ClassNotFound { class_name: String },

    /// The class (and its bases) don't register a method with this name.
    #[error("Couldn't locate the method \"{method_name}\" on test class \"{class_name}\"")]
    MethodNotFound {
        class_name: String,
        method_name: String,
    },

    /// More than one method with this name is registered on the class.
    #[error(
        "Method \"{method_name}\" on test class \"{class_name}\" is ambiguous ({count} registrations)"
    )]
    Ambiguous {
        class_name: String,
        method_name: String,
        count: usize,
    },
}

/// A declaration manifest could not be loaded.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Invalid declaration manifest: {0}")]
    Parse(#[from] serde_json::Error),
}
