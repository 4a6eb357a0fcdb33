use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one test as handed over by the test runner.
///
/// `class_name` is the fully qualified name of the grouping the test belongs
/// to (e.g. `acme::tests::ProductRepositoryTest`); `method_name` is the test
/// itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestIdentity {
    pub class_name: String,
    pub method_name: String,
}

impl TestIdentity {
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class_name, self.method_name)
    }
}
