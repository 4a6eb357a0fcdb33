//! Settings resolver - merges layered declarations into effective settings.
//!
//! Declarations are registered as plain data: suite-level declarations,
//! classes (optionally extending a base class) with their own declarations,
//! and the test methods of each class. Resolution walks
//! method -> class -> base classes -> suite -> fallback and picks the test
//! set name and the cleanup policy independently.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::domain::{
    CleanupPolicy, DEFAULT_TEST_SET_NAME, EffectiveSettings, TestIdentity, TestSetDeclaration,
};
use crate::error::{ManifestError, ResolutionError};

/// A registered test method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodRegistration {
    pub name: String,
    pub declarations: Vec<TestSetDeclaration>,
}

/// A registered test class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassRegistration {
    /// Class whose declarations and methods this class inherits.
    pub base: Option<String>,

    /// Class-level declarations, most important first.
    pub declarations: Vec<TestSetDeclaration>,

    /// Test methods defined on this class.
    pub methods: Vec<MethodRegistration>,
}

impl ClassRegistration {
    /// Add a class-level declaration.
    pub fn declare(&mut self, declaration: TestSetDeclaration) -> &mut Self {
        self.declarations.push(declaration);
        self
    }

    /// Set the base class.
    pub fn extends(&mut self, base: impl Into<String>) -> &mut Self {
        self.base = Some(base.into());
        self
    }

    /// Register a test method with its declarations.
    ///
    /// Registering the same name twice models an overload; resolving it
    /// fails with [`ResolutionError::Ambiguous`].
    pub fn method(
        &mut self,
        name: impl Into<String>,
        declarations: impl IntoIterator<Item = TestSetDeclaration>,
    ) -> &mut Self {
        self.methods.push(MethodRegistration {
            name: name.into(),
            declarations: declarations.into_iter().collect(),
        });
        self
    }
}

/// Registration table of suite, class and method declarations.
///
/// # Example
///
/// ```
/// use testset_core::{CleanupPolicy, SettingsResolver, TestIdentity, TestSetDeclaration};
///
/// let mut resolver = SettingsResolver::new();
/// resolver.declare_suite(TestSetDeclaration::named("Catalog"));
/// resolver
///     .register_class("acme::ProductTests")
///     .declare(TestSetDeclaration::with_cleanup(CleanupPolicy::ByReinitialize))
///     .method("adds_batch", []);
///
/// let settings = resolver
///     .resolve(&TestIdentity::new("acme::ProductTests", "adds_batch"))
///     .unwrap();
/// assert_eq!(settings.test_set_name, "Catalog");
/// assert_eq!(settings.cleanup, CleanupPolicy::ByReinitialize);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsResolver {
    suite: Vec<TestSetDeclaration>,
    classes: HashMap<String, ClassRegistration>,
}

impl SettingsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a registration table from JSON.
    ///
    /// ```json
    /// {
    ///   "suite": [{ "test_set_name": "Default" }],
    ///   "classes": {
    ///     "acme::ProductTests": {
    ///       "declarations": [{ "cleanup": "by_rollback" }],
    ///       "methods": [{ "name": "lists_products" }]
    ///     }
    ///   }
    /// }
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Add a suite-level declaration.
    pub fn declare_suite(&mut self, declaration: TestSetDeclaration) -> &mut Self {
        self.suite.push(declaration);
        self
    }

    /// Register a class, or return the existing registration.
    pub fn register_class(&mut self, class_name: impl Into<String>) -> &mut ClassRegistration {
        self.classes.entry(class_name.into()).or_default()
    }

    /// Register a class that extends `base`.
    pub fn register_class_with_base(
        &mut self,
        class_name: impl Into<String>,
        base: impl Into<String>,
    ) -> &mut ClassRegistration {
        let registration = self.register_class(class_name);
        registration.extends(base);
        registration
    }

    /// Register a test method on a class, registering the class if needed.
    pub fn register_method(
        &mut self,
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        declarations: impl IntoIterator<Item = TestSetDeclaration>,
    ) -> &mut Self {
        self.register_class(class_name)
            .method(method_name, declarations);
        self
    }

    /// Resolve the effective test set name and cleanup policy for a test.
    pub fn resolve(&self, identity: &TestIdentity) -> Result<EffectiveSettings, ResolutionError> {
        let chain = self.declaration_chain(identity)?;

        let test_set_name = chain
            .iter()
            .find_map(|decl| decl.test_set_name.clone())
            .unwrap_or_else(|| DEFAULT_TEST_SET_NAME.to_string());
        let cleanup = chain
            .iter()
            .find_map(|decl| decl.cleanup.resolved())
            .unwrap_or(CleanupPolicy::ByRollback);

        tracing::debug!(
            test = %identity,
            test_set = %test_set_name,
            policy = %cleanup,
            "Resolved effective test settings"
        );

        Ok(EffectiveSettings::new(test_set_name, cleanup))
    }

    /// All declarations that apply to a test, most specific first, ending
    /// with the `("Default", ByRollback)` fallback.
    pub fn declaration_chain(
        &self,
        identity: &TestIdentity,
    ) -> Result<Vec<TestSetDeclaration>, ResolutionError> {
        let classes = self.class_chain(&identity.class_name)?;
        let method = Self::find_method(&classes, identity)?;

        let mut chain: Vec<TestSetDeclaration> = method.declarations.clone();
        for (_, class) in &classes {
            chain.extend(class.declarations.iter().cloned());
        }
        chain.extend(self.suite.iter().cloned());
        chain.push(TestSetDeclaration::fallback());

        Ok(chain)
    }

    /// The class and its bases, most derived first.
    fn class_chain<'a>(
        &'a self,
        class_name: &'a str,
    ) -> Result<Vec<(&'a str, &'a ClassRegistration)>, ResolutionError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(class_name);

        while let Some(name) = next {
            if !seen.insert(name) {
                tracing::warn!(class = name, "Cycle in test class hierarchy, stopping");
                break;
            }
            let class = self
                .classes
                .get(name)
                .ok_or_else(|| ResolutionError::ClassNotFound {
                    class_name: name.to_string(),
                })?;
            chain.push((name, class));
            next = class.base.as_deref();
        }

        Ok(chain)
    }

    /// Finds the method on the most derived class that defines it.
    fn find_method<'a>(
        classes: &[(&str, &'a ClassRegistration)],
        identity: &TestIdentity,
    ) -> Result<&'a MethodRegistration, ResolutionError> {
        for (class_name, class) in classes {
            let mut matches = class
                .methods
                .iter()
                .filter(|m| m.name == identity.method_name);

            let Some(first) = matches.next() else {
                continue;
            };
            let extra = matches.count();
            if extra > 0 {
                return Err(ResolutionError::Ambiguous {
                    class_name: (*class_name).to_string(),
                    method_name: identity.method_name.clone(),
                    count: extra + 1,
                });
            }
            return Ok(first);
        }

        Err(ResolutionError::MethodNotFound {
            class_name: identity.class_name.clone(),
            method_name: identity.method_name.clone(),
        })
    }
}
