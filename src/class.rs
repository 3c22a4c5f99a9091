//! Test classes: a fixture type plus the methods registered against it.
//!
//! Rust has no runtime reflection, so discovery is explicit. A
//! [`TestClass`] records ordinary tests, concurrent tests, and before/after
//! hooks in registration order. The engine only ever sees the class through
//! the object-safe [`TargetClass`] view, looked up by name in a
//! [`ClassRegistry`].
//!
//! ```
//! use weft::{class::TestClass, failure::TestOutcome};
//!
//! #[derive(Default)]
//! struct Counter {
//!     value: u32,
//! }
//!
//! fn reset(counter: &mut Counter) -> TestOutcome {
//!     counter.value = 0;
//!     Ok(())
//! }
//!
//! fn increments(counter: &mut Counter) -> TestOutcome {
//!     counter.value += 1;
//!     assert_eq!(counter.value, 1);
//!     Ok(())
//! }
//!
//! let class = TestClass::<Counter>::new()
//!     .before("reset", reset)
//!     .concurrent_test("increments", increments);
//! assert_eq!(class.methods().len(), 2);
//! ```

use std::{
    any::type_name,
    collections::{HashMap, HashSet},
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, RwLock},
};

use thiserror::Error;

use crate::{
    descriptor::{MethodDescriptor, MethodKind},
    engine::explorer::failure_from_panic,
    failure::{ExpectedFailure, TestOutcome},
    lifecycle::{CheckedRun, LifecyclePlan},
    payload::CheckedTest,
};

/// Body of a test or lifecycle method.
pub type MethodBody<T> = fn(&mut T) -> TestOutcome;

/// Invocation parameters that are wrong before any test code runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A method was referenced that the class does not declare.
    #[error("class {class} does not declare method {method}")]
    UndeclaredMethod {
        /// Class name.
        class: String,
        /// Method name.
        method: String,
    },
    /// A method descriptor names a different class than the target.
    #[error("method {method} belongs to class {owner}, not to {class}")]
    ForeignMethod {
        /// Class under test.
        class: String,
        /// Method name.
        method: String,
        /// Class named by the descriptor.
        owner: String,
    },
    /// A method was used in a role it was not registered for.
    #[error("method {method} of class {class} is a {actual:?} method, not a {wanted:?} method")]
    WrongKind {
        /// Class name.
        class: String,
        /// Method name.
        method: String,
        /// Role requested by the payload.
        wanted: MethodKind,
        /// Role the method was registered with.
        actual: MethodKind,
    },
    /// An expected failure type is not known to the class.
    #[error("class {class} declares no expected failure of type {type_name}")]
    UnknownFailureType {
        /// Class name.
        class: String,
        /// Failure type name from the payload.
        type_name: String,
    },
    /// The class failed validation.
    #[error("class {class} is invalid: {}", problems.join("; "))]
    InvalidClass {
        /// Class name.
        class: String,
        /// Every problem found.
        problems: Vec<String>,
    },
}

/// A method registered on a [`TestClass`].
pub struct TestMethod<T> {
    descriptor: MethodDescriptor,
    kind: MethodKind,
    body: MethodBody<T>,
    expected: Option<ExpectedFailure>,
}

impl<T: 'static> TestMethod<T> {
    /// Create a method of `kind` named `name` on the class of fixture `T`.
    #[must_use]
    pub fn new(kind: MethodKind, name: &'static str, body: MethodBody<T>) -> Self {
        Self {
            descriptor: MethodDescriptor::new(type_name::<T>(), name),
            kind,
            body,
            expected: None,
        }
    }

    /// Declare the failure this test is expected to raise.
    #[must_use]
    pub fn expecting(mut self, expected: ExpectedFailure) -> Self {
        self.expected = Some(expected);
        self
    }
}

impl<T> TestMethod<T> {
    /// Class and name of this method.
    #[must_use]
    pub const fn descriptor(&self) -> &MethodDescriptor { &self.descriptor }

    /// Simple method name.
    #[must_use]
    pub const fn name(&self) -> &'static str { self.descriptor.name() }

    /// Role of this method.
    #[must_use]
    pub const fn kind(&self) -> MethodKind { self.kind }

    /// Declared expected failure, if any.
    #[must_use]
    pub const fn expected(&self) -> Option<&ExpectedFailure> { self.expected.as_ref() }

    /// Run the body against `fixture`, turning a panic of the body into a
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns the failure raised by the body.
    ///
    /// # Panics
    ///
    /// Resumes a panic raised by loom's runtime while exploring, so the
    /// exploration reports it as a violation.
    pub fn invoke(&self, fixture: &mut T) -> TestOutcome {
        catch_unwind(AssertUnwindSafe(|| (self.body)(fixture)))
            .unwrap_or_else(|payload| Err(failure_from_panic(payload)))
    }
}

impl<T> Clone for TestMethod<T> {
    fn clone(&self) -> Self { *self }
}

impl<T> Copy for TestMethod<T> {}

impl<T> PartialEq for TestMethod<T> {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor && self.kind == other.kind
    }
}

impl<T> fmt::Debug for TestMethod<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestMethod")
            .field("descriptor", &self.descriptor)
            .field("kind", &self.kind)
            .field("expected", &self.expected)
            .finish_non_exhaustive()
    }
}

/// The methods registered for fixture type `T`.
///
/// The class name is `std::any::type_name::<T>()`; a fresh `T::default()`
/// is built for every run of a test.
pub struct TestClass<T> {
    methods: Vec<TestMethod<T>>,
    failures: Vec<ExpectedFailure>,
}

impl<T> Clone for TestClass<T> {
    fn clone(&self) -> Self {
        Self {
            methods: self.methods.clone(),
            failures: self.failures.clone(),
        }
    }
}

impl<T> fmt::Debug for TestClass<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestClass")
            .field("class", &type_name::<T>())
            .field("methods", &self.methods)
            .field("failures", &self.failures)
            .finish()
    }
}

impl<T: 'static> Default for TestClass<T> {
    fn default() -> Self { Self::new() }
}

impl<T: 'static> TestClass<T> {
    /// An empty class.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            methods: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Register `method`.
    #[must_use]
    pub fn with(mut self, method: TestMethod<T>) -> Self {
        self.methods.push(method);
        self
    }

    /// Register an ordinary test.
    #[must_use]
    pub fn test(self, name: &'static str, body: MethodBody<T>) -> Self {
        self.with(TestMethod::new(MethodKind::Test, name, body))
    }

    /// Register a test to run under interleaving exploration.
    #[must_use]
    pub fn concurrent_test(self, name: &'static str, body: MethodBody<T>) -> Self {
        self.with(TestMethod::new(MethodKind::Concurrent, name, body))
    }

    /// Register a before-method.
    #[must_use]
    pub fn before(self, name: &'static str, body: MethodBody<T>) -> Self {
        self.with(TestMethod::new(MethodKind::Before, name, body))
    }

    /// Register an after-method.
    #[must_use]
    pub fn after(self, name: &'static str, body: MethodBody<T>) -> Self {
        self.with(TestMethod::new(MethodKind::After, name, body))
    }

    /// Declare a failure type that payloads may name as expected.
    ///
    /// Expectations attached with [`TestMethod::expecting`] are declared
    /// already. A checked wrapper running in another process only resolves
    /// the failure types its classes declare.
    #[must_use]
    pub fn declares_failure<E>(mut self) -> Self
    where
        E: std::error::Error + 'static,
    {
        self.failures.push(ExpectedFailure::of::<E>());
        self
    }

    /// Class name.
    #[must_use]
    pub fn name(&self) -> &'static str { type_name::<T>() }
}

impl<T> TestClass<T> {
    /// Every method in registration order.
    #[must_use]
    pub fn methods(&self) -> &[TestMethod<T>] { &self.methods }

    /// Methods of `kind` in registration order.
    pub fn methods_of(&self, kind: MethodKind) -> impl Iterator<Item = &TestMethod<T>> {
        self.methods.iter().filter(move |m| m.kind == kind)
    }

    /// Look a method up by name.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&TestMethod<T>> {
        self.methods.iter().find(|m| m.name() == name)
    }

    /// Problems that make the class unusable; empty when it is valid.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen = HashSet::new();
        for method in &self.methods {
            if method.name().is_empty() {
                problems.push(format!("a {:?} method has an empty name", method.kind));
            }
            if !seen.insert(method.name()) {
                problems.push(format!("method {} is registered more than once", method.name()));
            }
            if method.expected.is_some() && !method.kind.is_test() {
                problems.push(format!(
                    "{:?} method {} cannot declare an expected failure",
                    method.kind,
                    method.name()
                ));
            }
        }
        problems
    }

    fn known_failure(&self, wanted: &str) -> Option<ExpectedFailure> {
        self.methods
            .iter()
            .filter_map(|m| m.expected)
            .chain(self.failures.iter().copied())
            .chain(std::iter::once(ExpectedFailure::panic()))
            .find(|known| known.type_name() == wanted)
            .or_else(|| ExpectedFailure::recall(wanted))
    }

    fn resolve_method(
        &self,
        class: &str,
        name: &str,
        wanted: MethodKind,
    ) -> Result<TestMethod<T>, ConfigurationError> {
        let method = self
            .method(name)
            .ok_or_else(|| ConfigurationError::UndeclaredMethod {
                class: class.to_owned(),
                method: name.to_owned(),
            })?;
        let compatible = match wanted {
            MethodKind::Test | MethodKind::Concurrent => method.kind.is_test(),
            MethodKind::Before | MethodKind::After => method.kind == wanted,
        };
        if compatible {
            Ok(*method)
        } else {
            Err(ConfigurationError::WrongKind {
                class: class.to_owned(),
                method: name.to_owned(),
                wanted,
                actual: method.kind,
            })
        }
    }
}

fn check_owner(class: &str, method: &MethodDescriptor) -> Result<(), ConfigurationError> {
    if method.class() == class {
        Ok(())
    } else {
        Err(ConfigurationError::ForeignMethod {
            class: class.to_owned(),
            method: method.name().to_owned(),
            owner: method.class().to_owned(),
        })
    }
}

/// Object-safe view of a test class used by payload building and engines.
pub trait TargetClass: Send + Sync {
    /// Class name, as carried in payloads.
    fn class_name(&self) -> &'static str;

    /// Whether the class declares a method called `method`.
    fn declares(&self, method: &str) -> bool;

    /// Check that `test`, `befores` and `afters` belong to this class and
    /// are registered in the roles they are used in.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found.
    fn validate(
        &self,
        test: &MethodDescriptor,
        befores: &[MethodDescriptor],
        afters: &[MethodDescriptor],
    ) -> Result<(), ConfigurationError>;

    /// Resolve the names in `test` into something the engine can run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when a name does not resolve.
    fn resolve(&self, test: &CheckedTest) -> Result<Box<dyn CheckedRun>, ConfigurationError>;
}

impl<T> TargetClass for TestClass<T>
where
    T: Default + 'static,
{
    fn class_name(&self) -> &'static str { self.name() }

    fn declares(&self, method: &str) -> bool { self.method(method).is_some() }

    fn validate(
        &self,
        test: &MethodDescriptor,
        befores: &[MethodDescriptor],
        afters: &[MethodDescriptor],
    ) -> Result<(), ConfigurationError> {
        let class = self.name();
        let roles = std::iter::once((test, MethodKind::Concurrent))
            .chain(befores.iter().map(|m| (m, MethodKind::Before)))
            .chain(afters.iter().map(|m| (m, MethodKind::After)));
        for (method, wanted) in roles {
            check_owner(class, method)?;
            self.resolve_method(class, method.name(), wanted)?;
        }
        Ok(())
    }

    fn resolve(&self, test: &CheckedTest) -> Result<Box<dyn CheckedRun>, ConfigurationError> {
        let class = self.name();
        let befores = test
            .before_methods
            .iter()
            .map(|name| self.resolve_method(class, name, MethodKind::Before))
            .collect::<Result<Vec<_>, _>>()?;
        let afters = test
            .after_methods
            .iter()
            .map(|name| self.resolve_method(class, name, MethodKind::After))
            .collect::<Result<Vec<_>, _>>()?;
        let method = self.resolve_method(class, &test.test.method, MethodKind::Concurrent)?;
        let expected = test
            .test
            .exception
            .as_deref()
            .map(|wanted| {
                self.known_failure(wanted)
                    .ok_or_else(|| ConfigurationError::UnknownFailureType {
                        class: class.to_owned(),
                        type_name: wanted.to_owned(),
                    })
            })
            .transpose()?;
        Ok(Box::new(LifecyclePlan::new(befores, method, afters, expected)))
    }
}

/// Test classes addressable by name.
#[derive(Default)]
pub struct ClassRegistry {
    classes: RwLock<HashMap<&'static str, Arc<dyn TargetClass>>>,
}

impl ClassRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register `class`, replacing any class with the same name.
    pub fn register(&self, class: Arc<dyn TargetClass>) {
        let mut guard = match self.classes.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(class.class_name(), class);
    }

    /// Look up a class by name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn TargetClass>> {
        let guard = match self.classes.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get(name).cloned()
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = match self.classes.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f.debug_set().entries(guard.keys()).finish()
    }
}
