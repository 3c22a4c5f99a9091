//! Statements: a uniform "run this test" seam for the runner.
//!
//! A concurrent test is evaluated through [`ConcurrentStatement`], an ordinary
//! one through [`InvokeMethod`]; both fail the same way, with an
//! [`InvocationError`].

use std::fmt;

use crate::{
    class::{TargetClass, TestMethod},
    descriptor::MethodDescriptor,
    failure::ExpectedFailure,
    invocation::{CheckedInvocation, InvocationError},
    lifecycle::{CheckedRun, LifecyclePlan},
};

/// One runnable test.
pub trait Statement {
    /// Run the test, blocking until it finishes.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError`] when the test fails or cannot run.
    fn evaluate(&self) -> Result<(), InvocationError>;
}

/// Runs one concurrent test method under a checking engine.
pub struct ConcurrentStatement<'a> {
    test: MethodDescriptor,
    target: &'a dyn TargetClass,
    invocation: &'a CheckedInvocation,
    befores: Vec<MethodDescriptor>,
    afters: Vec<MethodDescriptor>,
    expected: Option<ExpectedFailure>,
}

impl<'a> ConcurrentStatement<'a> {
    /// Statement running `test` of `target` through `invocation`, with no
    /// lifecycle methods and no expected failure.
    #[must_use]
    pub const fn new(
        test: MethodDescriptor,
        target: &'a dyn TargetClass,
        invocation: &'a CheckedInvocation,
    ) -> Self {
        Self {
            test,
            target,
            invocation,
            befores: Vec::new(),
            afters: Vec::new(),
            expected: None,
        }
    }

    /// Expect the test to raise `expected`; `None` expects success.
    pub const fn set_expected_failure(&mut self, expected: Option<ExpectedFailure>) {
        self.expected = expected;
    }

    /// Before-methods to run, in order, ahead of every explored run.
    pub fn set_before_methods(&mut self, befores: Vec<MethodDescriptor>) { self.befores = befores; }

    /// After-methods to run, in order, after every explored run.
    pub fn set_after_methods(&mut self, afters: Vec<MethodDescriptor>) { self.afters = afters; }

    /// The test this statement runs.
    #[must_use]
    pub const fn test(&self) -> &MethodDescriptor { &self.test }
}

impl fmt::Debug for ConcurrentStatement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentStatement")
            .field("test", &self.test)
            .field("befores", &self.befores)
            .field("afters", &self.afters)
            .field("expected", &self.expected)
            .finish_non_exhaustive()
    }
}

impl Statement for ConcurrentStatement<'_> {
    fn evaluate(&self) -> Result<(), InvocationError> {
        self.invocation.run(
            self.target,
            &self.test,
            &self.befores,
            &self.afters,
            self.expected.as_ref(),
        )
    }
}

/// Runs one ordinary test method once, directly on the calling thread.
#[derive(Debug)]
pub struct InvokeMethod<T> {
    plan: LifecyclePlan<T>,
}

impl<T: 'static> InvokeMethod<T> {
    /// Statement running `test` between `befores` and `afters`, honouring the
    /// test's declared expected failure.
    #[must_use]
    pub fn new(
        test: TestMethod<T>,
        befores: Vec<TestMethod<T>>,
        afters: Vec<TestMethod<T>>,
    ) -> Self {
        let expected = test.expected().copied();
        Self {
            plan: LifecyclePlan::new(befores, test, afters, expected),
        }
    }
}

impl<T: Default + 'static> Statement for InvokeMethod<T> {
    fn evaluate(&self) -> Result<(), InvocationError> {
        self.plan.run_once().map_err(InvocationError::TestFailed)
    }
}
