//! One run of a test: before-methods, the test, then after-methods.
//!
//! The same driver backs ordinary tests and every interleaving an engine
//! explores, so a concurrent test fails in exactly the ways an ordinary one
//! would.

use crate::{
    class::TestMethod,
    failure::{
        ExpectedFailure,
        MissingExpectedFailure,
        TestFailure,
        TestOutcome,
        UnexpectedFailure,
    },
};

/// A fully resolved test that can be run any number of times.
pub trait CheckedRun: Send + Sync {
    /// Run the test once against a fresh fixture.
    ///
    /// # Errors
    ///
    /// Returns the first failure raised by a before-method, the test (after
    /// expected-failure matching), or an after-method, in that order.
    fn run_once(&self) -> TestOutcome;
}

/// Resolved lifecycle of one test on fixture type `T`.
#[derive(Debug)]
pub struct LifecyclePlan<T> {
    befores: Vec<TestMethod<T>>,
    test: TestMethod<T>,
    afters: Vec<TestMethod<T>>,
    expected: Option<ExpectedFailure>,
}

impl<T> LifecyclePlan<T> {
    /// Assemble a plan from resolved methods.
    #[must_use]
    pub const fn new(
        befores: Vec<TestMethod<T>>,
        test: TestMethod<T>,
        afters: Vec<TestMethod<T>>,
        expected: Option<ExpectedFailure>,
    ) -> Self {
        Self {
            befores,
            test,
            afters,
            expected,
        }
    }

    /// Run the plan against `fixture`.
    ///
    /// After-methods always run. The first failure wins.
    ///
    /// # Errors
    ///
    /// See [`CheckedRun::run_once`].
    pub fn run_with(&self, fixture: &mut T) -> TestOutcome {
        let mut outcome = self.run_befores_and_test(fixture);
        for after in &self.afters {
            let after_outcome = after.invoke(fixture);
            if outcome.is_ok() {
                outcome = after_outcome;
            }
        }
        outcome
    }

    fn run_befores_and_test(&self, fixture: &mut T) -> TestOutcome {
        for before in &self.befores {
            before.invoke(fixture)?;
        }
        expect(self.expected.as_ref(), self.test.invoke(fixture))
    }
}

impl<T> CheckedRun for LifecyclePlan<T>
where
    T: Default + 'static,
{
    fn run_once(&self) -> TestOutcome { self.run_with(&mut T::default()) }
}

/// Apply an expected-failure declaration to the outcome of a test method.
///
/// # Errors
///
/// Returns [`MissingExpectedFailure`] when a failure was expected but none
/// was raised, [`UnexpectedFailure`] when a different failure was raised,
/// and the original failure when nothing was expected.
pub fn expect(expected: Option<&ExpectedFailure>, outcome: TestOutcome) -> TestOutcome {
    match (expected, outcome) {
        (None, outcome) => outcome,
        (Some(expected), Ok(())) => Err(TestFailure::new(MissingExpectedFailure {
            expected: expected.type_name(),
        })),
        (Some(expected), Err(failure)) if expected.matches(&failure) => Ok(()),
        (Some(expected), Err(failure)) => Err(TestFailure::new(UnexpectedFailure {
            expected: expected.type_name(),
            actual: failure,
        })),
    }
}
