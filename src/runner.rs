//! Run every test of a class, sending concurrent tests through a checking
//! engine.

use std::{fmt, sync::OnceLock};

use tracing::{info, warn};

use crate::{
    class::{ConfigurationError, TestClass, TestMethod},
    descriptor::{MethodDescriptor, MethodKind},
    invocation::{CheckedInvocation, InvocationError},
    statement::{ConcurrentStatement, InvokeMethod, Statement},
};

/// Outcome of one test method.
#[derive(Debug)]
pub struct TestReport {
    method: MethodDescriptor,
    kind: MethodKind,
    outcome: Result<(), InvocationError>,
}

impl TestReport {
    /// Method the report is about.
    #[must_use]
    pub const fn method(&self) -> &MethodDescriptor { &self.method }

    /// Whether the method ran as an ordinary or a concurrent test.
    #[must_use]
    pub const fn kind(&self) -> MethodKind { self.kind }

    /// What running the method produced.
    #[must_use]
    pub const fn outcome(&self) -> &Result<(), InvocationError> { &self.outcome }

    /// Whether the method passed.
    #[must_use]
    pub const fn passed(&self) -> bool { self.outcome.is_ok() }
}

/// Reports for every test of a class, in run order.
#[derive(Debug, Default)]
pub struct RunSummary {
    reports: Vec<TestReport>,
}

impl RunSummary {
    /// Every report.
    #[must_use]
    pub fn reports(&self) -> &[TestReport] { &self.reports }

    /// Reports of methods that did not pass.
    pub fn failures(&self) -> impl Iterator<Item = &TestReport> {
        self.reports.iter().filter(|r| !r.passed())
    }

    /// Whether every method passed.
    #[must_use]
    pub fn is_success(&self) -> bool { self.reports.iter().all(TestReport::passed) }

    /// Report for the method called `name`.
    #[must_use]
    pub fn report(&self, name: &str) -> Option<&TestReport> {
        self.reports.iter().find(|r| r.method.name() == name)
    }
}

/// Runs the tests of one [`TestClass`].
///
/// Ordinary tests run once on the calling thread. Concurrent tests run
/// through a [`ConcurrentStatement`] on the runner's [`CheckedInvocation`].
pub struct ConcurrentRunner<T> {
    class: TestClass<T>,
    invocation: CheckedInvocation,
    test_methods: OnceLock<Vec<TestMethod<T>>>,
}

impl<T: Default + 'static> ConcurrentRunner<T> {
    /// Validate `class` and build a runner for it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidClass`] listing every problem
    /// found in `class`.
    pub fn new(
        class: TestClass<T>,
        invocation: CheckedInvocation,
    ) -> Result<Self, ConfigurationError> {
        let problems = class.problems();
        if !problems.is_empty() {
            return Err(ConfigurationError::InvalidClass {
                class: class.name().to_owned(),
                problems,
            });
        }
        Ok(Self {
            class,
            invocation,
            test_methods: OnceLock::new(),
        })
    }

    /// The class under test.
    #[must_use]
    pub const fn class(&self) -> &TestClass<T> { &self.class }

    /// Concurrent test methods, in registration order.
    #[must_use]
    pub fn compute_concurrent_test_methods(&self) -> Vec<TestMethod<T>> {
        self.class.methods_of(MethodKind::Concurrent).copied().collect()
    }

    /// Ordinary test methods followed by concurrent ones.
    ///
    /// Computed on first call; later calls return the same slice.
    #[must_use]
    pub fn compute_test_methods(&self) -> &[TestMethod<T>] {
        self.test_methods.get_or_init(|| {
            self.class
                .methods_of(MethodKind::Test)
                .chain(self.class.methods_of(MethodKind::Concurrent))
                .copied()
                .collect()
        })
    }

    /// Run every test method and report on each.
    #[must_use]
    pub fn run(&self) -> RunSummary {
        let reports = self
            .compute_test_methods()
            .iter()
            .map(|method| {
                let outcome = self.statement_for(method).evaluate();
                let report = TestReport {
                    method: *method.descriptor(),
                    kind: method.kind(),
                    outcome,
                };
                log_report(&report);
                report
            })
            .collect();
        RunSummary { reports }
    }

    fn statement_for(&self, method: &TestMethod<T>) -> Box<dyn Statement + '_> {
        if method.kind() == MethodKind::Concurrent {
            let mut statement =
                ConcurrentStatement::new(*method.descriptor(), &self.class, &self.invocation);
            statement.set_expected_failure(method.expected().copied());
            statement.set_before_methods(self.descriptors(MethodKind::Before));
            statement.set_after_methods(self.descriptors(MethodKind::After));
            Box::new(statement)
        } else {
            Box::new(InvokeMethod::new(
                *method,
                self.class.methods_of(MethodKind::Before).copied().collect(),
                self.class.methods_of(MethodKind::After).copied().collect(),
            ))
        }
    }

    fn descriptors(&self, kind: MethodKind) -> Vec<MethodDescriptor> {
        self.class.methods_of(kind).map(|m| *m.descriptor()).collect()
    }
}

impl<T> fmt::Debug for ConcurrentRunner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentRunner")
            .field("class", &self.class)
            .field("invocation", &self.invocation)
            .finish_non_exhaustive()
    }
}

fn log_report(report: &TestReport) {
    match &report.outcome {
        Ok(()) => info!(method = %report.method, kind = ?report.kind, "test passed"),
        Err(InvocationError::TestFailed(failure)) => {
            info!(method = %report.method, kind = ?report.kind, %failure, "test failed");
        }
        Err(err) => {
            warn!(method = %report.method, kind = ?report.kind, error = %err, "test errored");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Arc};

    use tracing::Level;

    use super::*;
    use crate::{
        class::ClassRegistry,
        config::ExplorationConfig,
        engine::explorer::LoomEngine,
        failure::TestOutcome,
        test_support,
    };

    #[derive(Default)]
    struct Fixture;

    fn passes(_: &mut Fixture) -> TestOutcome { Ok(()) }

    fn fails(_: &mut Fixture) -> TestOutcome { Err(io::Error::other("nope").into()) }

    #[test]
    fn each_report_is_logged() {
        let invocation = CheckedInvocation::new(Arc::new(LoomEngine::new(
            Arc::new(ClassRegistry::new()),
            ExplorationConfig::default(),
        )));
        let class = TestClass::<Fixture>::new()
            .test("passes", passes)
            .test("fails", fails);
        let runner = ConcurrentRunner::new(class, invocation).expect("valid class");
        let (summary, captured) = test_support::capture(|| runner.run());
        assert_eq!(summary.failures().count(), 1);

        let passed = captured.event_with_message("test passed").expect("pass event");
        assert_eq!(passed.level(), Level::INFO);
        assert!(passed.field("method").is_some_and(|m| m.ends_with("::passes")));
        let failed = captured.event_with_message("test failed").expect("fail event");
        let expected = format!("{}: nope", std::any::type_name::<io::Error>());
        assert_eq!(failed.field("failure"), Some(expected.as_str()));
    }
}
