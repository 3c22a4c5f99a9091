//! Reduce engine observations to a single verdict.

use tracing::debug;

use crate::{
    engine::EngineStartupError,
    failure::{TestFailure, UnattributedViolation},
};

/// Callbacks an engine makes while it explores.
///
/// For every explored run that matters to the verdict exactly one of these
/// is called.
pub trait ExplorationObserver {
    /// Exploration finished without finding a failing interleaving.
    fn run_completed(&mut self);

    /// A failure raised by test logic escaped the checked wrapper.
    fn exception_thrown(&mut self, failure: TestFailure);

    /// The engine found a violating interleaving with no test failure attached.
    fn property_violated(&mut self, description: String);
}

/// Read access to the outcome of an exploration.
pub trait Verdict {
    /// `true` only if every explored interleaving completed cleanly.
    fn test_result(&self) -> bool;

    /// The first failure raised by test logic, if one was captured.
    fn exception(&self) -> Option<TestFailure>;

    /// Description of a violation reported without a failure attached.
    fn violation(&self) -> Option<&str> { None }
}

/// Observer attached to exactly one exploration.
///
/// The verdict is only reachable through [`ResultCollector::finish`], which
/// consumes the collector, so it cannot be read while the engine still holds
/// it.
#[derive(Debug, Default)]
pub struct ResultCollector {
    observations: usize,
    exception: Option<TestFailure>,
    violation: Option<String>,
}

impl ResultCollector {
    /// A collector that has observed nothing.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Close the exploration and produce its verdict.
    ///
    /// # Errors
    ///
    /// Returns [`EngineStartupError::NoObservations`] when the engine never
    /// reported anything; that means it did not run, not that the test passed.
    pub fn finish(self) -> Result<InvocationVerdict, EngineStartupError> {
        if self.observations == 0 {
            return Err(EngineStartupError::NoObservations);
        }
        let passed = self.exception.is_none() && self.violation.is_none();
        Ok(InvocationVerdict {
            passed,
            exception: self.exception,
            violation: self.violation,
        })
    }
}

impl ExplorationObserver for ResultCollector {
    fn run_completed(&mut self) {
        self.observations += 1;
        debug!("exploration completed");
    }

    fn exception_thrown(&mut self, failure: TestFailure) {
        self.observations += 1;
        debug!(failure = %failure, "exploration captured a test failure");
        if self.exception.is_none() {
            self.exception = Some(failure);
        }
    }

    fn property_violated(&mut self, description: String) {
        self.observations += 1;
        debug!(%description, "exploration found a property violation");
        if self.violation.is_none() {
            self.violation = Some(description);
        }
    }
}

/// Pass/fail outcome of one exploration.
#[derive(Clone, Debug)]
pub struct InvocationVerdict {
    passed: bool,
    exception: Option<TestFailure>,
    violation: Option<String>,
}

impl InvocationVerdict {
    /// The failure to raise, or `None` for a pass.
    ///
    /// A failing verdict without a captured failure yields a synthesized
    /// [`UnattributedViolation`], so callers always get a cause.
    #[must_use]
    pub fn into_failure(self) -> Option<TestFailure> {
        let Self {
            passed,
            exception,
            violation,
        } = self;
        if passed {
            return None;
        }
        Some(exception.unwrap_or_else(|| {
            TestFailure::new(UnattributedViolation {
                description: violation.unwrap_or_else(|| "no description reported".to_owned()),
            })
        }))
    }
}

impl Verdict for InvocationVerdict {
    fn test_result(&self) -> bool { self.passed }

    fn exception(&self) -> Option<TestFailure> { self.exception.clone() }

    fn violation(&self) -> Option<&str> { self.violation.as_deref() }
}
