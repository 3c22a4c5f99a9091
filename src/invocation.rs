//! Orchestrates one checked invocation: prime, build, explore, collect,
//! report.

use std::{fmt, sync::Arc};

use thiserror::Error;
use tracing::{debug, info_span};

use crate::{
    class::{ConfigurationError, TargetClass},
    collector::{ResultCollector, Verdict},
    descriptor::MethodDescriptor,
    engine::{CheckingEngine, EngineStartupError},
    failure::{ExpectedFailure, TestFailure, UnattributedViolation},
    payload,
    primer::{GLOBAL_PRIMER, Primer},
};

/// Why a checked invocation did not pass.
///
/// Only [`InvocationError::TestFailed`] means the test itself failed; the
/// other variants are faults in how it was configured or run.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The invocation parameters do not fit the target class.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// The checking engine could not run the test.
    #[error(transparent)]
    EngineStartup(#[from] EngineStartupError),
    /// An explored interleaving failed.
    #[error("{0}")]
    TestFailed(TestFailure),
}

impl InvocationError {
    /// The test failure, when the test itself failed.
    #[must_use]
    pub const fn failure(&self) -> Option<&TestFailure> {
        match self {
            Self::TestFailed(failure) => Some(failure),
            Self::Configuration(_) | Self::EngineStartup(_) => None,
        }
    }

    /// Consume the error, keeping only a test failure.
    #[must_use]
    pub fn into_failure(self) -> Option<TestFailure> {
        match self {
            Self::TestFailed(failure) => Some(failure),
            Self::Configuration(_) | Self::EngineStartup(_) => None,
        }
    }
}

/// Runs checked tests through one engine.
///
/// Cloning shares the engine. Each [`CheckedInvocation::run`] blocks until
/// the engine finishes; concurrent runs against an engine that explores in
/// process are serialized by that engine.
#[derive(Clone)]
pub struct CheckedInvocation {
    engine: Arc<dyn CheckingEngine>,
    primer: &'static Primer,
}

impl CheckedInvocation {
    /// Invocation primed through the process-wide [`GLOBAL_PRIMER`].
    #[must_use]
    pub fn new(engine: Arc<dyn CheckingEngine>) -> Self {
        Self::with_primer(engine, &GLOBAL_PRIMER)
    }

    /// Invocation primed through `primer`.
    #[must_use]
    pub fn with_primer(engine: Arc<dyn CheckingEngine>, primer: &'static Primer) -> Self {
        Self { engine, primer }
    }

    /// Engine the invocation runs on.
    #[must_use]
    pub fn engine(&self) -> &dyn CheckingEngine { self.engine.as_ref() }

    /// Explore `test` on `target` with `befores` and `afters` running around
    /// it in every interleaving.
    ///
    /// # Errors
    ///
    /// - [`InvocationError::Configuration`] when a method is not declared on
    ///   `target`, belongs to another class, or is used in the wrong role;
    ///   the engine is not started.
    /// - [`InvocationError::EngineStartup`] when the engine cannot run, or
    ///   returns without reporting anything.
    /// - [`InvocationError::TestFailed`] carrying the captured failure, or a
    ///   synthesized [`UnattributedViolation`] when none was captured.
    pub fn run(
        &self,
        target: &dyn TargetClass,
        test: &MethodDescriptor,
        befores: &[MethodDescriptor],
        afters: &[MethodDescriptor],
        expected: Option<&ExpectedFailure>,
    ) -> Result<(), InvocationError> {
        let span = info_span!("checked_invocation", class = test.class(), method = test.name());
        let _entered = span.enter();
        self.primer.prime(self.engine.as_ref());
        let payload = payload::build(target, test, befores, afters, expected)?;
        debug!(%payload, "launching checking engine");
        let mut collector = ResultCollector::new();
        self.engine.run(&payload, &mut collector)?;
        let verdict = collector.finish()?;
        Self::check_result(&verdict)
    }

    /// The verdict's pass/fail flag, unchanged.
    #[must_use]
    pub fn test_result(verdict: &dyn Verdict) -> bool { verdict.test_result() }

    /// Turn a verdict into the invocation's outcome.
    ///
    /// A captured failure is returned as is, so callers see the very instance
    /// the test raised.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::TestFailed`] when the verdict is a failure.
    pub fn check_result(verdict: &dyn Verdict) -> Result<(), InvocationError> {
        if verdict.test_result() {
            return Ok(());
        }
        let failure = verdict.exception().unwrap_or_else(|| {
            TestFailure::new(UnattributedViolation {
                description: verdict
                    .violation()
                    .unwrap_or("engine reported a failure without a cause")
                    .to_owned(),
            })
        });
        Err(InvocationError::TestFailed(failure))
    }
}

impl fmt::Debug for CheckedInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckedInvocation")
            .field("primed", &self.primer.is_primed())
            .finish_non_exhaustive()
    }
}
