//! In-process exhaustive interleaving exploration on top of `loom`.
//!
//! Every explored execution runs the resolved lifecycle once against a fresh
//! fixture. Test bodies that want their interleavings explored use the
//! `loom::sync` and `loom::thread` primitives; the engine schedules them.
//!
//! Panics raised by loom's own runtime (a deadlock, an exhausted branch
//! budget) are property violations. Any other panic escaping the model is a
//! failure of the test code, wherever the model thread that raised it was
//! spawned.

use std::{
    any::Any,
    cell::Cell,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        Once,
        atomic::{AtomicBool, Ordering},
    },
};

use loom::model::Builder;
use tracing::{debug, info_span};

use super::{CheckingEngine, EngineStartupError};
use crate::{
    class::ClassRegistry,
    collector::ExplorationObserver,
    config::ExplorationConfig,
    failure::{TestFailure, TestOutcome, panic_message},
    lifecycle::CheckedRun,
    payload::{CheckedArgs, InvocationPayload},
};

/// Held for the duration of each exploration; they run one at a time.
static EXPLORATION: Mutex<()> = Mutex::new(());

static SCHEDULER_HOOK: Once = Once::new();

thread_local! {
    /// Set while this thread is inside `Builder::check`.
    static EXPLORING: Cell<bool> = const { Cell::new(false) };
    /// Set when loom's runtime panicked during the current exploration.
    static SCHEDULER_PANICKED: Cell<bool> = const { Cell::new(false) };
}

/// Chain a panic hook that notes panics raised inside loom's runtime.
///
/// Model threads run on the exploring OS thread, so thread-local flags see
/// every panic of the exploration.
fn install_scheduler_hook() {
    SCHEDULER_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let in_runtime = info
                .location()
                .is_some_and(|location| raised_by_scheduler(location.file()));
            if in_runtime && EXPLORING.get() {
                SCHEDULER_PANICKED.set(true);
            }
            previous(info);
        }));
    });
}

/// Whether `file` is a source file of loom's `src/rt` module.
fn raised_by_scheduler(file: &str) -> bool {
    let mut parents = file.rsplit(['/', '\\']).skip(1);
    parents.next() == Some("rt")
        && parents.next() == Some("src")
        && parents.next().is_some_and(|krate| krate.starts_with("loom"))
}

/// Turn a panic caught around test code into a failure.
///
/// Panics raised by loom's runtime during an exploration are resumed instead
/// so they leave the model and are reported as violations.
pub(crate) fn failure_from_panic(payload: Box<dyn Any + Send>) -> TestFailure {
    if EXPLORING.get() && SCHEDULER_PANICKED.get() {
        panic::resume_unwind(payload);
    }
    TestFailure::from_panic(payload.as_ref())
}

/// Explores checked tests in the current process.
#[derive(Clone, Debug)]
pub struct LoomEngine {
    registry: Arc<ClassRegistry>,
    config: ExplorationConfig,
}

impl LoomEngine {
    /// Engine resolving classes in `registry` and bounded by `config`.
    #[must_use]
    pub const fn new(registry: Arc<ClassRegistry>, config: ExplorationConfig) -> Self {
        Self { registry, config }
    }

    /// Bounds applied to each exploration.
    #[must_use]
    pub const fn config(&self) -> &ExplorationConfig { &self.config }

    fn builder(&self) -> Builder {
        let mut builder = Builder::new();
        builder.preemption_bound = self.config.preemption_bound;
        builder.max_branches = self.config.max_branches;
        builder.max_permutations = self.config.max_permutations;
        builder.max_duration = self.config.max_duration();
        builder.log = self.config.log;
        builder.location = self.config.location;
        builder
    }

    fn resolve(&self, args: CheckedArgs) -> Result<Arc<dyn CheckedRun>, EngineStartupError> {
        let Some(test) = args.into_checked_test() else {
            return Ok(Arc::new(WarmUp));
        };
        let class = self
            .registry
            .resolve(&test.class)
            .ok_or_else(|| EngineStartupError::UnknownClass(test.class.clone()))?;
        Ok(Arc::from(class.resolve(&test)?))
    }

    fn explore(&self, run: Arc<dyn CheckedRun>) -> Exploration {
        let captured: Arc<Mutex<Option<TestFailure>>> = Arc::default();
        let started = Arc::new(AtomicBool::new(false));
        let slot = Arc::clone(&captured);
        let entered = Arc::clone(&started);
        let model = move || {
            entered.store(true, Ordering::SeqCst);
            if let Err(failure) = run.run_once() {
                store_first(&slot, failure);
                panic::resume_unwind(Box::new(FailureCaptured));
            }
        };
        let builder = self.builder();
        install_scheduler_hook();
        SCHEDULER_PANICKED.set(false);
        EXPLORING.set(true);
        let result = panic::catch_unwind(AssertUnwindSafe(|| builder.check(model)));
        EXPLORING.set(false);
        let scheduler_panicked = SCHEDULER_PANICKED.replace(false);
        let failure = lock(&captured).take();
        classify(result, failure, started.load(Ordering::SeqCst), scheduler_panicked)
    }
}

impl CheckingEngine for LoomEngine {
    fn run(
        &self,
        payload: &InvocationPayload,
        observer: &mut dyn ExplorationObserver,
    ) -> Result<(), EngineStartupError> {
        let args = CheckedArgs::parse(payload.tokens())?;
        let span = info_span!(
            "explore",
            class = args.test_class.as_deref().unwrap_or_default(),
            method = args.test.as_ref().map(|t| t.method.as_str()).unwrap_or_default(),
        );
        let _entered = span.enter();
        let run = self.resolve(args)?;
        let _exclusive = lock(&EXPLORATION);
        debug!(%payload, "starting exploration");
        match self.explore(run) {
            Exploration::Completed => observer.run_completed(),
            Exploration::Failed(failure) => observer.exception_thrown(failure),
            Exploration::Violated(description) => observer.property_violated(description),
            Exploration::Aborted(reason) => return Err(EngineStartupError::Aborted(reason)),
        }
        Ok(())
    }
}

/// Lifecycle of the warm-up payload: nothing to run.
struct WarmUp;

impl CheckedRun for WarmUp {
    fn run_once(&self) -> TestOutcome { Ok(()) }
}

/// Unwind payload marking a failure already stored for the caller.
struct FailureCaptured;

#[derive(Debug)]
enum Exploration {
    Completed,
    Failed(TestFailure),
    Violated(String),
    Aborted(String),
}

fn classify(
    result: Result<(), Box<dyn Any + Send>>,
    failure: Option<TestFailure>,
    started: bool,
    scheduler_panicked: bool,
) -> Exploration {
    match (result, failure) {
        (_, Some(captured)) => Exploration::Failed(captured),
        (Ok(()), None) => Exploration::Completed,
        (Err(payload), None) if !started => Exploration::Aborted(panic_message(payload.as_ref())),
        (Err(payload), None) if scheduler_panicked => {
            Exploration::Violated(panic_message(payload.as_ref()))
        }
        (Err(payload), None) => Exploration::Failed(TestFailure::from_panic(payload.as_ref())),
    }
}

fn store_first(slot: &Mutex<Option<TestFailure>>, failure: TestFailure) {
    let mut guard = lock(slot);
    if guard.is_none() {
        *guard = Some(failure);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
