#![expect(clippy::expect_used, reason = "test assertions")]

//! Method discovery and whole-class runs.

use std::{io, sync::Arc};

use rstest::{fixture, rstest};
use weft::{
    class::{ClassRegistry, ConfigurationError, TestClass, TestMethod},
    config::ExplorationConfig,
    descriptor::MethodKind,
    engine::explorer::LoomEngine,
    failure::{ExpectedFailure, TestOutcome},
    invocation::{CheckedInvocation, InvocationError},
    primer::Primer,
    runner::ConcurrentRunner,
};

#[derive(Default)]
struct Queue {
    items: Vec<u32>,
}

fn fill(queue: &mut Queue) -> TestOutcome {
    queue.items.extend([1, 2, 3]);
    Ok(())
}

fn pops_in_order(queue: &mut Queue) -> TestOutcome {
    if queue.items.first() == Some(&1) {
        Ok(())
    } else {
        Err(io::Error::other("queue not filled").into())
    }
}

fn is_empty(queue: &mut Queue) -> TestOutcome {
    if queue.items.is_empty() {
        Ok(())
    } else {
        Err(io::Error::other("queue not empty").into())
    }
}

fn length_is_three(queue: &mut Queue) -> TestOutcome {
    if queue.items.len() == 3 {
        Ok(())
    } else {
        Err(io::Error::other("wrong length").into())
    }
}

fn overflows(_: &mut Queue) -> TestOutcome { panic!("capacity exceeded") }

fn drain(queue: &mut Queue) -> TestOutcome {
    queue.items.clear();
    Ok(())
}

fn mixed_class() -> TestClass<Queue> {
    TestClass::new()
        .before("fill", fill)
        .concurrent_test("pops_in_order", pops_in_order)
        .test("length_is_three", length_is_three)
        .with(
            TestMethod::new(MethodKind::Concurrent, "overflows", overflows)
                .expecting(ExpectedFailure::panic()),
        )
        .test("is_empty", is_empty)
        .after("drain", drain)
}

fn invocation_for(class: &TestClass<Queue>) -> CheckedInvocation {
    static PRIMER: Primer = Primer::new();
    let registry = Arc::new(ClassRegistry::new());
    registry.register(Arc::new(class.clone()));
    CheckedInvocation::with_primer(
        Arc::new(LoomEngine::new(registry, ExplorationConfig::default())),
        &PRIMER,
    )
}

fn runner_for(class: TestClass<Queue>) -> ConcurrentRunner<Queue> {
    let invocation = invocation_for(&class);
    ConcurrentRunner::new(class, invocation).expect("valid class")
}

#[fixture]
fn mixed() -> ConcurrentRunner<Queue> { runner_for(mixed_class()) }

fn names(methods: &[TestMethod<Queue>]) -> Vec<&'static str> {
    methods.iter().map(TestMethod::name).collect()
}

#[rstest]
fn concurrent_discovery_finds_only_concurrent_methods(mixed: ConcurrentRunner<Queue>) {
    let concurrent = mixed.compute_concurrent_test_methods();
    assert_eq!(names(&concurrent), ["pops_in_order", "overflows"]);
    assert!(concurrent.iter().all(|m| m.kind() == MethodKind::Concurrent));
}

#[rstest]
fn combined_discovery_lists_ordinary_then_concurrent(mixed: ConcurrentRunner<Queue>) {
    let methods = mixed.compute_test_methods();
    assert_eq!(
        names(methods),
        ["length_is_three", "is_empty", "pops_in_order", "overflows"]
    );
}

#[rstest]
fn combined_discovery_is_stable(mixed: ConcurrentRunner<Queue>) {
    let first = mixed.compute_test_methods();
    let second = mixed.compute_test_methods();
    assert!(std::ptr::eq(first, second));
}

#[rstest]
fn run_reports_every_method(mixed: ConcurrentRunner<Queue>) {
    let summary = mixed.run();
    let reported: Vec<_> = summary.reports().iter().map(|r| r.method().name()).collect();
    assert_eq!(
        reported,
        ["length_is_three", "is_empty", "pops_in_order", "overflows"]
    );
    assert!(!summary.is_success());

    let failures: Vec<_> = summary.failures().map(|r| r.method().name()).collect();
    assert_eq!(failures, ["is_empty"]);
    let report = summary.report("is_empty").expect("is_empty report");
    assert_eq!(report.kind(), MethodKind::Test);
    let Err(InvocationError::TestFailed(failure)) = report.outcome() else {
        panic!("expected a test failure, got {:?}", report.outcome());
    };
    assert_eq!(failure.message(), "queue not empty");
}

#[test]
fn concurrent_only_class_runs_through_the_engine() {
    let class = TestClass::new()
        .before("fill", fill)
        .concurrent_test("pops_in_order", pops_in_order)
        .after("drain", drain);
    let summary = runner_for(class).run();
    assert!(summary.is_success());
    let [report] = summary.reports() else {
        panic!("expected one report, got {summary:?}");
    };
    assert_eq!(report.kind(), MethodKind::Concurrent);
}

#[test]
fn plain_class_has_no_concurrent_methods() {
    let runner = runner_for(TestClass::new().test("is_empty", is_empty));
    assert!(runner.compute_concurrent_test_methods().is_empty());
    assert_eq!(names(runner.compute_test_methods()), ["is_empty"]);
    assert!(runner.run().is_success());
}

#[test]
fn invalid_class_reports_every_problem() {
    let class = TestClass::new()
        .test("is_empty", is_empty)
        .concurrent_test("is_empty", pops_in_order)
        .with(
            TestMethod::new(MethodKind::After, "drain", drain)
                .expecting(ExpectedFailure::panic()),
        );
    let invocation = invocation_for(&class);
    let err = ConcurrentRunner::new(class, invocation).expect_err("invalid class");
    let ConfigurationError::InvalidClass { problems, .. } = err else {
        panic!("expected an invalid class error, got {err:?}");
    };
    assert_eq!(problems.len(), 2, "{problems:?}");
}
