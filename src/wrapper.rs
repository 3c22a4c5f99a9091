//! Child side of [`crate::engine::process::ProcessEngine`].
//!
//! A test binary that registers its classes hands its arguments to
//! [`serve_from_env`]; the checked test runs under [`LoomEngine`] and every
//! observation is written to stdout as one [`WireEvent`] line.

use std::{
    env,
    io::{self, Write},
    process::ExitCode,
    sync::Arc,
};

use tracing::{debug, error};

use crate::{
    class::ClassRegistry,
    collector::ExplorationObserver,
    config::ExplorationConfig,
    engine::{CheckingEngine, EngineStartupError, explorer::LoomEngine, wire::WireEvent},
    failure::TestFailure,
    payload::{ENTRY_POINT, InvocationPayload},
};

/// Run the checked test named by `tokens`, writing wire events to `out`.
///
/// # Errors
///
/// Returns [`EngineStartupError`] when the payload cannot be run or an event
/// cannot be written.
pub fn serve<W: Write>(
    registry: &Arc<ClassRegistry>,
    config: &ExplorationConfig,
    tokens: &[String],
    out: &mut W,
) -> Result<(), EngineStartupError> {
    let engine = LoomEngine::new(Arc::clone(registry), config.clone());
    let payload = InvocationPayload::from_tokens(tokens.to_vec());
    let mut writer = EventWriter { out, error: None };
    engine.run(&payload, &mut writer)?;
    if let Some(err) = writer.error {
        return Err(err);
    }
    writer.out.flush()?;
    Ok(())
}

/// Serve the payload found in the process arguments on stdout.
///
/// Arguments before the entry point token are ignored, so the wrapper can sit
/// behind a test harness that consumes its own flags. Configuration is read
/// with [`ExplorationConfig::load`].
#[must_use]
pub fn serve_from_env(registry: &Arc<ClassRegistry>) -> ExitCode {
    let tokens = payload_tokens(env::args());
    let config = match ExplorationConfig::load() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "cannot load exploration config");
            return ExitCode::FAILURE;
        }
    };
    let stdout = io::stdout();
    match serve(registry, &config, &tokens, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "checked wrapper failed");
            ExitCode::FAILURE
        }
    }
}

fn payload_tokens(args: impl IntoIterator<Item = String>) -> Vec<String> {
    args.into_iter().skip_while(|arg| arg != ENTRY_POINT).collect()
}

struct EventWriter<'a, W> {
    out: &'a mut W,
    error: Option<EngineStartupError>,
}

impl<W: Write> EventWriter<'_, W> {
    fn emit(&mut self, event: &WireEvent) {
        if self.error.is_some() {
            return;
        }
        let written = event
            .encode()
            .map_err(io::Error::other)
            .and_then(|line| writeln!(self.out, "{line}"));
        match written {
            Ok(()) => debug!(?event, "wire event written"),
            Err(err) => self.error = Some(err.into()),
        }
    }
}

impl<W: Write> ExplorationObserver for EventWriter<'_, W> {
    fn run_completed(&mut self) { self.emit(&WireEvent::Completed); }

    fn exception_thrown(&mut self, failure: TestFailure) {
        self.emit(&WireEvent::exception(&failure));
    }

    fn property_violated(&mut self, description: String) {
        self.emit(&WireEvent::Violation { description });
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use rstest::rstest;

    use super::*;
    use crate::{
        class::{TargetClass, TestClass},
        descriptor::MethodDescriptor,
        failure::{ExpectedFailure, TestOutcome},
        payload,
    };

    #[derive(Default)]
    struct Fixture;

    fn passes(_: &mut Fixture) -> TestOutcome { Ok(()) }

    fn fails(_: &mut Fixture) -> TestOutcome { Err(io::Error::other("boom").into()) }

    fn class() -> TestClass<Fixture> {
        TestClass::new()
            .concurrent_test("passes", passes)
            .concurrent_test("fails", fails)
    }

    fn served(method: &'static str, expected: Option<&ExpectedFailure>) -> String {
        let class = class();
        let registry = Arc::new(ClassRegistry::new());
        registry.register(Arc::new(class.clone()));
        let test = MethodDescriptor::new(class.class_name(), method);
        let payload = payload::build(&class, &test, &[], &[], expected).expect("payload");
        let mut out = Vec::new();
        serve(&registry, &ExplorationConfig::default(), payload.tokens(), &mut out)
            .expect("serve");
        String::from_utf8(out).expect("utf-8 output")
    }

    #[test]
    fn passing_test_reports_completion() {
        assert_eq!(served("passes", None), "{\"event\":\"completed\"}\n");
    }

    #[test]
    fn failing_test_reports_the_failure() {
        let line = served("fails", None);
        let event = WireEvent::decode(line.trim_end()).expect("event");
        let WireEvent::Exception { type_name, message, .. } = event else {
            panic!("expected an exception event");
        };
        assert_eq!(type_name, std::any::type_name::<io::Error>());
        assert_eq!(message, "boom");
    }

    #[test]
    fn expected_failure_is_matched_in_the_wrapper() {
        let expected = ExpectedFailure::of::<io::Error>();
        assert_eq!(served("fails", Some(&expected)), "{\"event\":\"completed\"}\n");
    }

    #[test]
    fn unknown_class_is_not_served() {
        let registry = Arc::new(ClassRegistry::new());
        let tokens = [
            ENTRY_POINT.to_owned(),
            "--testclass=missing".to_owned(),
            "--test=method=x".to_owned(),
        ];
        let mut out = Vec::new();
        let err = serve(&registry, &ExplorationConfig::default(), &tokens, &mut out)
            .expect_err("unknown class");
        assert!(matches!(err, EngineStartupError::UnknownClass(name) if name == "missing"));
        assert!(out.is_empty());
    }

    #[rstest]
    #[case::harness_flags(&["test-bin", "--nocapture", ENTRY_POINT, "--test=method=x"], 2)]
    #[case::entry_point_first(&[ENTRY_POINT], 1)]
    #[case::no_entry_point(&["test-bin", "--list"], 0)]
    fn payload_starts_at_the_entry_point(#[case] args: &[&str], #[case] expected: usize) {
        let tokens = payload_tokens(args.iter().map(|a| (*a).to_owned()));
        assert_eq!(tokens.len(), expected);
        assert!(tokens.first().is_none_or(|t| t == ENTRY_POINT));
    }
}
