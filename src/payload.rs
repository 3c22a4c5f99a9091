//! Invocation payloads exchanged with the checking engine.
//!
//! A payload is an ordered list of tokens naming the checked wrapper entry
//! point, the class under test, the test method (plus its expected failure
//! type, if any) and the lifecycle methods that must run around it:
//!
//! ```text
//! weft-checked-wrapper
//! --testclass=my_crate::tests::Counter
//! --test=method=increments,exception=weft::failure::Panicked
//! --beforemethod=reset
//! --aftermethod=verify
//! ```
//!
//! [`build`] produces the tokens on the calling side and
//! [`CheckedArgs::parse`] reads them back inside the engine.

use std::fmt;

use clap::Parser;
use thiserror::Error;

use crate::{
    class::{ConfigurationError, TargetClass},
    descriptor::MethodDescriptor,
    failure::ExpectedFailure,
};

/// Entry point token identifying the checked wrapper.
pub const ENTRY_POINT: &str = "weft-checked-wrapper";
/// Prefix of the class-under-test token.
pub const TEST_CLASS_PREFIX: &str = "--testclass=";
/// Prefix of the test descriptor token.
pub const TEST_PREFIX: &str = "--test=method=";
/// Separator introducing the expected failure type inside the test descriptor.
pub const EXCEPTION_SEPARATOR: &str = ",exception=";
/// Prefix of each before-method token.
pub const BEFORE_METHOD_PREFIX: &str = "--beforemethod=";
/// Prefix of each after-method token.
pub const AFTER_METHOD_PREFIX: &str = "--aftermethod=";

/// Ordered tokens handed to a checking engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvocationPayload {
    tokens: Vec<String>,
}

impl InvocationPayload {
    /// Payload used to warm the engine up: the entry point and nothing to run.
    #[must_use]
    pub fn warm_up() -> Self {
        Self {
            tokens: vec![ENTRY_POINT.to_owned()],
        }
    }

    /// Wrap tokens produced elsewhere, for example by a test double.
    #[must_use]
    pub const fn from_tokens(tokens: Vec<String>) -> Self { Self { tokens } }

    /// The tokens in order.
    #[must_use]
    pub fn tokens(&self) -> &[String] { &self.tokens }

    /// Whether `token` appears anywhere in the payload.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool { self.tokens.iter().any(|t| t == token) }
}

impl fmt::Display for InvocationPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.tokens.join(" ")) }
}

/// Name of the expected failure type, or the empty string when none is expected.
#[must_use]
pub fn exception_class_name(expected: Option<&ExpectedFailure>) -> &'static str {
    expected.map_or("", ExpectedFailure::type_name)
}

/// Build the payload describing one checked invocation.
///
/// # Errors
///
/// Returns the [`ConfigurationError`] from [`TargetClass::validate`] when a
/// method is not declared on `target`, belongs to another class, or is
/// registered in a different role. The engine is never consulted.
///
/// The expected failure, if any, is remembered so the checked wrapper can
/// resolve it by name.
pub fn build(
    target: &dyn TargetClass,
    test: &MethodDescriptor,
    befores: &[MethodDescriptor],
    afters: &[MethodDescriptor],
    expected: Option<&ExpectedFailure>,
) -> Result<InvocationPayload, ConfigurationError> {
    target.validate(test, befores, afters)?;
    if let Some(failure) = expected {
        failure.remember();
    }

    let mut tokens = Vec::with_capacity(3 + befores.len() + afters.len());
    tokens.push(ENTRY_POINT.to_owned());
    tokens.push(format!("{TEST_CLASS_PREFIX}{}", target.class_name()));
    tokens.push(test_descriptor(test, expected));
    tokens.extend(
        befores
            .iter()
            .map(|m| format!("{BEFORE_METHOD_PREFIX}{}", m.name())),
    );
    tokens.extend(
        afters
            .iter()
            .map(|m| format!("{AFTER_METHOD_PREFIX}{}", m.name())),
    );
    Ok(InvocationPayload { tokens })
}

fn test_descriptor(test: &MethodDescriptor, expected: Option<&ExpectedFailure>) -> String {
    let mut token = format!("{TEST_PREFIX}{}", test.name());
    if expected.is_some() {
        token.push_str(EXCEPTION_SEPARATOR);
        token.push_str(exception_class_name(expected));
    }
    token
}

/// Problems found while reading a payload inside the engine.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The tokens did not parse.
    #[error("malformed payload: {0}")]
    Malformed(#[from] clap::Error),
    /// A class was named without a test method.
    #[error("payload names class {0} but no test method")]
    MissingTest(String),
    /// A test method was named without a class.
    #[error("payload names test method {0} but no class")]
    MissingTestClass(String),
}

/// Test descriptor as read back from a payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestSpec {
    /// Test method name.
    pub method: String,
    /// Expected failure type name, if any.
    pub exception: Option<String>,
}

fn parse_test_spec(value: &str) -> Result<TestSpec, String> {
    let rest = value
        .strip_prefix("method=")
        .ok_or_else(|| format!("test descriptor must start with `method=`: {value}"))?;
    let (method, exception) = match rest.split_once(EXCEPTION_SEPARATOR) {
        Some((method, exception)) => (method, Some(exception.to_owned())),
        None => (rest, None),
    };
    if method.is_empty() {
        return Err("test descriptor names an empty method".to_owned());
    }
    Ok(TestSpec {
        method: method.to_owned(),
        exception,
    })
}

/// Arguments understood by the checked wrapper.
#[derive(Clone, Debug, PartialEq, Eq, Parser)]
#[command(
    name = ENTRY_POINT,
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct CheckedArgs {
    /// Class under test.
    #[arg(long = "testclass")]
    pub test_class: Option<String>,
    /// Test method and optional expected failure type.
    #[arg(long = "test", value_parser = parse_test_spec)]
    pub test: Option<TestSpec>,
    /// Before-methods in execution order.
    #[arg(long = "beforemethod")]
    pub before_methods: Vec<String>,
    /// After-methods in execution order.
    #[arg(long = "aftermethod")]
    pub after_methods: Vec<String>,
}

/// Everything the wrapper needs to run one test: the class, the test, and
/// its lifecycle methods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckedTest {
    /// Class under test.
    pub class: String,
    /// Test method and optional expected failure type.
    pub test: TestSpec,
    /// Before-methods in execution order.
    pub before_methods: Vec<String>,
    /// After-methods in execution order.
    pub after_methods: Vec<String>,
}

impl CheckedArgs {
    /// Parse payload tokens; the first token is the entry point.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] when the tokens are malformed or name only
    /// half of a class/test pair.
    pub fn parse(tokens: &[String]) -> Result<Self, PayloadError> {
        let args = Self::try_parse_from(tokens)?;
        match (&args.test_class, &args.test) {
            (Some(class), None) => Err(PayloadError::MissingTest(class.clone())),
            (None, Some(test)) => Err(PayloadError::MissingTestClass(test.method.clone())),
            _ => Ok(args),
        }
    }

    /// The test to run, or `None` for a warm-up payload.
    #[must_use]
    pub fn into_checked_test(self) -> Option<CheckedTest> {
        let Self {
            test_class,
            test,
            before_methods,
            after_methods,
        } = self;
        Some(CheckedTest {
            class: test_class?,
            test: test?,
            before_methods,
            after_methods,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use rstest::rstest;

    use super::*;
    use crate::{class::TestClass, failure::TestOutcome};

    #[derive(Default)]
    struct Target;

    fn noop(_: &mut Target) -> TestOutcome { Ok(()) }

    fn target() -> TestClass<Target> {
        TestClass::new()
            .concurrent_test("race", noop)
            .before("hash_code", noop)
            .before("notify", noop)
            .after("notify_all", noop)
            .after("wait", noop)
    }

    fn descriptor(name: &'static str) -> MethodDescriptor {
        MethodDescriptor::new(std::any::type_name::<Target>(), name)
    }

    #[test]
    fn exception_class_name_is_the_type_name() {
        let expected = ExpectedFailure::of::<io::Error>();
        assert_eq!(
            exception_class_name(Some(&expected)),
            std::any::type_name::<io::Error>()
        );
    }

    #[test]
    fn exception_class_name_is_empty_without_expectation() {
        assert_eq!(exception_class_name(None), "");
        assert_eq!(exception_class_name(None), exception_class_name(None));
    }

    #[test]
    fn builds_every_token_in_order() {
        let class = target();
        let expected = ExpectedFailure::of::<io::Error>();
        let payload = build(
            &class,
            &descriptor("race"),
            &[descriptor("hash_code"), descriptor("notify")],
            &[descriptor("notify_all"), descriptor("wait")],
            Some(&expected),
        )
        .expect("payload");

        let class_token = format!("--testclass={}", std::any::type_name::<Target>());
        let test_token = format!(
            "--test=method=race,exception={}",
            std::any::type_name::<io::Error>()
        );
        assert_eq!(
            payload.tokens(),
            [
                ENTRY_POINT,
                class_token.as_str(),
                test_token.as_str(),
                "--beforemethod=hash_code",
                "--beforemethod=notify",
                "--aftermethod=notify_all",
                "--aftermethod=wait",
            ]
        );
    }

    #[test]
    fn omits_exception_suffix_without_expectation() {
        let class = target();
        let payload = build(&class, &descriptor("race"), &[], &[], None).expect("payload");
        assert!(payload.contains("--test=method=race"));
        assert_eq!(
            payload
                .tokens()
                .iter()
                .filter(|t| t.starts_with("--test="))
                .count(),
            1
        );
        assert!(!payload.tokens().iter().any(|t| t.contains("exception=")));
    }

    #[rstest]
    #[case::test_method(descriptor("missing"), &[], &[])]
    #[case::before_method(descriptor("race"), &[descriptor("missing")], &[])]
    #[case::after_method(descriptor("race"), &[], &[descriptor("missing")])]
    fn rejects_undeclared_methods(
        #[case] test: MethodDescriptor,
        #[case] befores: &[MethodDescriptor],
        #[case] afters: &[MethodDescriptor],
    ) {
        let class = target();
        let err = build(&class, &test, befores, afters, None).expect_err("undeclared");
        assert!(matches!(
            err,
            ConfigurationError::UndeclaredMethod { ref method, .. } if method == "missing"
        ));
    }

    #[rstest]
    #[case::hook_as_test(descriptor("hash_code"), &[], &[])]
    #[case::test_as_before(descriptor("race"), &[descriptor("race")], &[])]
    #[case::after_as_before(descriptor("race"), &[descriptor("wait")], &[])]
    #[case::foreign_class(
        descriptor("race"),
        &[MethodDescriptor::new("some::OtherClass", "hash_code")],
        &[]
    )]
    fn rejects_methods_outside_their_role(
        #[case] test: MethodDescriptor,
        #[case] befores: &[MethodDescriptor],
        #[case] afters: &[MethodDescriptor],
    ) {
        let class = target();
        let err = build(&class, &test, befores, afters, None).expect_err("misused method");
        assert!(
            matches!(
                err,
                ConfigurationError::WrongKind { .. } | ConfigurationError::ForeignMethod { .. }
            ),
            "{err:?}"
        );
    }

    #[test]
    fn expected_failure_is_resolvable_after_building() {
        #[derive(Debug, Error)]
        #[error("never declared by the class")]
        struct Undeclared;

        let class = target();
        let expected = ExpectedFailure::of::<Undeclared>();
        let payload = build(&class, &descriptor("race"), &[], &[], Some(&expected))
            .expect("payload");
        let checked = CheckedArgs::parse(payload.tokens())
            .expect("parse")
            .into_checked_test()
            .expect("checked test");
        assert!(class.resolve(&checked).is_ok());
    }

    #[test]
    fn parses_built_payload_back() {
        let class = target();
        let expected = ExpectedFailure::panic();
        let payload = build(
            &class,
            &descriptor("race"),
            &[descriptor("hash_code")],
            &[descriptor("wait")],
            Some(&expected),
        )
        .expect("payload");

        let checked = CheckedArgs::parse(payload.tokens())
            .expect("parse")
            .into_checked_test()
            .expect("checked test");
        assert_eq!(checked.class, std::any::type_name::<Target>());
        assert_eq!(checked.test.method, "race");
        assert_eq!(
            checked.test.exception.as_deref(),
            Some(expected.type_name())
        );
        assert_eq!(checked.before_methods, ["hash_code"]);
        assert_eq!(checked.after_methods, ["wait"]);
    }

    #[test]
    fn warm_up_payload_has_nothing_to_run() {
        let args = CheckedArgs::parse(InvocationPayload::warm_up().tokens()).expect("parse");
        assert!(args.into_checked_test().is_none());
    }

    #[rstest]
    #[case::class_only(&[ENTRY_POINT, "--testclass=a::B"])]
    #[case::test_only(&[ENTRY_POINT, "--test=method=run"])]
    #[case::bad_descriptor(&[ENTRY_POINT, "--testclass=a::B", "--test=run"])]
    #[case::unknown_flag(&[ENTRY_POINT, "--bogus=1"])]
    fn rejects_malformed_payloads(#[case] tokens: &[&str]) {
        let owned: Vec<String> = tokens.iter().map(|t| (*t).to_owned()).collect();
        assert!(CheckedArgs::parse(&owned).is_err());
    }
}
