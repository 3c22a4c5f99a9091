//! Failures raised by test logic and the failures synthesized on its behalf.
//!
//! [`TestFailure`] plays the role a thrown exception plays in other test
//! frameworks: it is what a before, test, or after method produces when it
//! fails, and what a checked invocation hands back to its caller. The handle
//! is reference counted so the very instance captured inside an explored run
//! can be re-raised in the calling thread; [`TestFailure::ptr_eq`] compares
//! that identity.

use std::{
    any::{Any, type_name},
    backtrace::Backtrace,
    borrow::Cow,
    error::Error as StdError,
    fmt,
    sync::{Arc, RwLock},
};

use thiserror::Error;

/// Outcome of a single before, test, or after method.
pub type TestOutcome = Result<(), TestFailure>;

/// A captured failure, cheap to clone and identity preserving.
///
/// Any `E: Error + Send + Sync + 'static` converts into a `TestFailure`, so
/// test bodies can use `?` freely. The backtrace is captured where the
/// failure is created and honours `RUST_BACKTRACE`.
#[derive(Clone)]
pub struct TestFailure {
    inner: Arc<Captured>,
}

struct Captured {
    error: Box<dyn StdError + Send + Sync + 'static>,
    type_name: Cow<'static, str>,
    backtrace: Backtrace,
}

impl TestFailure {
    /// Capture `error` as a test failure.
    #[must_use]
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Captured {
                error: Box::new(error),
                type_name: Cow::Borrowed(type_name::<E>()),
                backtrace: Backtrace::capture(),
            }),
        }
    }

    /// Rebuild a failure reported by another process.
    ///
    /// [`TestFailure::type_name`] and the display text name the remote type;
    /// the remote backtrace stays on the [`RemoteFailure`].
    #[must_use]
    pub fn remote(failure: RemoteFailure) -> Self {
        Self {
            inner: Arc::new(Captured {
                type_name: Cow::Owned(failure.type_name.clone()),
                error: Box::new(failure),
                backtrace: Backtrace::disabled(),
            }),
        }
    }

    /// Convert a panic payload into a failure wrapping [`Panicked`].
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::new(Panicked {
            message: panic_message(payload),
        })
    }

    /// Type name of the captured error.
    #[must_use]
    pub fn type_name(&self) -> &str { &self.inner.type_name }

    /// Display text of the captured error.
    #[must_use]
    pub fn message(&self) -> String { self.inner.error.to_string() }

    /// Backtrace captured when the failure was created.
    #[must_use]
    pub fn backtrace(&self) -> &Backtrace { &self.inner.backtrace }

    /// Borrow the captured error.
    #[must_use]
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) { self.inner.error.as_ref() }

    /// Whether the captured error, or any error in its source chain, is an `E`.
    #[must_use]
    pub fn is<E>(&self) -> bool
    where
        E: StdError + 'static,
    {
        self.downcast_ref::<E>().is_some()
    }

    /// Find an `E` in the captured error or its source chain.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        let root: &(dyn StdError + 'static) = self.as_error();
        let mut current = Some(root);
        while let Some(err) = current {
            if let Some(found) = err.downcast_ref::<E>() {
                return Some(found);
            }
            current = err.source();
        }
        None
    }

    /// Whether both handles refer to the same captured failure.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool { Arc::ptr_eq(&self.inner, &other.inner) }
}

impl<E> From<E> for TestFailure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self { Self::new(error) }
}

impl fmt::Debug for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestFailure")
            .field("type_name", &self.inner.type_name)
            .field("message", &self.message())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.inner.type_name, self.inner.error)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}

/// A test body panicked.
#[derive(Debug, Error)]
#[error("test panicked: {message}")]
pub struct Panicked {
    /// Panic message, when the payload carried one.
    pub message: String,
}

/// A failure was expected but the test method completed.
#[derive(Debug, Error)]
#[error("expected failure of type {expected}, but the test completed")]
pub struct MissingExpectedFailure {
    /// Type name of the expected failure.
    pub expected: &'static str,
}

/// The test method failed, but not with the expected failure type.
///
/// The failure actually raised is the error's source.
#[derive(Debug)]
pub struct UnexpectedFailure {
    /// Type name of the expected failure.
    pub expected: &'static str,
    /// The failure actually raised.
    pub actual: TestFailure,
}

impl fmt::Display for UnexpectedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unexpected failure, expected {} but was {}", self.expected, self.actual)
    }
}

impl StdError for UnexpectedFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> { Some(self.actual.as_error()) }
}

/// The engine found a violating interleaving without a test-originated failure.
#[derive(Debug, Error)]
#[error("interleaving violated a safety property: {description}")]
pub struct UnattributedViolation {
    /// Engine-supplied description of the violation.
    pub description: String,
}

/// A failure reconstructed from an out-of-process engine report.
///
/// The type name, message and rendered backtrace survive the process
/// boundary, so two remote failures are equivalent rather than identical.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteFailure {
    /// Type name reported by the checked process.
    pub type_name: String,
    /// Message reported by the checked process.
    pub message: String,
    /// Backtrace rendered by the checked process, when it captured one.
    pub backtrace: Option<String>,
}

/// The failure type a test method is declared to raise.
///
/// Matching follows the source chain, so expecting `E` also accepts a
/// failure that wraps an `E`.
#[derive(Clone, Copy)]
pub struct ExpectedFailure {
    type_name: &'static str,
    matcher: fn(&TestFailure) -> bool,
}

impl ExpectedFailure {
    /// Expect a failure of type `E`.
    #[must_use]
    pub fn of<E>() -> Self
    where
        E: StdError + 'static,
    {
        Self {
            type_name: type_name::<E>(),
            matcher: TestFailure::is::<E>,
        }
    }

    /// Expect the test body to panic.
    #[must_use]
    pub fn panic() -> Self { Self::of::<Panicked>() }

    /// Type name of the expected failure.
    #[must_use]
    pub const fn type_name(&self) -> &'static str { self.type_name }

    /// Whether `failure` satisfies this expectation.
    #[must_use]
    pub fn matches(&self, failure: &TestFailure) -> bool { (self.matcher)(failure) }

    /// Make this expectation resolvable by type name anywhere in the process.
    ///
    /// Payloads carry expected failures by name; the checked wrapper finds
    /// them again through [`ExpectedFailure::recall`].
    pub fn remember(self) {
        let mut known = match REMEMBERED.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !known.contains(&self) {
            known.push(self);
        }
    }

    /// A remembered expectation for the failure type called `type_name`.
    #[must_use]
    pub fn recall(type_name: &str) -> Option<Self> {
        let known = match REMEMBERED.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        known.iter().find(|e| e.type_name == type_name).copied()
    }
}

static REMEMBERED: RwLock<Vec<ExpectedFailure>> = RwLock::new(Vec::new());

impl fmt::Debug for ExpectedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExpectedFailure")
            .field(&self.type_name)
            .finish()
    }
}

impl PartialEq for ExpectedFailure {
    fn eq(&self, other: &Self) -> bool { self.type_name == other.type_name }
}

impl Eq for ExpectedFailure {}
