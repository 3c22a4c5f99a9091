//! Identifiers for test methods.

use std::fmt;

/// Role a method plays within its test class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// An ordinary test, executed once.
    Test,
    /// A test executed under interleaving exploration.
    Concurrent,
    /// Runs before each test, in registration order.
    Before,
    /// Runs after each test, in registration order.
    After,
}

impl MethodKind {
    /// Whether methods of this kind are tests rather than lifecycle hooks.
    #[must_use]
    pub const fn is_test(self) -> bool { matches!(self, Self::Test | Self::Concurrent) }
}

/// A method named by its declaring class and its name.
///
/// Method names are unique within a class, so no further disambiguation is
/// carried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    class: &'static str,
    name: &'static str,
}

impl MethodDescriptor {
    /// Describe `name` declared on `class`.
    #[must_use]
    pub const fn new(class: &'static str, name: &'static str) -> Self { Self { class, name } }

    /// Name of the declaring class.
    #[must_use]
    pub const fn class(&self) -> &'static str { self.class }

    /// Simple method name.
    #[must_use]
    pub const fn name(&self) -> &'static str { self.name }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.class, self.name)
    }
}
