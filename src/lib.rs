//! Run concurrent tests under exhaustive interleaving exploration.
//!
//! A test class registers ordinary tests, concurrent tests, and before/after
//! hooks against a fixture type. Ordinary tests run once. Concurrent tests are
//! handed to a [`engine::CheckingEngine`] as an invocation payload; the engine
//! runs the before-methods, the test, and the after-methods inside every
//! interleaving it explores, and the first failure found is raised again in
//! the calling thread as the very same [`failure::TestFailure`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use weft::{
//!     class::{ClassRegistry, TestClass},
//!     config::ExplorationConfig,
//!     engine::explorer::LoomEngine,
//!     failure::TestOutcome,
//!     invocation::CheckedInvocation,
//!     runner::ConcurrentRunner,
//! };
//!
//! #[derive(Default)]
//! struct Counter;
//!
//! fn increments(_: &mut Counter) -> TestOutcome { Ok(()) }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let class = TestClass::<Counter>::new().concurrent_test("increments", increments);
//! let registry = Arc::new(ClassRegistry::new());
//! registry.register(Arc::new(class.clone()));
//! let engine = LoomEngine::new(registry, ExplorationConfig::load()?);
//! let runner = ConcurrentRunner::new(class, CheckedInvocation::new(Arc::new(engine)))?;
//! assert!(runner.run().is_success());
//! # Ok(())
//! # }
//! ```

pub mod class;
pub mod collector;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod failure;
pub mod invocation;
pub mod lifecycle;
pub mod payload;
pub mod primer;
pub mod runner;
pub mod statement;
pub mod worker;
pub mod wrapper;

#[cfg(test)]
pub(crate) mod test_support;
