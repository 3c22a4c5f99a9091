//! Checking engines: explore the interleavings of one checked test.
//!
//! An engine receives an [`InvocationPayload`], runs the checked wrapper it
//! names under its own scheduling, and reports what it found to an
//! [`ExplorationObserver`]. Engines block the calling thread until
//! exploration terminates. Two engines ship with the crate:
//!
//! - [`explorer::LoomEngine`] explores in-process, so a captured failure reaches
//!   the caller as the very same [`crate::failure::TestFailure`].
//! - [`process::ProcessEngine`] runs the wrapper in a child process and
//!   reconstructs failures from its event stream.

pub mod explorer;
pub mod process;
pub mod wire;

use std::io;

use thiserror::Error;

use crate::{
    class::ConfigurationError,
    collector::ExplorationObserver,
    payload::{InvocationPayload, PayloadError},
};

/// The engine could not run; distinct from a test that ran and failed.
#[derive(Debug, Error)]
pub enum EngineStartupError {
    /// The engine returned without reporting a single observation.
    #[error("checking engine reported no observations")]
    NoObservations,
    /// The payload could not be read.
    #[error(transparent)]
    Payload(#[from] PayloadError),
    /// The payload names a class the engine does not know.
    #[error("no test class named {0} is registered with the engine")]
    UnknownClass(String),
    /// The payload names methods or failure types the class cannot resolve.
    #[error("cannot resolve checked test: {0}")]
    Resolve(#[from] ConfigurationError),
    /// The engine panicked before exploring anything.
    #[error("checking engine failed before exploring: {0}")]
    Aborted(String),
    /// The engine process could not be spawned.
    #[error("failed to spawn checking engine {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// Communication with the engine process failed.
    #[error("checking engine I/O failed: {0}")]
    Io(#[from] io::Error),
    /// The engine process emitted an event that does not decode.
    #[error("malformed engine event {line:?}: {source}")]
    MalformedEvent {
        /// Offending line.
        line: String,
        /// Decoding error.
        source: serde_json::Error,
    },
    /// The engine process exited unsuccessfully without reporting.
    #[error("checking engine exited with {status}")]
    Exited {
        /// Exit status description.
        status: String,
    },
}

/// Something that explores the interleavings described by a payload.
///
/// Implementations must report, for a run that completes, exactly one of
/// [`ExplorationObserver::run_completed`],
/// [`ExplorationObserver::exception_thrown`], or
/// [`ExplorationObserver::property_violated`].
pub trait CheckingEngine: Send + Sync {
    /// Explore `payload`, reporting to `observer`; blocks until done.
    ///
    /// # Errors
    ///
    /// Returns [`EngineStartupError`] when the engine cannot start or cannot
    /// make sense of the payload. Test failures are reported to `observer`,
    /// never as errors.
    fn run(
        &self,
        payload: &InvocationPayload,
        observer: &mut dyn ExplorationObserver,
    ) -> Result<(), EngineStartupError>;
}
