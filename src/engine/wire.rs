//! JSON-lines events written by the checked wrapper and read by
//! [`super::process::ProcessEngine`].
//!
//! One event per line, tagged by `event`:
//!
//! ```text
//! {"event":"completed"}
//! {"event":"exception","type_name":"std::io::error::Error","message":"boom","backtrace":"..."}
//! {"event":"violation","description":"deadlock; threads = 2"}
//! ```

use std::backtrace::BacktraceStatus;

use serde::{Deserialize, Serialize};

use super::EngineStartupError;
use crate::{
    collector::ExplorationObserver,
    failure::{RemoteFailure, TestFailure},
};

/// One observation crossing the process boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WireEvent {
    /// Exploration finished without a failing interleaving.
    Completed,
    /// Test logic raised a failure.
    Exception {
        /// Type name of the raised failure.
        type_name: String,
        /// Display text of the raised failure.
        message: String,
        /// Backtrace of the raised failure, when one was captured.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backtrace: Option<String>,
    },
    /// The engine found a violation with no test failure attached.
    Violation {
        /// Engine-supplied description.
        description: String,
    },
}

impl WireEvent {
    /// Event describing `failure`.
    #[must_use]
    pub fn exception(failure: &TestFailure) -> Self {
        let backtrace = failure.backtrace();
        Self::Exception {
            type_name: failure.type_name().to_owned(),
            message: failure.message(),
            backtrace: (backtrace.status() == BacktraceStatus::Captured)
                .then(|| backtrace.to_string()),
        }
    }

    /// Encode as a single line of JSON, without the trailing newline.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures; none occur for these variants in
    /// practice.
    pub fn encode(&self) -> Result<String, serde_json::Error> { serde_json::to_string(self) }

    /// Decode one line.
    ///
    /// # Errors
    ///
    /// Returns [`EngineStartupError::MalformedEvent`] when `line` is not an
    /// event.
    pub fn decode(line: &str) -> Result<Self, EngineStartupError> {
        serde_json::from_str(line).map_err(|source| EngineStartupError::MalformedEvent {
            line: line.to_owned(),
            source,
        })
    }

    /// Replay the event on `observer`.
    ///
    /// Exceptions arrive as [`RemoteFailure`]s carrying the remote type name,
    /// message and backtrace; identity does not survive.
    pub fn forward(self, observer: &mut dyn ExplorationObserver) {
        match self {
            Self::Completed => observer.run_completed(),
            Self::Exception {
                type_name,
                message,
                backtrace,
            } => observer.exception_thrown(TestFailure::remote(RemoteFailure {
                type_name,
                message,
                backtrace,
            })),
            Self::Violation { description } => observer.property_violated(description),
        }
    }
}
