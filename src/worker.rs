//! Worker threads that keep their failures for the thread that joins them.
//!
//! A test that spawns its own threads loses any failure raised on them: the
//! thread dies and the test passes. [`ExplodingWorker`] captures the failure,
//! panics included, and [`WorkerHandle::join`] raises it again in the joining
//! thread.
//!
//! ```
//! use std::io;
//!
//! use weft::{failure::TestFailure, worker::ExplodingWorker};
//!
//! # fn main() -> std::io::Result<()> {
//! let handle = ExplodingWorker::new(|| Err(io::Error::other("boom").into())).start("boom")?;
//! let failure: TestFailure = handle.join().unwrap_err();
//! assert_eq!(failure.message(), "boom");
//! # Ok(())
//! # }
//! ```

use std::{
    fmt,
    io,
    panic::{self, AssertUnwindSafe},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, warn};

use crate::failure::{Panicked, TestFailure, TestOutcome};

type Body = Box<dyn FnOnce() -> TestOutcome + Send + 'static>;

/// A unit of work whose failure is captured rather than lost.
pub struct ExplodingWorker {
    body: Option<Body>,
    failure: Option<TestFailure>,
}

impl ExplodingWorker {
    /// Worker that will run `body`.
    #[must_use]
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce() -> TestOutcome + Send + 'static,
    {
        Self {
            body: Some(Box::new(body)),
            failure: None,
        }
    }

    /// Run the body on the current thread, capturing its failure.
    ///
    /// Later calls do nothing; the body runs at most once.
    pub fn run(&mut self) {
        let Some(body) = self.body.take() else {
            return;
        };
        let outcome = match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(outcome) => outcome,
            Err(payload) => Err(TestFailure::from_panic(payload.as_ref())),
        };
        if let Err(failure) = outcome {
            debug!(%failure, "worker failed");
            self.failure = Some(failure);
        }
    }

    /// Failure captured by [`ExplodingWorker::run`], if any.
    #[must_use]
    pub const fn failure(&self) -> Option<&TestFailure> { self.failure.as_ref() }

    /// Run the worker on a new thread called `name`.
    ///
    /// # Errors
    ///
    /// Returns the error from [`thread::Builder::spawn`] when the thread
    /// cannot be created.
    pub fn start(mut self, thread_name: impl Into<String>) -> io::Result<WorkerHandle> {
        let name = thread_name.into();
        let (sender, receiver) = mpsc::channel();
        let thread = thread::Builder::new().name(name.clone()).spawn(move || {
            self.run();
            let outcome = self.failure.map_or(Ok(()), Err);
            if sender.send(outcome).is_err() {
                debug!("worker handle dropped before the worker finished");
            }
        })?;
        Ok(WorkerHandle {
            name,
            receiver,
            thread: Some(thread),
            finished: None,
        })
    }
}

impl fmt::Debug for ExplodingWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExplodingWorker")
            .field("pending", &self.body.is_some())
            .field("failure", &self.failure)
            .finish()
    }
}

/// Whether a worker finished within a bounded wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// The worker finished without failing.
    Finished,
    /// The wait timed out; the worker is still running.
    Running,
}

/// A started [`ExplodingWorker`].
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    receiver: Receiver<TestOutcome>,
    thread: Option<JoinHandle<()>>,
    finished: Option<TestOutcome>,
}

impl WorkerHandle {
    /// Name of the worker thread.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Wait for the worker to finish.
    ///
    /// # Errors
    ///
    /// Returns the failure the worker captured, as the same instance.
    pub fn join(mut self) -> TestOutcome {
        if let Some(outcome) = self.finished.take() {
            return outcome;
        }
        let outcome = self.receiver.recv().unwrap_or_else(|_| Err(self.lost()));
        self.reap();
        outcome
    }

    /// Wait at most `timeout` for the worker to finish.
    ///
    /// Can be called again after [`WorkerState::Running`]. Once the worker
    /// has finished, every call returns the same result.
    ///
    /// # Errors
    ///
    /// Returns the failure the worker captured, as the same instance.
    pub fn join_timeout(&mut self, timeout: Duration) -> Result<WorkerState, TestFailure> {
        if self.finished.is_none() {
            let outcome = match self.receiver.recv_timeout(timeout) {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => return Ok(WorkerState::Running),
                Err(RecvTimeoutError::Disconnected) => Err(self.lost()),
            };
            self.reap();
            self.finished = Some(outcome);
        }
        match &self.finished {
            Some(Err(failure)) => Err(failure.clone()),
            Some(Ok(())) | None => Ok(WorkerState::Finished),
        }
    }

    fn lost(&self) -> TestFailure {
        TestFailure::new(Panicked {
            message: format!("worker {} exited without reporting", self.name),
        })
    }

    fn reap(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.join().is_err() {
            warn!(worker = %self.name, "worker thread panicked after reporting");
        }
    }
}
