//! Out-of-process checking engine.
//!
//! The child is started as `program [leading args] <payload tokens>` and must
//! write [`WireEvent`] lines on stdout; anything it writes on stderr is passed
//! through. [`crate::wrapper::serve`] is the matching child side.

use std::{
    ffi::{OsStr, OsString},
    io::{BufRead, BufReader, Read},
    process::{Child, Command, Stdio},
};

use tracing::{debug, warn};

use super::{CheckingEngine, EngineStartupError, wire::WireEvent};
use crate::{collector::ExplorationObserver, payload::InvocationPayload};

/// Runs each payload in a freshly spawned process.
#[derive(Clone, Debug)]
pub struct ProcessEngine {
    program: OsString,
    leading_args: Vec<OsString>,
}

impl ProcessEngine {
    /// Engine spawning `program` with the payload tokens as its arguments.
    #[must_use]
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            leading_args: Vec::new(),
        }
    }

    /// Pass `arg` before the payload tokens.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.leading_args.push(arg.as_ref().to_owned());
        self
    }

    fn command(&self, payload: &InvocationPayload) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .args(payload.tokens())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }

    fn spawn(&self, payload: &InvocationPayload) -> Result<Child, EngineStartupError> {
        self.command(payload)
            .spawn()
            .map_err(|source| EngineStartupError::Spawn {
                program: self.program.to_string_lossy().into_owned(),
                source,
            })
    }
}

impl CheckingEngine for ProcessEngine {
    fn run(
        &self,
        payload: &InvocationPayload,
        observer: &mut dyn ExplorationObserver,
    ) -> Result<(), EngineStartupError> {
        debug!(program = ?self.program, %payload, "spawning checking engine");
        let mut child = self.spawn(payload)?;
        let outcome = child
            .stdout
            .take()
            .map_or(Ok(0), |stdout| forward_events(stdout, observer));
        let forwarded = match outcome {
            Ok(count) => count,
            Err(err) => {
                reap(&mut child);
                return Err(err);
            }
        };
        let status = child.wait()?;
        if !status.success() {
            if forwarded == 0 {
                return Err(EngineStartupError::Exited {
                    status: status.to_string(),
                });
            }
            warn!(%status, forwarded, "checking engine exited unsuccessfully after reporting");
        }
        debug!(forwarded, "checking engine finished");
        Ok(())
    }
}

/// Decode every non-blank line of `stdout` and replay it on `observer`.
fn forward_events(
    stdout: impl Read,
    observer: &mut dyn ExplorationObserver,
) -> Result<usize, EngineStartupError> {
    let mut forwarded = 0;
    for read in BufReader::new(stdout).lines() {
        let line = read?;
        let event = line.trim();
        if event.is_empty() {
            continue;
        }
        WireEvent::decode(event)?.forward(observer);
        forwarded += 1;
    }
    Ok(forwarded)
}

fn reap(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(error = %err, "checking engine already exited");
    }
    if let Err(err) = child.wait() {
        warn!(error = %err, "failed to reap checking engine");
    }
}
