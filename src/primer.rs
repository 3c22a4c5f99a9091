//! Once-per-process engine warm-up.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Once,
};

use tracing::{debug, warn};

use crate::{
    collector::ResultCollector,
    engine::CheckingEngine,
    failure::panic_message,
    payload::InvocationPayload,
};

/// Primer shared by every [`crate::invocation::CheckedInvocation::new`].
pub static GLOBAL_PRIMER: Primer = Primer::new();

/// Runs the warm-up payload through an engine at most once.
///
/// Priming is best effort: a failing or panicking warm-up is logged and
/// swallowed, and is not retried.
#[derive(Debug)]
pub struct Primer {
    once: Once,
}

impl Default for Primer {
    fn default() -> Self { Self::new() }
}

impl Primer {
    /// A primer that has not run yet.
    #[must_use]
    pub const fn new() -> Self { Self { once: Once::new() } }

    /// Whether a warm-up has been attempted.
    #[must_use]
    pub fn is_primed(&self) -> bool { self.once.is_completed() }

    /// Warm `engine` up unless this primer already did so.
    ///
    /// Concurrent callers block until the first warm-up finishes.
    pub fn prime(&self, engine: &dyn CheckingEngine) { self.once.call_once(|| warm_up(engine)); }
}

fn warm_up(engine: &dyn CheckingEngine) {
    debug!("priming checking engine");
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut collector = ResultCollector::new();
        engine.run(&InvocationPayload::warm_up(), &mut collector)
    }));
    match attempt {
        Ok(Ok(())) => debug!("checking engine primed"),
        Ok(Err(err)) => warn!(error = %err, "priming the checking engine failed"),
        Err(payload) => warn!(
            panic = %panic_message(payload.as_ref()),
            "checking engine panicked while priming"
        ),
    }
}
