//! Exploration bounds for the interleaving engine.
//!
//! Values are layered in increasing precedence: built-in defaults, an
//! optional `weft.toml`, then `WEFT_`-prefixed environment variables
//! (`WEFT_PREEMPTION_BOUND=2`, `WEFT_MAX_BRANCHES=5000`, ...).

use std::{path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix of the environment variables read by [`ExplorationConfig::load`].
pub const ENV_PREFIX: &str = "WEFT_";
/// Configuration file read by [`ExplorationConfig::load`].
pub const DEFAULT_CONFIG_FILE: &str = "weft.toml";

/// Failure to assemble an [`ExplorationConfig`].
#[derive(Debug, Error)]
#[error("failed to load exploration config: {0}")]
pub struct ConfigError(#[from] Box<figment::Error>);

/// Bounds applied to every exploration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationConfig {
    /// Maximum preemptions per explored execution; `None` explores exhaustively.
    pub preemption_bound: Option<usize>,
    /// Maximum scheduling branches in a single execution.
    pub max_branches: usize,
    /// Stop after this many permutations.
    pub max_permutations: Option<usize>,
    /// Stop exploring after this many seconds.
    pub max_duration_secs: Option<u64>,
    /// Log every scheduling decision.
    pub log: bool,
    /// Record source locations of synchronisation operations.
    pub location: bool,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            preemption_bound: Some(3),
            max_branches: 1_000,
            max_permutations: None,
            max_duration_secs: None,
            log: false,
            location: false,
        }
    }
}

impl ExplorationConfig {
    /// Load from defaults, `weft.toml`, and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a layer holds values of the wrong type.
    pub fn load() -> Result<Self, ConfigError> { Self::load_from(Path::new(DEFAULT_CONFIG_FILE)) }

    /// Load from defaults, the TOML file at `path` if it exists, and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a layer holds values of the wrong type.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::figment(path).extract().map_err(Box::new).map_err(ConfigError::from)
    }

    /// The layered provider stack, for callers that merge further layers.
    #[must_use]
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Exploration time limit as a [`Duration`].
    #[must_use]
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.map(Duration::from_secs)
    }
}
