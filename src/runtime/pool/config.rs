//! Pool configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::runtime::error::{RuntimeError, RuntimeResult};

/// Actor pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool name, used as the worker thread name prefix
    #[serde(default = "default_name")]
    pub name: String,
    /// Maximum number of worker threads
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    /// How long an idle worker lingers before it exits
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Messages one actor may process per turn before yielding its worker
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

fn default_name() -> String {
    "ActorPool".to_string()
}

fn default_max_threads() -> usize {
    100
}

fn default_idle_timeout_ms() -> u64 {
    5000
}

fn default_max_batch() -> usize {
    100
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            max_threads: default_max_threads(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_batch: default_max_batch(),
        }
    }
}

impl PoolConfig {
    #[inline]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn set_idle_timeout(
        &mut self,
        timeout: Duration,
    ) {
        self.idle_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    }

    /// Reject settings the pool cannot run with.
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.max_threads < 1 {
            return Err(RuntimeError::Config(format!(
                "ActorPool.maxThreads must be >= 1, not {}",
                self.max_threads
            )));
        }
        if self.max_batch < 1 {
            return Err(RuntimeError::Config(format!(
                "ActorPool.maxBatch must be >= 1, not {}",
                self.max_batch
            )));
        }
        Ok(())
    }
}
