//! Worker pool configuration.

use serde::Deserialize;

/// Worker pool configuration loaded from environment variables.
///
/// Environment variables are prefixed with `BRANCHLINE_`:
/// - `BRANCHLINE_WORKERS`: Number of workers (default: 4)
/// - `BRANCHLINE_POOL_NAME`: Pool name used in logs (default: "default")
/// - `BRANCHLINE_CONTROL_CAPACITY`: Control channel buffer per worker (default: 256)
/// - `BRANCHLINE_STATUS_LIMIT`: Default size of the status overview (default: 50)
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Number of workers, fixed for the life of the pool.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Worker pool name.
    #[serde(default = "default_pool_name")]
    pub pool_name: String,

    /// Control messages buffered per worker before the oldest are dropped.
    #[serde(default = "default_control_capacity")]
    pub control_capacity: usize,

    /// Default limit for the status overview.
    #[serde(default = "default_status_limit")]
    pub status_limit: usize,
}

fn default_workers() -> usize {
    4
}

fn default_pool_name() -> String {
    "default".to_string()
}

fn default_control_capacity() -> usize {
    256
}

fn default_status_limit() -> usize {
    50
}

impl PoolConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `BRANCHLINE_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("BRANCHLINE_").from_env::<PoolConfig>()
    }

    /// Override the number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            pool_name: default_pool_name(),
            control_capacity: default_control_capacity(),
            status_limit: default_status_limit(),
        }
    }
}
