use serde::{Deserialize, Serialize};
use trellis_primitives::jobs::ProvingJobKind;

/// Default value for `max_settled_jobs` in [`BrokerConfig`].
const DEFAULT_MAX_SETTLED_JOBS: usize = 4_096;

/// Configuration for the in-memory proving broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerConfig {
    /// How many times a job that failed transiently is put back in the queue.
    pub max_retries: u64,
    /// Time budget, in ms, spread over all retries of a single job.
    pub retry_total_time_ms: u64,
    /// Growth factor between consecutive retry delays.
    pub retry_backoff_base: f64,
    /// How many settled jobs are remembered for dedup before the oldest are dropped.
    #[serde(default = "default_max_settled_jobs")]
    pub max_settled_jobs: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_total_time_ms: 3_000,
            retry_backoff_base: 1.5,
            max_settled_jobs: DEFAULT_MAX_SETTLED_JOBS,
        }
    }
}

fn default_max_settled_jobs() -> usize {
    DEFAULT_MAX_SETTLED_JOBS
}

/// Configuration for the pool of proving agents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentsConfig {
    pub count: usize,
    /// Kinds the agents accept. Empty means every kind.
    #[serde(default)]
    pub kinds: Vec<ProvingJobKind>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            count: 4,
            kinds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProverConfig {
    /// Artificial latency added to every native proof, in ms.
    #[serde(default)]
    pub simulated_delay_ms: u64,
}
