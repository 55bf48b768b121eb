use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::proving::{AgentsConfig, BrokerConfig, ProverConfig};

/// Default value for `command_buffer` in [`OrchestratorConfig`].
const DEFAULT_COMMAND_BUFFER: usize = 64;

/// Default value for `tree_height` in [`WorldStateConfig`].
const DEFAULT_TREE_HEIGHT: u8 = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    /// How long `finalise_epoch` waits for the root proof before giving up. No limit if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch_timeout_secs: Option<u64>,

    /// Capacity of the orchestrator's command channel.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

impl OrchestratorConfig {
    pub fn epoch_timeout(&self) -> Option<Duration> {
        self.epoch_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            epoch_timeout_secs: None,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

fn default_command_buffer() -> usize {
    DEFAULT_COMMAND_BUFFER
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldStateConfig {
    /// Height of every append-only tree, so each holds `2^tree_height` leaves.
    #[serde(default = "default_tree_height")]
    pub tree_height: u8,
}

impl Default for WorldStateConfig {
    fn default() -> Self {
        Self {
            tree_height: DEFAULT_TREE_HEIGHT,
        }
    }
}

fn default_tree_height() -> u8 {
    DEFAULT_TREE_HEIGHT
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub prover: ProverConfig,
    #[serde(default)]
    pub world_state: WorldStateConfig,
}
