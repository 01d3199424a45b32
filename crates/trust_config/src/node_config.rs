use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ProtocolConfig;

/// Failure behaviour injected into a node for experiments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureMode {
    /// Consensus messages carry random bits instead of honest values.
    Byzantine,
    /// The node sends no consensus messages at all.
    Omission,
}

/// Per-node runtime settings. The keypair itself lives in `trust_core`;
/// this only carries knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub protocol: ProtocolConfig,

    /// Port the (external) transport listens on; echoed in ping/pong.
    pub listen_port: u16,

    /// Settle delay between closing one round and starting ACS for the
    /// next one.
    pub consensus_delay: Duration,

    /// Interval between generated transactions, when instructed to send.
    pub tx_interval: Duration,

    /// Interval between validation sweeps, when instructed to validate.
    pub validation_interval: Duration,

    /// Number of random peers a gossiped message is forwarded to.
    pub gossip_fanout: usize,

    /// Skip promoters when choosing transaction counterparties.
    pub ignore_promoters: bool,

    /// Optional failure injection.
    pub failure: Option<FailureMode>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            protocol: ProtocolConfig::default(),
            listen_port: 0,
            consensus_delay: Duration::from_secs(5),
            tx_interval: Duration::from_secs(1),
            validation_interval: Duration::from_secs(1),
            gossip_fanout: 3,
            ignore_promoters: false,
            failure: None,
        }
    }
}

impl NodeConfig {
    pub fn is_byzantine(&self) -> bool {
        matches!(self.failure, Some(FailureMode::Byzantine))
    }

    pub fn is_omitting(&self) -> bool {
        matches!(self.failure, Some(FailureMode::Omission))
    }
}
