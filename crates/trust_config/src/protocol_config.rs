use primitives::{DEFAULT_BYZANTINE_BOUND, DEFAULT_COMMITTEE_SIZE};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Committee parameters shared by every node in a run. `n` is the
/// committee size used by ACS and erasure coding, `t` the Byzantine bound
/// inside it, `population` the total number of nodes exchanging
/// transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub n: usize,
    pub t: usize,
    pub population: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            n: DEFAULT_COMMITTEE_SIZE,
            t: DEFAULT_BYZANTINE_BOUND,
            population: DEFAULT_COMMITTEE_SIZE,
        }
    }
}

impl ProtocolConfig {
    pub fn new(n: usize, t: usize, population: usize) -> crate::Result<Self> {
        let config = ProtocolConfig { n, t, population };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.t == 0 {
            return Err(ConfigError::Other(
                "byzantine bound t must be at least 1".to_string(),
            ));
        }
        if self.n <= 3 * self.t {
            return Err(ConfigError::Other(format!(
                "committee size {} must exceed 3t = {}",
                self.n,
                3 * self.t
            )));
        }
        if self.population < self.n {
            return Err(ConfigError::Other(format!(
                "population {} smaller than committee size {}",
                self.population, self.n
            )));
        }
        Ok(())
    }

    /// Erasure-coding data shard count `k = n - 2t`.
    pub fn data_shards(&self) -> usize {
        self.n - 2 * self.t
    }

    /// Erasure-coding parity shard count `m = 2t`.
    pub fn parity_shards(&self) -> usize {
        2 * self.t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        ProtocolConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_n_not_exceeding_3t() {
        assert!(ProtocolConfig::new(3, 1, 4).is_err());
        assert!(ProtocolConfig::new(4, 1, 4).is_ok());
    }

    #[test]
    fn rejects_population_below_committee() {
        assert!(ProtocolConfig::new(4, 1, 3).is_err());
    }

    #[test]
    fn shard_counts() {
        let config = ProtocolConfig::new(7, 2, 7).unwrap();
        assert_eq!(config.data_shards(), 3);
        assert_eq!(config.parity_shards(), 4);
    }
}
