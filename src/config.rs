use crate::error::{Error, Result};
use crate::keyspace::{IdMode, MIX_FIELDS};
use std::time::Duration;

/// Relative weights for the four workload operations. Any positive total is
/// valid; frequencies are defined by each weight's share of the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpWeights {
    pub query: u64,
    pub insert: u64,
    pub update: u64,
    pub delete: u64,
}

impl Default for OpWeights {
    /// Skewed so the keyspace grows faster than it is perturbed, keeping
    /// query verification meaningful.
    fn default() -> Self {
        Self {
            query: 40,
            insert: 30,
            update: 5,
            delete: 5,
        }
    }
}

impl OpWeights {
    pub fn total(&self) -> u64 {
        self.query + self.insert + self.update + self.delete
    }
}

/// Workload driver configuration.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Mix field used as the shard key (0..32); higher means more random
    /// shard placement.
    pub shard_key_mix: usize,
    /// Mix field used as the secondary index (0..32).
    pub index_mix: usize,
    pub weights: OpWeights,
    /// Largest query window; ranges smaller than this are queried whole.
    pub max_window: i64,
    /// Sparsity exponent for range queries: every `2^sparsity`-th value is
    /// expected present.
    pub sparsity: u32,
    pub id_mode: IdMode,
    /// Seed for the driver's random source; `None` seeds from the OS.
    /// Fixing it makes document generation and operation selection
    /// reproducible.
    pub seed: Option<u64>,
    /// Sleep between scheduler ticks.
    pub pace: Duration,
    /// Log accumulated operation counts every this many ticks; 0 disables.
    pub report_every: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            shard_key_mix: 5,
            index_mix: 4,
            weights: OpWeights::default(),
            max_window: 300,
            sparsity: 1,
            id_mode: IdMode::Incremental,
            seed: None,
            pace: Duration::ZERO,
            report_every: 100,
        }
    }
}

impl WorkloadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.shard_key_mix >= MIX_FIELDS {
            return Err(Error::Config(format!(
                "shard_key_mix {} out of range 0..{MIX_FIELDS}",
                self.shard_key_mix
            )));
        }
        if self.index_mix >= MIX_FIELDS {
            return Err(Error::Config(format!(
                "index_mix {} out of range 0..{MIX_FIELDS}",
                self.index_mix
            )));
        }
        if self.weights.total() == 0 {
            return Err(Error::Config("operation weights sum to zero".to_string()));
        }
        if self.max_window <= 0 {
            return Err(Error::Config(format!(
                "max_window must be positive, got {}",
                self.max_window
            )));
        }
        if self.sparsity >= 31 {
            return Err(Error::Config(format!(
                "sparsity exponent {} too large",
                self.sparsity
            )));
        }
        Ok(())
    }
}

/// Relative weights for the chaos operations. Leader changes are opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChaosWeights {
    pub flush_routing_cache: u64,
    pub force_leader_change: u64,
}

impl Default for ChaosWeights {
    fn default() -> Self {
        Self {
            flush_routing_cache: 100,
            force_leader_change: 0,
        }
    }
}

impl ChaosWeights {
    pub fn total(&self) -> u64 {
        self.flush_routing_cache + self.force_leader_change
    }
}

/// Chaos driver configuration.
#[derive(Debug, Clone)]
pub struct ChaosConfig {
    pub weights: ChaosWeights,
    /// How long the cluster is given to re-stabilize after a forced leader
    /// change before the notification record is cleared. Blocks the loop.
    pub quiesce: Duration,
    /// Seconds the stepped-down leader is asked to stay out of elections.
    pub step_down_seconds: u64,
    pub seed: Option<u64>,
    /// Sleep between scheduler ticks.
    pub pace: Duration,
    pub report_every: u64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            weights: ChaosWeights::default(),
            quiesce: Duration::from_secs(10),
            step_down_seconds: 50,
            seed: None,
            pace: Duration::from_secs(5),
            report_every: 10,
        }
    }
}

impl ChaosConfig {
    pub fn validate(&self) -> Result<()> {
        if self.weights.total() == 0 {
            return Err(Error::Config("chaos weights sum to zero".to_string()));
        }
        Ok(())
    }
}
