//! Engine capacity configuration.
//!
//! Every store in the engine is pre-sized here and allocated once at init.
//! Nothing grows afterwards: the probe path may not allocate, so capacity
//! exhaustion is a silent, best-effort drop rather than a resize.

use thiserror::Error;

/// Fixed hop ceiling for the ancestor walk.
///
/// The walk is a safety-bounded loop, not a search that happens to stop:
/// past this many hops a lineage chain is treated as "no ancestor found"
/// even if more parents exist (guards against cyclic or corrupted lineage).
pub const DEFAULT_MAX_ANCESTOR_HOPS: u32 = 16;

/// Pre-sized capacities for one correlation engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum live tasks tracked (creation edges and span contexts).
    pub max_tasks: usize,
    /// Maximum OS threads with a live binding.
    pub max_threads: usize,
    /// Maximum pending creations awaiting their child's first run.
    pub max_pending: usize,
    /// Maximum in-flight span instances (entry probe fired, return pending).
    pub max_inflight: usize,
    /// Outbound record channel depth.
    pub channel_capacity: usize,
    /// Ancestor walk hop ceiling.
    pub max_ancestor_hops: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_tasks: 4096,
            max_threads: 512,
            max_pending: 1024,
            max_inflight: 2048,
            channel_capacity: 8192,
            max_ancestor_hops: DEFAULT_MAX_ANCESTOR_HOPS,
        }
    }
}

/// Rejected configuration at engine init.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("capacity `{0}` must be nonzero")]
    ZeroCapacity(&'static str),
    #[error("max_ancestor_hops must be nonzero")]
    ZeroHops,
}

impl EngineConfig {
    /// Uniform small configuration, handy for tests and demos.
    pub fn with_capacity(capacity: usize) -> Self {
        EngineConfig {
            max_tasks: capacity,
            max_threads: capacity,
            max_pending: capacity,
            max_inflight: capacity,
            channel_capacity: capacity.max(16),
            max_ancestor_hops: DEFAULT_MAX_ANCESTOR_HOPS,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tasks == 0 {
            return Err(ConfigError::ZeroCapacity("max_tasks"));
        }
        if self.max_threads == 0 {
            return Err(ConfigError::ZeroCapacity("max_threads"));
        }
        if self.max_pending == 0 {
            return Err(ConfigError::ZeroCapacity("max_pending"));
        }
        if self.max_inflight == 0 {
            return Err(ConfigError::ZeroCapacity("max_inflight"));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("channel_capacity"));
        }
        if self.max_ancestor_hops == 0 {
            return Err(ConfigError::ZeroHops);
        }
        Ok(())
    }
}
