#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    Full,
    OsBuffered,
}

/// Runtime configuration for an identity store handle.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long one operation may wait for the exclusive file lock before
    /// failing as unavailable.
    pub lock_timeout_ms: u64,
    pub lock_retry_interval_ms: u64,
    pub durability_mode: DurabilityMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 200,
            lock_retry_interval_ms: 10,
            durability_mode: DurabilityMode::Full,
        }
    }
}

impl StoreConfig {
    /// Profile without fsync on commit. Faster for tests and local tooling;
    /// a power loss may drop the latest transactions.
    pub fn development() -> Self {
        Self {
            durability_mode: DurabilityMode::OsBuffered,
            ..Self::default()
        }
    }
}
