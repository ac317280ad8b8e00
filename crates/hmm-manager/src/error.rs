use hmm_addresses::{LayoutError, RegionLayoutError};

/// Configuration construction failures (spec section 7 lists these as fatal
/// at construction time, not as runtime conditions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Region(#[from] RegionLayoutError),
    #[error("maxFlushQueueSize must be at least 1")]
    ZeroFlushQueueSize,
    #[error("maxMigrationTableSize must be at least 1")]
    ZeroMigrationTableSize,
}

/// Runtime failures of the manager, per spec section 7 "Error Handling Design".
///
/// `Backpressure`, `LateCallback` and `RolledBackMigration` are deliberately
/// *not* variants here: spec section 7 treats them as normal control flow
/// (a rollback event, an ignored idempotent callback), not as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    /// Both regions are full at `allocate()`, or an on-demand demotion found
    /// no victim to free a frame.
    #[error("out of capacity: no free frame in either region")]
    OutOfCapacity,
    /// A structural invariant was violated (spec section 3 "Invariants") —
    /// fatal by design, the simulator terminates with a diagnostic.
    #[error("invariant violation: {0}")]
    InvariantViolation(&'static str),
}
