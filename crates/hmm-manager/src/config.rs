use hmm_addresses::{AddressLayout, RegionLayout};
use hmm_engine::Time;

use crate::error::ConfigError;

/// Which phases a migration runs and how flushing/remapping is performed,
/// per spec section 4.2 "FlushPolicy".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// FLUSH_BEFORE only for PCM-resident source pages; FLUSH_AFTER uses LLC
    /// block invalidation.
    FlushPcmBefore,
    /// Skip FLUSH_BEFORE entirely; correctness is maintained by forcing
    /// `stallOnAccess` for the whole critical window.
    FlushOnlyAfter,
    /// Atomically remap cached-line address tags from src to dst instead of
    /// flushing.
    Remap,
    /// Like `Remap`, but updates tag bits in place with no line movement.
    ChangeTag,
}

/// `partitionPeriod` is measured in cycles or in retired instructions
/// (spec section 4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodType {
    Cycles,
    Instructions,
}

/// The manager's static configuration, equivalent to the constructor
/// parameter list of the original `HybridMemoryManager` (spec section 6
/// "Configuration").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    pub layout: AddressLayout,
    pub regions: RegionLayout,
    pub flush_policy: FlushPolicy,
    pub max_flush_queue_size: usize,
    pub suppress_flush_writebacks: bool,
    pub demote_timeout: Time,
    pub partition_period: Time,
    pub period_type: PeriodType,
    pub max_migration_table_size: usize,
}

impl ManagerConfig {
    /// # Errors
    /// Returns [`ConfigError`] if `page_size`/`block_size` aren't powers of
    /// two, `block_size > page_size`, the regions aren't disjoint page
    /// multiples, or either bound is zero.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        page_size: u64,
        block_size: u64,
        dram_size: u64,
        pcm_size: u64,
        flush_policy: FlushPolicy,
        max_flush_queue_size: usize,
        suppress_flush_writebacks: bool,
        demote_timeout: Time,
        partition_period: Time,
        period_type: PeriodType,
        max_migration_table_size: usize,
    ) -> Result<Self, ConfigError> {
        let layout = AddressLayout::new(page_size, block_size)?;
        let regions = RegionLayout::contiguous(page_size, dram_size, pcm_size)?;
        if max_flush_queue_size == 0 {
            return Err(ConfigError::ZeroFlushQueueSize);
        }
        if max_migration_table_size == 0 {
            return Err(ConfigError::ZeroMigrationTableSize);
        }
        Ok(Self {
            layout,
            regions,
            flush_policy,
            max_flush_queue_size,
            suppress_flush_writebacks,
            demote_timeout,
            partition_period,
            period_type,
            max_migration_table_size,
        })
    }
}
