use std::collections::HashMap;

use hmm_addresses::{Pid, Region};
use hmm_engine::Time;

use crate::migration::MigrationOutcome;

/// Sink for the outbound counters of spec section 6 "Outbound statistics".
///
/// Richer aggregation (histograms, cross-run comparison, file output) is the
/// out-of-scope "statistics aggregation" system; this trait only exposes the
/// raw counters a policy author or test needs.
pub trait StatsSink {
    /// `region` is the migration's *destination* region.
    fn record_migration(&mut self, region: Region, outcome: MigrationOutcome);
    fn record_migration_latency(&mut self, region: Region, latency: Time);
    fn record_flush_latency(&mut self, latency: Time);
    fn record_copy_latency(&mut self, latency: Time);
    fn record_flushed_block(&mut self, dirty: bool);
    fn record_tag_change(&mut self);
    fn record_idle(&mut self, duration: Time);
    fn record_pid_migration(&mut self, pid: Pid);
    fn sample_migration_table_occupancy(&mut self, len: usize);
}

/// Dependency-free in-process implementation, sufficient to assert the spec
/// section 8 properties in tests and to print a summary from a CLI driver.
#[derive(Debug, Default)]
pub struct InMemoryStats {
    pub dram_full_migrations: u64,
    pub pcm_full_migrations: u64,
    pub dram_partial_migrations: u64,
    pub pcm_partial_migrations: u64,
    pub dram_migration_latency_total: Time,
    pub pcm_migration_latency_total: Time,
    pub flush_latency_total: Time,
    pub copy_latency_total: Time,
    pub dirty_flushed_blocks: u64,
    pub clean_flushed_blocks: u64,
    pub tag_changes: u64,
    pub idle_time: Time,
    pub per_pid_migrations: HashMap<Pid, u64>,
    occupancy_samples: u64,
    occupancy_sum: u64,
}

impl InMemoryStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn average_migration_table_occupancy(&self) -> f64 {
        if self.occupancy_samples == 0 {
            0.0
        } else {
            self.occupancy_sum as f64 / self.occupancy_samples as f64
        }
    }

    #[must_use]
    pub fn used_footprint_migrations(&self, pid: Pid) -> u64 {
        self.per_pid_migrations.get(&pid).copied().unwrap_or(0)
    }
}

impl StatsSink for InMemoryStats {
    fn record_migration(&mut self, region: Region, outcome: MigrationOutcome) {
        match (region, outcome) {
            (Region::Dram, MigrationOutcome::Full) => self.dram_full_migrations += 1,
            (Region::Dram, MigrationOutcome::Partial) => self.dram_partial_migrations += 1,
            (Region::Pcm, MigrationOutcome::Full) => self.pcm_full_migrations += 1,
            (Region::Pcm, MigrationOutcome::Partial) => self.pcm_partial_migrations += 1,
        }
    }

    fn record_migration_latency(&mut self, region: Region, latency: Time) {
        match region {
            Region::Dram => self.dram_migration_latency_total += latency,
            Region::Pcm => self.pcm_migration_latency_total += latency,
        }
    }

    fn record_flush_latency(&mut self, latency: Time) {
        self.flush_latency_total += latency;
    }

    fn record_copy_latency(&mut self, latency: Time) {
        self.copy_latency_total += latency;
    }

    fn record_flushed_block(&mut self, dirty: bool) {
        if dirty {
            self.dirty_flushed_blocks += 1;
        } else {
            self.clean_flushed_blocks += 1;
        }
    }

    fn record_tag_change(&mut self) {
        self.tag_changes += 1;
    }

    fn record_idle(&mut self, duration: Time) {
        self.idle_time += duration;
    }

    fn record_pid_migration(&mut self, pid: Pid) {
        *self.per_pid_migrations.entry(pid).or_insert(0) += 1;
    }

    fn sample_migration_table_occupancy(&mut self, len: usize) {
        self.occupancy_samples += 1;
        self.occupancy_sum += len as u64;
    }
}
