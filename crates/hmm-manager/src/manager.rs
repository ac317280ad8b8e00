use std::collections::HashMap;

use hmm_addresses::{Bitset, BlockIndex, Frame, Pid, Region, VirtPage};
use hmm_engine::{Engine, Time};

use crate::address_map::AddressMap;
use crate::collaborators::{Cpu, CpuId, HybridMemoryDevice, InstrCounter, LastLevelCache};
use crate::config::{FlushPolicy, ManagerConfig, PeriodType};
use crate::error::ManagerError;
use crate::events::ManagerEvent;
use crate::migration::{MigrationEntry, MigrationOutcome, MigrationState, MigrationTable};
use crate::page_table::{PageEntry, PageTable};
use crate::partition::Partitioner;
use crate::policy::{MigrationPolicy, PolicySet};
use crate::stall_queue::StallQueue;
use crate::stats::StatsSink;

/// The page-migration engine of spec sections 2-7, wired behind the
/// `access`/`finish`/callback surface of section 6, dispatching through a
/// single owned [`Engine<ManagerEvent>`] (spec section 5: "a global Engine
/// orders events by (time, insertion_seq)").
///
/// The Engine is owned here rather than injected at construction (spec
/// section 9 says "injected at construction") — an intentional deviation,
/// recorded in `DESIGN.md`, that avoids threading a second lifetime/generic
/// through every collaborator for no behavioral difference in a
/// single-consumer simulator.
pub struct HybridMemoryManager<Llc, Device, Stats> {
    config: ManagerConfig,
    engine: Engine<ManagerEvent>,
    address_map: AddressMap,
    page_table: PageTable,
    migrations: MigrationTable,
    stalls: StallQueue,
    partitioner: Partitioner,
    policies: PolicySet,
    stats: Stats,
    llc: Llc,
    device: Device,
    cpus: Vec<CpuId>,
    instr_counters: Vec<(Pid, u64)>,
    /// Per-page write tracking, consulted by FLUSH_BEFORE to decide
    /// writeback vs. invalidation per block (spec section 4.2, section 9
    /// "Bitset width"). Keyed by `(pid, vpage)` rather than embedded in
    /// `PageEntry` so `PageEntry` keeps deriving `Copy`.
    dirty_blocks: HashMap<(Pid, VirtPage), Bitset>,
    /// `Some(t)` from the moment the migration table last became empty at
    /// time `t`; cleared the next time a migration is admitted, at which
    /// point the elapsed span is folded into `StatsSink::record_idle` (spec
    /// section 6 "idle time").
    idle_since: Option<Time>,
}

impl<Llc, Device, Stats> HybridMemoryManager<Llc, Device, Stats>
where
    Llc: LastLevelCache,
    Device: HybridMemoryDevice,
    Stats: StatsSink,
{
    pub fn new(config: ManagerConfig, llc: Llc, device: Device, stats: Stats) -> Self {
        let partitioner = Partitioner::new(config.partition_period, config.period_type, 0);
        Self {
            address_map: AddressMap::new(config.regions),
            page_table: PageTable::new(),
            migrations: MigrationTable::new(config.max_migration_table_size, config.max_flush_queue_size),
            stalls: StallQueue::new(),
            partitioner,
            policies: PolicySet::new(),
            stats,
            llc,
            device,
            cpus: Vec::new(),
            instr_counters: Vec::new(),
            dirty_blocks: HashMap::new(),
            idle_since: Some(0),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    #[must_use]
    pub const fn now(&self) -> Time {
        self.engine.now()
    }

    #[must_use]
    pub const fn stats(&self) -> &Stats {
        &self.stats
    }

    #[must_use]
    pub fn migration_table_len(&self) -> usize {
        self.migrations.len()
    }

    pub fn add_cpu(&mut self, cpu: &impl Cpu) {
        self.cpus.push(cpu.id());
    }

    pub fn add_instr_counter(&mut self, counter: &impl InstrCounter, threshold: u64) {
        self.instr_counters.push((counter.pid(), threshold));
    }

    pub fn add_policy(&mut self, policy: Box<dyn MigrationPolicy>) {
        self.policies.push(policy);
        self.partitioner.add_policy_slot();
    }

    /// Seed the periodic DEMOTE and UPDATE_PARTITION events (spec section
    /// 4.5, 4.6). Call once after configuring policies.
    pub fn start(&mut self) {
        self.engine.schedule(self.config.demote_timeout, ManagerEvent::Demote);
        self.engine.schedule(self.config.partition_period, ManagerEvent::UpdatePartition);
    }

    /// Allocate `footprint` fresh virtual pages for `pid`, DRAM-first
    /// PCM-fallback (spec section 4.1 "allocate").
    ///
    /// # Errors
    /// Returns [`ManagerError::OutOfCapacity`] once both free-lists are
    /// exhausted.
    pub fn allocate(&mut self, pid: Pid, footprint: usize) -> Result<(), ManagerError> {
        for i in 0..footprint {
            let vpage = VirtPage::new(i as u64);
            let (frame, region) = self.address_map.allocate_one()?;
            self.address_map.bind(frame, pid, vpage);
            self.page_table.insert(pid, vpage, PageEntry::new(frame, region));
            self.policies.notify_placed(pid, vpage, region);
            log::debug!("allocated {pid:?}/{vpage:?} -> {frame:?} ({region:?})");
        }
        Ok(())
    }

    /// Spec section 4.1 `access()`: five-step lookup/lazy-allocate/stall
    /// decision.
    ///
    /// # Errors
    /// Returns [`ManagerError::OutOfCapacity`] if a lazy allocation is
    /// needed and both regions (and on-demand migration) fail to produce a
    /// frame.
    pub fn access(
        &mut self,
        pid: Pid,
        vaddr: u64,
        read: bool,
        instr: bool,
        cpu: CpuId,
    ) -> Result<(bool, u64), ManagerError> {
        let vpage = VirtPage::new(self.config.layout.get_index(vaddr));
        let voff = self.config.layout.get_offset(vaddr);

        if self.page_table.get(pid, vpage).is_none() {
            let (frame, region) = match self.address_map.allocate_one() {
                Ok(pair) => pair,
                Err(_) => self.migrate_on_demand(pid, vpage)?,
            };
            self.address_map.bind(frame, pid, vpage);
            self.page_table.insert(pid, vpage, PageEntry::new(frame, region));
            self.policies.notify_placed(pid, vpage, region);
        }

        let entry = *self
            .page_table
            .get(pid, vpage)
            .ok_or(ManagerError::InvariantViolation("page entry missing right after insert"))?;

        let paddr = self.config.layout.get_address(entry.frame.as_u64(), voff);
        self.policies.notify_access(pid, vpage, read, instr);

        if !read {
            let block = self.config.layout.get_block(vaddr) as u32;
            self.dirty_blocks
                .entry((pid, vpage))
                .or_insert_with(|| Bitset::new(self.config.layout.blocks_per_page()))
                .set(block);
        }

        if entry.is_migrating && entry.stall_on_access {
            self.stalls.push(pid, vpage, cpu);
            return Ok((true, paddr));
        }
        Ok((false, paddr))
    }

    /// Spec section 6 `finish(coreId)`: the core has no further outstanding
    /// requests. Nothing in this manager tracks per-core outstanding state
    /// beyond the StallQueue (which already releases by page, not by core),
    /// so this is a log-only hook for symmetry with the external interface.
    pub fn finish(&mut self, cpu: CpuId) {
        log::trace!("cpu {cpu} finished");
    }

    pub fn process_interrupt(&mut self, pid: Pid) {
        log::debug!("instruction counter interrupt for {pid:?}");
        if matches!(self.config.period_type, PeriodType::Instructions) {
            self.run_update_partition();
        }
    }

    /// Drain every currently pending event (and whatever they reschedule as
    /// a result) until the engine goes idle. Returns the number of events
    /// dispatched. A periodic `Demote`/`UpdatePartition` keeps the engine
    /// non-idle forever once [`Self::start`] has run, so callers driving a
    /// bounded demo should prefer repeated [`Self::step`] calls instead.
    pub fn run_while_pending(&mut self, max_events: usize) -> usize {
        let mut dispatched = 0;
        while dispatched < max_events && self.step() {
            dispatched += 1;
        }
        dispatched
    }

    /// Deliver exactly one event. Returns `false` if the engine is idle.
    pub fn step(&mut self) -> bool {
        let Some((_time, event)) = self.engine.advance() else {
            return false;
        };
        self.dispatch(event);
        true
    }

    fn dispatch(&mut self, event: ManagerEvent) {
        match event {
            ManagerEvent::Demote => self.run_demote(),
            ManagerEvent::UpdatePartition => self.run_update_partition(),
            ManagerEvent::Unstall { pid, vpage, cpu } => self.run_unstall(pid, vpage, cpu),
            ManagerEvent::Rollback { src } => self.rollback(src),
            ManagerEvent::DrainCompleted { src } => self.drain_completed(src),
            ManagerEvent::FlushCompleted { src, block: _, dirty } => self.flush_completed(src, dirty),
            ManagerEvent::CopyCompleted { src } => self.copy_completed(src),
            ManagerEvent::RemapCompleted { src } => self.remap_or_tag_completed(src),
            ManagerEvent::TagChangeCompleted { src, block: _ } => self.remap_or_tag_completed(src),
            ManagerEvent::AccessCompleted { request } => self.access_completed(request),
            ManagerEvent::InstrInterrupt { pid } => self.process_interrupt(pid),
        }
    }

    /// Spec section 6 `accessCompleted(request, source)`: a deferred memory
    /// request tied to a stalled access finished. Callers driving CPU
    /// timing externally may invoke this directly; the manager does not
    /// generate it internally since its own stall/release path runs
    /// entirely through the StallQueue's UNSTALL events.
    pub fn access_completed(&mut self, request: crate::collaborators::StalledRequest) {
        if let Some(entry) = self.migrations.get_mut(request.src_frame) {
            entry.stalled_requests_left = entry.stalled_requests_left.saturating_sub(1);
        } else {
            log::trace!("late accessCompleted for {:?}/{:?}, ignored", request.pid, request.vpage);
        }
    }

    /// Spec section 4.6 DEMOTE: loop over every enabled policy in fixed
    /// (registration) order, giving each one attempt at a promotion and,
    /// failing that, a demotion — rather than stopping at the first
    /// migration found across the whole set.
    fn run_demote(&mut self) {
        let mut any_migrated = false;
        for policy_index in 0..self.policies.len() {
            let budget = self.partitioner.budget(policy_index);
            let mut migrated = false;
            if let Some((pid, vpage)) = self.policies.select_promote_at(policy_index, budget) {
                if self.partitioner.consume_promote_budget(policy_index) {
                    migrated = self.start_migration_for(pid, vpage);
                }
            }
            if !migrated {
                if let Some((pid, vpage)) = self.policies.select_demote_at(policy_index) {
                    migrated = self.start_migration_for(pid, vpage);
                }
            }
            any_migrated |= migrated;
        }
        if !any_migrated {
            log::trace!("DEMOTE tick found no candidate, rescheduling");
        }
        self.engine.schedule(self.config.demote_timeout, ManagerEvent::Demote);
    }

    fn run_update_partition(&mut self) {
        self.partitioner.retick(self.config.regions.num_dram_pages());
        self.engine.schedule(self.config.partition_period, ManagerEvent::UpdatePartition);
    }

    fn run_unstall(&mut self, pid: Pid, vpage: VirtPage, cpu: CpuId) {
        log::debug!("unstall {pid:?}/{vpage:?} on cpu {cpu}");
    }

    /// Begin migrating `(pid, vpage)` to the opposite region, if the
    /// destination has a free frame and the migration table isn't full
    /// (spec section 4.2 "Entry conditions").
    fn start_migration_for(&mut self, pid: Pid, vpage: VirtPage) -> bool {
        let Some(entry) = self.page_table.get(pid, vpage).copied() else {
            return false;
        };
        if entry.is_migrating {
            return false;
        }
        let dest_region = match entry.region {
            Region::Dram => Region::Pcm,
            Region::Pcm => Region::Dram,
        };
        let Some(dest_frame) = self.address_map.take_free(dest_region) else {
            return false;
        };
        if self.migrations.is_full() {
            self.address_map.give_free(dest_region, dest_frame);
            return false;
        }
        let migration = MigrationEntry::new(
            pid,
            vpage,
            entry.frame,
            entry.region,
            dest_frame,
            dest_region,
            self.config.layout.blocks_per_page(),
            self.config.flush_policy,
            self.engine.now(),
        );
        let stall = migration.stall_on_access();
        let was_idle = self.migrations.is_empty();
        self.migrations.admit(migration);
        if was_idle {
            if let Some(idle_since) = self.idle_since.take() {
                self.stats.record_idle(self.engine.now().saturating_sub(idle_since));
            }
        }
        if let Some(page_entry) = self.page_table.get_mut(pid, vpage) {
            page_entry.is_migrating = true;
            page_entry.stall_on_access = stall;
        }
        log::info!("migration admitted {pid:?}/{vpage:?}: {:?} -> {dest_region:?}", entry.region);
        self.begin_flush_before(entry.frame);
        true
    }

    fn begin_flush_before(&mut self, src: Frame) {
        let needs_flush = self.migrations.get(src).is_some_and(|e| e.flush_requests_left > 0);
        if !needs_flush {
            self.transition_to_copy(src);
            return;
        }
        let latency = self.llc.request_drain(src);
        self.engine.schedule(latency, ManagerEvent::DrainCompleted { src });
    }

    fn drain_completed(&mut self, src: Frame) {
        let Some(entry) = self.migrations.get_mut(src) else {
            log::trace!("late drainCompleted for {src:?}, ignored");
            return;
        };
        if entry.state != MigrationState::FlushBefore {
            return;
        }
        entry.record_drain();
        self.issue_pending_flushes(src, true);
    }

    /// Issue as many queued block flush/invalidate requests as
    /// `maxFlushQueueSize` currently allows (spec section 4.2
    /// "`flushQueue` bounds the number of in-flight flush requests").
    fn issue_pending_flushes(&mut self, src: Frame, before_phase: bool) {
        let suppress = self.config.suppress_flush_writebacks;
        loop {
            if !self.migrations.flush_slot_available() {
                break;
            }
            let Some(entry) = self.migrations.get_mut(src) else {
                break;
            };
            let Some(block) = entry.pending_flush_blocks.pop_front() else {
                break;
            };
            let (pid, vpage) = (entry.pid, entry.vpage);
            // FLUSH_AFTER only ever invalidates already-copied lines; the
            // dirty/clean split only matters during FLUSH_BEFORE.
            let dirty = before_phase
                && self
                    .dirty_blocks
                    .get(&(pid, vpage))
                    .is_some_and(|bits| bits.is_set(block.as_u32()));
            if dirty {
                // The flush decision captures the block's dirty state as of
                // now; a write arriving after this point re-dirties it for a
                // future flush pass.
                if let Some(bits) = self.dirty_blocks.get_mut(&(pid, vpage)) {
                    bits.clear(block.as_u32());
                }
            }
            if dirty && suppress {
                entry.record_suppressed_writeback();
                continue;
            }
            self.migrations.begin_flush();
            let latency = if dirty {
                self.llc.request_flush(src, block, true)
            } else {
                self.llc.request_invalidate(src, block)
            };
            self.engine.schedule(latency, ManagerEvent::FlushCompleted { src, block, dirty });
        }
        self.maybe_advance_flush_before(src);
        self.maybe_commit_flush_after(src);
    }

    fn flush_completed(&mut self, src: Frame, dirty: bool) {
        self.migrations.end_flush();
        let Some(entry) = self.migrations.get_mut(src) else {
            log::trace!("late flushCompleted for {src:?}, ignored");
            return;
        };
        entry.record_flush(dirty);
        self.stats.record_flushed_block(dirty);
        let before_phase = entry.state == MigrationState::FlushBefore;
        self.issue_pending_flushes(src, before_phase);
    }

    fn maybe_advance_flush_before(&mut self, src: Frame) {
        let Some(entry) = self.migrations.get(src) else {
            return;
        };
        if entry.state == MigrationState::FlushBefore && entry.flush_before_done() {
            if let Some(start_flush) = entry.start_flush {
                self.stats.record_flush_latency(self.engine.now().saturating_sub(start_flush));
            }
            if let Some(entry) = self.migrations.get_mut(src) {
                entry.start_flush = None;
            }
            self.transition_to_copy(src);
        }
    }

    fn transition_to_copy(&mut self, src: Frame) {
        let now = self.engine.now();
        let Some(entry) = self.migrations.get_mut(src) else {
            return;
        };
        entry.state = MigrationState::Copy;
        entry.start_copy = Some(now);
        let (pid, vpage, stall, needs_copying, dest) =
            (entry.pid, entry.vpage, entry.stall_on_access(), entry.needs_copying, entry.dest_frame);
        if let Some(page_entry) = self.page_table.get_mut(pid, vpage) {
            page_entry.stall_on_access = stall;
        }
        if !needs_copying {
            self.copy_completed(src);
            return;
        }
        let latency = self.device.copy_page(src, dest);
        self.engine.schedule(latency, ManagerEvent::CopyCompleted { src });
    }

    fn copy_completed(&mut self, src: Frame) {
        let Some(entry) = self.migrations.get_mut(src) else {
            log::trace!("late copyCompleted for {src:?}, ignored");
            return;
        };
        if entry.state != MigrationState::Copy {
            return;
        }
        let (policy, dest_frame, blocks_total, start_copy) =
            (self.config.flush_policy, entry.dest_frame, entry.blocks_total, entry.start_copy);
        let now = self.engine.now();
        if let Some(start_copy) = start_copy {
            self.stats.record_copy_latency(now.saturating_sub(start_copy));
        }
        match policy {
            FlushPolicy::FlushPcmBefore | FlushPolicy::FlushOnlyAfter => {
                entry.arm_flush_after(blocks_total, 0, now);
                self.issue_pending_flushes(src, false);
            }
            FlushPolicy::Remap => {
                entry.arm_flush_after(0, 1, now);
                let latency = self.llc.request_remap(src, dest_frame);
                self.engine.schedule(latency, ManagerEvent::RemapCompleted { src });
            }
            FlushPolicy::ChangeTag => {
                entry.arm_flush_after(0, blocks_total, now);
                for block in (0..blocks_total).map(BlockIndex::new) {
                    let latency = self.llc.request_tag_change(src, dest_frame, block);
                    self.engine.schedule(latency, ManagerEvent::TagChangeCompleted { src, block });
                }
            }
        }
    }

    fn maybe_commit_flush_after(&mut self, src: Frame) {
        let Some(entry) = self.migrations.get(src) else {
            return;
        };
        if entry.state == MigrationState::FlushAfter && entry.flush_after_done() {
            if let Some(start_flush) = entry.start_flush {
                self.stats.record_flush_latency(self.engine.now().saturating_sub(start_flush));
            }
            self.commit_migration(src);
        }
    }

    fn remap_or_tag_completed(&mut self, src: Frame) {
        let Some(entry) = self.migrations.get_mut(src) else {
            log::trace!("late remap/tag-change completion for {src:?}, ignored");
            return;
        };
        if entry.state != MigrationState::FlushAfter {
            return;
        }
        entry.record_tag_change();
        self.stats.record_tag_change();
        self.maybe_commit_flush_after(src);
    }

    /// FLUSH_AFTER's counters reached zero: commit the address change,
    /// release the source frame, and unstall waiters (spec section 4.2
    /// "FLUSH_AFTER", section 4.3 "release occurs on ... tag-change
    /// completion").
    fn commit_migration(&mut self, src: Frame) {
        let Some(entry) = self.migrations.remove(src) else {
            return;
        };
        self.address_map.unbind(src);
        self.address_map.bind(entry.dest_frame, entry.pid, entry.vpage);
        self.address_map.give_free(entry.src_region, src);
        self.page_table.insert(
            entry.pid,
            entry.vpage,
            PageEntry::new(entry.dest_frame, entry.dest_region),
        );
        self.policies.notify_placed(entry.pid, entry.vpage, entry.dest_region);
        self.stats.record_migration(entry.dest_region, MigrationOutcome::Full);
        self.stats
            .record_migration_latency(entry.dest_region, self.engine.now().saturating_sub(entry.start_migration));
        self.stats.record_pid_migration(entry.pid);
        self.release_stalled(entry.pid, entry.vpage);
        self.stats.sample_migration_table_occupancy(self.migrations.len());
        if self.migrations.is_empty() {
            self.idle_since = Some(self.engine.now());
        }
        log::info!(
            "migration committed {:?}/{:?}: {:?} -> {:?}",
            entry.pid,
            entry.vpage,
            entry.src_region,
            entry.dest_region
        );
    }

    fn release_stalled(&mut self, pid: Pid, vpage: VirtPage) {
        for cpu in self.stalls.drain(pid, vpage) {
            self.engine.schedule(0, ManagerEvent::Unstall { pid, vpage, cpu });
        }
    }

    /// Spec section 4.2 "Rollback": abort in place, release the destination
    /// frame, clear `stallOnAccess`, drain the StallQueue, and remove the
    /// entry. The source page is untouched.
    fn rollback(&mut self, src: Frame) {
        let Some(mut entry) = self.migrations.remove(src) else {
            log::trace!("late ROLLBACK for {src:?}, ignored");
            return;
        };
        entry.rolled_back = true;
        self.address_map.give_free(entry.dest_region, entry.dest_frame);
        if let Some(page_entry) = self.page_table.get_mut(entry.pid, entry.vpage) {
            page_entry.is_migrating = false;
            page_entry.stall_on_access = false;
        }
        self.policies.notify_placed(entry.pid, entry.vpage, entry.src_region);
        self.stats.record_migration(entry.dest_region, MigrationOutcome::Partial);
        self.stats.record_migration_latency(
            entry.dest_region,
            self.engine.now().saturating_sub(entry.start_migration),
        );
        self.release_stalled(entry.pid, entry.vpage);
        self.stats.sample_migration_table_occupancy(self.migrations.len());
        if self.migrations.is_empty() {
            self.idle_since = Some(self.engine.now());
        }
        log::warn!("migration rolled back {:?}/{:?}", entry.pid, entry.vpage);
    }

    /// Arm a rollback timeout for a migration still in FLUSH_BEFORE after
    /// `demoteTimeout` (spec section 4.2 "Rollback" cause (b), section 7
    /// "Backpressure ... if persists past demoteTimeout, trigger
    /// ROLLBACK").
    pub fn arm_rollback_timeout(&mut self, src: Frame) {
        self.engine.schedule(self.config.demote_timeout, ManagerEvent::Rollback { src });
    }

    /// Spec section 4.4 `migrateOnDemand`: try to kick off a demotion to
    /// free a frame for `(pid, vpage)`. The new migration is asynchronous,
    /// so a frame is never *synchronously* available here; this always
    /// fails the current access but may create capacity for the next one.
    fn migrate_on_demand(&mut self, _pid: Pid, _vpage: VirtPage) -> Result<(Frame, Region), ManagerError> {
        if let Some((_, victim_pid, victim_vpage)) = self.policies.select_demote() {
            self.start_migration_for(victim_pid, victim_vpage);
        }
        Err(ManagerError::OutOfCapacity)
    }
}

#[cfg(test)]
impl<Llc, Device, Stats> HybridMemoryManager<Llc, Device, Stats>
where
    Llc: LastLevelCache,
    Device: HybridMemoryDevice,
    Stats: StatsSink,
{
    /// Test-only hook: start a migration for an already-placed page without
    /// going through a DEMOTE tick, so scenario tests can drive the state
    /// machine directly from a known starting layout.
    pub fn start_migration_for_test(&mut self, pid: Pid, vpage: VirtPage) -> bool {
        self.start_migration_for(pid, vpage)
    }

    /// Test-only hook: place `(pid, vpage)` directly onto `frame`, bypassing
    /// the DRAM-first allocator, so a test can seed a page into PCM even
    /// while DRAM still has room (spec section 8 scenario fixtures assume a
    /// specific starting placement, not allocation order).
    pub fn place_for_test(&mut self, pid: Pid, vpage: VirtPage, frame: Frame, region: Region) {
        self.address_map.bind(frame, pid, vpage);
        self.page_table.insert(pid, vpage, PageEntry::new(frame, region));
    }

    /// Test-only hook: pull a raw free frame from `region` for
    /// [`Self::place_for_test`] to bind.
    pub fn take_free_for_test(&mut self, region: Region) -> Option<Frame> {
        self.address_map.take_free(region)
    }

    /// Test-only hook: inject an event directly onto the engine, so a test
    /// can replay a stale callback (e.g. a `flushCompleted` that arrives
    /// after its migration already rolled back) without reconstructing the
    /// real LLC/device timing that would have produced it.
    pub fn schedule_for_test(&mut self, delay: Time, event: ManagerEvent) {
        self.engine.schedule(delay, event);
    }
}
