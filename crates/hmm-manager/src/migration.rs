use std::collections::{HashMap, VecDeque};

use hmm_addresses::{BlockIndex, Frame, Pid, Region, VirtPage};
use hmm_engine::Time;

use crate::config::FlushPolicy;

/// Position in the FLUSH_BEFORE -> COPY -> FLUSH_AFTER pipeline (spec
/// section 4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    FlushBefore,
    Copy,
    FlushAfter,
}

/// Distinguishes a migration that ran to completion from one that was
/// rolled back after doing some work (spec section 4.2 "Rollback",
/// outbound statistics in section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    Full,
    Partial,
}

/// One in-flight page migration, keyed by source frame in [`MigrationTable`]
/// (spec section 3 "MigrationEntry").
#[derive(Debug, Clone)]
pub struct MigrationEntry {
    pub pid: Pid,
    pub vpage: VirtPage,
    pub src_frame: Frame,
    pub src_region: Region,
    pub dest_frame: Frame,
    pub dest_region: Region,
    pub state: MigrationState,
    pub rolled_back: bool,
    /// False only for `CHANGE_TAG`, which never moves page contents.
    pub needs_copying: bool,
    /// `FLUSH_ONLY_AFTER` forces `stallOnAccess` for the entire critical
    /// window, not just from COPY onward (spec section 4.2 FlushPolicy).
    pub force_stall_whole_window: bool,
    pub blocks_total: u32,
    /// One page-level drain precedes the per-block flush pass (spec section
    /// 4.2: "drains from L1/L2 happen first via `IDrainCallback`").
    pub drain_requests_left: u32,
    pub flush_requests_left: u32,
    /// Block indices not yet issued to the LLC because `maxFlushQueueSize`
    /// was saturated when the phase began (spec section 4.2 "`flushQueue`
    /// bounds the number of in-flight flush requests ... additional blocks
    /// wait").
    pub pending_flush_blocks: VecDeque<BlockIndex>,
    pub stalled_requests_left: u32,
    pub tag_change_requests_left: u32,
    pub dirty_flushed_blocks: u32,
    pub clean_flushed_blocks: u32,
    pub start_migration: Time,
    pub start_flush: Option<Time>,
    pub start_copy: Option<Time>,
}

impl MigrationEntry {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pid: Pid,
        vpage: VirtPage,
        src_frame: Frame,
        src_region: Region,
        dest_frame: Frame,
        dest_region: Region,
        blocks_total: u32,
        policy: FlushPolicy,
        now: Time,
    ) -> Self {
        let flush_before_blocks = match policy {
            FlushPolicy::FlushPcmBefore if src_region == Region::Pcm => blocks_total,
            FlushPolicy::FlushPcmBefore
            | FlushPolicy::FlushOnlyAfter
            | FlushPolicy::Remap
            | FlushPolicy::ChangeTag => 0,
        };
        Self {
            pid,
            vpage,
            src_frame,
            src_region,
            dest_frame,
            dest_region,
            state: MigrationState::FlushBefore,
            rolled_back: false,
            needs_copying: !matches!(policy, FlushPolicy::ChangeTag),
            force_stall_whole_window: matches!(policy, FlushPolicy::FlushOnlyAfter),
            blocks_total,
            drain_requests_left: u32::from(flush_before_blocks > 0),
            flush_requests_left: flush_before_blocks,
            pending_flush_blocks: (0..flush_before_blocks).map(BlockIndex::new).collect(),
            stalled_requests_left: 0,
            tag_change_requests_left: 0,
            dirty_flushed_blocks: 0,
            clean_flushed_blocks: 0,
            start_migration: now,
            start_flush: if flush_before_blocks > 0 { Some(now) } else { None },
            start_copy: None,
        }
    }

    /// Arm the FLUSH_AFTER phase. `invalidate_blocks` queues per-block LLC
    /// invalidations (`FLUSH_PCM_BEFORE`/`FLUSH_ONLY_AFTER`);
    /// `commit_completions` is the number of remap/tag-change callbacks
    /// still outstanding (`REMAP`: 1 whole-page remap; `CHANGE_TAG`:
    /// per-block tag changes) before the migration can commit.
    pub fn arm_flush_after(&mut self, invalidate_blocks: u32, commit_completions: u32, now: Time) {
        self.state = MigrationState::FlushAfter;
        self.flush_requests_left = invalidate_blocks;
        self.pending_flush_blocks = (0..invalidate_blocks).map(BlockIndex::new).collect();
        self.tag_change_requests_left = commit_completions;
        self.start_flush.get_or_insert(now);
    }

    #[must_use]
    pub const fn flush_before_done(&self) -> bool {
        self.drain_requests_left == 0 && self.flush_requests_left == 0
    }

    #[must_use]
    pub const fn flush_after_done(&self) -> bool {
        self.flush_requests_left == 0 && self.tag_change_requests_left == 0
    }

    /// `stallOnAccess` is forced from the moment the phase needs exclusive
    /// LLC ownership: always during COPY, during FLUSH_AFTER until tags
    /// commit, and for the whole window under `FLUSH_ONLY_AFTER` (spec
    /// section 4.2 "Entry conditions").
    #[must_use]
    pub const fn stall_on_access(&self) -> bool {
        if self.force_stall_whole_window {
            return true;
        }
        matches!(self.state, MigrationState::Copy | MigrationState::FlushAfter)
    }

    pub fn record_flush(&mut self, dirty: bool) {
        if dirty {
            self.dirty_flushed_blocks += 1;
        } else {
            self.clean_flushed_blocks += 1;
        }
        self.flush_requests_left = self.flush_requests_left.saturating_sub(1);
    }

    pub fn record_suppressed_writeback(&mut self) {
        self.clean_flushed_blocks += 1;
        self.flush_requests_left = self.flush_requests_left.saturating_sub(1);
    }

    pub fn record_drain(&mut self) {
        self.drain_requests_left = self.drain_requests_left.saturating_sub(1);
    }

    pub fn record_tag_change(&mut self) {
        self.tag_change_requests_left = self.tag_change_requests_left.saturating_sub(1);
    }
}

/// The bounded set of in-flight [`MigrationEntry`] values, plus the flush
/// back-pressure counter shared across all of them (spec section 3
/// "Invariants" 3 and 6, section 4.2 "Phase semantics").
#[derive(Debug)]
pub struct MigrationTable {
    entries: HashMap<Frame, MigrationEntry>,
    max_size: usize,
    flush_in_flight: usize,
    max_flush_queue_size: usize,
}

impl MigrationTable {
    #[must_use]
    pub fn new(max_size: usize, max_flush_queue_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_size,
            flush_in_flight: 0,
            max_flush_queue_size,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_size
    }

    #[must_use]
    pub fn contains(&self, src: Frame) -> bool {
        self.entries.contains_key(&src)
    }

    #[must_use]
    pub fn get(&self, src: Frame) -> Option<&MigrationEntry> {
        self.entries.get(&src)
    }

    pub fn get_mut(&mut self, src: Frame) -> Option<&mut MigrationEntry> {
        self.entries.get_mut(&src)
    }

    /// Admit a new migration if the table has a free slot (spec section
    /// 4.2 "Entry conditions"). Returns `None` when the table is full —
    /// this is a normal admission-control outcome, not an error.
    pub fn admit(&mut self, entry: MigrationEntry) -> Option<Frame> {
        if self.is_full() {
            return None;
        }
        let src = entry.src_frame;
        self.entries.insert(src, entry);
        Some(src)
    }

    pub fn remove(&mut self, src: Frame) -> Option<MigrationEntry> {
        self.entries.remove(&src)
    }

    /// Whether a flush slot is available under `maxFlushQueueSize`.
    #[must_use]
    pub const fn flush_slot_available(&self) -> bool {
        self.flush_in_flight < self.max_flush_queue_size
    }

    #[must_use]
    pub const fn flush_in_flight(&self) -> usize {
        self.flush_in_flight
    }

    /// Reserve a flush slot. Caller must have checked [`Self::flush_slot_available`].
    pub fn begin_flush(&mut self) {
        self.flush_in_flight += 1;
    }

    pub fn end_flush(&mut self) {
        self.flush_in_flight = self.flush_in_flight.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(policy: FlushPolicy, region: Region) -> MigrationEntry {
        MigrationEntry::new(
            Pid::new(0),
            VirtPage::new(0x10),
            Frame::new(0),
            region,
            Frame::new(1),
            Region::Dram,
            64,
            policy,
            0,
        )
    }

    #[test]
    fn flush_pcm_before_skips_flush_for_dram_source() {
        let e = entry(FlushPolicy::FlushPcmBefore, Region::Dram);
        assert_eq!(e.flush_requests_left, 0);
        assert!(e.flush_before_done());
    }

    #[test]
    fn flush_pcm_before_requires_flush_for_pcm_source() {
        let e = entry(FlushPolicy::FlushPcmBefore, Region::Pcm);
        assert_eq!(e.flush_requests_left, 64);
        assert!(!e.flush_before_done());
    }

    #[test]
    fn change_tag_never_needs_copying() {
        let e = entry(FlushPolicy::ChangeTag, Region::Pcm);
        assert!(!e.needs_copying);
    }

    #[test]
    fn flush_only_after_stalls_whole_window() {
        let e = entry(FlushPolicy::FlushOnlyAfter, Region::Pcm);
        assert!(e.stall_on_access());
    }

    #[test]
    fn admission_respects_table_size() {
        let mut table = MigrationTable::new(1, 4);
        let first = entry(FlushPolicy::FlushPcmBefore, Region::Pcm);
        assert!(table.admit(first).is_some());
        let second = MigrationEntry::new(
            Pid::new(1),
            VirtPage::new(0x20),
            Frame::new(5),
            Region::Pcm,
            Frame::new(6),
            Region::Dram,
            64,
            FlushPolicy::FlushPcmBefore,
            0,
        );
        assert!(table.admit(second).is_none());
    }

    #[test]
    fn flush_backpressure_tracks_in_flight() {
        let mut table = MigrationTable::new(4, 1);
        assert!(table.flush_slot_available());
        table.begin_flush();
        assert!(!table.flush_slot_available());
        table.end_flush();
        assert!(table.flush_slot_available());
    }
}
