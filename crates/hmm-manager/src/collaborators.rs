use hmm_addresses::{BlockIndex, Frame, Pid, VirtPage};
use hmm_engine::Time;

/// Identifies a simulated CPU core registered via `add_cpu`.
pub type CpuId = u64;

/// Named interface for the CPU timing model (out of scope per spec section
/// 1). The manager only needs an id to target UNSTALL deliveries at; it
/// never calls into per-core timing logic.
pub trait Cpu {
    fn id(&self) -> CpuId;
}

/// Named interface for the last-level cache (out of scope per spec section
/// 1). Each method only *issues* work and returns the latency until the
/// manager should observe the matching completion callback — the LLC's own
/// queueing physics are not modeled here, matching the source's
/// `IFlushCallback`/`IDrainCallback`/`IRemapCallback`/`ITagChangeCallback`
/// split into separate completion channels.
pub trait LastLevelCache {
    fn request_drain(&self, frame: Frame) -> Time;
    fn request_flush(&self, frame: Frame, block: BlockIndex, dirty_hint: bool) -> Time;
    fn request_invalidate(&self, frame: Frame, block: BlockIndex) -> Time;
    fn request_remap(&self, old_frame: Frame, new_frame: Frame) -> Time;
    fn request_tag_change(&self, old_frame: Frame, new_frame: Frame, block: BlockIndex) -> Time;
}

/// Named interface for the DRAM/PCM device timing model (out of scope per
/// spec section 1).
pub trait HybridMemoryDevice {
    fn copy_page(&self, src: Frame, dst: Frame) -> Time;
}

/// Named interface for a per-process instruction counter (out of scope per
/// spec section 1, section 4.7 "processInterrupt").
pub trait InstrCounter {
    fn value(&self) -> u64;
    fn pid(&self) -> Pid;
}

/// Identifies a deferred memory request whose completion decrements a
/// migration's `stalledRequestsLeft` (spec section 6 "accessCompleted").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StalledRequest {
    pub pid: Pid,
    pub vpage: VirtPage,
    pub cpu: CpuId,
    /// Source frame of the migration this request was stalled behind, so
    /// the callback can find the `MigrationEntry` without a page-table
    /// lookup that might have moved on by the time it fires.
    pub src_frame: Frame,
}
