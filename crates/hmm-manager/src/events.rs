use hmm_addresses::{BlockIndex, Frame, Pid, VirtPage};

use crate::collaborators::{CpuId, StalledRequest};

/// Everything the manager schedules onto its [`hmm_engine::Engine`] — both
/// its own self-scheduled intents (`Demote`, `UpdatePartition`, ...) and the
/// delivery of external callbacks (`FlushCompleted`, `CopyCompleted`, ...),
/// unified into one type so a single Engine instance orders them all by
/// `(time, insertion_seq)` (spec section 5 "EventType").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerEvent {
    /// Run one iteration of the PolicySet + Partitioner loop.
    Demote,
    /// Recompute per-policy DRAM promotion budgets.
    UpdatePartition,
    /// Release one CPU previously stalled on `(pid, vpage)`.
    Unstall { pid: Pid, vpage: VirtPage, cpu: CpuId },
    /// `demoteTimeout` elapsed before FLUSH_BEFORE completed for `src`.
    Rollback { src: Frame },
    /// Issue the next queued block flush for `src` once a flush-queue slot
    /// frees up.
    DrainCompleted { src: Frame },
    FlushCompleted { src: Frame, block: BlockIndex, dirty: bool },
    CopyCompleted { src: Frame },
    RemapCompleted { src: Frame },
    TagChangeCompleted { src: Frame, block: BlockIndex },
    AccessCompleted { request: StalledRequest },
    InstrInterrupt { pid: Pid },
}
