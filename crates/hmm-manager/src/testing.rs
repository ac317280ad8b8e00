//! Hand-written fakes for the external collaborator traits, used by
//! `hmm-manager`'s own integration tests and available to downstream
//! drivers. Not a mocking framework: the example corpus has none, and
//! these are synchronous/fixed-delay stand-ins, not behavior verifiers.

use hmm_addresses::{BlockIndex, Frame, Pid};
use hmm_engine::Time;

use crate::collaborators::{Cpu, CpuId, HybridMemoryDevice, InstrCounter, LastLevelCache};

/// Every request completes after the same fixed latency.
#[derive(Debug, Clone, Copy)]
pub struct FixedLatencyLlc {
    pub drain_latency: Time,
    pub flush_latency: Time,
    pub remap_latency: Time,
    pub tag_change_latency: Time,
}

impl Default for FixedLatencyLlc {
    fn default() -> Self {
        Self {
            drain_latency: 5,
            flush_latency: 10,
            remap_latency: 8,
            tag_change_latency: 3,
        }
    }
}

impl LastLevelCache for FixedLatencyLlc {
    fn request_drain(&self, _frame: Frame) -> Time {
        self.drain_latency
    }

    fn request_flush(&self, _frame: Frame, _block: BlockIndex, _dirty_hint: bool) -> Time {
        self.flush_latency
    }

    fn request_invalidate(&self, _frame: Frame, _block: BlockIndex) -> Time {
        self.flush_latency
    }

    fn request_remap(&self, _old_frame: Frame, _new_frame: Frame) -> Time {
        self.remap_latency
    }

    fn request_tag_change(&self, _old_frame: Frame, _new_frame: Frame, _block: BlockIndex) -> Time {
        self.tag_change_latency
    }
}

/// Page copy completes after a fixed latency regardless of size.
#[derive(Debug, Clone, Copy)]
pub struct FixedLatencyDevice {
    pub copy_latency: Time,
}

impl Default for FixedLatencyDevice {
    fn default() -> Self {
        Self { copy_latency: 50 }
    }
}

impl HybridMemoryDevice for FixedLatencyDevice {
    fn copy_page(&self, _src: Frame, _dst: Frame) -> Time {
        self.copy_latency
    }
}

/// Minimal `Cpu` implementation: an id with no timing state of its own.
#[derive(Debug, Clone, Copy)]
pub struct SimpleCpu(pub CpuId);

impl Cpu for SimpleCpu {
    fn id(&self) -> CpuId {
        self.0
    }
}

/// An `InstrCounter` the test drives by hand via [`SimpleInstrCounter::advance`].
#[derive(Debug, Clone, Copy)]
pub struct SimpleInstrCounter {
    pid: Pid,
    value: u64,
}

impl SimpleInstrCounter {
    #[must_use]
    pub const fn new(pid: Pid) -> Self {
        Self { pid, value: 0 }
    }

    pub fn advance(&mut self, delta: u64) {
        self.value += delta;
    }
}

impl InstrCounter for SimpleInstrCounter {
    fn value(&self) -> u64 {
        self.value
    }

    fn pid(&self) -> Pid {
        self.pid
    }
}
