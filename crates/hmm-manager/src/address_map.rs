use std::collections::{HashMap, VecDeque};

use hmm_addresses::{Frame, Pid, Region, RegionLayout, VirtPage};

use crate::error::ManagerError;

/// Free-frame bookkeeping and the physical-page reverse map (spec section 3
/// "Free-lists" and "PhysicalPageEntry").
///
/// Both free-lists are FIFO: allocation pops the head, freeing appends to the
/// tail (spec section 3, "Free-lists").
#[derive(Debug)]
pub struct AddressMap {
    regions: RegionLayout,
    dram_free: VecDeque<Frame>,
    pcm_free: VecDeque<Frame>,
    physical_pages: HashMap<Frame, (Pid, VirtPage)>,
}

impl AddressMap {
    #[must_use]
    pub fn new(regions: RegionLayout) -> Self {
        let dram_free = (regions.first_dram_frame().as_u64()..regions.one_past_last_dram_frame().as_u64())
            .map(Frame::new)
            .collect();
        let pcm_free = (regions.first_pcm_frame().as_u64()..regions.one_past_last_pcm_frame().as_u64())
            .map(Frame::new)
            .collect();
        Self {
            regions,
            dram_free,
            pcm_free,
            physical_pages: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn regions(&self) -> RegionLayout {
        self.regions
    }

    #[must_use]
    pub fn dram_free_count(&self) -> usize {
        self.dram_free.len()
    }

    #[must_use]
    pub fn pcm_free_count(&self) -> usize {
        self.pcm_free.len()
    }

    /// Pop a free frame from `region`'s free-list, if any.
    pub fn take_free(&mut self, region: Region) -> Option<Frame> {
        match region {
            Region::Dram => self.dram_free.pop_front(),
            Region::Pcm => self.pcm_free.pop_front(),
        }
    }

    /// Return `frame` to the tail of its region's free-list.
    pub fn give_free(&mut self, region: Region, frame: Frame) {
        match region {
            Region::Dram => self.dram_free.push_back(frame),
            Region::Pcm => self.pcm_free.push_back(frame),
        }
    }

    /// DRAM-first, PCM-fallback allocation of a single frame (spec section
    /// 4.1: "assign virtual pages to frames drawn first from the DRAM
    /// free-list until exhausted, then from PCM").
    ///
    /// # Errors
    /// Returns [`ManagerError::OutOfCapacity`] when both free-lists are empty.
    pub fn allocate_one(&mut self) -> Result<(Frame, Region), ManagerError> {
        if let Some(frame) = self.take_free(Region::Dram) {
            return Ok((frame, Region::Dram));
        }
        if let Some(frame) = self.take_free(Region::Pcm) {
            return Ok((frame, Region::Pcm));
        }
        Err(ManagerError::OutOfCapacity)
    }

    pub fn bind(&mut self, frame: Frame, pid: Pid, vpage: VirtPage) {
        self.physical_pages.insert(frame, (pid, vpage));
    }

    pub fn unbind(&mut self, frame: Frame) -> Option<(Pid, VirtPage)> {
        self.physical_pages.remove(&frame)
    }

    #[must_use]
    pub fn owner_of(&self, frame: Frame) -> Option<(Pid, VirtPage)> {
        self.physical_pages.get(&frame).copied()
    }
}
