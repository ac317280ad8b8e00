use crate::Frame;

/// The two memory regions a physical address can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Dram,
    Pcm,
}

/// The contiguous, disjoint physical layout `[dram_base, dram_end)` followed
/// by `[pcm_base, pcm_end)`, each a whole multiple of `pageSize`.
///
/// Matches spec section 6: "A physical address P identifies region via
/// half-open ranges ... these ranges must be disjoint and each a multiple of
/// pageSize."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLayout {
    page_size: u64,
    dram_base: u64,
    dram_end: u64,
    pcm_base: u64,
    pcm_end: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegionLayoutError {
    #[error("dram size must be a non-zero multiple of the page size")]
    DramSizeNotPageMultiple,
    #[error("pcm size must be a non-zero multiple of the page size")]
    PcmSizeNotPageMultiple,
    #[error("dram and pcm regions must be disjoint")]
    RegionsOverlap,
}

impl RegionLayout {
    /// Lay DRAM out first, PCM immediately after, per spec section 6
    /// ("contiguous layout DRAM first, PCM after").
    ///
    /// # Errors
    /// Returns [`RegionLayoutError`] if either size isn't a non-zero multiple
    /// of `page_size`, or (defensively, this construction can't otherwise
    /// produce it) the resulting regions overlap.
    pub const fn contiguous(
        page_size: u64,
        dram_size: u64,
        pcm_size: u64,
    ) -> Result<Self, RegionLayoutError> {
        if dram_size == 0 || dram_size % page_size != 0 {
            return Err(RegionLayoutError::DramSizeNotPageMultiple);
        }
        if pcm_size == 0 || pcm_size % page_size != 0 {
            return Err(RegionLayoutError::PcmSizeNotPageMultiple);
        }
        let dram_base = 0u64;
        let dram_end = dram_base + dram_size;
        let pcm_base = dram_end;
        let pcm_end = pcm_base + pcm_size;
        if dram_end > pcm_base {
            return Err(RegionLayoutError::RegionsOverlap);
        }
        Ok(Self {
            page_size,
            dram_base,
            dram_end,
            pcm_base,
            pcm_end,
        })
    }

    #[must_use]
    pub const fn num_dram_pages(self) -> u64 {
        (self.dram_end - self.dram_base) / self.page_size
    }

    #[must_use]
    pub const fn num_pcm_pages(self) -> u64 {
        (self.pcm_end - self.pcm_base) / self.page_size
    }

    #[must_use]
    pub const fn first_dram_frame(self) -> Frame {
        Frame::new(self.dram_base / self.page_size)
    }

    #[must_use]
    pub const fn one_past_last_dram_frame(self) -> Frame {
        Frame::new(self.dram_end / self.page_size)
    }

    #[must_use]
    pub const fn first_pcm_frame(self) -> Frame {
        Frame::new(self.pcm_base / self.page_size)
    }

    #[must_use]
    pub const fn one_past_last_pcm_frame(self) -> Frame {
        Frame::new(self.pcm_end / self.page_size)
    }

    #[must_use]
    pub const fn is_dram_addr(self, addr: u64) -> bool {
        self.dram_base <= addr && addr < self.dram_end
    }

    #[must_use]
    pub const fn is_pcm_addr(self, addr: u64) -> bool {
        self.pcm_base <= addr && addr < self.pcm_end
    }

    #[must_use]
    pub fn is_dram_frame(self, frame: Frame) -> bool {
        let f = frame.as_u64();
        self.first_dram_frame().as_u64() <= f && f < self.one_past_last_dram_frame().as_u64()
    }

    #[must_use]
    pub fn is_pcm_frame(self, frame: Frame) -> bool {
        let f = frame.as_u64();
        self.first_pcm_frame().as_u64() <= f && f < self.one_past_last_pcm_frame().as_u64()
    }

    /// The region a frame belongs to, or `None` if it falls outside both.
    #[must_use]
    pub fn region_of_frame(self, frame: Frame) -> Option<Region> {
        if self.is_dram_frame(frame) {
            Some(Region::Dram)
        } else if self.is_pcm_frame(frame) {
            Some(Region::Pcm)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_page_multiple_sizes() {
        assert_eq!(
            RegionLayout::contiguous(4096, 4097, 4096),
            Err(RegionLayoutError::DramSizeNotPageMultiple)
        );
    }

    #[test]
    fn lays_dram_then_pcm() {
        let layout = RegionLayout::contiguous(4096, 4096, 2 * 4096).unwrap();
        assert_eq!(layout.num_dram_pages(), 1);
        assert_eq!(layout.num_pcm_pages(), 2);
        assert_eq!(layout.first_dram_frame(), Frame::new(0));
        assert_eq!(layout.first_pcm_frame(), Frame::new(1));
        assert_eq!(layout.one_past_last_pcm_frame(), Frame::new(3));
        assert_eq!(layout.region_of_frame(Frame::new(0)), Some(Region::Dram));
        assert_eq!(layout.region_of_frame(Frame::new(1)), Some(Region::Pcm));
        assert_eq!(layout.region_of_frame(Frame::new(2)), Some(Region::Pcm));
        assert_eq!(layout.region_of_frame(Frame::new(3)), None);
    }
}
