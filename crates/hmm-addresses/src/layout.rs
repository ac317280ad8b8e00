/// Bit-exact page/block address arithmetic for a fixed `(pageSize, blockSize)` pair.
///
/// All widths are derived once at construction and arithmetic afterwards is
/// plain shifts and masks, matching spec section 3 ("Address arithmetic") and
/// section 6 ("Address layout, bit-exact") exactly:
///
/// - `offsetWidth = log2(pageSize)`
/// - `indexMask = ~(pageSize - 1)`
/// - `blockOffsetWidth = log2(blockSize)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressLayout {
    offset_width: u32,
    index_mask: u64,
    block_offset_width: u32,
    blocks_per_page: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("page size must be a non-zero power of two")]
    PageSizeNotPowerOfTwo,
    #[error("block size must be a non-zero power of two")]
    BlockSizeNotPowerOfTwo,
    #[error("block size must not exceed page size")]
    BlockLargerThanPage,
}

const fn is_pow2(x: u64) -> bool {
    x != 0 && (x & (x - 1)) == 0
}

impl AddressLayout {
    /// Construct a layout from a page size and block (cache-line) size, both in bytes.
    ///
    /// # Errors
    /// Returns [`LayoutError`] if either size isn't a power of two, or if
    /// `blockSize > pageSize`.
    pub const fn new(page_size: u64, block_size: u64) -> Result<Self, LayoutError> {
        if !is_pow2(page_size) {
            return Err(LayoutError::PageSizeNotPowerOfTwo);
        }
        if !is_pow2(block_size) {
            return Err(LayoutError::BlockSizeNotPowerOfTwo);
        }
        if block_size > page_size {
            return Err(LayoutError::BlockLargerThanPage);
        }
        let offset_width = page_size.trailing_zeros();
        let block_offset_width = block_size.trailing_zeros();
        let blocks_per_page = (page_size / block_size) as u32;
        Ok(Self {
            offset_width,
            index_mask: !(page_size - 1),
            block_offset_width,
            blocks_per_page,
        })
    }

    #[must_use]
    pub const fn offset_width(self) -> u32 {
        self.offset_width
    }

    #[must_use]
    pub const fn index_mask(self) -> u64 {
        self.index_mask
    }

    #[must_use]
    pub const fn blocks_per_page(self) -> u32 {
        self.blocks_per_page
    }

    /// `addr >> offsetWidth`
    #[must_use]
    pub const fn get_index(self, addr: u64) -> u64 {
        addr >> self.offset_width
    }

    /// `addr & ~indexMask`
    #[must_use]
    pub const fn get_offset(self, addr: u64) -> u64 {
        addr & !self.index_mask
    }

    /// `(index << offsetWidth) | (offset & ~indexMask)`
    #[must_use]
    pub const fn get_address(self, index: u64, offset: u64) -> u64 {
        (index << self.offset_width) | (offset & !self.index_mask)
    }

    /// `(addr & ~indexMask) >> blockOffsetWidth`
    #[must_use]
    pub const fn get_block(self, addr: u64) -> u64 {
        (addr & !self.index_mask) >> self.block_offset_width
    }

    /// `(index << offsetWidth) | (block << blockOffsetWidth)`
    #[must_use]
    pub const fn get_address_from_block(self, index: u64, block: u64) -> u64 {
        (index << self.offset_width) | (block << self.block_offset_width)
    }
}
