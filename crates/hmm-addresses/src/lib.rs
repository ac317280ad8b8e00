//! # Address, Page, Frame and Block Arithmetic
//!
//! Strongly typed building blocks for the hybrid memory manager: the raw
//! bit-exact translation formulas of a page/block addressing scheme, typed
//! wrappers that keep virtual pages, physical frames and region ranges from
//! being mixed up at compile time, and a small bitset used to track per-block
//! dirty/clean state during a migration flush pass.
//!
//! Mirrors the role `kernel-memory-addresses` plays for the paging code this
//! crate was grown from: a dependency-free, exhaustively unit-tested layer
//! everything else builds on.

#![cfg_attr(not(test), no_std)]

mod bitset;
mod frame;
mod layout;
mod pid;
mod region;

pub use bitset::Bitset;
pub use frame::Frame;
pub use layout::{AddressLayout, LayoutError};
pub use pid::Pid;
pub use region::{Region, RegionLayout, RegionLayoutError};

/// A virtual page number (`addr >> offsetWidth`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtPage(u64);

impl VirtPage {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for VirtPage {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<VirtPage> for u64 {
    #[inline]
    fn from(p: VirtPage) -> Self {
        p.as_u64()
    }
}

/// A cache-line-sized sub-unit index within a page (`(addr & ~indexMask) >> blockOffsetWidth`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockIndex(u32);

impl BlockIndex {
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for BlockIndex {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}
