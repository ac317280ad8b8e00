use std::collections::HashMap;

use hmm_addresses::{Frame, Pid, Region, VirtPage};

/// Per-page metadata, keyed by virtual page within one process's table
/// (spec section 3 "PageEntry").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEntry {
    pub frame: Frame,
    pub region: Region,
    /// True iff a `MigrationEntry` currently references this page.
    pub is_migrating: bool,
    /// True iff new requests must be stalled: set during the critical window
    /// of a migration (spec section 4.3).
    pub stall_on_access: bool,
}

impl PageEntry {
    #[must_use]
    pub const fn new(frame: Frame, region: Region) -> Self {
        Self {
            frame,
            region,
            is_migrating: false,
            stall_on_access: false,
        }
    }
}

/// Per-process virtual-page tables.
///
/// Per spec section 9 ("Cyclic references"), a `MigrationEntry` never holds a
/// reference into this table — only `(pid, vpage)` keys, looked up here when
/// needed.
#[derive(Debug, Default)]
pub struct PageTable {
    tables: HashMap<Pid, HashMap<VirtPage, PageEntry>>,
}

impl PageTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pid: Pid, vpage: VirtPage, entry: PageEntry) {
        self.tables.entry(pid).or_default().insert(vpage, entry);
    }

    #[must_use]
    pub fn get(&self, pid: Pid, vpage: VirtPage) -> Option<&PageEntry> {
        self.tables.get(&pid)?.get(&vpage)
    }

    pub fn get_mut(&mut self, pid: Pid, vpage: VirtPage) -> Option<&mut PageEntry> {
        self.tables.get_mut(&pid)?.get_mut(&vpage)
    }

    pub fn remove(&mut self, pid: Pid, vpage: VirtPage) -> Option<PageEntry> {
        self.tables.get_mut(&pid)?.remove(&vpage)
    }

    #[must_use]
    pub fn used_footprint(&self, pid: Pid) -> usize {
        self.tables.get(&pid).map_or(0, HashMap::len)
    }

    #[must_use]
    pub fn contains(&self, pid: Pid, vpage: VirtPage) -> bool {
        self.get(pid, vpage).is_some()
    }
}
