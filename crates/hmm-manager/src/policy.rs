use std::collections::HashMap;

use hmm_addresses::{Pid, Region, VirtPage};

/// Capability set a migration policy exposes (spec section 4.6 "PolicySet").
///
/// Boxed trait objects, per spec section 9's "vtable-style dispatch if
/// user-extensible" — policies are meant to be pluggable, not a closed enum.
pub trait MigrationPolicy {
    /// A PCM page worth moving to DRAM, subject to `pid_budget` remaining
    /// promotions this partition period.
    fn select_promote(&mut self, pid_budget: u32) -> Option<(Pid, VirtPage)>;
    /// A DRAM page worth evicting; demotions are never budget-constrained
    /// (spec section 4.5).
    fn select_demote(&mut self) -> Option<(Pid, VirtPage)>;
    /// Online bookkeeping hook invoked from every `access()` (spec section
    /// 4.6, 4.7 "updateMonitors").
    fn notify_access(&mut self, pid: Pid, vpage: VirtPage, read: bool, instr: bool);
    /// `(pid, vpage)` now resides in `region` — called once at initial
    /// placement and again whenever a migration commits or rolls back, so a
    /// policy can maintain its own promote/demote candidate sets instead of
    /// relying on an external caller to keep them in sync (spec section 4.6
    /// "PolicySet").
    fn notify_placed(&mut self, pid: Pid, vpage: VirtPage, region: Region);
}

/// Counts accesses per `(pid, vpage)` and promotes/demotes by access count, a
/// minimal stand-in for a full LRU/LFU policy (spec section 4.6: "pluggable
/// migration policies").
#[derive(Debug, Default)]
pub struct AccessCountPolicy {
    counts: HashMap<(Pid, VirtPage), u64>,
    pcm_candidates: Vec<(Pid, VirtPage)>,
    dram_candidates: Vec<(Pid, VirtPage)>,
}

impl AccessCountPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MigrationPolicy for AccessCountPolicy {
    fn select_promote(&mut self, pid_budget: u32) -> Option<(Pid, VirtPage)> {
        if pid_budget == 0 {
            return None;
        }
        self.pcm_candidates
            .iter()
            .copied()
            .max_by_key(|k| self.counts.get(k).copied().unwrap_or(0))
    }

    fn select_demote(&mut self) -> Option<(Pid, VirtPage)> {
        self.dram_candidates
            .iter()
            .copied()
            .min_by_key(|k| self.counts.get(k).copied().unwrap_or(0))
    }

    fn notify_access(&mut self, pid: Pid, vpage: VirtPage, _read: bool, _instr: bool) {
        *self.counts.entry((pid, vpage)).or_insert(0) += 1;
    }

    fn notify_placed(&mut self, pid: Pid, vpage: VirtPage, region: Region) {
        let key = (pid, vpage);
        self.pcm_candidates.retain(|&k| k != key);
        self.dram_candidates.retain(|&k| k != key);
        match region {
            Region::Pcm => self.pcm_candidates.push(key),
            Region::Dram => self.dram_candidates.push(key),
        }
    }
}

/// Returns a fixed, pre-programmed sequence of candidates regardless of
/// access history, so integration tests can drive the spec section 8
/// concrete scenarios deterministically.
#[derive(Debug, Default)]
pub struct FixedCandidatePolicy {
    promote_queue: Vec<(Pid, VirtPage)>,
    demote_queue: Vec<(Pid, VirtPage)>,
}

impl FixedCandidatePolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_promotions(mut self, candidates: Vec<(Pid, VirtPage)>) -> Self {
        self.promote_queue = candidates;
        self
    }

    #[must_use]
    pub fn with_demotions(mut self, candidates: Vec<(Pid, VirtPage)>) -> Self {
        self.demote_queue = candidates;
        self
    }
}

impl MigrationPolicy for FixedCandidatePolicy {
    fn select_promote(&mut self, pid_budget: u32) -> Option<(Pid, VirtPage)> {
        if pid_budget == 0 || self.promote_queue.is_empty() {
            return None;
        }
        Some(self.promote_queue.remove(0))
    }

    fn select_demote(&mut self) -> Option<(Pid, VirtPage)> {
        if self.demote_queue.is_empty() {
            return None;
        }
        Some(self.demote_queue.remove(0))
    }

    fn notify_access(&mut self, _pid: Pid, _vpage: VirtPage, _read: bool, _instr: bool) {}

    fn notify_placed(&mut self, _pid: Pid, _vpage: VirtPage, _region: Region) {}
}

/// The set of enabled policies consulted, in fixed order, by a DEMOTE tick
/// (spec section 4.6: "loops over enabled policies in fixed order").
#[derive(Default)]
pub struct PolicySet {
    policies: Vec<Box<dyn MigrationPolicy>>,
}

impl PolicySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, policy: Box<dyn MigrationPolicy>) {
        self.policies.push(policy);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn notify_access(&mut self, pid: Pid, vpage: VirtPage, read: bool, instr: bool) {
        for policy in &mut self.policies {
            policy.notify_access(pid, vpage, read, instr);
        }
    }

    /// Broadcast a placement/re-placement to every registered policy (spec
    /// section 4.6) — the manager calls this from `allocate`,
    /// `commit_migration` and `rollback` so a policy like
    /// [`AccessCountPolicy`] can maintain its own candidate sets.
    pub fn notify_placed(&mut self, pid: Pid, vpage: VirtPage, region: Region) {
        for policy in &mut self.policies {
            policy.notify_placed(pid, vpage, region);
        }
    }

    /// First enabled policy (in registration order) with a promotion
    /// candidate under `pid_budget`.
    pub fn select_promote(&mut self, pid_budget: u32) -> Option<(usize, Pid, VirtPage)> {
        for (index, policy) in self.policies.iter_mut().enumerate() {
            if let Some((pid, vpage)) = policy.select_promote(pid_budget) {
                return Some((index, pid, vpage));
            }
        }
        None
    }

    pub fn select_demote(&mut self) -> Option<(usize, Pid, VirtPage)> {
        for (index, policy) in self.policies.iter_mut().enumerate() {
            if let Some((pid, vpage)) = policy.select_demote() {
                return Some((index, pid, vpage));
            }
        }
        None
    }

    /// Consult exactly the policy at `index`, rather than the first match
    /// across all of them — used by a DEMOTE tick that gives every enabled
    /// policy its own attempt in fixed order (spec section 4.6).
    pub fn select_promote_at(&mut self, index: usize, pid_budget: u32) -> Option<(Pid, VirtPage)> {
        self.policies.get_mut(index)?.select_promote(pid_budget)
    }

    /// Like [`Self::select_promote_at`], for demotion.
    pub fn select_demote_at(&mut self, index: usize) -> Option<(Pid, VirtPage)> {
        self.policies.get_mut(index)?.select_demote()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_drains_promotions_in_order() {
        let mut policy = FixedCandidatePolicy::new()
            .with_promotions(vec![(Pid::new(0), VirtPage::new(0x10)), (Pid::new(0), VirtPage::new(0x11))]);
        assert_eq!(policy.select_promote(1), Some((Pid::new(0), VirtPage::new(0x10))));
        assert_eq!(policy.select_promote(1), Some((Pid::new(0), VirtPage::new(0x11))));
        assert_eq!(policy.select_promote(1), None);
    }

    #[test]
    fn zero_budget_blocks_promotion() {
        let mut policy =
            FixedCandidatePolicy::new().with_promotions(vec![(Pid::new(0), VirtPage::new(0x10))]);
        assert_eq!(policy.select_promote(0), None);
    }

    #[test]
    fn policy_set_tries_in_registration_order() {
        let mut set = PolicySet::new();
        set.push(Box::new(FixedCandidatePolicy::new()));
        set.push(Box::new(
            FixedCandidatePolicy::new().with_promotions(vec![(Pid::new(2), VirtPage::new(0x30))]),
        ));
        assert_eq!(set.select_promote(1), Some((1, Pid::new(2), VirtPage::new(0x30))));
    }

    #[test]
    fn access_count_policy_promotes_most_accessed() {
        let mut policy = AccessCountPolicy::new();
        policy.notify_placed(Pid::new(0), VirtPage::new(1), Region::Pcm);
        policy.notify_placed(Pid::new(0), VirtPage::new(2), Region::Pcm);
        policy.notify_access(Pid::new(0), VirtPage::new(2), true, false);
        policy.notify_access(Pid::new(0), VirtPage::new(2), true, false);
        policy.notify_access(Pid::new(0), VirtPage::new(1), true, false);
        assert_eq!(policy.select_promote(1), Some((Pid::new(0), VirtPage::new(2))));
    }

    #[test]
    fn access_count_policy_moves_candidate_between_lists_on_replacement() {
        let mut policy = AccessCountPolicy::new();
        policy.notify_placed(Pid::new(0), VirtPage::new(1), Region::Pcm);
        assert_eq!(policy.select_promote(1), Some((Pid::new(0), VirtPage::new(1))));
        assert_eq!(policy.select_demote(), None);
        policy.notify_placed(Pid::new(0), VirtPage::new(1), Region::Dram);
        assert_eq!(policy.select_promote(1), None);
        assert_eq!(policy.select_demote(), Some((Pid::new(0), VirtPage::new(1))));
    }
}
