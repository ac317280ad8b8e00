use std::collections::{HashMap, VecDeque};

use hmm_addresses::{Pid, VirtPage};

/// FIFO queues of requests blocked on an in-flight migration, keyed by
/// `(pid, vpage)` (spec section 3 "StallQueue", section 4.3 "Stalling").
///
/// A request is stalled, never dropped: it is released in the order it
/// arrived once the owning migration reaches `DONE` or `ROLLBACK`.
#[derive(Debug, Default)]
pub struct StallQueue {
    queues: HashMap<(Pid, VirtPage), VecDeque<u64>>,
}

impl StallQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stalled request's CPU id to the `(pid, vpage)` queue.
    pub fn push(&mut self, pid: Pid, vpage: VirtPage, cpu: u64) {
        self.queues.entry((pid, vpage)).or_default().push_back(cpu);
    }

    #[must_use]
    pub fn is_stalled(&self, pid: Pid, vpage: VirtPage) -> bool {
        self.queues
            .get(&(pid, vpage))
            .is_some_and(|q| !q.is_empty())
    }

    /// Drain every request stalled on `(pid, vpage)`, in arrival order.
    pub fn drain(&mut self, pid: Pid, vpage: VirtPage) -> Vec<u64> {
        self.queues
            .remove(&(pid, vpage))
            .map(Vec::from)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self, pid: Pid, vpage: VirtPage) -> usize {
        self.queues.get(&(pid, vpage)).map_or(0, VecDeque::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.values().all(VecDeque::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stalls_release_in_arrival_order() {
        let mut queue = StallQueue::new();
        let pid = Pid::new(0);
        let vpage = VirtPage::new(1);
        queue.push(pid, vpage, 10);
        queue.push(pid, vpage, 20);
        queue.push(pid, vpage, 30);
        assert!(queue.is_stalled(pid, vpage));
        assert_eq!(queue.drain(pid, vpage), vec![10, 20, 30]);
        assert!(!queue.is_stalled(pid, vpage));
    }

    #[test]
    fn unrelated_pages_dont_interfere() {
        let mut queue = StallQueue::new();
        queue.push(Pid::new(0), VirtPage::new(1), 1);
        assert!(!queue.is_stalled(Pid::new(0), VirtPage::new(2)));
        assert!(!queue.is_empty());
    }

    #[test]
    fn draining_missing_key_is_empty() {
        let mut queue = StallQueue::new();
        assert!(queue.drain(Pid::new(9), VirtPage::new(9)).is_empty());
    }
}
