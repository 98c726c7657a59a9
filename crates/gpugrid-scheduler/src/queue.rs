//! Priority queue of job ids.
//!
//! Ordered by `(priority rank, sequence)`: every critical job precedes every
//! high job, and so on; within a class, lower sequence goes first. Submission
//! sequences start at 1, and reclaimed jobs get negative sequences from a
//! separate counter so they land ahead of everything already in their class.

use std::collections::{BTreeMap, HashMap};

use gpugrid_core::{JobId, Priority};

type Slot = (u8, i64);

#[derive(Debug, Default)]
pub struct PriorityQueue {
    order: BTreeMap<Slot, JobId>,
    slots: HashMap<JobId, Slot>,
    /// Last sequence handed out by `push_front`; decreases from 0.
    front: i64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert behind every job of the same class with a lower sequence.
    ///
    /// Re-inserting an id that is already queued moves it.
    pub fn push_back(&mut self, job_id: &str, priority: Priority, sequence: u64) {
        self.insert(job_id, (priority.rank(), sequence as i64));
    }

    /// Insert at the head of the job's priority class. Returns the slot
    /// taken, for [`PriorityQueue::restore_front`] after a restart.
    pub fn push_front(&mut self, job_id: &str, priority: Priority) -> i64 {
        self.front -= 1;
        self.insert(job_id, (priority.rank(), self.front));
        self.front
    }

    /// Re-insert at a slot handed out by an earlier `push_front`.
    ///
    /// Later `push_front` calls still land ahead of every restored slot.
    pub fn restore_front(&mut self, job_id: &str, priority: Priority, slot: i64) {
        self.front = self.front.min(slot);
        self.insert(job_id, (priority.rank(), slot));
    }

    fn insert(&mut self, job_id: &str, slot: Slot) {
        self.remove(job_id);
        self.order.insert(slot, job_id.to_string());
        self.slots.insert(job_id.to_string(), slot);
    }

    /// Remove and return the head.
    pub fn pop(&mut self) -> Option<JobId> {
        let (_, job_id) = self.order.pop_first()?;
        self.slots.remove(&job_id);
        Some(job_id)
    }

    /// Remove `job_id` wherever it sits. Returns true if it was queued.
    pub fn remove(&mut self, job_id: &str) -> bool {
        match self.slots.remove(job_id) {
            Some(slot) => {
                self.order.remove(&slot);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(queue: &mut PriorityQueue) -> Vec<JobId> {
        std::iter::from_fn(|| queue.pop()).collect()
    }

    #[test]
    fn priority_classes_before_submission_order() {
        let mut queue = PriorityQueue::new();
        queue.push_back("low", Priority::Low, 1);
        queue.push_back("normal", Priority::Normal, 2);
        queue.push_back("critical", Priority::Critical, 3);
        queue.push_back("high", Priority::High, 4);

        assert_eq!(drain(&mut queue), ["critical", "high", "normal", "low"]);
    }

    #[test]
    fn fifo_within_class() {
        let mut queue = PriorityQueue::new();
        queue.push_back("b", Priority::Normal, 2);
        queue.push_back("a", Priority::Normal, 1);
        queue.push_back("c", Priority::Normal, 3);

        assert_eq!(drain(&mut queue), ["a", "b", "c"]);
    }

    #[test]
    fn push_front_goes_to_head_of_class_only() {
        let mut queue = PriorityQueue::new();
        queue.push_back("high", Priority::High, 1);
        queue.push_back("n1", Priority::Normal, 2);
        queue.push_back("n2", Priority::Normal, 3);
        queue.push_front("reclaimed", Priority::Normal);

        assert_eq!(drain(&mut queue), ["high", "reclaimed", "n1", "n2"]);
    }

    #[test]
    fn latest_push_front_wins() {
        let mut queue = PriorityQueue::new();
        queue.push_back("n1", Priority::Normal, 1);
        queue.push_front("first", Priority::Normal);
        queue.push_front("second", Priority::Normal);

        assert_eq!(drain(&mut queue), ["second", "first", "n1"]);
    }

    #[test]
    fn remove_only_reports_queued_ids() {
        let mut queue = PriorityQueue::new();
        queue.push_back("a", Priority::Normal, 1);
        queue.push_back("b", Priority::Normal, 2);

        assert!(queue.remove("a"));
        assert!(!queue.remove("a"));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().as_deref(), Some("b"));
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn reinsert_moves_instead_of_duplicating() {
        let mut queue = PriorityQueue::new();
        queue.push_back("a", Priority::Low, 1);
        queue.push_back("b", Priority::Normal, 2);
        queue.push_back("a", Priority::Normal, 1);

        assert_eq!(queue.len(), 2);
        assert_eq!(drain(&mut queue), ["a", "b"]);
    }

    #[test]
    fn restored_slot_keeps_its_place_and_later_reclaims_go_first() {
        let mut before = PriorityQueue::new();
        before.push_back("n1", Priority::Normal, 1);
        let slot = before.push_front("reclaimed", Priority::Normal);

        let mut after = PriorityQueue::new();
        after.push_back("n1", Priority::Normal, 1);
        after.restore_front("reclaimed", Priority::Normal, slot);
        after.push_front("newest", Priority::Normal);

        assert_eq!(drain(&mut after), ["newest", "reclaimed", "n1"]);
    }
}
