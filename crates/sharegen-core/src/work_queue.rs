//! Lock-free work queue handing records to one or more workers

use std::sync::atomic::{AtomicUsize, Ordering};

/// Records waiting to be processed, claimed in input order.
///
/// Workers call [`next()`](WorkQueue::next) to claim the next item. Use
/// [`filtered`](WorkQueue::filtered) to drop items already done (resume).
pub struct WorkQueue<S> {
    items: Vec<S>,
    cursor: AtomicUsize,
}

impl<S> WorkQueue<S> {
    pub fn new(items: Vec<S>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Keep only items that pass `keep`; returns the queue and the number dropped
    pub fn filtered(items: Vec<S>, keep: impl Fn(&S) -> bool) -> (Self, usize) {
        let before = items.len();
        let kept: Vec<S> = items.into_iter().filter(|s| keep(s)).collect();
        let dropped = before - kept.len();
        log::debug!("{} items in work queue, {dropped} filtered out", kept.len());
        (Self::new(kept), dropped)
    }

    /// Claim the next item
    pub fn next(&self) -> Option<&S> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i)
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Items never handed out
    pub fn unclaimed(&self) -> usize {
        self.total()
            .saturating_sub(self.cursor.load(Ordering::Relaxed))
    }

    pub fn items(&self) -> &[S] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_in_order() {
        let q = WorkQueue::new(vec!["e1", "e2", "e3"]);
        assert_eq!(q.total(), 3);
        assert_eq!(q.next(), Some(&"e1"));
        assert_eq!(q.next(), Some(&"e2"));
        assert_eq!(q.unclaimed(), 1);
        assert_eq!(q.next(), Some(&"e3"));
        assert_eq!(q.next(), None);
        assert_eq!(q.unclaimed(), 0);
    }

    #[test]
    fn filtered_reports_dropped() {
        let (q, dropped) = WorkQueue::filtered(vec![1, 2, 3, 4], |x| *x % 2 == 0);
        assert_eq!(dropped, 2);
        assert_eq!(q.items(), &[2, 4]);
    }

    #[test]
    fn empty_queue() {
        let q: WorkQueue<i32> = WorkQueue::new(vec![]);
        assert_eq!(q.total(), 0);
        assert_eq!(q.next(), None);
        assert_eq!(q.unclaimed(), 0);
    }
}
