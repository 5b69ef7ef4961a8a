/// FIFO of operations submitted before their target is ready.
///
/// Key properties:
/// - Replay order equals submission order.
/// - Draining empties the queue; nothing is replayed twice.
/// - Ids are monotonic so callers can correlate log lines with submissions.

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeferredId(pub u64);

#[derive(Debug)]
pub struct DeferredQueue<T> {
    next_id: u64,
    items: Vec<(DeferredId, T)>,
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            items: Vec::new(),
        }
    }
}

impl<T> DeferredQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, op: T) -> DeferredId {
        let id = DeferredId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.items.push((id, op));
        id
    }

    pub fn iter(&self) -> impl Iterator<Item = &(DeferredId, T)> {
        self.items.iter()
    }

    /// Takes every queued operation in submission order.
    pub fn drain(&mut self) -> Vec<(DeferredId, T)> {
        std::mem::take(&mut self.items)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{DeferredId, DeferredQueue};

    #[test]
    fn drains_in_submission_order() {
        let mut q = DeferredQueue::new();
        q.push("create");
        q.push("add");
        q.push("hide");

        let ops: Vec<_> = q.drain().into_iter().map(|(_, op)| op).collect();
        assert_eq!(ops, vec!["create", "add", "hide"]);
        assert!(q.is_empty());
    }

    #[test]
    fn ids_keep_increasing_across_drains() {
        let mut q = DeferredQueue::new();
        assert_eq!(q.push(1), DeferredId(0));
        q.drain();
        assert_eq!(q.push(2), DeferredId(1));
        assert_eq!(q.len(), 1);
    }
}
