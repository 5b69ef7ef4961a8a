use std::time::Duration;

use foundation::time::Timestamp;

/// Single shared debounce timer for batch flushing.
///
/// Every `schedule` pushes the deadline out to `now + window`; the timer fires
/// once the caller observes a quiet period of at least `window`. The scheduler
/// never runs the flush itself: `poll` and `flush_now` report that a flush is
/// owed and the owner performs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushScheduler {
    window: Duration,
    deadline: Option<Timestamp>,
}

impl FlushScheduler {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn deadline(&self) -> Option<Timestamp> {
        self.deadline
    }

    pub fn is_scheduled(&self) -> bool {
        self.deadline.is_some()
    }

    /// (Re)starts the timer. Returns the new deadline.
    pub fn schedule(&mut self, now: Timestamp) -> Timestamp {
        let deadline = now.saturating_add(self.window);
        self.deadline = Some(deadline);
        deadline
    }

    /// Returns `true` if a timer was outstanding.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Returns `true` exactly once per expired deadline.
    pub fn poll(&mut self, now: Timestamp) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Cancels the outstanding timer so the owner can flush synchronously.
    ///
    /// Returns `true` if a timer was outstanding.
    pub fn flush_now(&mut self) -> bool {
        self.cancel()
    }
}

#[cfg(test)]
mod tests {
    use super::FlushScheduler;
    use foundation::time::Timestamp;
    use std::time::Duration;

    fn scheduler() -> FlushScheduler {
        FlushScheduler::new(Duration::from_millis(100))
    }

    #[test]
    fn fires_after_quiet_window() {
        let mut s = scheduler();
        s.schedule(Timestamp(0));
        assert!(!s.poll(Timestamp(99)));
        assert!(s.poll(Timestamp(100)));
        assert!(!s.poll(Timestamp(500)));
    }

    #[test]
    fn reschedule_extends_deadline() {
        let mut s = scheduler();
        s.schedule(Timestamp(0));
        s.schedule(Timestamp(80));
        assert!(!s.poll(Timestamp(150)));
        assert_eq!(s.deadline(), Some(Timestamp(180)));
        assert!(s.poll(Timestamp(180)));
    }

    #[test]
    fn cancel_and_flush_now_clear_deadline() {
        let mut s = scheduler();
        assert!(!s.cancel());
        s.schedule(Timestamp(0));
        assert!(s.flush_now());
        assert!(!s.is_scheduled());
        assert!(!s.poll(Timestamp(1_000)));
    }
}
