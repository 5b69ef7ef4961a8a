use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use foundation::time::Timestamp;

/// Source of "now" for timers. Production uses [`SystemClock`]; tests drive a
/// [`VirtualClock`] by hand so debounce behavior never waits on wall time.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX))
    }
}

/// Manually advanced clock. Clones share the same timeline.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    now_ms: Rc<Cell<u64>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let next = Timestamp(self.now_ms.get()).saturating_add(by);
        self.now_ms.set(next.0);
    }

    pub fn set(&self, t: Timestamp) {
        self.now_ms.set(t.0);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now_ms.get())
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, SystemClock, VirtualClock};
    use foundation::time::Timestamp;
    use std::time::Duration;

    #[test]
    fn virtual_clock_clones_share_time() {
        let clock = VirtualClock::new();
        let handle = clock.clone();
        handle.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), Timestamp(250));
        clock.set(Timestamp(10));
        assert_eq!(handle.now(), Timestamp(10));
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
