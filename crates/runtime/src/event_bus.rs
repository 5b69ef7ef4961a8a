/// Recorded notification with a monotonic sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<E> {
    pub seq: u64,
    pub payload: E,
}

type Subscriber<E> = Box<dyn FnMut(&Event<E>)>;

/// Events kept for polling hosts when no capacity is given.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Outbound notification channel.
///
/// Events are delivered to subscribers synchronously, in subscription order.
/// While nobody is subscribed they are retained for polling instead, up to
/// `capacity`; the oldest are evicted first.
pub struct EventBus<E> {
    next_seq: u64,
    capacity: usize,
    events: Vec<Event<E>>,
    subscribers: Vec<Subscriber<E>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl<E> std::fmt::Debug for EventBus<E>
where
    E: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("next_seq", &self.next_seq)
            .field("capacity", &self.capacity)
            .field("events", &self.events)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            next_seq: 0,
            capacity,
            events: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, f: impl FnMut(&Event<E>) + 'static) {
        self.subscribers.push(Box::new(f));
    }

    pub fn emit(&mut self, payload: E) {
        let event = Event {
            seq: self.next_seq,
            payload,
        };
        self.next_seq += 1;
        if !self.subscribers.is_empty() {
            for sub in &mut self.subscribers {
                sub(&event);
            }
            return;
        }
        if self.capacity == 0 {
            return;
        }
        if self.events.len() >= self.capacity {
            let excess = self.events.len() + 1 - self.capacity;
            self.events.drain(..excess);
        }
        self.events.push(event);
    }

    /// Total emitted, including evicted and delivered-only events.
    pub fn emitted(&self) -> u64 {
        self.next_seq
    }

    pub fn events(&self) -> &[Event<E>] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<Event<E>> {
        std::mem::take(&mut self.events)
    }
}
