use parking_lot::{Condvar, Mutex};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use super::Event;

/// Multi-producer inbound queue of a worker.
///
/// Event names registered as coalesced keep at most one pending instance:
/// pushing a new one purges the older ones first, so a slow consumer only
/// ever sees the latest.
pub struct EventQueue {
    pending: Mutex<VecDeque<Event>>,
    available: Condvar,
    coalesced: HashSet<String>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::with_coalescing(Vec::<String>::new())
    }

    pub fn with_coalescing<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pending: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            coalesced: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn coalesces(&self, name: &str) -> bool {
        self.coalesced.contains(name)
    }

    /// Enqueue an event, returning how many pending events it superseded.
    pub fn push(&self, event: Event) -> usize {
        let mut pending = self.pending.lock();
        let mut purged = 0;

        if self.coalesced.contains(event.name()) {
            let before = pending.len();
            pending.retain(|queued| queued.name() != event.name());
            purged = before - pending.len();
        }

        pending.push_back(event);
        self.available.notify_one();
        purged
    }

    /// Take every pending event in arrival order.
    pub fn drain(&self) -> Vec<Event> {
        self.pending.lock().drain(..).collect()
    }

    /// Copy of the pending events, leaving the queue untouched
    pub fn snapshot(&self) -> Vec<Event> {
        self.pending.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Block until an event is pending, the queue is woken, or `timeout` passes.
    ///
    /// Returns whether events are pending.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            self.available.wait_for(&mut pending, timeout);
        }
        !pending.is_empty()
    }

    /// Wake every thread blocked in [`wait_timeout`](Self::wait_timeout).
    pub fn wake(&self) {
        let _pending = self.pending.lock();
        self.available.notify_all();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::names;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_fifo_without_coalescing() {
        let queue = EventQueue::new();
        for n in 0..3 {
            queue.push(Event::empty("video", names::FRAME).with_frame_number(n));
        }

        let numbers: Vec<_> = queue.drain().iter().map(|e| e.frame_number()).collect();
        assert_eq!(numbers, vec![Some(0), Some(1), Some(2)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_coalescing_keeps_other_names() {
        let queue = EventQueue::with_coalescing([names::FRAME]);
        queue.push(Event::empty("video", names::FRAME).with_frame_number(1));
        queue.push(Event::empty("ui", "ping"));
        let purged = queue.push(Event::empty("video", names::FRAME).with_frame_number(2));

        assert_eq!(purged, 1);
        let pending = queue.drain();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].is("ping"));
        assert_eq!(pending[1].frame_number(), Some(2));
    }

    #[test]
    fn test_wait_returns_when_event_arrives() {
        let queue = Arc::new(EventQueue::new());
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.push(Event::empty("a", "ping"));
            })
        };

        let start = Instant::now();
        let mut ready = false;
        while !ready && start.elapsed() < Duration::from_secs(5) {
            ready = queue.wait_timeout(Duration::from_secs(1));
        }
        producer.join().unwrap();

        assert!(ready);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_wait_times_out_when_idle() {
        let queue = EventQueue::new();
        let start = Instant::now();
        assert!(!queue.wait_timeout(Duration::from_millis(10)));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
