//! In-memory FIFO of built events awaiting upload
//!
//! Unbounded: while the delivery loop is in its start-up delay or backing
//! off after failures, the queue grows with whatever callers log. Nothing is
//! persisted, so events still queued at process exit are lost.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::event::Event;

/// Shared handle to the delivery queue; clones see the same queue
#[derive(Debug, Clone, Default)]
pub struct DeliveryQueue {
    events: Arc<Mutex<VecDeque<Event>>>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event at the tail; never blocks beyond the short lock
    pub fn push(&self, event: Event) {
        self.lock().push_back(event);
    }

    /// Remove up to `max` events from the head in one step.
    ///
    /// Pushes racing with this call land after the removed prefix.
    pub fn take_batch(&self, max: usize) -> Vec<Event> {
        let mut events = self.lock();
        let n = max.min(events.len());
        events.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CustomKeys, Level};
    use crate::platform::EnvironmentFields;

    fn event(n: usize) -> Event {
        Event {
            logid: format!("id-{n}"),
            logtime: String::new(),
            msg: n.to_string(),
            desc: String::new(),
            level: Level::Info,
            appid: String::new(),
            version: String::new(),
            device_id: String::new(),
            user: String::new(),
            custom_keys: CustomKeys::default(),
            environment: EnvironmentFields::default(),
        }
    }

    fn msgs(batch: &[Event]) -> Vec<String> {
        batch.iter().map(|e| e.msg.clone()).collect()
    }

    #[test]
    fn test_take_batch_is_fifo_and_bounded() {
        let queue = DeliveryQueue::new();
        for n in 0..7 {
            queue.push(event(n));
        }

        assert_eq!(msgs(&queue.take_batch(3)), ["0", "1", "2"]);
        assert_eq!(queue.len(), 4);
        assert_eq!(msgs(&queue.take_batch(10)), ["3", "4", "5", "6"]);
        assert!(queue.is_empty());
        assert!(queue.take_batch(10).is_empty());
    }

    #[test]
    fn test_concurrent_pushes_are_never_lost() {
        let queue = DeliveryQueue::new();
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for n in 0..250 {
                        queue.push(event(t * 1000 + n));
                    }
                })
            })
            .collect();

        let mut drained = Vec::new();
        while drained.len() < 1000 {
            drained.extend(queue.take_batch(10));
            if writers.iter().all(|w| w.is_finished()) && queue.is_empty() {
                break;
            }
        }
        for writer in writers {
            writer.join().unwrap();
        }
        drained.extend(queue.take_batch(usize::MAX));

        assert_eq!(drained.len(), 1000);
        let mut ids: Vec<_> = drained.iter().map(|e| e.logid.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 1000);

        // per-writer order is preserved
        for t in 0..4 {
            let own: Vec<usize> = drained
                .iter()
                .filter_map(|e| e.msg.parse::<usize>().ok())
                .filter(|n| n / 1000 == t)
                .collect();
            assert!(own.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
