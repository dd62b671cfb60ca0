// 3.2: ordered event channel. events leave by (kind priority, push sequence) ascending,
// so same-priority events are FIFO. owned by the engine, never global.

use crate::events::{Event, EventPayload, EventSequence};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventKey {
    priority: u8,
    sequence: EventSequence,
}

#[derive(Debug)]
pub struct EventChannel {
    queue: BTreeMap<EventKey, Event>,
    next_sequence: u64,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    pub fn new() -> Self {
        Self {
            queue: BTreeMap::new(),
            next_sequence: 1,
        }
    }

    /// Stamps the payload with the next sequence number and enqueues it.
    pub fn push(&mut self, payload: EventPayload) -> EventSequence {
        let sequence = EventSequence(self.next_sequence);
        self.next_sequence += 1;

        let key = EventKey {
            priority: payload.kind().priority(),
            sequence,
        };
        self.queue.insert(key, Event::new(sequence, payload));
        sequence
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.queue.pop_first().map(|(_, event)| event)
    }

    pub fn peek(&self) -> Option<&Event> {
        self.queue.values().next()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Removes every queued event without dispatching it, in dequeue order.
    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.queue).into_values().collect()
    }

    /// Removes queued signals and orders only. Fills and fund events stay queued
    /// with their original sequence numbers.
    pub fn cancel_portfolio_events(&mut self) -> Vec<Event> {
        let (cancelled, kept): (BTreeMap<_, _>, BTreeMap<_, _>) = std::mem::take(&mut self.queue)
            .into_iter()
            .partition(|(_, event)| event.payload.is_cancellable());
        self.queue = kept;
        cancelled.into_values().collect()
    }
}
