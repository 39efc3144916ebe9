//! Per-machine FIFO queue with selective receive.

use crate::event::{Event, EventType};
use std::collections::VecDeque;

/// Pending events of one machine, in arrival order.
///
/// Removal is always "first entry satisfying a predicate": plain dequeue
/// uses a predicate that skips deferred types, selective receive uses the
/// awaited set. Skipped entries keep their relative order.
#[derive(Debug, Default, Clone)]
pub struct Mailbox {
    queue: VecDeque<Event>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.queue.push_back(event);
    }

    /// Put an event back at the head, ahead of everything queued.
    pub fn push_front(&mut self, event: Event) {
        self.queue.push_front(event);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Remove and return the first event whose type satisfies `accept`.
    pub fn dequeue_first(&mut self, mut accept: impl FnMut(EventType) -> bool) -> Option<Event> {
        let index = self.queue.iter().position(|e| accept(e.kind()))?;
        self.queue.remove(index)
    }

    pub fn contains(&self, mut accept: impl FnMut(EventType) -> bool) -> bool {
        self.queue.iter().any(|e| accept(e.kind()))
    }

    /// Remove the first event matching any of `patterns` (wildcard aware).
    pub fn receive(&mut self, patterns: &[EventType]) -> Option<Event> {
        self.dequeue_first(|kind| patterns.iter().any(|p| p.matches(kind)))
    }

    pub fn kinds(&self) -> Vec<EventType> {
        self.queue.iter().map(Event::kind).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.queue.iter()
    }

    /// Drop every pending event, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }
}
