//! Realtime-safe delivery of user callbacks off the render thread.
//!
//! The render thread only ever pushes; nothing it does here can block.
//! `Dispatcher::enqueue` grows its `Vec` up to `capacity`, pre-allocated at
//! construction so the render thread's push never triggers a reallocation;
//! once full, further events are dropped (and logged) rather than grown
//! past the bound or blocked on.

use std::sync::Mutex;

use crate::node_id::NodeId;

/// A node's playback finished; deliver this off the render thread.
pub struct FinishedEvent {
    pub node: NodeId,
    pub callback: Box<dyn FnOnce() + Send>,
}

pub struct Dispatcher {
    queue: Mutex<Vec<FinishedEvent>>,
    capacity: usize,
}

impl Dispatcher {
    /// `capacity` bounds the queue (see
    /// `audiograph_core::GraphConfig::dispatcher_queue_capacity`); its
    /// storage is reserved up front so the render thread's `enqueue` never
    /// allocates.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Called from the render thread when a scheduled source finishes. A
    /// full queue means the control thread is outpacing the render
    /// thread's drain rate; the event is dropped and logged rather than
    /// grown past `capacity` or blocked on.
    pub fn enqueue(&self, event: FinishedEvent) {
        if let Ok(mut queue) = self.queue.lock() {
            if queue.len() >= self.capacity {
                log::warn!(
                    "dispatcher queue at capacity ({}); dropping a finished-callback event for {:?}",
                    self.capacity,
                    event.node,
                );
                return;
            }
            queue.push(event);
        }
    }

    /// Called from client code (never the render thread) to run any
    /// pending `onEnded` callbacks.
    pub fn drain(&self) {
        let events = {
            let Ok(mut queue) = self.queue.lock() else { return };
            std::mem::replace(&mut *queue, Vec::with_capacity(self.capacity))
        };
        for event in events {
            (event.callback)();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn drain_runs_callbacks_once() {
        let dispatcher = Dispatcher::new(256);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        dispatcher.enqueue(FinishedEvent {
            node: NodeId::DANGLING,
            callback: Box::new(move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        });
        dispatcher.drain();
        dispatcher.drain();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn enqueue_drops_events_past_capacity() {
        let dispatcher = Dispatcher::new(1);
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count_clone = count.clone();
            dispatcher.enqueue(FinishedEvent {
                node: NodeId::DANGLING,
                callback: Box::new(move || {
                    count_clone.fetch_add(1, Ordering::SeqCst);
                }),
            });
        }
        dispatcher.drain();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
