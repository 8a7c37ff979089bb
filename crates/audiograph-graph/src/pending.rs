//! The deferred connect/disconnect queue the update thread drains under
//! the graph lock.
//!
//! Phase order (`Connect < Disconnect < FinishDisconnect`) is enforced by
//! draining the queue in three passes rather than by a single sort, since
//! items re-queue themselves (a deferred connect, a still-fading
//! disconnect) and must come back around in the same relative order.

use std::collections::VecDeque;

use crate::node_id::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Connect,
    Disconnect,
    FinishDisconnect,
}

#[derive(Clone, Copy, Debug)]
pub struct PendingEdge {
    pub dest: NodeId,
    pub src: NodeId,
    pub dest_input: u32,
    pub src_output: u32,
    pub phase: Phase,
    /// Seconds remaining in the `FinishDisconnect` crossfade; unused in
    /// other phases.
    pub remaining_duration: f64,
    /// For a `Connect` that targets a scheduled source awaiting its start
    /// time: the horizon (`enqueue_time + 100ms`) past which the edge is
    /// wired even if the source hasn't started yet, so a far-future
    /// `play(after:)` doesn't block the edge forever.
    pub horizon_seconds: f64,
}

#[derive(Default)]
pub struct PendingQueue {
    connect: VecDeque<PendingEdge>,
    disconnect: VecDeque<PendingEdge>,
    finish_disconnect: VecDeque<PendingEdge>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edge: PendingEdge) {
        match edge.phase {
            Phase::Connect => self.connect.push_back(edge),
            Phase::Disconnect => self.disconnect.push_back(edge),
            Phase::FinishDisconnect => self.finish_disconnect.push_back(edge),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.connect.is_empty() && self.disconnect.is_empty() && self.finish_disconnect.is_empty()
    }

    /// Drain every queue in phase order, handing each item to `apply`.
    /// `apply` returns `Some(edge)` to re-queue it (its phase field decides
    /// which queue it lands back in) or `None` to drop it.
    pub fn drain_one_pass(&mut self, mut apply: impl FnMut(PendingEdge) -> Option<PendingEdge>) {
        for queue in [&mut self.connect, &mut self.disconnect, &mut self.finish_disconnect] {
            let pending = std::mem::take(queue);
            for edge in pending {
                if let Some(requeued) = apply(edge) {
                    match requeued.phase {
                        Phase::Connect => self.connect.push_back(requeued),
                        Phase::Disconnect => self.disconnect.push_back(requeued),
                        Phase::FinishDisconnect => self.finish_disconnect.push_back(requeued),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunderdome::Arena;

    fn fake_node_id(arena: &mut Arena<()>) -> NodeId {
        NodeId { idx: arena.insert(()), debug_name: "test" }
    }

    #[test]
    fn drains_in_phase_order() {
        let mut arena = Arena::new();
        let a = fake_node_id(&mut arena);
        let b = fake_node_id(&mut arena);
        let mut queue = PendingQueue::new();
        queue.push(PendingEdge {
            dest: b,
            src: a,
            dest_input: 0,
            src_output: 0,
            phase: Phase::FinishDisconnect,
            remaining_duration: 0.0,
            horizon_seconds: 0.0,
        });
        queue.push(PendingEdge {
            dest: a,
            src: b,
            dest_input: 0,
            src_output: 0,
            phase: Phase::Connect,
            remaining_duration: 0.0,
            horizon_seconds: 0.0,
        });

        let mut order = Vec::new();
        queue.drain_one_pass(|edge| {
            order.push(edge.phase);
            None
        });
        assert_eq!(order, vec![Phase::Connect, Phase::FinishDisconnect]);
    }
}
