// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event stream hub
//!
//! Engine events fan out to SSE subscribers through a broadcast
//! channel; a bounded ring buffer keeps recent history so a resumed
//! stream can replay since `Last-Event-ID`. On overflow the configured
//! policy drops the oldest or the newest entry.

use parking_lot::Mutex;
use sm_core::EngineEvent;
use sm_rpc::StreamEnvelope;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropPolicy {
    Oldest,
    Newest,
}

pub struct EventStreamHub {
    buffer: Mutex<VecDeque<StreamEnvelope>>,
    capacity: usize,
    drop_policy: DropPolicy,
    next_id: AtomicU64,
    broadcast: broadcast::Sender<StreamEnvelope>,
}

impl EventStreamHub {
    pub fn new(capacity: usize, drop_policy: DropPolicy) -> Self {
        let (broadcast, _) = broadcast::channel(capacity.max(16));
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            drop_policy,
            next_id: AtomicU64::new(1),
            broadcast,
        }
    }

    /// Publish an engine event. Returns its stream id.
    pub fn publish(&self, event: &EngineEvent) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let envelope = StreamEnvelope::new(id, event);

        {
            let mut buffer = self.buffer.lock();
            if buffer.len() >= self.capacity {
                match self.drop_policy {
                    DropPolicy::Oldest => {
                        buffer.pop_front();
                        buffer.push_back(envelope.clone());
                    }
                    DropPolicy::Newest => {
                        // The incoming envelope is the newest; drop it.
                        let _ = self.broadcast.send(envelope);
                        return id;
                    }
                }
            } else {
                buffer.push_back(envelope.clone());
            }
        }

        let _ = self.broadcast.send(envelope);
        id
    }

    /// Buffered envelopes with id greater than `last_id`.
    pub fn replay_since(&self, last_id: u64) -> Vec<StreamEnvelope> {
        self.buffer.lock().iter().filter(|e| e.id > last_id).cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEnvelope> {
        self.broadcast.subscribe()
    }

    pub fn last_id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst).saturating_sub(1)
    }
}

impl Default for EventStreamHub {
    fn default() -> Self {
        Self::new(1_024, DropPolicy::Oldest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm_core::{ExecutionId, ExecutionStatus};

    fn event(n: u64) -> EngineEvent {
        EngineEvent::FrameCreated {
            execution_id: ExecutionId::from_string("e1"),
            sequence: n,
            plan_hash: format!("h{n}"),
        }
    }

    #[test]
    fn ids_are_monotone() {
        let hub = EventStreamHub::default();
        let a = hub.publish(&event(0));
        let b = hub.publish(&event(1));
        assert!(b > a);
        assert_eq!(hub.last_id(), b);
    }

    #[test]
    fn replay_since_filters_by_id() {
        let hub = EventStreamHub::default();
        for n in 0..5 {
            hub.publish(&event(n));
        }
        let replay = hub.replay_since(2);
        assert_eq!(replay.len(), 3);
        assert!(replay.iter().all(|e| e.id > 2));
    }

    #[test]
    fn drop_oldest_evicts_front() {
        let hub = EventStreamHub::new(3, DropPolicy::Oldest);
        for n in 0..5 {
            hub.publish(&event(n));
        }
        let replay = hub.replay_since(0);
        assert_eq!(replay.len(), 3);
        assert_eq!(replay[0].id, 3);
    }

    #[test]
    fn drop_newest_keeps_front() {
        let hub = EventStreamHub::new(3, DropPolicy::Newest);
        for n in 0..5 {
            hub.publish(&event(n));
        }
        let replay = hub.replay_since(0);
        assert_eq!(replay.len(), 3);
        assert_eq!(replay[0].id, 1);
        assert_eq!(replay[2].id, 3);
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let hub = EventStreamHub::default();
        let mut rx = hub.subscribe();
        hub.publish(&event(7));
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.notification.method, "frame.created");
    }

    #[test]
    fn execution_status_events_flow_too() {
        let hub = EventStreamHub::default();
        hub.publish(&EngineEvent::ExecutionStatus {
            execution_id: ExecutionId::from_string("e1"),
            status: ExecutionStatus::Completed,
            stop_reason: None,
        });
        assert_eq!(hub.replay_since(0)[0].notification.method, "execution.status");
    }
}
