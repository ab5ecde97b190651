//! The Transport boundary: causal delivery, Lamport/sender stamping,
//! snapshot-driven join. Split into a "move bytes" trait and an
//! engine-side synchronous callback, the way a network/runtime split
//! keeps delivery concerns off the engine — nothing on the engine's
//! side of this boundary is `async`.

use crate::record::{AnnotationRecord, PartialRecord};
use revtext_common::SenderId;
use std::sync::{Arc, Mutex};

/// Moves stamped records between replicas. A real implementation
/// deals in bytes (the wire format) over a network; this trait only
/// commits to the shape every such implementation must expose.
pub trait Transport: Send + Sync {
    /// Stamp and broadcast a locally originated record.
    fn send(&self, partial: PartialRecord) -> AnnotationRecord;

    /// Register a callback invoked, in causal order, for every record
    /// this replica should deliver (its own, echoed back, and every
    /// remote one). Synchronous by contract — see §5.
    fn on_deliver(&self, f: Box<dyn Fn(AnnotationRecord) + Send + Sync>);
}

/// In-process reference transport connecting a fixed set of replicas,
/// used by integration tests to drive multi-replica convergence
/// scenarios without a real network. Delivery is causal by
/// construction: each sender's appends are relayed to every replica,
/// including itself, in the order `send` was called, and a single
/// shared clock hands out strictly increasing Lamport timestamps.
pub struct LocalBus {
    inner: Arc<Mutex<LocalBusState>>,
}

struct LocalBusState {
    clock: u64,
    subscribers: Vec<(SenderId, Box<dyn Fn(AnnotationRecord) + Send + Sync>)>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(LocalBusState { clock: 0, subscribers: Vec::new() })) }
    }

    /// A handle for one replica, stamping with `sender_id` and relaying
    /// to every replica registered on this bus (including itself).
    pub fn handle(&self, sender_id: SenderId) -> LocalBusHandle {
        LocalBusHandle { bus: self.inner.clone(), sender_id }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LocalBusHandle {
    bus: Arc<Mutex<LocalBusState>>,
    sender_id: SenderId,
}

impl Transport for LocalBusHandle {
    fn send(&self, partial: PartialRecord) -> AnnotationRecord {
        let mut state = self.bus.lock().unwrap();
        state.clock += 1;
        let record = AnnotationRecord {
            id: partial.id,
            user_id: partial.user_id,
            lamport: revtext_common::Lamport(state.clock),
            sender_id: self.sender_id.clone(),
            timestamp: partial.timestamp,
            body: partial.body,
        };
        for (_, sub) in &state.subscribers {
            sub(record.clone());
        }
        record
    }

    fn on_deliver(&self, f: Box<dyn Fn(AnnotationRecord) + Send + Sync>) {
        self.bus.lock().unwrap().subscribers.push((self.sender_id.clone(), f));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Endpoint, RecordBody};
    use revtext_common::{AnnotationId, UserId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn every_replica_observes_every_send() {
        let bus = LocalBus::new();
        let a = bus.handle(SenderId::from("a"));
        let b = bus.handle(SenderId::from("b"));
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        a.on_deliver(Box::new(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        }));
        let count3 = count.clone();
        b.on_deliver(Box::new(move |_| {
            count3.fetch_add(1, Ordering::SeqCst);
        }));

        a.send(PartialRecord {
            id: AnnotationId::new(),
            user_id: UserId::from("alice"),
            timestamp: 0,
            body: RecordBody::InsertSuggestion { start: Endpoint::open(None), end: Endpoint::open(None) },
        });

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
