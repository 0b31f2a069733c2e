//! In-flight edit lock
//!
//! Tracks the nodes currently being updated so a second edit of the same node
//! is turned away instead of racing the first. Holding an [`EditGuard`] is
//! holding the lock; dropping it releases the node on every exit path.

use crate::tree::NodeId;
use dashmap::DashSet;

#[derive(Debug, Default)]
pub struct EditLock {
    in_flight: DashSet<NodeId>,
}

impl EditLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `node_id`, or `None` when an edit of it is already running.
    pub fn try_acquire(&self, node_id: &NodeId) -> Option<EditGuard<'_>> {
        if self.in_flight.insert(node_id.clone()) {
            Some(EditGuard {
                lock: self,
                node_id: node_id.clone(),
            })
        } else {
            None
        }
    }

    pub fn is_locked(&self, node_id: &NodeId) -> bool {
        self.in_flight.contains(node_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

/// Releases its node when dropped.
#[derive(Debug)]
pub struct EditGuard<'a> {
    lock: &'a EditLock,
    node_id: NodeId,
}

impl EditGuard<'_> {
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }
}

impl Drop for EditGuard<'_> {
    fn drop(&mut self) {
        self.lock.in_flight.remove(&self.node_id);
    }
}
