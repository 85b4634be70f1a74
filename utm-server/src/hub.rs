//! Broadcast hub — fans telemetry and violation events out to live
//! subscribers.
//!
//! Registrations are sharded by drone id so connect/disconnect on one
//! drone does not contend with fan-out on another. Admin subscribers sit
//! in a separate wildcard bucket and receive events for every drone,
//! including drones first seen after they subscribed.
//!
//! Delivery is best effort: each subscriber owns an unbounded channel and
//! a single forwarding task, so per-subscriber order matches publish
//! order, and a dead subscriber fails only its own delivery. The first
//! failed send reaps the subscriber from every bucket.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;
use uuid::Uuid;

use utm_core::FeedEvent;

const SHARDS: usize = 16;

/// Which drones a subscriber may observe.
#[derive(Debug, Clone)]
pub enum DroneScope {
    /// Admin visibility: every drone, present and future.
    All,
    /// Owner visibility: a fixed set of drone ids.
    Only(HashSet<Uuid>),
}

pub type SubscriberId = u64;

struct Registration {
    id: SubscriberId,
    tx: UnboundedSender<FeedEvent>,
}

pub struct BroadcastHub {
    shards: Vec<RwLock<HashMap<Uuid, Vec<Registration>>>>,
    wildcard: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        BroadcastHub {
            shards: (0..SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
            wildcard: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn shard(&self, drone_id: &Uuid) -> &RwLock<HashMap<Uuid, Vec<Registration>>> {
        // Uuid bytes are uniformly distributed; the first byte is enough.
        &self.shards[drone_id.as_bytes()[0] as usize % SHARDS]
    }

    /// Register a subscriber for its authorized drones. The returned
    /// receiver sees events in publish order.
    pub fn subscribe(&self, scope: &DroneScope) -> (SubscriberId, UnboundedReceiver<FeedEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        match scope {
            DroneScope::All => {
                self.wildcard
                    .write()
                    .unwrap()
                    .push(Registration { id, tx });
            }
            DroneScope::Only(drone_ids) => {
                for drone_id in drone_ids {
                    self.shard(drone_id)
                        .write()
                        .unwrap()
                        .entry(*drone_id)
                        .or_default()
                        .push(Registration {
                            id,
                            tx: tx.clone(),
                        });
                }
            }
        }

        debug!(subscriber = id, "subscriber registered");
        (id, rx)
    }

    /// Deliver one event to every live subscriber registered for the
    /// drone. A failed delivery reaps that subscriber; it never affects
    /// the others or the publisher. Returns the number of deliveries.
    pub fn publish(&self, drone_id: Uuid, event: &FeedEvent) -> usize {
        let mut delivered = 0;
        let mut dead: Vec<SubscriberId> = Vec::new();

        {
            let shard = self.shard(&drone_id).read().unwrap();
            if let Some(registrations) = shard.get(&drone_id) {
                for reg in registrations {
                    match reg.tx.send(event.clone()) {
                        Ok(()) => delivered += 1,
                        Err(_) => dead.push(reg.id),
                    }
                }
            }
        }
        {
            let wildcard = self.wildcard.read().unwrap();
            for reg in wildcard.iter() {
                match reg.tx.send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(_) => dead.push(reg.id),
                }
            }
        }

        for id in dead {
            debug!(subscriber = id, "delivery failed, reaping subscriber");
            self.unsubscribe(id);
        }
        delivered
    }

    /// Remove a subscriber from every bucket. Idempotent; called on
    /// disconnect and on the first failed delivery.
    pub fn unsubscribe(&self, id: SubscriberId) {
        for shard in &self.shards {
            let mut shard = shard.write().unwrap();
            shard.retain(|_, registrations| {
                registrations.retain(|reg| reg.id != id);
                // Drop emptied entries so the table does not grow unbounded.
                !registrations.is_empty()
            });
        }
        self.wildcard.write().unwrap().retain(|reg| reg.id != id);
    }

    /// Live registrations for one drone (wildcards not included).
    pub fn subscriber_count(&self, drone_id: &Uuid) -> usize {
        self.shard(drone_id)
            .read()
            .unwrap()
            .get(drone_id)
            .map_or(0, |regs| regs.len())
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
