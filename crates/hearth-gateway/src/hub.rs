use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

/// Per-room registry of live subscribers.
///
/// A notification carries no payload. Each subscriber holds at most one
/// pending wake, so notifications that arrive while it is busy coalesce into
/// a single wake instead of queueing up.
#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    /// room -> (subscription id -> wake handle)
    rooms: RwLock<HashMap<String, HashMap<Uuid, Arc<Notify>>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber for `room`. Dropping the returned handle
    /// unsubscribes it.
    pub fn subscribe(&self, room: &str) -> Subscription {
        let id = Uuid::new_v4();
        let wake = Arc::new(Notify::new());

        let mut rooms = self.inner.rooms.write().unwrap_or_else(PoisonError::into_inner);
        rooms
            .entry(room.to_string())
            .or_default()
            .insert(id, wake.clone());
        debug!("Subscriber {} joined room {:?} ({} total)", id, room, rooms[room].len());

        Subscription {
            id,
            room: room.to_string(),
            wake,
            hub: self.clone(),
        }
    }

    /// Wake every subscriber of `room`. Never blocks. Returns how many were woken.
    pub fn notify(&self, room: &str) -> usize {
        let rooms = self.inner.rooms.read().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = rooms.get(room) else {
            return 0;
        };
        for wake in subscribers.values() {
            wake.notify_one();
        }
        debug!("Notified {} subscribers in room {:?}", subscribers.len(), room);
        subscribers.len()
    }

    /// Remove a subscription. Safe to call more than once.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.remove(&subscription.room, subscription.id);
    }

    pub fn subscriber_count(&self, room: &str) -> usize {
        self.inner
            .rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room)
            .map_or(0, HashMap::len)
    }

    fn remove(&self, room: &str, id: Uuid) {
        let mut rooms = self.inner.rooms.write().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = rooms.get_mut(room) else {
            return;
        };
        if subscribers.remove(&id).is_some() {
            debug!("Subscriber {} left room {:?}", id, room);
        }
        if subscribers.is_empty() {
            rooms.remove(room);
        }
    }
}

/// A live registration with the [`Hub`], backing one streaming client.
pub struct Subscription {
    id: Uuid,
    room: String,
    wake: Arc<Notify>,
    hub: Hub,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    /// Wait for the next wake. Returns immediately if one is already pending.
    pub async fn changed(&self) {
        self.wake.notified().await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.remove(&self.room, self.id);
    }
}
