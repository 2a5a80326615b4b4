//! SessionManager: per-user session slots.
//!
//! Each user gets one `Arc<Mutex<Option<Session>>>`. A handler locks the
//! slot for the whole transition, so two handlers for the same user can
//! never interleave; different users never contend beyond the map lookup.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::state::Session;
use crate::store::UserId;

/// A user's session slot. `None` means no active flow.
pub type SessionSlot = Arc<Mutex<Option<Session>>>;

#[derive(Default)]
pub struct SessionManager {
    slots: RwLock<HashMap<UserId, SessionSlot>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the user's slot, creating an empty one on first contact.
    pub async fn slot(&self, user_id: UserId) -> SessionSlot {
        if let Some(slot) = self.slots.read().await.get(&user_id) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(user_id).or_default())
    }

    /// Snapshot of the user's current session.
    pub async fn get(&self, user_id: UserId) -> Option<Session> {
        let slot = self.slots.read().await.get(&user_id).cloned()?;
        let guard = slot.lock().await;
        guard.clone()
    }

    /// Drop the user's slot if it is empty and nobody else holds it.
    /// Returns whether the slot was removed.
    pub async fn release(&self, user_id: UserId) -> bool {
        let mut slots = self.slots.write().await;
        let idle = slots.get(&user_id).is_some_and(|slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|guard| guard.is_none())
        });
        if idle {
            slots.remove(&user_id);
        }
        idle
    }

    /// Number of users with a slot, active or not.
    pub async fn slot_count(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Number of users currently inside a flow.
    pub async fn active_count(&self) -> usize {
        let slots: Vec<SessionSlot> = self.slots.read().await.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }
}
