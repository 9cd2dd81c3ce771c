//! In-process registry of snapshot listeners.
//!
//! Delivery to a listener and its removal both take the entry's `active`
//! lock, so once [`ListenerRegistration::unsubscribe`] returns no callback is
//! running or will ever run for that listener. Listeners must therefore not
//! unsubscribe themselves from inside a callback.

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex, Weak,
    atomic::{AtomicU64, Ordering},
  },
};

use moneybox_core::{
  collection::{Collection, CollectionQuery, StoredDocument},
  store::{ListenerRegistration, SnapshotListener, SubscriptionError},
};

pub struct Entry {
  pub query: CollectionQuery,
  listener:  Arc<dyn SnapshotListener>,
  active:    Mutex<bool>,
}

impl Entry {
  /// Filter and order `docs` for this listener's query, then deliver.
  pub fn deliver_snapshot(&self, mut docs: Vec<StoredDocument>) {
    self.query.apply(&mut docs);
    let active = self.active.lock().unwrap_or_else(|p| p.into_inner());
    if *active {
      self.listener.on_snapshot(docs);
    }
  }

  pub fn deliver_error(&self, err: SubscriptionError) {
    let active = self.active.lock().unwrap_or_else(|p| p.into_inner());
    if *active {
      self.listener.on_error(err);
    }
  }

  fn deactivate(&self) {
    *self.active.lock().unwrap_or_else(|p| p.into_inner()) = false;
  }
}

#[derive(Default)]
pub struct ListenerRegistry {
  next_id: AtomicU64,
  entries: Mutex<HashMap<u64, Arc<Entry>>>,
  /// Serialises fan-out so each listener sees snapshots in write order.
  pub delivery: tokio::sync::Mutex<()>,
}

impl ListenerRegistry {
  pub fn register(
    self: &Arc<Self>,
    query: CollectionQuery,
    listener: Arc<dyn SnapshotListener>,
  ) -> (Arc<Entry>, ListenerRegistration) {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let entry = Arc::new(Entry { query, listener, active: Mutex::new(true) });
    self.lock_entries().insert(id, entry.clone());

    let registry: Weak<Self> = Arc::downgrade(self);
    let registration = ListenerRegistration::new(move || {
      if let Some(registry) = registry.upgrade() {
        let removed = registry.lock_entries().remove(&id);
        if let Some(entry) = removed {
          entry.deactivate();
        }
      }
    });

    (entry, registration)
  }

  /// Live entries watching `collection`.
  pub fn watching(&self, collection: Collection) -> Vec<Arc<Entry>> {
    self
      .lock_entries()
      .values()
      .filter(|e| e.query.collection == collection)
      .cloned()
      .collect()
  }

  pub fn len(&self) -> usize { self.lock_entries().len() }

  fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Arc<Entry>>> {
    self.entries.lock().unwrap_or_else(|p| p.into_inner())
  }
}
