//! Single-writer state coordination shared by every view-model.
//!
//! A [`Coordinator`] owns one tokio task and one published state. Each
//! attached subscription forwards tagged events into an unbounded channel;
//! the task folds them into the state with a pure reducer and publishes the
//! result through a [`watch`] channel. Nothing else ever writes the state.
//!
//! Every attachment gets a fresh generation number. Events carry the
//! generation they were produced under and are discarded unless it is still
//! the live one, so once [`Coordinator::detach`] returns no event from that
//! source (including one already queued) changes the state.

use std::{
  collections::HashMap,
  fmt::Debug,
  hash::Hash,
  sync::{Arc, Mutex, MutexGuard},
};

use moneybox_core::{
  collection::{CollectionQuery, StoredDocument},
  store::{DocumentStore, ErrorCode, ListenerRegistration, SnapshotListener, SubscriptionError},
};
use tokio::{
  sync::{mpsc, watch},
  task::JoinHandle,
};

// ─── Plumbing ────────────────────────────────────────────────────────────────

struct Envelope<K, E> {
  key:        K,
  generation: u64,
  event:      E,
}

struct Attached {
  generation:   u64,
  registration: Option<ListenerRegistration>,
}

struct Sources<K> {
  next_generation: u64,
  live:            HashMap<K, Attached>,
}

impl<K: Eq + Hash> Sources<K> {
  fn is_live(&self, key: &K, generation: u64) -> bool {
    self.live.get(key).is_some_and(|a| a.generation == generation)
  }
}

type SnapshotFn<E> = dyn Fn(Vec<StoredDocument>) -> E + Send + Sync;
type ErrorFn<E> = dyn Fn(SubscriptionError) -> E + Send + Sync;

/// The [`SnapshotListener`] handed to the store. It only tags and forwards.
struct Forwarder<K, E> {
  key:         K,
  generation:  u64,
  events:      mpsc::UnboundedSender<Envelope<K, E>>,
  on_snapshot: Arc<SnapshotFn<E>>,
  on_error:    Arc<ErrorFn<E>>,
}

impl<K: Copy, E> Forwarder<K, E> {
  fn forward(&self, event: E) {
    // The coordinator is gone; nothing left to update.
    let _ = self.events.send(Envelope { key: self.key, generation: self.generation, event });
  }
}

impl<K, E> SnapshotListener for Forwarder<K, E>
where
  K: Copy + Send + Sync,
  E: Send,
{
  fn on_snapshot(&self, docs: Vec<StoredDocument>) { self.forward((self.on_snapshot)(docs)); }

  fn on_error(&self, err: SubscriptionError) { self.forward((self.on_error)(err)); }
}

// ─── Coordinator ─────────────────────────────────────────────────────────────

pub struct Coordinator<K, St, E> {
  events:  mpsc::UnboundedSender<Envelope<K, E>>,
  state:   watch::Receiver<Arc<St>>,
  sources: Arc<Mutex<Sources<K>>>,
  task:    JoinHandle<()>,
}

impl<K, St, E> Coordinator<K, St, E>
where
  K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
  St: Send + Sync + 'static,
  E: Send + 'static,
{
  /// Spawn the coordinator task. Must be called inside a tokio runtime.
  pub fn spawn<R>(initial: St, reduce: R) -> Self
  where
    R: Fn(&St, E) -> St + Send + 'static,
  {
    let (events, mut rx) = mpsc::unbounded_channel::<Envelope<K, E>>();
    let (state_tx, state) = watch::channel(Arc::new(initial));
    let sources = Arc::new(Mutex::new(Sources { next_generation: 0, live: HashMap::new() }));

    let task_sources = sources.clone();
    let task = tokio::spawn(async move {
      while let Some(Envelope { key, generation, event }) = rx.recv().await {
        // Held through publication so a concurrent detach cannot interleave.
        let sources = lock(&task_sources);
        if !sources.is_live(&key, generation) {
          tracing::trace!(?key, generation, "dropping event from detached source");
          continue;
        }
        let current = state_tx.borrow().clone();
        state_tx.send_replace(Arc::new(reduce(&current, event)));
      }
    });

    Self { events, state, sources, task }
  }

  /// Subscribe `query` and route its snapshots and errors into the reducer
  /// under `key`. Replaces any existing attachment for the same key.
  ///
  /// If the store refuses the subscription, the failure is routed through
  /// `on_error` like any other subscription error.
  pub async fn attach<S, F, G>(
    &self,
    store: &S,
    key: K,
    query: CollectionQuery,
    on_snapshot: F,
    on_error: G,
  )
  where
    S: DocumentStore,
    F: Fn(Vec<StoredDocument>) -> E + Send + Sync + 'static,
    G: Fn(SubscriptionError) -> E + Send + Sync + 'static,
  {
    let (generation, replaced) = {
      let mut sources = lock(&self.sources);
      let generation = sources.next_generation;
      sources.next_generation += 1;
      let replaced = sources.live.insert(key, Attached { generation, registration: None });
      (generation, replaced)
    };
    if let Some(reg) = replaced.and_then(|a| a.registration) {
      reg.unsubscribe();
    }

    let forwarder = Arc::new(Forwarder {
      key,
      generation,
      events: self.events.clone(),
      on_snapshot: Arc::new(on_snapshot),
      on_error: Arc::new(on_error),
    });
    let collection = query.collection;

    match store.subscribe(query, forwarder.clone()).await {
      Ok(registration) => {
        let mut sources = lock(&self.sources);
        match sources.live.get_mut(&key) {
          Some(attached) if attached.generation == generation => {
            attached.registration = Some(registration);
          }
          // Detached or replaced while the subscription was being set up.
          _ => {
            drop(sources);
            registration.unsubscribe();
          }
        }
      }
      Err(e) => {
        tracing::warn!(?key, %collection, error = %e, "subscription failed");
        forwarder.on_error(SubscriptionError::new(ErrorCode::Unavailable, e.to_string()));
      }
    }
  }

  /// Stop listening to `key`. Returns `false` if it was not attached.
  pub fn detach(&self, key: K) -> bool {
    let removed = lock(&self.sources).live.remove(&key);
    match removed {
      Some(attached) => {
        if let Some(reg) = attached.registration {
          reg.unsubscribe();
        }
        tracing::debug!(?key, "source detached");
        true
      }
      None => false,
    }
  }

  /// Detach every source and stop the coordinator task.
  pub fn shutdown(&self) {
    let drained: Vec<Attached> = lock(&self.sources).live.drain().map(|(_, a)| a).collect();
    for reg in drained.into_iter().filter_map(|a| a.registration) {
      reg.unsubscribe();
    }
    self.task.abort();
  }

  pub fn is_attached(&self, key: K) -> bool { lock(&self.sources).live.contains_key(&key) }

  /// The latest published state.
  pub fn state(&self) -> Arc<St> { self.state.borrow().clone() }

  /// A receiver that observes every published state.
  pub fn watch(&self) -> watch::Receiver<Arc<St>> { self.state.clone() }
}

impl<K, St, E> Drop for Coordinator<K, St, E> {
  fn drop(&mut self) {
    let drained: Vec<Attached> = lock(&self.sources).live.drain().map(|(_, a)| a).collect();
    for reg in drained.into_iter().filter_map(|a| a.registration) {
      reg.unsubscribe();
    }
    self.task.abort();
  }
}

fn lock<K>(sources: &Mutex<Sources<K>>) -> MutexGuard<'_, Sources<K>> {
  sources.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use moneybox_core::collection::Collection;

  use super::*;
  use crate::testing::ManualStore;

  #[derive(Debug)]
  enum Ev {
    Count(usize),
    Failed(String),
  }

  fn counter() -> Coordinator<&'static str, Vec<String>, Ev> {
    Coordinator::spawn(Vec::new(), |log: &Vec<String>, ev: Ev| {
      let mut next = log.clone();
      next.push(match ev {
        Ev::Count(n) => n.to_string(),
        Ev::Failed(m) => m,
      });
      next
    })
  }

  async fn settle(c: &Coordinator<&'static str, Vec<String>, Ev>, len: usize) -> Vec<String> {
    let mut rx = c.watch();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.len() >= len))
      .await
      .expect("state settles")
      .expect("coordinator alive")
      .clone();
    (*state).clone()
  }

  #[tokio::test]
  async fn initial_snapshot_is_folded() {
    let store = ManualStore::default();
    let c = counter();
    c.attach(
      &store,
      "deposits",
      CollectionQuery::new(Collection::Deposits),
      |docs| Ev::Count(docs.len()),
      |e| Ev::Failed(e.message),
    )
    .await;

    assert_eq!(settle(&c, 1).await, ["0"]);
    assert!(c.is_attached("deposits"));
  }

  #[tokio::test]
  async fn queued_events_from_detached_source_are_dropped() {
    let store = ManualStore::default();
    let c = counter();
    c.attach(
      &store,
      "deposits",
      CollectionQuery::new(Collection::Deposits),
      |docs| Ev::Count(docs.len()),
      |e| Ev::Failed(e.message),
    )
    .await;
    c.attach(
      &store,
      "loans",
      CollectionQuery::new(Collection::Loans),
      |docs| Ev::Count(docs.len() + 100),
      |e| Ev::Failed(e.message),
    )
    .await;
    settle(&c, 2).await;

    assert!(c.detach("deposits"));
    assert!(!c.detach("deposits"));

    // The store keeps calling stale listeners; the coordinator must not care.
    store.emit_all(Collection::Deposits, 7);
    store.emit_all(Collection::Loans, 1);

    let log = settle(&c, 3).await;
    assert_eq!(log.last().map(String::as_str), Some("101"));
    assert!(!log.contains(&"7".to_owned()));
  }

  #[tokio::test]
  async fn refused_subscription_becomes_error_event() {
    let store = ManualStore::refusing();
    let c = counter();
    c.attach(
      &store,
      "users",
      CollectionQuery::new(Collection::Users),
      |docs| Ev::Count(docs.len()),
      |e| Ev::Failed(e.message),
    )
    .await;

    assert_eq!(settle(&c, 1).await, ["store offline"]);
  }
}
