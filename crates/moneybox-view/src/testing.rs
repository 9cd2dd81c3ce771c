//! In-memory store doubles for view-model tests.
//!
//! [`ManualStore`] never forgets a listener, even after its registration is
//! dropped, so tests can push snapshots at stale subscriptions and check that
//! the view ignores them.

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use bytes::Bytes;
use moneybox_core::{
  collection::{Collection, CollectionQuery, Fields, StoredDocument},
  store::{
    DocumentStore, ListenerRegistration, ObjectMetadata, ObjectStorage, SnapshotListener,
    StoredObject, SubscriptionError,
  },
};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct FakeError(pub String);

type Listeners = Vec<(CollectionQuery, Arc<dyn SnapshotListener>)>;

#[derive(Default)]
pub struct ManualStore {
  refuse:    bool,
  listeners: Mutex<Listeners>,
  docs:      Mutex<HashMap<Collection, Vec<StoredDocument>>>,
  next_id:   AtomicUsize,
}

impl ManualStore {
  pub fn refusing() -> Self { Self { refuse: true, ..Self::default() } }

  fn targets(&self, collection: Collection) -> Listeners {
    self
      .listeners
      .lock()
      .unwrap()
      .iter()
      .filter(|(q, _)| q.collection == collection)
      .cloned()
      .collect()
  }

  /// Replace `collection` with `docs` and push it to every listener ever
  /// registered for it.
  pub fn emit(&self, collection: Collection, docs: Vec<StoredDocument>) {
    self.docs.lock().unwrap().insert(collection, docs.clone());
    for (query, listener) in self.targets(collection) {
      let mut view = docs.clone();
      query.apply(&mut view);
      listener.on_snapshot(view);
    }
  }

  /// Emit `n` empty documents.
  pub fn emit_all(&self, collection: Collection, n: usize) {
    let docs = (0..n).map(|i| StoredDocument::new(format!("doc{i}"), Fields::new())).collect();
    self.emit(collection, docs);
  }

  pub fn fail(&self, collection: Collection, err: SubscriptionError) {
    for (_, listener) in self.targets(collection) {
      listener.on_error(err.clone());
    }
  }

  pub fn doc(&self, collection: Collection, id: &str) -> Option<StoredDocument> {
    self
      .docs
      .lock()
      .unwrap()
      .get(&collection)
      .and_then(|docs| docs.iter().find(|d| d.id == id).cloned())
  }

  fn write(&self, collection: Collection, id: String, fields: Fields) {
    let mut all = self.docs.lock().unwrap();
    let docs = all.entry(collection).or_default();
    match docs.iter_mut().find(|d| d.id == id) {
      Some(doc) => doc.fields = fields,
      None => docs.push(StoredDocument::new(id, fields)),
    }
  }
}

impl DocumentStore for ManualStore {
  type Error = FakeError;

  async fn subscribe(
    &self,
    query: CollectionQuery,
    listener: Arc<dyn SnapshotListener>,
  ) -> Result<ListenerRegistration, FakeError> {
    if self.refuse {
      return Err(FakeError("store offline".into()));
    }
    let mut docs = self.docs.lock().unwrap().get(&query.collection).cloned().unwrap_or_default();
    query.apply(&mut docs);
    self.listeners.lock().unwrap().push((query, listener.clone()));
    listener.on_snapshot(docs);
    Ok(ListenerRegistration::new(|| {}))
  }

  async fn add(&self, collection: Collection, fields: Fields) -> Result<String, FakeError> {
    let id = format!("gen{}", self.next_id.fetch_add(1, Ordering::Relaxed));
    self.write(collection, id.clone(), fields);
    Ok(id)
  }

  async fn set(&self, collection: Collection, id: String, fields: Fields) -> Result<(), FakeError> {
    self.write(collection, id, fields);
    Ok(())
  }

  async fn update(&self, collection: Collection, id: String, partial: Fields) -> Result<(), FakeError> {
    self.update_if(collection, id, Fields::new(), partial).await.map(drop)
  }

  async fn update_if(
    &self,
    collection: Collection,
    id: String,
    expected: Fields,
    partial: Fields,
  ) -> Result<bool, FakeError> {
    let mut all = self.docs.lock().unwrap();
    let doc = all
      .get_mut(&collection)
      .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
      .ok_or_else(|| FakeError(format!("no document {id}")))?;
    if !doc.holds(&expected) {
      return Ok(false);
    }
    doc.fields.extend(partial);
    Ok(true)
  }

  async fn get(&self, collection: Collection, id: String) -> Result<Option<StoredDocument>, FakeError> {
    Ok(self.doc(collection, &id))
  }

  async fn query(&self, query: CollectionQuery) -> Result<Vec<StoredDocument>, FakeError> {
    let mut docs = self.docs.lock().unwrap().get(&query.collection).cloned().unwrap_or_default();
    query.apply(&mut docs);
    Ok(docs)
  }
}

/// Object storage that counts calls and refuses names containing `reject`.
#[derive(Default)]
pub struct CountingStorage {
  pub calls:    AtomicUsize,
  pub reject:   Option<String>,
  pub uploaded: Mutex<Vec<(String, ObjectMetadata)>>,
}

impl CountingStorage {
  pub fn rejecting(fragment: &str) -> Self {
    Self { reject: Some(fragment.to_owned()), ..Self::default() }
  }

  pub fn call_count(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

impl ObjectStorage for CountingStorage {
  type Error = FakeError;

  async fn upload(&self, path: String, _data: Bytes, metadata: ObjectMetadata) -> Result<String, FakeError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.reject.as_deref().is_some_and(|r| path.contains(r)) {
      return Err(FakeError("quota exceeded".into()));
    }
    let url = format!("mem://{path}");
    self.uploaded.lock().unwrap().push((path, metadata));
    Ok(url)
  }

  async fn download(&self, path: String) -> Result<Option<StoredObject>, FakeError> {
    Ok(
      self
        .uploaded
        .lock()
        .unwrap()
        .iter()
        .find(|(p, _)| *p == path)
        .map(|(_, metadata)| StoredObject { data: Bytes::new(), metadata: metadata.clone() }),
    )
  }
}

pub fn fields(v: Value) -> Fields { v.as_object().cloned().expect("object literal") }

pub fn doc(id: &str, v: Value) -> StoredDocument { StoredDocument::new(id, fields(v)) }
