//! The `DocumentStore` and `ObjectStorage` traits and their listener types.
//!
//! The traits are implemented by storage backends (e.g.
//! `moneybox-store-sqlite`). View-models and the API depend on this
//! abstraction, not on any concrete backend.

use std::{fmt, future::Future, sync::Arc};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::collection::{Collection, CollectionQuery, Fields, StoredDocument};

// ─── Snapshot listeners ──────────────────────────────────────────────────────

/// Why a subscription stopped delivering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
  PermissionDenied,
  Unavailable,
  Internal,
}

/// An error pushed to a listener instead of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct SubscriptionError {
  pub code:    ErrorCode,
  pub message: String,
}

impl SubscriptionError {
  pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
    Self { code, message: message.into() }
  }

  /// The text shown next to an aggregate that failed to load.
  pub fn user_message(&self, what: &str) -> String {
    match self.code {
      ErrorCode::PermissionDenied => {
        "Permission denied. Check the store access rules.".to_owned()
      }
      _ => format!("Failed to load {what}: {}", self.message),
    }
  }
}

/// Receives full-collection snapshots for one subscription.
///
/// Callbacks run on the store's delivery path and must not block.
pub trait SnapshotListener: Send + Sync {
  fn on_snapshot(&self, docs: Vec<StoredDocument>);
  fn on_error(&self, err: SubscriptionError);
}

/// Handle for a live subscription. Dropping it unsubscribes.
pub struct ListenerRegistration {
  unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ListenerRegistration {
  pub fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
    Self { unsubscribe: Some(Box::new(unsubscribe)) }
  }

  /// Stop delivery. After this returns the listener is never invoked again.
  pub fn unsubscribe(mut self) { self.run(); }

  fn run(&mut self) {
    if let Some(f) = self.unsubscribe.take() {
      f();
    }
  }
}

impl Drop for ListenerRegistration {
  fn drop(&mut self) { self.run(); }
}

impl fmt::Debug for ListenerRegistration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ListenerRegistration")
      .field("active", &self.unsubscribe.is_some())
      .finish()
  }
}

// ─── Document store ──────────────────────────────────────────────────────────

/// Abstraction over a realtime document database.
///
/// Values equal to [`crate::timestamp::server_timestamp`] are replaced with
/// the store's clock on every write. All methods return `Send` futures so the
/// trait can be used in multi-threaded async runtimes.
pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Register `listener` for `query`. The current state is delivered once
  /// before this returns, then again after every write to the collection.
  fn subscribe(
    &self,
    query: CollectionQuery,
    listener: Arc<dyn SnapshotListener>,
  ) -> impl Future<Output = Result<ListenerRegistration, Self::Error>> + Send + '_;

  /// Insert a document with a generated id and return that id.
  fn add(
    &self,
    collection: Collection,
    fields: Fields,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;

  /// Create or fully replace the document at `id`.
  fn set(
    &self,
    collection: Collection,
    id: String,
    fields: Fields,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Merge `partial` into an existing document in one atomic step, so
  /// concurrent updates to different fields never overwrite each other.
  /// Errors if it does not exist.
  fn update(
    &self,
    collection: Collection,
    id: String,
    partial: Fields,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Merge `partial` only if the document still [holds] every value in
  /// `expected`. Check and write are atomic. Returns `false`, writing
  /// nothing, when a value differs. Errors if the document does not exist.
  ///
  /// [holds]: StoredDocument::holds
  fn update_if(
    &self,
    collection: Collection,
    id: String,
    expected: Fields,
    partial: Fields,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Retrieve a document by id. Returns `None` if not found.
  fn get(
    &self,
    collection: Collection,
    id: String,
  ) -> impl Future<Output = Result<Option<StoredDocument>, Self::Error>> + Send + '_;

  /// One-shot read of everything `query` selects.
  fn query(
    &self,
    query: CollectionQuery,
  ) -> impl Future<Output = Result<Vec<StoredDocument>, Self::Error>> + Send + '_;
}

// ─── Object storage ──────────────────────────────────────────────────────────

/// Custom metadata attached to an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
  pub content_type:       String,
  pub uploaded_at:        String,
  pub original_file_name: String,
}

/// Durable blob storage for attachments.
pub trait ObjectStorage: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Store `data` at `path` and return a durable download URL. Uploading to
  /// an occupied path replaces what was there.
  fn upload(
    &self,
    path: String,
    data: Bytes,
    metadata: ObjectMetadata,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;

  /// Read back what was uploaded at `path`. Returns `None` if nothing is
  /// stored there.
  fn download(
    &self,
    path: String,
  ) -> impl Future<Output = Result<Option<StoredObject>, Self::Error>> + Send + '_;
}

/// An uploaded object as read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
  pub data:     Bytes,
  pub metadata: ObjectMetadata,
}
