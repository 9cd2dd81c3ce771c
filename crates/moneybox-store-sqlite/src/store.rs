//! [`SqliteStore`]: the SQLite implementation of [`DocumentStore`] and
//! [`ObjectStorage`].

use std::{path::Path, sync::Arc};

use bytes::Bytes;
use chrono::Utc;
use moneybox_core::{
  collection::{Collection, CollectionQuery, Fields, StoredDocument},
  store::{
    DocumentStore, ErrorCode, ListenerRegistration, ObjectMetadata, ObjectStorage,
    SnapshotListener, StoredObject, SubscriptionError,
  },
};
use rusqlite::OptionalExtension as _;
use url::Url;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RawDocument, decode_fields, encode_dt, encode_fields, merge_fields,
    resolve_server_timestamps,
  },
  listeners::ListenerRegistry,
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Money Box document store and object store backed by a single SQLite
/// file.
///
/// Cloning is cheap; the connection and listener registry are shared.
#[derive(Clone)]
pub struct SqliteStore {
  conn:       tokio_rusqlite::Connection,
  listeners:  Arc<ListenerRegistry>,
  object_url: Arc<Url>,
}

/// How a guarded merge ended.
enum Merge {
  Applied,
  Rejected,
  Missing,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    let store = Self {
      conn,
      listeners: Arc::default(),
      object_url: Arc::new(parse_object_url(DEFAULT_OBJECT_URL)?),
    };
    store.init_schema().await?;
    Ok(store)
  }

  /// Prefix for the download URLs returned by [`ObjectStorage::upload`].
  /// Must be an absolute URL with a path, e.g. `https://host/objects`.
  pub fn with_object_url(mut self, prefix: &str) -> Result<Self> {
    self.object_url = Arc::new(parse_object_url(prefix)?);
    Ok(self)
  }

  /// The download URL for `path`, each segment percent-encoded.
  fn url_for(&self, path: &str) -> Result<String> {
    let mut url = (*self.object_url).clone();
    url
      .path_segments_mut()
      .map_err(|()| Error::ObjectUrl(self.object_url.to_string()))?
      .pop_if_empty()
      .extend(path.split('/'));
    Ok(url.into())
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Number of live snapshot listeners.
  pub fn listener_count(&self) -> usize { self.listeners.len() }

  /// Every document of `collection`, in insertion order.
  async fn load_collection(&self, collection: Collection) -> Result<Vec<StoredDocument>> {
    let collection_str = collection.as_ref().to_owned();

    let raws: Vec<RawDocument> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT doc_id, fields_json FROM documents
           WHERE collection = ?1
           ORDER BY rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![collection_str], |row| {
            Ok(RawDocument {
              doc_id:      row.get(0)?,
              fields_json: row.get(1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDocument::into_document).collect()
  }

  /// Insert or replace a whole document.
  async fn write_document(
    &self,
    collection: Collection,
    id: String,
    mut fields: Fields,
  ) -> Result<()> {
    let now = Utc::now();
    resolve_server_timestamps(&mut fields, now);

    let collection_str = collection.as_ref().to_owned();
    let fields_json    = encode_fields(&fields)?;
    let at_str         = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO documents (collection, doc_id, fields_json, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?4)
           ON CONFLICT (collection, doc_id)
           DO UPDATE SET fields_json = excluded.fields_json,
                         updated_at  = excluded.updated_at",
          rusqlite::params![collection_str, id, fields_json, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Check `expected`, then merge `partial`, inside one transaction.
  async fn merge_document(
    &self,
    collection: Collection,
    id: String,
    expected: Fields,
    mut partial: Fields,
  ) -> Result<Merge> {
    let now = Utc::now();
    resolve_server_timestamps(&mut partial, now);

    let collection_str = collection.as_ref().to_owned();
    let at_str         = encode_dt(now);

    let merge = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current: Option<String> = tx
          .query_row(
            "SELECT fields_json FROM documents
             WHERE collection = ?1 AND doc_id = ?2",
            rusqlite::params![collection_str, id],
            |row| row.get(0),
          )
          .optional()?;
        let Some(current) = current else {
          return Ok(Merge::Missing);
        };

        let mut doc = StoredDocument::new(id, decode_fields(&current).map_err(boxed)?);
        if !doc.holds(&expected) {
          return Ok(Merge::Rejected);
        }
        merge_fields(&mut doc.fields, partial);
        let fields_json = encode_fields(&doc.fields).map_err(boxed)?;

        tx.execute(
          "UPDATE documents SET fields_json = ?3, updated_at = ?4
           WHERE collection = ?1 AND doc_id = ?2",
          rusqlite::params![collection_str, doc.id, fields_json, at_str],
        )?;
        tx.commit()?;
        Ok(Merge::Applied)
      })
      .await?;
    Ok(merge)
  }

  /// Push the current state of `collection` to every listener watching it.
  async fn notify(&self, collection: Collection) {
    let _delivery = self.listeners.delivery.lock().await;
    let targets = self.listeners.watching(collection);
    if targets.is_empty() {
      return;
    }

    match self.load_collection(collection).await {
      Ok(docs) => {
        for entry in targets {
          entry.deliver_snapshot(docs.clone());
        }
      }
      Err(e) => {
        tracing::warn!(%collection, error = %e, "snapshot reload failed");
        let err = SubscriptionError::new(ErrorCode::Unavailable, e.to_string());
        for entry in targets {
          entry.deliver_error(err.clone());
        }
      }
    }
  }
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteStore {
  type Error = Error;

  async fn subscribe(
    &self,
    query: CollectionQuery,
    listener: Arc<dyn SnapshotListener>,
  ) -> Result<ListenerRegistration> {
    let _delivery = self.listeners.delivery.lock().await;
    let collection = query.collection;
    let (entry, registration) = self.listeners.register(query, listener);

    let docs = self.load_collection(collection).await?;
    entry.deliver_snapshot(docs);

    tracing::debug!(%collection, "listener registered");
    Ok(registration)
  }

  async fn add(&self, collection: Collection, fields: Fields) -> Result<String> {
    let id = Uuid::new_v4().simple().to_string();
    self.write_document(collection, id.clone(), fields).await?;
    self.notify(collection).await;
    Ok(id)
  }

  async fn set(&self, collection: Collection, id: String, fields: Fields) -> Result<()> {
    self.write_document(collection, id, fields).await?;
    self.notify(collection).await;
    Ok(())
  }

  async fn update(&self, collection: Collection, id: String, partial: Fields) -> Result<()> {
    self.update_if(collection, id, Fields::new(), partial).await?;
    Ok(())
  }

  async fn update_if(
    &self,
    collection: Collection,
    id: String,
    expected: Fields,
    partial: Fields,
  ) -> Result<bool> {
    match self.merge_document(collection, id.clone(), expected, partial).await? {
      Merge::Applied => {
        self.notify(collection).await;
        Ok(true)
      }
      Merge::Rejected => {
        tracing::debug!(%collection, %id, "conditional update rejected");
        Ok(false)
      }
      Merge::Missing => Err(Error::DocumentNotFound { collection, id }),
    }
  }

  async fn get(&self, collection: Collection, id: String) -> Result<Option<StoredDocument>> {
    let collection_str = collection.as_ref().to_owned();

    let raw: Option<RawDocument> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT doc_id, fields_json FROM documents
             WHERE collection = ?1 AND doc_id = ?2",
            rusqlite::params![collection_str, id],
            |row| {
              Ok(RawDocument {
                doc_id:      row.get(0)?,
                fields_json: row.get(1)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawDocument::into_document).transpose()
  }

  async fn query(&self, query: CollectionQuery) -> Result<Vec<StoredDocument>> {
    let mut docs = self.load_collection(query.collection).await?;
    query.apply(&mut docs);
    Ok(docs)
  }
}

// ─── ObjectStorage impl ──────────────────────────────────────────────────────

impl ObjectStorage for SqliteStore {
  type Error = Error;

  async fn upload(&self, path: String, data: Bytes, metadata: ObjectMetadata) -> Result<String> {
    let url           = self.url_for(&path)?;
    let content_type  = metadata.content_type.clone();
    let metadata_json = serde_json::to_string(&metadata)?;
    let at_str        = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO objects (path, data, content_type, metadata_json, uploaded_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (path)
           DO UPDATE SET data          = excluded.data,
                         content_type  = excluded.content_type,
                         metadata_json = excluded.metadata_json,
                         uploaded_at   = excluded.uploaded_at",
          rusqlite::params![path, data.to_vec(), content_type, metadata_json, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(url)
  }

  async fn download(&self, path: String) -> Result<Option<StoredObject>> {
    let row: Option<(Vec<u8>, String)> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT data, metadata_json FROM objects WHERE path = ?1",
            rusqlite::params![path],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?)
      })
      .await?;

    row
      .map(|(data, metadata_json)| {
        Ok(StoredObject {
          data:     Bytes::from(data),
          metadata: serde_json::from_str(&metadata_json)?,
        })
      })
      .transpose()
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

const DEFAULT_OBJECT_URL: &str = "http://localhost/objects";

fn parse_object_url(prefix: &str) -> Result<Url> {
  let url = Url::parse(prefix)?;
  if url.cannot_be_a_base() {
    return Err(Error::ObjectUrl(prefix.to_owned()));
  }
  Ok(url)
}

fn boxed(e: Error) -> tokio_rusqlite::Error { tokio_rusqlite::Error::Other(Box::new(e)) }
