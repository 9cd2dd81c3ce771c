//! Error type for `moneybox-store-sqlite`.

use moneybox_core::collection::Collection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] moneybox_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid object url: {0}")]
  Url(#[from] url::ParseError),

  /// The object URL prefix has no path to append to.
  #[error("object url cannot take a path: {0}")]
  ObjectUrl(String),

  /// `update` targeted a document that does not exist.
  #[error("document not found: {collection}/{id}")]
  DocumentNotFound { collection: Collection, id: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
