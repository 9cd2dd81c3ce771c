//! Loan attachments: upload validation, storage paths, and stored metadata.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// MIME types accepted for loan attachments.
pub const ALLOWED_TYPES: &[&str] = &[
  "application/pdf",
  "image/jpeg",
  "image/png",
  "image/gif",
  "application/msword",
  "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
  "application/vnd.ms-excel",
  "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

/// Largest accepted attachment, in bytes (10 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Most attachments a single loan request may carry.
pub const MAX_ATTACHMENTS: usize = 5;

/// Top-level namespace for loan attachments in object storage.
pub const LOAN_NAMESPACE: &str = "loans";

// ─── Stored metadata ─────────────────────────────────────────────────────────

/// Metadata of an uploaded attachment, as persisted on its loan request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
  pub url:          String,
  pub name:         String,
  #[serde(rename = "type")]
  pub content_type: String,
  pub size:         u64,
  pub uploaded_at:  DateTime<Utc>,
  pub storage_path: String,
}

// ─── Upload input ────────────────────────────────────────────────────────────

/// A file selected by the member, not yet uploaded.
#[derive(Debug, Clone)]
pub struct FileUpload {
  pub name:         String,
  pub content_type: String,
  pub data:         Bytes,
}

impl FileUpload {
  pub fn new(
    name: impl Into<String>,
    content_type: impl Into<String>,
    data: impl Into<Bytes>,
  ) -> Self {
    Self { name: name.into(), content_type: content_type.into(), data: data.into() }
  }

  pub fn size(&self) -> u64 { self.data.len() as u64 }

  /// Size first, then type. Runs before any storage call.
  pub fn validate(&self) -> Result<(), ValidationError> {
    if self.size() > MAX_UPLOAD_BYTES {
      return Err(ValidationError::FileTooLarge {
        name: self.name.clone(),
        size: self.size(),
      });
    }
    if !ALLOWED_TYPES.contains(&self.content_type.as_str()) {
      return Err(ValidationError::UnsupportedFileType {
        name:         self.name.clone(),
        content_type: self.content_type.clone(),
      });
    }
    Ok(())
  }

  /// `loans/{user}/{request}/{millis}-{original name}`.
  pub fn storage_path(&self, user_id: &str, request_id: &str, at: DateTime<Utc>) -> String {
    format!(
      "{LOAN_NAMESPACE}/{user_id}/{request_id}/{}-{}",
      at.timestamp_millis(),
      self.name
    )
  }
}

// ─── Batch results ───────────────────────────────────────────────────────────

/// An attachment that could not be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedUpload {
  pub name:        String,
  pub error:       String,
  pub uploaded_at: DateTime<Utc>,
}

/// One entry per file of a batch upload, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UploadOutcome {
  Failed(FailedUpload),
  Uploaded(Document),
}

impl UploadOutcome {
  pub fn document(&self) -> Option<&Document> {
    match self {
      Self::Uploaded(d) => Some(d),
      Self::Failed(_) => None,
    }
  }

  pub fn is_failed(&self) -> bool { matches!(self, Self::Failed(_)) }
}
