//! Attachment uploads for loan requests.
//!
//! Files are checked against the size ceiling and type allow-list before
//! storage is touched. Batches upload one file at a time and never stop early:
//! every input produces exactly one [`UploadOutcome`]. Files in one batch get
//! distinct millisecond stamps, so same-named files never share a path.

use chrono::{DateTime, TimeDelta, Utc};
use moneybox_core::{
  document::{Document, FailedUpload, FileUpload, UploadOutcome},
  store::{ObjectMetadata, ObjectStorage},
};

use crate::{Error, Result};

/// Validate and upload one file under `loans/{user}/{request}/`.
pub async fn upload_document<O: ObjectStorage>(
  storage: &O,
  file: &FileUpload,
  user_id: &str,
  request_id: &str,
) -> Result<Document> {
  upload_at(storage, file, user_id, request_id, Utc::now()).await
}

async fn upload_at<O: ObjectStorage>(
  storage: &O,
  file: &FileUpload,
  user_id: &str,
  request_id: &str,
  now: DateTime<Utc>,
) -> Result<Document> {
  file.validate()?;

  let path = file.storage_path(user_id, request_id, now);
  let metadata = ObjectMetadata {
    content_type:       file.content_type.clone(),
    uploaded_at:        now.to_rfc3339(),
    original_file_name: file.name.clone(),
  };

  let url = storage
    .upload(path.clone(), file.data.clone(), metadata)
    .await
    .map_err(|e| Error::Upload(Box::new(e)))?;

  tracing::debug!(%path, size = file.size(), "uploaded attachment");
  Ok(Document {
    url,
    name: file.name.clone(),
    content_type: file.content_type.clone(),
    size: file.size(),
    uploaded_at: now,
    storage_path: path,
  })
}

/// Upload `files` in order, reporting progress as a percentage before and
/// after each file.
pub async fn upload_batch<O, P>(
  storage: &O,
  files: &[FileUpload],
  user_id: &str,
  request_id: &str,
  mut progress: P,
) -> Vec<UploadOutcome>
where
  O: ObjectStorage,
  P: FnMut(u8) + Send,
{
  let total = files.len();
  let mut outcomes = Vec::with_capacity(total);
  let mut stamp = None;

  for (i, file) in files.iter().enumerate() {
    progress(percent(i, total));
    let at = next_stamp(stamp, Utc::now());
    stamp = Some(at);
    let outcome = match upload_at(storage, file, user_id, request_id, at).await {
      Ok(document) => UploadOutcome::Uploaded(document),
      Err(e) => {
        tracing::warn!(file = %file.name, request_id, error = %e, "attachment rejected");
        UploadOutcome::Failed(FailedUpload {
          name:        file.name.clone(),
          error:       e.to_string(),
          uploaded_at: Utc::now(),
        })
      }
    };
    outcomes.push(outcome);
    progress(percent(i + 1, total));
  }

  outcomes
}

/// `now`, or one millisecond past `previous` if the clock has not moved on.
fn next_stamp(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
  match previous {
    Some(prev) if now.timestamp_millis() <= prev.timestamp_millis() => {
      prev + TimeDelta::milliseconds(1)
    }
    _ => now,
  }
}

fn percent(done: usize, total: usize) -> u8 {
  if total == 0 {
    return 100;
  }
  (done * 100 / total) as u8
}
