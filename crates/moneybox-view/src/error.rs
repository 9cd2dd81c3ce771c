//! Error type for `moneybox-view`.

use moneybox_core::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Rejected before anything was written.
  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error(transparent)]
  Domain(#[from] moneybox_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("Failed to upload file: {0}")]
  Upload(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("loan request not found: {0}")]
  LoanNotFound(String),

  #[error("loan request {0} belongs to another member")]
  NotOwner(String),

  #[error("loan request {0} has not been ruled on yet")]
  AwaitingStatus(String),
}

impl Error {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
