//! Error types for `moneybox-core`.

use thiserror::Error;

use crate::loan::Decision;

/// Failures while decoding store documents or applying domain rules.
#[derive(Debug, Error)]
pub enum Error {
  #[error("document {id} is missing required field `{field}`")]
  MissingField { id: String, field: &'static str },

  #[error("document {id} has an invalid `{field}`: {reason}")]
  InvalidField {
    id:     String,
    field:  &'static str,
    reason: String,
  },

  #[error("unrecognised timestamp: {0}")]
  InvalidTimestamp(String),

  #[error("cannot move from {from} to {to}")]
  IllegalTransition { from: Decision, to: Decision },

  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Input rejected before any remote call is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("Please fill in all fields (missing {0})")]
  MissingField(&'static str),

  #[error("Amount must be greater than 0")]
  NonPositiveAmount,

  #[error("Amount is not a number: {0:?}")]
  InvalidAmount(String),

  #[error("Please attach at least one document")]
  NoDocuments,

  #[error("Maximum {max} files allowed")]
  TooManyFiles { max: usize },

  #[error("File size must be less than 10MB ({name} is {size} bytes)")]
  FileTooLarge { name: String, size: u64 },

  #[error(
    "File type not supported. Please upload PDF, images, or documents. \
     ({name} is {content_type:?})"
  )]
  UnsupportedFileType { name: String, content_type: String },

  #[error("A message needs text or an image")]
  EmptyMessage,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
