//! Deposits: immutable records of money paid into the community pot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
  Result, ValidationError, amount,
  collection::{Fields, StoredDocument},
  timestamp,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
  pub id:        String,
  pub user_id:   String,
  pub amount:    Decimal,
  pub timestamp: DateTime<Utc>,
}

impl Deposit {
  pub fn from_document(doc: &StoredDocument) -> Result<Self> {
    Ok(Self {
      id:        doc.id.clone(),
      user_id:   doc.str("userId").unwrap_or_default().to_owned(),
      amount:    amount::normalize(doc.get("amount")),
      timestamp: doc.instant("timestamp")?,
    })
  }
}

/// Input for recording a deposit; the timestamp is assigned by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDeposit {
  pub user_id: String,
  pub amount:  Decimal,
}

impl NewDeposit {
  pub fn validate(&self) -> Result<(), ValidationError> {
    if self.user_id.trim().is_empty() {
      return Err(ValidationError::MissingField("user_id"));
    }
    amount::ensure_positive(self.amount)?;
    Ok(())
  }

  pub fn into_fields(self) -> Fields {
    let mut fields = Fields::new();
    fields.insert("userId".into(), json!(self.user_id));
    fields.insert("amount".into(), json!(self.amount));
    fields.insert("timestamp".into(), timestamp::server_timestamp());
    fields
  }
}
