//! Loan requests and their two independent decision flags.
//!
//! `status` is set by an administrator; `user_decision` is the requesting
//! member's acknowledgement of that outcome. Both start as
//! [`Decision::Pending`] and may each move to a decided value exactly once.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use strum::{AsRefStr, Display, EnumString};

use crate::{
  Error, Result, ValidationError, amount,
  collection::{Fields, StoredDocument},
  document::{Document, MAX_ATTACHMENTS},
  timestamp,
};

// ─── Decision ────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Decision {
  #[default]
  Pending,
  Accepted,
  Denied,
}

impl Decision {
  pub fn is_pending(self) -> bool { self == Self::Pending }

  /// Only pending flags move, and never back to pending.
  pub fn can_transition_to(self, next: Decision) -> bool {
    self.is_pending() && !next.is_pending()
  }

  pub fn transition(self, next: Decision) -> Result<Decision> {
    if self.can_transition_to(next) {
      Ok(next)
    } else {
      Err(Error::IllegalTransition { from: self, to: next })
    }
  }
}

// ─── LoanRequest ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRequest {
  pub id:               String,
  pub user_id:          String,
  pub amount:           Decimal,
  pub name:             String,
  pub reason:           String,
  pub status:           Decision,
  pub user_decision:    Decision,
  pub user_decision_at: Option<DateTime<Utc>>,
  pub timestamp:        DateTime<Utc>,
  pub documents:        Vec<Document>,
}

impl LoanRequest {
  pub fn from_document(doc: &StoredDocument) -> Result<Self> {
    Ok(Self {
      id:               doc.id.clone(),
      user_id:          doc.str("userId").unwrap_or_default().to_owned(),
      amount:           amount::normalize(doc.get("amount")),
      name:             doc.str("name").unwrap_or_default().to_owned(),
      reason:           doc.str("reason").unwrap_or_default().to_owned(),
      status:           decision_field(doc, "status")?,
      user_decision:    decision_field(doc, "userDecision")?,
      user_decision_at: doc.opt_instant("userDecisionAt")?,
      timestamp:        doc.instant("timestamp")?,
      documents:        doc.decode("documents")?,
    })
  }

  /// The administrator has ruled and the member has not yet responded.
  pub fn awaiting_user_decision(&self) -> bool {
    !self.status.is_pending() && self.user_decision.is_pending()
  }
}

fn decision_field(doc: &StoredDocument, field: &'static str) -> Result<Decision> {
  match doc.str(field) {
    None => Ok(Decision::Pending),
    Some(s) => s.parse().map_err(|_| Error::InvalidField {
      id: doc.id.clone(),
      field,
      reason: format!("unknown decision {s:?}"),
    }),
  }
}

// ─── NewLoanRequest ──────────────────────────────────────────────────────────

/// Form input for a loan request. Attachments travel separately.
#[derive(Debug, Clone, Deserialize)]
pub struct NewLoanRequest {
  pub amount: Decimal,
  pub name:   String,
  pub reason: String,
}

impl NewLoanRequest {
  /// Check the form before anything is written. `attachments` is the number
  /// of files the member selected.
  pub fn validate(&self, attachments: usize) -> Result<(), ValidationError> {
    if self.name.trim().is_empty() {
      return Err(ValidationError::MissingField("name"));
    }
    if self.reason.trim().is_empty() {
      return Err(ValidationError::MissingField("reason"));
    }
    if attachments == 0 {
      return Err(ValidationError::NoDocuments);
    }
    if attachments > MAX_ATTACHMENTS {
      return Err(ValidationError::TooManyFiles { max: MAX_ATTACHMENTS });
    }
    amount::ensure_positive(self.amount)?;
    Ok(())
  }

  /// Initial document: both flags pending, no attachments yet.
  pub fn into_fields(self, user_id: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("userId".into(), json!(user_id));
    fields.insert("amount".into(), json!(self.amount));
    fields.insert("name".into(), json!(self.name));
    fields.insert("reason".into(), json!(self.reason));
    fields.insert("status".into(), json!(Decision::Pending));
    fields.insert("userDecision".into(), json!(Decision::Pending));
    fields.insert("timestamp".into(), timestamp::server_timestamp());
    fields.insert("documents".into(), json!([]));
    fields
  }
}
