//! Recent-activity feed: a pure projection of the latest deposit and loan
//! snapshots, rebuilt on every update.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{deposit::Deposit, loan::{Decision, LoanRequest}};

/// Default number of items shown in the feed.
pub const DEFAULT_LIMIT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
  Deposit,
  Loan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityItem {
  pub id:        String,
  pub kind:      ActivityKind,
  pub user_id:   String,
  pub amount:    Decimal,
  /// Only set for loans.
  pub status:    Option<Decision>,
  pub timestamp: DateTime<Utc>,
}

impl From<&Deposit> for ActivityItem {
  fn from(d: &Deposit) -> Self {
    Self {
      id:        d.id.clone(),
      kind:      ActivityKind::Deposit,
      user_id:   d.user_id.clone(),
      amount:    d.amount,
      status:    None,
      timestamp: d.timestamp,
    }
  }
}

impl From<&LoanRequest> for ActivityItem {
  fn from(l: &LoanRequest) -> Self {
    Self {
      id:        l.id.clone(),
      kind:      ActivityKind::Loan,
      user_id:   l.user_id.clone(),
      amount:    l.amount,
      status:    Some(l.status),
      timestamp: l.timestamp,
    }
  }
}

/// The `limit` newest events across both sources, newest first.
pub fn recent_activity(
  deposits: &[Deposit],
  loans: &[LoanRequest],
  limit: usize,
) -> Vec<ActivityItem> {
  let mut items: Vec<ActivityItem> = deposits
    .iter()
    .map(ActivityItem::from)
    .chain(loans.iter().map(ActivityItem::from))
    .collect();
  items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
  items.truncate(limit);
  items
}
