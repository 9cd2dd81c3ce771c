//! The dashboard's pure event fold.
//!
//! [`reduce`] never mutates its input: it clones the current state, applies
//! one event and returns the replacement. Aggregates for a source are always
//! recomputed from the full snapshot, never accumulated, and the cross-source
//! projections (chart, activity) are rebuilt whenever either input changes.

use moneybox_core::{
  activity::{self, ActivityItem},
  collection::{Collection, CollectionQuery, Direction, StoredDocument},
  deposit::Deposit,
  loan::LoanRequest,
  presence::UserRecord,
  series::{self, SeriesPoint},
  store::SubscriptionError,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ─── Sources ─────────────────────────────────────────────────────────────────

/// One of the three collections the dashboard watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
  Deposits,
  Loans,
  Users,
}

impl Source {
  pub const ALL: [Source; 3] = [Source::Deposits, Source::Loans, Source::Users];

  pub fn label(self) -> &'static str {
    match self {
      Self::Deposits => "deposits",
      Self::Loans => "loans",
      Self::Users => "users",
    }
  }

  pub fn collection(self) -> Collection {
    match self {
      Self::Deposits => Collection::Deposits,
      Self::Loans => Collection::Loans,
      Self::Users => Collection::Users,
    }
  }

  /// The subscription each source is fed by.
  pub fn query(self) -> CollectionQuery {
    let field = match self {
      Self::Deposits | Self::Loans => "timestamp",
      Self::Users => "createdAt",
    };
    CollectionQuery::new(self.collection()).order_by(field, Direction::Descending)
  }
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// A snapshot that has already been decoded into domain records.
#[derive(Debug, Clone)]
pub enum Snapshot {
  Deposits(Vec<Deposit>),
  Loans(Vec<LoanRequest>),
  Users(Vec<UserRecord>),
}

#[derive(Debug, Clone)]
pub enum DashboardEvent {
  Snapshot(Snapshot),
  Failed { source: Source, message: String },
}

impl DashboardEvent {
  /// Decode a raw snapshot. A single bad document fails the whole snapshot so
  /// that aggregates are never computed over a partial set.
  pub fn decode(source: Source, docs: &[StoredDocument]) -> Self {
    let decoded = match source {
      Source::Deposits => decode_all(docs, Deposit::from_document).map(Snapshot::Deposits),
      Source::Loans => decode_all(docs, LoanRequest::from_document).map(Snapshot::Loans),
      Source::Users => decode_all(docs, UserRecord::from_document).map(Snapshot::Users),
    };
    match decoded {
      Ok(snapshot) => Self::Snapshot(snapshot),
      Err(e) => {
        tracing::warn!(source = source.label(), error = %e, "snapshot decode failed");
        Self::Failed {
          source,
          message: format!("Failed to process {} data: {e}", source.label()),
        }
      }
    }
  }

  pub fn subscription_failed(source: Source, err: &SubscriptionError) -> Self {
    tracing::warn!(
      source = source.label(),
      code = ?err.code,
      error = %err.message,
      "subscription error"
    );
    Self::Failed { source, message: err.user_message(source.label()) }
  }
}

fn decode_all<T>(
  docs: &[StoredDocument],
  decode: fn(&StoredDocument) -> moneybox_core::Result<T>,
) -> moneybox_core::Result<Vec<T>> {
  docs.iter().map(decode).collect()
}

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
  /// Points kept in the chart series.
  pub chart_window:   usize,
  /// Items kept in the recent-activity feed.
  pub activity_limit: usize,
}

impl Default for DashboardConfig {
  fn default() -> Self {
    Self {
      chart_window:   series::DEFAULT_WINDOW,
      activity_limit: activity::DEFAULT_LIMIT,
    }
  }
}

/// Sticky per-source error messages. Cleared by the next good snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceErrors {
  pub deposits: Option<String>,
  pub loans:    Option<String>,
  pub users:    Option<String>,
}

impl SourceErrors {
  pub fn get(&self, source: Source) -> Option<&str> {
    match source {
      Source::Deposits => self.deposits.as_deref(),
      Source::Loans => self.loans.as_deref(),
      Source::Users => self.users.as_deref(),
    }
  }

  fn slot(&mut self, source: Source) -> &mut Option<String> {
    match source {
      Source::Deposits => &mut self.deposits,
      Source::Loans => &mut self.loans,
      Source::Users => &mut self.users,
    }
  }

  pub fn any(&self) -> bool {
    self.deposits.is_some() || self.loans.is_some() || self.users.is_some()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardState {
  pub total_deposits:  Decimal,
  pub total_loans:     Decimal,
  pub pending_loans:   usize,
  pub total_users:     usize,
  /// Newest member first.
  pub users:           Vec<UserRecord>,
  pub recent_activity: Vec<ActivityItem>,
  pub chart:           Vec<SeriesPoint>,
  pub errors:          SourceErrors,
  /// True until the first users snapshot (or users error) arrives.
  pub loading:         bool,

  #[serde(skip)]
  deposits: Vec<Deposit>,
  #[serde(skip)]
  loans:    Vec<LoanRequest>,
}

impl Default for DashboardState {
  fn default() -> Self {
    Self {
      total_deposits:  Decimal::ZERO,
      total_loans:     Decimal::ZERO,
      pending_loans:   0,
      total_users:     0,
      users:           Vec::new(),
      recent_activity: Vec::new(),
      chart:           Vec::new(),
      errors:          SourceErrors::default(),
      loading:         true,
      deposits:        Vec::new(),
      loans:           Vec::new(),
    }
  }
}

impl DashboardState {
  /// The last good deposits snapshot.
  pub fn deposits(&self) -> &[Deposit] { &self.deposits }

  /// The last good loans snapshot.
  pub fn loans(&self) -> &[LoanRequest] { &self.loans }
}

// ─── Fold ────────────────────────────────────────────────────────────────────

pub fn reduce(
  state: &DashboardState,
  event: DashboardEvent,
  config: &DashboardConfig,
) -> DashboardState {
  let mut next = state.clone();

  match event {
    DashboardEvent::Snapshot(Snapshot::Deposits(deposits)) => {
      next.total_deposits = deposits.iter().map(|d| d.amount).sum();
      next.deposits = deposits;
      next.errors.deposits = None;
      rebuild_projections(&mut next, config);
    }
    DashboardEvent::Snapshot(Snapshot::Loans(loans)) => {
      next.total_loans = loans.iter().map(|l| l.amount).sum();
      next.pending_loans = loans.iter().filter(|l| l.status.is_pending()).count();
      next.loans = loans;
      next.errors.loans = None;
      rebuild_projections(&mut next, config);
    }
    DashboardEvent::Snapshot(Snapshot::Users(mut users)) => {
      users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
      next.total_users = users.len();
      next.users = users;
      next.errors.users = None;
      next.loading = false;
    }
    DashboardEvent::Failed { source, message } => {
      *next.errors.slot(source) = Some(message);
      if source == Source::Users {
        next.loading = false;
      }
    }
  }

  next
}

fn rebuild_projections(state: &mut DashboardState, config: &DashboardConfig) {
  state.chart = series::merge_series(&state.deposits, &state.loans, config.chart_window);
  state.recent_activity =
    activity::recent_activity(&state.deposits, &state.loans, config.activity_limit);
}

#[cfg(test)]
mod tests {
  use chrono::{DateTime, TimeZone, Utc};
  use moneybox_core::{loan::Decision, store::ErrorCode};
  use serde_json::json;

  use super::*;
  use crate::testing::doc;

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  fn deposit(id: &str, amount: i64, secs: i64) -> Deposit {
    Deposit { id: id.into(), user_id: "u".into(), amount: Decimal::from(amount), timestamp: at(secs) }
  }

  fn loan(id: &str, amount: i64, secs: i64, status: Decision) -> LoanRequest {
    LoanRequest {
      id:               id.into(),
      user_id:          "u".into(),
      amount:           Decimal::from(amount),
      name:             "n".into(),
      reason:           "r".into(),
      status,
      user_decision:    Decision::Pending,
      user_decision_at: None,
      timestamp:        at(secs),
      documents:        vec![],
    }
  }

  fn fold(events: Vec<DashboardEvent>) -> DashboardState {
    let config = DashboardConfig::default();
    events
      .into_iter()
      .fold(DashboardState::default(), |s, e| reduce(&s, e, &config))
  }

  #[test]
  fn starts_loading_with_zero_aggregates() {
    let s = DashboardState::default();
    assert!(s.loading);
    assert_eq!(s.total_deposits, Decimal::ZERO);
    assert!(!s.errors.any());
  }

  #[test]
  fn deposit_totals_recompute_from_scratch() {
    let s = fold(vec![
      DashboardEvent::Snapshot(Snapshot::Deposits(vec![deposit("a", 100, 1), deposit("b", 250, 2)])),
      DashboardEvent::Snapshot(Snapshot::Deposits(vec![deposit("a", 100, 1)])),
    ]);
    assert_eq!(s.total_deposits, Decimal::from(100));
    assert_eq!(s.chart.len(), 1);
  }

  #[test]
  fn pending_counts_status_only() {
    let mut decided = loan("c", 30, 3, Decision::Accepted);
    decided.user_decision = Decision::Denied;
    let s = fold(vec![DashboardEvent::Snapshot(Snapshot::Loans(vec![
      loan("a", 10, 1, Decision::Pending),
      loan("b", 20, 2, Decision::Pending),
      decided,
    ]))]);
    assert_eq!(s.total_loans, Decimal::from(60));
    assert_eq!(s.pending_loans, 2);
  }

  #[test]
  fn chart_and_activity_merge_both_sources() {
    let config = DashboardConfig { chart_window: 3, activity_limit: 2 };
    let s = [
      DashboardEvent::Snapshot(Snapshot::Deposits(vec![deposit("d1", 5, 10), deposit("d2", 5, 30)])),
      DashboardEvent::Snapshot(Snapshot::Loans(vec![
        loan("l1", 7, 20, Decision::Pending),
        loan("l2", 7, 5, Decision::Pending),
      ])),
    ]
    .into_iter()
    .fold(DashboardState::default(), |s, e| reduce(&s, e, &config));

    let chart: Vec<_> = s.chart.iter().map(|p| p.timestamp.timestamp()).collect();
    assert_eq!(chart, [10, 20, 30]);
    let feed: Vec<_> = s.recent_activity.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(feed, ["d2", "l1"]);
  }

  #[test]
  fn users_end_loading_and_sort_newest_first() {
    let s = fold(vec![DashboardEvent::decode(Source::Users, &[
      doc("old", json!({ "email": "a@x.com", "createdAt": 1_000 })),
      doc("new", json!({ "email": "b@x.com", "createdAt": 9_000 })),
    ])]);
    assert!(!s.loading);
    assert_eq!(s.total_users, 2);
    assert_eq!(s.users[0].id, "new");
  }

  #[test]
  fn error_is_sticky_and_keeps_last_good_values() {
    let config = DashboardConfig::default();
    let good = reduce(
      &DashboardState::default(),
      DashboardEvent::Snapshot(Snapshot::Deposits(vec![deposit("a", 40, 1)])),
      &config,
    );
    let failed = reduce(
      &good,
      DashboardEvent::subscription_failed(
        Source::Deposits,
        &SubscriptionError::new(ErrorCode::PermissionDenied, "nope"),
      ),
      &config,
    );
    assert_eq!(failed.total_deposits, Decimal::from(40));
    assert!(failed.errors.get(Source::Deposits).is_some_and(|m| m.starts_with("Permission denied")));

    let recovered = reduce(
      &failed,
      DashboardEvent::Snapshot(Snapshot::Deposits(vec![deposit("a", 40, 1), deposit("b", 2, 2)])),
      &config,
    );
    assert_eq!(recovered.total_deposits, Decimal::from(42));
    assert!(recovered.errors.get(Source::Deposits).is_none());
  }

  #[test]
  fn undecodable_snapshot_flags_source() {
    let bad = doc("bad", json!({ "amount": 3, "timestamp": "yesterday" }));
    let event = DashboardEvent::decode(Source::Deposits, &[bad]);
    let s = fold(vec![event]);
    assert!(s.errors.deposits.as_deref().is_some_and(|m| m.starts_with("Failed to process deposits data")));
    assert!(s.loading);
  }

  #[test]
  fn only_lowercase_pending_is_counted() {
    let good = DashboardEvent::decode(
      Source::Loans,
      &[
        doc("a", json!({ "amount": 5, "status": "pending", "timestamp": 1_000 })),
        doc("b", json!({ "amount": 5, "status": "accepted", "timestamp": 2_000 })),
      ],
    );
    let s = fold(vec![good]);
    assert_eq!(s.pending_loans, 1);

    let odd = DashboardEvent::decode(
      Source::Loans,
      &[doc("c", json!({ "amount": 5, "status": "Pending", "timestamp": 3_000 }))],
    );
    let s = reduce(&s, odd, &DashboardConfig::default());
    assert_eq!(s.pending_loans, 1);
    assert!(s.errors.loans.is_some());
  }

  #[test]
  fn users_error_ends_loading() {
    let s = fold(vec![DashboardEvent::Failed { source: Source::Users, message: "x".into() }]);
    assert!(!s.loading);
    assert_eq!(s.errors.get(Source::Users), Some("x"));
  }

  #[test]
  fn reduce_does_not_touch_input() {
    let before = DashboardState::default();
    let _ = reduce(
      &before,
      DashboardEvent::Snapshot(Snapshot::Deposits(vec![deposit("a", 1, 1)])),
      &DashboardConfig::default(),
    );
    assert_eq!(before, DashboardState::default());
  }
}
