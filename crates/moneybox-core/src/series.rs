//! Bounded chart series merged from deposits and loans.
//!
//! This is merge-and-truncate, not bucketing: two events at the same instant
//! stay two points.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{deposit::Deposit, loan::LoanRequest};

/// Default number of points kept for the dashboard chart.
pub const DEFAULT_WINDOW: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
  pub timestamp: DateTime<Utc>,
  /// `HH:MM` axis label.
  pub name:      String,
  pub deposits:  Decimal,
  pub loans:     Decimal,
}

impl SeriesPoint {
  fn new(timestamp: DateTime<Utc>, deposits: Decimal, loans: Decimal) -> Self {
    Self {
      timestamp,
      name: timestamp.format("%H:%M").to_string(),
      deposits,
      loans,
    }
  }
}

/// The last `window` events, oldest first.
///
/// Each deposit contributes `(amount, 0)` and each loan `(0, amount)`. Input
/// order does not matter; the result is always non-decreasing in time and has
/// `min(deposits.len() + loans.len(), window)` points.
pub fn merge_series(
  deposits: &[Deposit],
  loans: &[LoanRequest],
  window: usize,
) -> Vec<SeriesPoint> {
  let mut combined: Vec<SeriesPoint> = deposits
    .iter()
    .map(|d| SeriesPoint::new(d.timestamp, d.amount, Decimal::ZERO))
    .chain(
      loans
        .iter()
        .map(|l| SeriesPoint::new(l.timestamp, Decimal::ZERO, l.amount)),
    )
    .collect();

  combined.sort_by_key(|p| p.timestamp);
  let skip = combined.len().saturating_sub(window);
  combined.split_off(skip)
}
