//! Collections, queries, and the untyped document envelope the store speaks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result, timestamp};

/// Field map of a stored document.
pub type Fields = Map<String, Value>;

/// The collections the application reads and writes.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Collection {
  Deposits,
  Loans,
  Users,
  Messages,
}

// ─── Query type ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
  #[default]
  Ascending,
  Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
  pub field:     String,
  pub direction: Direction,
}

/// Equality filter on a top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
  pub field: String,
  pub value: Value,
}

/// What a subscription or one-shot read selects from a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionQuery {
  pub collection: Collection,
  pub order_by:   Option<OrderBy>,
  pub filter:     Option<FieldFilter>,
}

impl CollectionQuery {
  pub fn new(collection: Collection) -> Self {
    Self { collection, order_by: None, filter: None }
  }

  pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
    self.order_by = Some(OrderBy { field: field.to_owned(), direction });
    self
  }

  pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
    self.filter = Some(FieldFilter { field: field.to_owned(), value: value.into() });
    self
  }

  /// Whether `doc` passes the filter (ordering is applied separately).
  pub fn matches(&self, doc: &StoredDocument) -> bool {
    match &self.filter {
      Some(f) => doc.fields.get(&f.field) == Some(&f.value),
      None => true,
    }
  }

  /// Apply filter and ordering to a full collection, in place.
  ///
  /// Ordering compares normalized instants when both sides parse as
  /// timestamps, numbers numerically, and falls back to string form. The sort
  /// is stable so ties keep insertion order.
  pub fn apply(&self, docs: &mut Vec<StoredDocument>) {
    docs.retain(|d| self.matches(d));
    if let Some(order) = &self.order_by {
      docs.sort_by(|a, b| {
        let ord = compare_values(a.fields.get(&order.field), b.fields.get(&order.field));
        match order.direction {
          Direction::Ascending => ord,
          Direction::Descending => ord.reverse(),
        }
      });
    }
  }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
  use std::cmp::Ordering;

  if let (Ok(Some(ta)), Ok(Some(tb))) =
    (timestamp::normalize_opt(a), timestamp::normalize_opt(b))
  {
    return ta.cmp(&tb);
  }
  match (a, b) {
    (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
    (None | Some(Value::Null), _) => Ordering::Less,
    (_, None | Some(Value::Null)) => Ordering::Greater,
    (Some(Value::Number(x)), Some(Value::Number(y))) => x
      .as_f64()
      .partial_cmp(&y.as_f64())
      .unwrap_or(Ordering::Equal),
    (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
    (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
  }
}

// ─── Document envelope ───────────────────────────────────────────────────────

/// A document as delivered by the store: an id plus raw fields.
///
/// Typed entities decode from this at ingestion; see the `from_document`
/// constructors on each entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
  pub id:     String,
  pub fields: Fields,
}

impl StoredDocument {
  pub fn new(id: impl Into<String>, fields: Fields) -> Self {
    Self { id: id.into(), fields }
  }

  pub fn get(&self, field: &str) -> Option<&Value> { self.fields.get(field) }

  /// A string field, or `None` when absent, null, or another type.
  pub fn str(&self, field: &str) -> Option<&str> {
    self.get(field).and_then(Value::as_str)
  }

  pub fn required_str(&self, field: &'static str) -> Result<String> {
    self.str(field).map(str::to_owned).ok_or_else(|| Error::MissingField {
      id: self.id.clone(),
      field,
    })
  }

  /// A timestamp field, normalized; absent means the Unix epoch.
  pub fn instant(&self, field: &'static str) -> Result<DateTime<Utc>> {
    timestamp::normalize(self.get(field)).map_err(|e| self.invalid(field, e))
  }

  pub fn opt_instant(&self, field: &'static str) -> Result<Option<DateTime<Utc>>> {
    timestamp::normalize_opt(self.get(field)).map_err(|e| self.invalid(field, e))
  }

  /// Deserialize one field with serde, treating absence as `T::default()`.
  pub fn decode<T>(&self, field: &'static str) -> Result<T>
  where
    T: serde::de::DeserializeOwned + Default,
  {
    match self.get(field) {
      None | Some(Value::Null) => Ok(T::default()),
      Some(v) => serde_json::from_value(v.clone()).map_err(|e| self.invalid(field, e)),
    }
  }

  /// Whether every field of `expected` currently holds that value. An
  /// absent field reads as `null`.
  pub fn holds(&self, expected: &Fields) -> bool {
    expected.iter().all(|(k, v)| self.get(k).unwrap_or(&Value::Null) == v)
  }

  fn invalid(&self, field: &'static str, err: impl std::fmt::Display) -> Error {
    Error::InvalidField { id: self.id.clone(), field, reason: err.to_string() }
  }
}
