//! Encoding and decoding helpers between domain values and the plain-text
//! representations stored in SQLite columns.
//!
//! Row timestamps are written as RFC 3339 strings. Document fields are stored
//! as a compact JSON object in which server-timestamp sentinels have already
//! been replaced by the store-native `{seconds, nanoseconds}` form.

use chrono::{DateTime, Utc};
use moneybox_core::{
  collection::{Fields, StoredDocument},
  timestamp,
};
use serde_json::Value;

use crate::Result;

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

// ─── Fields ──────────────────────────────────────────────────────────────────

pub fn encode_fields(fields: &Fields) -> Result<String> {
  Ok(serde_json::to_string(fields)?)
}

pub fn decode_fields(s: &str) -> Result<Fields> { Ok(serde_json::from_str(s)?) }

/// Replace every server-timestamp sentinel, at any depth, with `now`.
pub fn resolve_server_timestamps(fields: &mut Fields, now: DateTime<Utc>) {
  for value in fields.values_mut() {
    resolve_value(value, now);
  }
}

fn resolve_value(value: &mut Value, now: DateTime<Utc>) {
  if timestamp::is_server_timestamp(value) {
    *value = timestamp::to_native_value(now);
    return;
  }
  match value {
    Value::Object(map) => map.values_mut().for_each(|v| resolve_value(v, now)),
    Value::Array(items) => items.iter_mut().for_each(|v| resolve_value(v, now)),
    _ => {}
  }
}

/// Shallow merge: top-level keys of `partial` overwrite those of `base`.
pub fn merge_fields(base: &mut Fields, partial: Fields) {
  for (k, v) in partial {
    base.insert(k, v);
  }
}

// ─── Raw row ─────────────────────────────────────────────────────────────────

/// A `documents` row as read from SQLite, before JSON decoding.
pub struct RawDocument {
  pub doc_id:      String,
  pub fields_json: String,
}

impl RawDocument {
  pub fn into_document(self) -> Result<StoredDocument> {
    Ok(StoredDocument::new(self.doc_id, decode_fields(&self.fields_json)?))
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;

  #[test]
  fn nested_sentinels_are_resolved() {
    let now = Utc.timestamp_opt(1_000, 0).unwrap();
    let mut fields = json!({
      "timestamp": timestamp::server_timestamp(),
      "meta": { "seen": timestamp::server_timestamp() },
      "list": [timestamp::server_timestamp()],
      "plain": 3,
    })
    .as_object()
    .cloned()
    .unwrap();

    resolve_server_timestamps(&mut fields, now);

    let native = json!({ "seconds": 1_000, "nanoseconds": 0 });
    assert_eq!(fields["timestamp"], native);
    assert_eq!(fields["meta"]["seen"], native);
    assert_eq!(fields["list"][0], native);
    assert_eq!(fields["plain"], json!(3));
  }

  #[test]
  fn merge_overwrites_top_level_only() {
    let mut base = json!({ "a": 1, "b": { "x": 1 } }).as_object().cloned().unwrap();
    let partial = json!({ "b": { "y": 2 }, "c": 3 }).as_object().cloned().unwrap();
    merge_fields(&mut base, partial);
    assert_eq!(serde_json::Value::Object(base), json!({ "a": 1, "b": { "y": 2 }, "c": 3 }));
  }
}
