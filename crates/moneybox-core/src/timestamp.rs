//! Timestamp normalization at the store boundary.
//!
//! A timestamp field can arrive in three shapes: the store-native
//! `{"seconds", "nanoseconds"}` object, integer epoch milliseconds, or an
//! RFC 3339 string. Every decoder converts to [`DateTime<Utc>`] immediately so
//! that nothing downstream has to branch on shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Key of the sentinel object that asks the store to stamp the write time.
pub const SERVER_TIMESTAMP_KEY: &str = "$serverTimestamp";

/// A field value the store replaces with its own clock at write time.
pub fn server_timestamp() -> Value {
  serde_json::json!({ SERVER_TIMESTAMP_KEY: true })
}

/// Whether `value` is the [`server_timestamp`] sentinel.
pub fn is_server_timestamp(value: &Value) -> bool {
  value
    .as_object()
    .is_some_and(|o| o.len() == 1 && o.contains_key(SERVER_TIMESTAMP_KEY))
}

// ─── Raw shapes ──────────────────────────────────────────────────────────────

/// Every timestamp representation accepted at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
  /// Store-native temporal value.
  Native {
    #[serde(alias = "_seconds")]
    seconds:     i64,
    #[serde(alias = "_nanoseconds", default)]
    nanoseconds: u32,
  },
  /// Milliseconds since the Unix epoch.
  Millis(i64),
  /// RFC 3339 / ISO 8601 text.
  Text(String),
}

impl RawTimestamp {
  /// The store-native encoding of `at`.
  pub fn native(at: DateTime<Utc>) -> Self {
    Self::Native {
      seconds:     at.timestamp(),
      nanoseconds: at.timestamp_subsec_nanos(),
    }
  }

  pub fn to_instant(&self) -> Result<DateTime<Utc>> {
    match self {
      Self::Native { seconds, nanoseconds } => {
        DateTime::from_timestamp(*seconds, *nanoseconds).ok_or_else(|| {
          Error::InvalidTimestamp(format!("{seconds}s {nanoseconds}ns"))
        })
      }
      Self::Millis(ms) => DateTime::from_timestamp_millis(*ms)
        .ok_or_else(|| Error::InvalidTimestamp(format!("{ms}ms"))),
      Self::Text(s) => DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidTimestamp(format!("{s:?}: {e}"))),
    }
  }
}

/// Normalize an optional field value to an instant.
///
/// Absent or `null` values map to the Unix epoch so they sort before every
/// real event.
pub fn normalize(value: Option<&Value>) -> Result<DateTime<Utc>> {
  Ok(normalize_opt(value)?.unwrap_or(DateTime::UNIX_EPOCH))
}

/// Like [`normalize`] but keeps absence visible.
pub fn normalize_opt(value: Option<&Value>) -> Result<Option<DateTime<Utc>>> {
  match value {
    None | Some(Value::Null) => Ok(None),
    Some(v) => {
      let raw: RawTimestamp = serde_json::from_value(v.clone())
        .map_err(|_| Error::InvalidTimestamp(v.to_string()))?;
      raw.to_instant().map(Some)
    }
  }
}

/// Encode `at` the way the store writes resolved server timestamps.
pub fn to_native_value(at: DateTime<Utc>) -> Value {
  serde_json::to_value(RawTimestamp::native(at)).unwrap_or(Value::Null)
}
