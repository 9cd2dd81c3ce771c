//! Member records and heartbeat-derived online status.
//!
//! The stored `isOnline` flag is written by clients but never trusted: a
//! client that dies without saying goodbye leaves it set. Whether a member is
//! online is always recomputed from `lastActive`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
  Result,
  collection::{Fields, StoredDocument},
  timestamp,
};

/// A heartbeat at least this many milliseconds old means the member is offline.
pub const ONLINE_WINDOW_MS: i64 = 60_000;

/// How often an active client refreshes `lastActive`.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub fn is_online(last_active: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
  last_active.is_some_and(|at| (now - at).num_milliseconds() < ONLINE_WINDOW_MS)
}

/// `alice@example.com` → `alice`.
pub fn display_name_from_email(email: &str) -> String {
  email.split('@').next().unwrap_or_default().to_owned()
}

// ─── UserRecord ──────────────────────────────────────────────────────────────

/// A document of the `users` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
  pub id:           String,
  pub email:        Option<String>,
  pub display_name: String,
  /// As last written by the member's client; see [`is_online`].
  pub is_online:    bool,
  pub last_active:  Option<DateTime<Utc>>,
  pub created_at:   Option<DateTime<Utc>>,
}

impl UserRecord {
  pub fn from_document(doc: &StoredDocument) -> Result<Self> {
    let email = doc.str("email").map(str::to_owned);
    let display_name = doc
      .str("displayName")
      .filter(|s| !s.is_empty())
      .map(str::to_owned)
      .or_else(|| email.as_deref().map(display_name_from_email))
      .unwrap_or_else(|| "Unknown".to_owned());

    Ok(Self {
      id: doc.id.clone(),
      email,
      display_name,
      is_online: doc.get("isOnline").and_then(|v| v.as_bool()).unwrap_or(false),
      last_active: doc.opt_instant("lastActive")?,
      created_at: doc.opt_instant("createdAt")?,
    })
  }

  pub fn online_at(&self, now: DateTime<Utc>) -> bool { is_online(self.last_active, now) }
}

// ─── Derived presence ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPresence {
  pub user_id:      String,
  pub display_name: String,
  pub online:       bool,
  pub last_active:  Option<DateTime<Utc>>,
}

impl UserPresence {
  pub fn of(user: &UserRecord, now: DateTime<Utc>) -> Self {
    Self {
      user_id:      user.id.clone(),
      display_name: user.display_name.clone(),
      online:       user.online_at(now),
      last_active:  user.last_active,
    }
  }
}

/// Members online at `now`, sorted by display name.
pub fn online_users(users: &[UserRecord], now: DateTime<Utc>) -> Vec<UserPresence> {
  let mut online: Vec<UserPresence> = users
    .iter()
    .filter(|u| u.online_at(now))
    .map(|u| UserPresence::of(u, now))
    .collect();
  online.sort_by(|a, b| a.display_name.cmp(&b.display_name));
  online
}

// ─── Heartbeat writes ────────────────────────────────────────────────────────

/// Partial update written on every heartbeat and on sign-off.
pub fn heartbeat_fields(online: bool) -> Fields {
  let mut fields = Fields::new();
  fields.insert("isOnline".into(), json!(online));
  fields.insert("lastActive".into(), timestamp::server_timestamp());
  fields
}

/// Full document for a member seen for the first time.
pub fn new_user_fields(email: &str) -> Fields {
  let mut fields = heartbeat_fields(true);
  fields.insert("email".into(), json!(email));
  fields.insert("displayName".into(), json!(display_name_from_email(email)));
  fields.insert("createdAt".into(), timestamp::server_timestamp());
  fields
}
