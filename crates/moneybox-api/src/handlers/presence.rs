//! Handlers for `/presence` endpoints.
//!
//! Clients call `heartbeat` every 30 seconds while a session is open and
//! `offline` when it closes. Who counts as online is derived from
//! `lastActive` alone.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use chrono::Utc;
use moneybox_core::{
  collection::Collection,
  presence::{UserPresence, online_users},
  store::DocumentStore,
};
use moneybox_view::{Member, presence};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

/// `GET /presence`: members active within the last minute, by name.
pub async fn online<S>(State(state): State<AppState<S>>) -> Json<Vec<UserPresence>> {
  let dashboard = state.dashboard.state();
  Json(online_users(&dashboard.users, Utc::now()))
}

#[derive(Debug, Default, Deserialize)]
pub struct HeartbeatBody {
  /// Required the first time a member is seen.
  pub email: Option<String>,
}

/// `POST /presence/:user_id/heartbeat`
pub async fn heartbeat<S>(
  State(state): State<AppState<S>>,
  Path(user_id): Path<String>,
  body: Option<Json<HeartbeatBody>>,
) -> Result<StatusCode, ApiError>
where
  S: DocumentStore,
{
  let Json(body) = body.unwrap_or_default();

  let email = match body.email {
    Some(email) => email,
    None => {
      let known = state
        .store
        .get(Collection::Users, user_id.clone())
        .await
        .map_err(ApiError::store)?
        .is_some();
      if !known {
        return Err(ApiError::BadRequest(format!("email is required for new member {user_id}")));
      }
      String::new()
    }
  };

  presence::announce(&*state.store, &Member::new(user_id, email)).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `POST /presence/:user_id/offline`
pub async fn offline<S>(
  State(state): State<AppState<S>>,
  Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: DocumentStore,
{
  presence::go_offline(&*state.store, &user_id).await?;
  Ok(StatusCode::NO_CONTENT)
}
