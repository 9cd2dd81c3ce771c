//! Handlers for `/deposits`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/deposits` | Body: [`NewDeposit`]; returns 201 + `{"id": ...}` |

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use moneybox_core::{collection::Collection, deposit::NewDeposit, store::DocumentStore};
use serde_json::json;

use crate::{AppState, error::ApiError};

/// `POST /deposits`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<NewDeposit>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore,
{
  body.validate()?;
  let user_id = body.user_id.clone();

  let id = state
    .store
    .add(Collection::Deposits, body.into_fields())
    .await
    .map_err(ApiError::store)?;

  tracing::info!(%id, %user_id, "deposit recorded");
  Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}
