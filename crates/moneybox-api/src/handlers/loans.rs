//! Handlers for `/loans` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/loans` | `?user_id` required; newest first |
//! | `POST` | `/loans` | Body: [`SubmitLoanBody`]; returns 201 + [`SubmissionReport`] |
//! | `POST` | `/loans/:id/decision` | Body: `{"user_id": "...", "decision": "accepted"}` |
//! | `POST` | `/loans/:id/status` | Body: `{"status": "denied"}` |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use moneybox_core::{
  document::FileUpload,
  loan::{Decision, LoanRequest, NewLoanRequest},
  store::{DocumentStore, ObjectStorage},
};
use moneybox_view::{LoanDesk, SubmissionReport};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{AppState, error::ApiError};

fn desk<S>(state: &AppState<S>) -> LoanDesk<S, S>
where
  S: DocumentStore + ObjectStorage,
{
  LoanDesk::new(state.store.clone(), state.store.clone())
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub user_id: String,
}

/// `GET /loans?user_id=<id>`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<LoanRequest>>, ApiError>
where
  S: DocumentStore + ObjectStorage,
{
  Ok(Json(desk(&state).loans_for(&params.user_id).await?))
}

// ─── Submit ───────────────────────────────────────────────────────────────────

/// One attachment, inlined as base64.
#[derive(Debug, Deserialize)]
pub struct FileBody {
  pub name:         String,
  pub content_type: String,
  pub data_base64:  String,
}

impl FileBody {
  fn decode(self) -> Result<FileUpload, ApiError> {
    let data = B64
      .decode(self.data_base64.as_bytes())
      .map_err(|e| ApiError::BadRequest(format!("{}: invalid base64: {e}", self.name)))?;
    Ok(FileUpload::new(self.name, self.content_type, data))
  }
}

/// JSON body accepted by `POST /loans`.
#[derive(Debug, Deserialize)]
pub struct SubmitLoanBody {
  pub user_id: String,
  pub amount:  Decimal,
  pub name:    String,
  pub reason:  String,
  #[serde(default)]
  pub files:   Vec<FileBody>,
}

/// `POST /loans`: returns 201 even when some attachments failed; the report
/// says which.
pub async fn submit<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<SubmitLoanBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore + ObjectStorage,
{
  let files = body
    .files
    .into_iter()
    .map(FileBody::decode)
    .collect::<Result<Vec<_>, _>>()?;
  let request = NewLoanRequest { amount: body.amount, name: body.name, reason: body.reason };

  let report: SubmissionReport = desk(&state).submit(&body.user_id, request, files).await?;
  Ok((StatusCode::CREATED, Json(report)))
}

// ─── Decisions ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
  pub user_id:  String,
  pub decision: Decision,
}

/// `POST /loans/:id/decision`: the member's answer.
pub async fn decide<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<String>,
  Json(body): Json<DecisionBody>,
) -> Result<Json<LoanRequest>, ApiError>
where
  S: DocumentStore + ObjectStorage,
{
  let loan = desk(&state).record_decision(&id, &body.user_id, body.decision).await?;
  Ok(Json(loan))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub status: Decision,
}

/// `POST /loans/:id/status`: the administrator's ruling.
pub async fn set_status<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<String>,
  Json(body): Json<StatusBody>,
) -> Result<Json<LoanRequest>, ApiError>
where
  S: DocumentStore + ObjectStorage,
{
  let loan = desk(&state).set_status(&id, body.status).await?;
  Ok(Json(loan))
}
