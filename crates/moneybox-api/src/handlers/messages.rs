//! Handlers for `/messages`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/messages` | Full history, oldest first |
//! | `POST` | `/messages` | Body: [`SendBody`]; returns 201 + `{"id": ...}` |

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use moneybox_core::{
  chat::{ChatMessage, NewMessage},
  store::DocumentStore,
};
use moneybox_view::{Member, chat};
use serde::Deserialize;
use serde_json::json;

use crate::{AppState, error::ApiError};

/// `GET /messages`
pub async fn list<S>(State(state): State<AppState<S>>) -> Result<Json<Vec<ChatMessage>>, ApiError>
where
  S: DocumentStore,
{
  Ok(Json(chat::history(&*state.store).await?))
}

#[derive(Debug, Deserialize)]
pub struct SendBody {
  pub user_id:   String,
  pub email:     String,
  #[serde(default)]
  pub text:      String,
  pub image_url: Option<String>,
}

/// `POST /messages`
pub async fn send<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<SendBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore,
{
  let member = Member::new(body.user_id, body.email);
  let message = NewMessage { text: body.text, image_url: body.image_url };

  let id = chat::send_message(&*state.store, &member, message).await?;
  Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}
