//! `GET /objects/{*path}`: serve an uploaded attachment.

use axum::{
  body::Body,
  extract::{Path, State},
  http::{StatusCode, header},
  response::Response,
};
use moneybox_core::store::ObjectStorage;

use crate::{AppState, error::ApiError};

pub async fn download<S>(
  State(state): State<AppState<S>>,
  Path(path): Path<String>,
) -> Result<Response, ApiError>
where
  S: ObjectStorage,
{
  let object = state
    .store
    .download(path.clone())
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("object {path} not found")))?;

  Response::builder()
    .status(StatusCode::OK)
    .header(header::CONTENT_TYPE, object.metadata.content_type)
    .header(header::CONTENT_LENGTH, object.data.len())
    .body(Body::from(object.data))
    .map_err(ApiError::store)
}
