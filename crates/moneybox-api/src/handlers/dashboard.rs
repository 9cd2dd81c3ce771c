//! `GET /dashboard`: the current aggregate view.

use axum::{Json, extract::State};
use moneybox_view::DashboardState;

use crate::AppState;

pub async fn show<S>(State(state): State<AppState<S>>) -> Json<DashboardState> {
  Json(DashboardState::clone(&state.dashboard.state()))
}
