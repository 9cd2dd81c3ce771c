//! JSON HTTP API for Money Box.
//!
//! Exposes an axum [`Router`] backed by any store that implements both
//! [`DocumentStore`] and [`ObjectStorage`]. The live [`Dashboard`] is started
//! once per process and shared by every request. Authentication is the
//! caller's responsibility.

pub mod error;
pub mod handlers;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use moneybox_core::store::{DocumentStore, ObjectStorage};
use moneybox_view::{Dashboard, DashboardConfig};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use handlers::{dashboard, deposits, loans, messages, objects, presence};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `MONEYBOX_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  /// Externally visible base URL, used to build attachment download links.
  /// Defaults to `http://{host}:{port}`.
  pub public_url: Option<String>,
  pub dashboard:  DashboardConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_owned(),
      port:       8080,
      store_path: PathBuf::from("moneybox.db"),
      public_url: None,
      dashboard:  DashboardConfig::default(),
    }
  }
}

impl ServerConfig {
  /// Prefix for attachment URLs; objects are served under `/objects`.
  pub fn object_url(&self) -> String {
    let base = match &self.public_url {
      Some(url) => url.trim_end_matches('/').to_owned(),
      None => format!("http://{}:{}", self.host, self.port),
    };
    format!("{base}/objects")
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub store:     Arc<S>,
  pub dashboard: Arc<Dashboard>,
  pub config:    Arc<ServerConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:     self.store.clone(),
      dashboard: self.dashboard.clone(),
      config:    self.config.clone(),
    }
  }
}

impl<S: DocumentStore> AppState<S> {
  /// Start the shared dashboard against `store`.
  pub async fn new(store: Arc<S>, config: ServerConfig) -> Self {
    let dashboard = Dashboard::start(&*store, config.dashboard).await;
    Self {
      store,
      dashboard: Arc::new(dashboard),
      config: Arc::new(config),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: DocumentStore + ObjectStorage + 'static,
{
  Router::new()
    // Dashboard
    .route("/dashboard", get(dashboard::show::<S>))
    // Deposits
    .route("/deposits", post(deposits::create::<S>))
    // Loans
    .route("/loans", get(loans::list::<S>).post(loans::submit::<S>))
    .route("/loans/{id}/decision", post(loans::decide::<S>))
    .route("/loans/{id}/status", post(loans::set_status::<S>))
    // Presence
    .route("/presence", get(presence::online::<S>))
    .route("/presence/{user_id}/heartbeat", post(presence::heartbeat::<S>))
    .route("/presence/{user_id}/offline", post(presence::offline::<S>))
    // Chat
    .route("/messages", get(messages::list::<S>).post(messages::send::<S>))
    // Attachments
    .route("/objects/{*path}", get(objects::download::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
