//! [`Dashboard`]: live totals, chart and activity across deposits, loans and
//! users.

use std::sync::Arc;

use moneybox_core::store::DocumentStore;
use tokio::sync::watch;

use crate::{
  coordinator::Coordinator,
  reducer::{DashboardConfig, DashboardEvent, DashboardState, Source, reduce},
};

pub struct Dashboard {
  inner: Coordinator<Source, DashboardState, DashboardEvent>,
}

impl Dashboard {
  /// Subscribe to all three sources. Subscription failures do not fail the
  /// call; they show up as per-source errors in the state.
  pub async fn start<S: DocumentStore>(store: &S, config: DashboardConfig) -> Self {
    let inner = Coordinator::spawn(DashboardState::default(), move |state, event| {
      reduce(state, event, &config)
    });

    for source in Source::ALL {
      inner
        .attach(
          store,
          source,
          source.query(),
          move |docs| DashboardEvent::decode(source, &docs),
          move |err| DashboardEvent::subscription_failed(source, &err),
        )
        .await;
    }

    tracing::info!(
      chart_window = config.chart_window,
      activity_limit = config.activity_limit,
      "dashboard started"
    );
    Self { inner }
  }

  pub fn state(&self) -> Arc<DashboardState> { self.inner.state() }

  pub fn watch(&self) -> watch::Receiver<Arc<DashboardState>> { self.inner.watch() }

  /// Stop following one source. Its last values stay in the state.
  pub fn unsubscribe(&self, source: Source) -> bool { self.inner.detach(source) }

  pub fn is_subscribed(&self, source: Source) -> bool { self.inner.is_attached(source) }

  pub fn shutdown(self) {
    self.inner.shutdown();
    tracing::info!("dashboard stopped");
  }
}
