//! Presence heartbeats.
//!
//! Whether a member is online is always derived from `lastActive` (see
//! [`moneybox_core::presence::is_online`]). The heartbeat only keeps that
//! field fresh while a session is open.

use std::{sync::Arc, time::Duration};

use moneybox_core::{
  collection::Collection,
  presence::{HEARTBEAT_INTERVAL, heartbeat_fields, new_user_fields},
  store::DocumentStore,
};
use serde::{Deserialize, Serialize};
use tokio::{
  sync::oneshot,
  task::JoinHandle,
  time::{Instant, MissedTickBehavior},
};

use crate::{Error, Result};

/// The signed-in member a session acts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
  pub user_id: String,
  pub email:   String,
}

impl Member {
  pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
    Self { user_id: user_id.into(), email: email.into() }
  }
}

/// Mark `member` online now, creating their user document on first sight.
pub async fn announce<S: DocumentStore>(store: &S, member: &Member) -> Result<()> {
  let id = member.user_id.clone();
  let existing = store.get(Collection::Users, id.clone()).await.map_err(Error::store)?;

  let written = match existing {
    Some(_) => store.update(Collection::Users, id, heartbeat_fields(true)).await,
    None => {
      tracing::info!(user_id = %member.user_id, "creating user record");
      store.set(Collection::Users, id, new_user_fields(&member.email)).await
    }
  };
  written.map_err(Error::store)
}

pub async fn go_offline<S: DocumentStore>(store: &S, user_id: &str) -> Result<()> {
  store
    .update(Collection::Users, user_id.to_owned(), heartbeat_fields(false))
    .await
    .map_err(Error::store)
}

/// Keeps one member's `lastActive` fresh until stopped or dropped.
///
/// Dropping the handle ends the heartbeat the same way [`stop`] does, except
/// that nothing waits for the final offline write.
///
/// [`stop`]: PresenceHeartbeat::stop
pub struct PresenceHeartbeat {
  stop: oneshot::Sender<()>,
  task: JoinHandle<()>,
}

impl PresenceHeartbeat {
  pub async fn start<S>(store: Arc<S>, member: Member) -> Result<Self>
  where
    S: DocumentStore + 'static,
  {
    Self::start_with_interval(store, member, HEARTBEAT_INTERVAL).await
  }

  pub async fn start_with_interval<S>(
    store: Arc<S>,
    member: Member,
    interval: Duration,
  ) -> Result<Self>
  where
    S: DocumentStore + 'static,
  {
    announce(&*store, &member).await?;
    tracing::debug!(user_id = %member.user_id, ?interval, "heartbeat started");

    let (stop, mut stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

      loop {
        tokio::select! {
          _ = ticker.tick() => {
            if let Err(e) = announce(&*store, &member).await {
              tracing::warn!(user_id = %member.user_id, error = %e, "heartbeat failed");
            }
          }
          _ = &mut stopped => break,
        }
      }

      match go_offline(&*store, &member.user_id).await {
        Ok(()) => tracing::debug!(user_id = %member.user_id, "heartbeat stopped"),
        Err(e) => tracing::warn!(user_id = %member.user_id, error = %e, "offline write failed"),
      }
    });

    Ok(Self { stop, task })
  }

  /// Stop beating and wait for the offline write to finish.
  pub async fn stop(self) {
    let Self { stop, task } = self;
    let _ = stop.send(());
    if let Err(e) = task.await {
      tracing::warn!(error = %e, "heartbeat task ended abnormally");
    }
  }
}
