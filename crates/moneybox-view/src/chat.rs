//! The community chat room: message history plus who is around.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use moneybox_core::{
  chat::{ChatMessage, NewMessage},
  collection::{Collection, CollectionQuery, Direction, StoredDocument},
  presence::{UserPresence, UserRecord, online_users},
  store::{DocumentStore, SubscriptionError},
};
use serde::Serialize;
use tokio::sync::watch;

use crate::{Error, Result, coordinator::Coordinator, presence::Member};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatSource {
  Messages,
  Roster,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatView {
  /// Oldest first.
  pub messages: Vec<ChatMessage>,
  pub roster:   Vec<UserRecord>,
  pub error:    Option<String>,
  pub loading:  bool,
}

impl Default for ChatView {
  fn default() -> Self {
    Self { messages: Vec::new(), roster: Vec::new(), error: None, loading: true }
  }
}

impl ChatView {
  pub fn online(&self, now: DateTime<Utc>) -> Vec<UserPresence> { online_users(&self.roster, now) }
}

#[derive(Debug, Clone)]
pub enum ChatEvent {
  Messages(Vec<ChatMessage>),
  Roster(Vec<UserRecord>),
  Failed(String),
}

impl ChatEvent {
  fn decode(source: ChatSource, docs: &[StoredDocument]) -> Self {
    let decoded = match source {
      ChatSource::Messages => {
        docs.iter().map(ChatMessage::from_document).collect::<Result<_, _>>().map(Self::Messages)
      }
      ChatSource::Roster => {
        docs.iter().map(UserRecord::from_document).collect::<Result<_, _>>().map(Self::Roster)
      }
    };
    decoded.unwrap_or_else(|e| {
      tracing::warn!(?source, error = %e, "chat snapshot decode failed");
      Self::Failed(format!("Failed to process chat data: {e}"))
    })
  }

  fn subscription_failed(source: ChatSource, err: &SubscriptionError) -> Self {
    tracing::warn!(?source, code = ?err.code, error = %err.message, "chat subscription error");
    let what = match source {
      ChatSource::Messages => "messages",
      ChatSource::Roster => "users",
    };
    Self::Failed(err.user_message(what))
  }
}

pub fn reduce_chat(state: &ChatView, event: ChatEvent) -> ChatView {
  let mut next = state.clone();
  match event {
    ChatEvent::Messages(mut messages) => {
      messages.sort_by_key(|m| m.timestamp);
      next.messages = messages;
      next.error = None;
      next.loading = false;
    }
    ChatEvent::Roster(roster) => next.roster = roster,
    ChatEvent::Failed(message) => {
      next.error = Some(message);
      next.loading = false;
    }
  }
  next
}

fn history_query() -> CollectionQuery {
  CollectionQuery::new(Collection::Messages).order_by("timestamp", Direction::Ascending)
}

pub struct ChatRoom {
  inner: Coordinator<ChatSource, ChatView, ChatEvent>,
}

impl ChatRoom {
  pub async fn start<S: DocumentStore>(store: &S) -> Self {
    let inner = Coordinator::spawn(ChatView::default(), reduce_chat);
    let sources = [
      (ChatSource::Messages, history_query()),
      (ChatSource::Roster, CollectionQuery::new(Collection::Users)),
    ];
    for (source, query) in sources {
      inner
        .attach(
          store,
          source,
          query,
          move |docs| ChatEvent::decode(source, &docs),
          move |err| ChatEvent::subscription_failed(source, &err),
        )
        .await;
    }
    Self { inner }
  }

  pub fn state(&self) -> Arc<ChatView> { self.inner.state() }

  pub fn watch(&self) -> watch::Receiver<Arc<ChatView>> { self.inner.watch() }

  pub fn shutdown(self) { self.inner.shutdown(); }
}

/// Post a message as `member`. Returns the new message id.
pub async fn send_message<S: DocumentStore>(
  store: &S,
  member: &Member,
  message: NewMessage,
) -> Result<String> {
  message.validate()?;
  let id = store
    .add(Collection::Messages, message.into_fields(&member.user_id, &member.email))
    .await
    .map_err(Error::store)?;
  tracing::debug!(%id, user_id = %member.user_id, "message sent");
  Ok(id)
}

/// One-shot read of the whole history, oldest first.
pub async fn history<S: DocumentStore>(store: &S) -> Result<Vec<ChatMessage>> {
  let docs = store.query(history_query()).await.map_err(Error::store)?;
  Ok(docs.iter().map(ChatMessage::from_document).collect::<Result<_, _>>()?)
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use chrono::TimeDelta;
  use moneybox_core::ValidationError;
  use moneybox_store_sqlite::SqliteStore;
  use serde_json::json;

  use super::*;
  use crate::testing::fields;

  #[tokio::test]
  async fn messages_arrive_in_order_with_author_name() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let room = ChatRoom::start(&store).await;
    let member = Member::new("u1", "efua.owusu@example.com");

    send_message(&store, &member, NewMessage { text: "first".into(), image_url: None }).await.unwrap();
    send_message(&store, &member, NewMessage { text: "second".into(), image_url: None }).await.unwrap();

    let mut rx = room.watch();
    let view = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|v| v.messages.len() == 2))
      .await
      .unwrap()
      .unwrap()
      .clone();
    let texts: Vec<_> = view.messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["first", "second"]);
    assert_eq!(view.messages[0].user_name, "efua.owusu");

    let past = history(&store).await.unwrap();
    assert_eq!(past.len(), 2);
    room.shutdown();
  }

  #[tokio::test]
  async fn empty_message_is_rejected_before_writing() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let err = send_message(&store, &Member::new("u1", "a@x.com"), NewMessage::default())
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::EmptyMessage)));
    assert!(history(&store).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn roster_drives_online_list() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let now = Utc::now();
    store
      .set(
        Collection::Users,
        "fresh".into(),
        fields(json!({ "email": "yaw@x.com", "lastActive": now.to_rfc3339() })),
      )
      .await
      .unwrap();
    store
      .set(
        Collection::Users,
        "stale".into(),
        fields(json!({
          "email": "akua@x.com",
          "isOnline": true,
          "lastActive": (now - TimeDelta::minutes(5)).to_rfc3339(),
        })),
      )
      .await
      .unwrap();

    let room = ChatRoom::start(&store).await;
    let mut rx = room.watch();
    let view = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|v| v.roster.len() == 2))
      .await
      .unwrap()
      .unwrap()
      .clone();

    let online: Vec<_> = view.online(now).into_iter().map(|p| p.user_id).collect();
    assert_eq!(online, ["fresh"]);
  }
}
