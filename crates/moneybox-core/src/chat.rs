//! Community chat messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
  Result, ValidationError,
  collection::{Fields, StoredDocument},
  presence::display_name_from_email,
  timestamp,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub id:        String,
  pub text:      String,
  pub image_url: Option<String>,
  pub user_id:   String,
  pub user_name: String,
  pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
  pub fn from_document(doc: &StoredDocument) -> Result<Self> {
    Ok(Self {
      id:        doc.id.clone(),
      text:      doc.str("text").unwrap_or_default().to_owned(),
      image_url: doc.str("imageUrl").map(str::to_owned),
      user_id:   doc.str("userId").unwrap_or_default().to_owned(),
      user_name: doc.str("userName").unwrap_or_default().to_owned(),
      timestamp: doc.instant("timestamp")?,
    })
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewMessage {
  #[serde(default)]
  pub text:      String,
  pub image_url: Option<String>,
}

impl NewMessage {
  pub fn validate(&self) -> Result<(), ValidationError> {
    let has_image = self.image_url.as_deref().is_some_and(|u| !u.trim().is_empty());
    if self.text.trim().is_empty() && !has_image {
      return Err(ValidationError::EmptyMessage);
    }
    Ok(())
  }

  pub fn into_fields(self, user_id: &str, email: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("text".into(), json!(self.text));
    fields.insert("imageUrl".into(), json!(self.image_url));
    fields.insert("userId".into(), json!(user_id));
    fields.insert("userName".into(), json!(display_name_from_email(email)));
    fields.insert("timestamp".into(), timestamp::server_timestamp());
    fields
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_message_rejected() {
    let m = NewMessage { text: "   ".into(), image_url: None };
    assert_eq!(m.validate(), Err(ValidationError::EmptyMessage));
  }

  #[test]
  fn image_only_message_accepted() {
    let m = NewMessage { text: String::new(), image_url: Some("https://img/x.png".into()) };
    assert_eq!(m.validate(), Ok(()));
  }

  #[test]
  fn user_name_from_email() {
    let m = NewMessage { text: "hi".into(), image_url: None };
    let f = m.into_fields("u1", "yaw@example.com");
    assert_eq!(f["userName"], "yaw");
    assert_eq!(f["imageUrl"], serde_json::Value::Null);
  }
}
